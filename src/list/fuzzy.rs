use std::collections::HashSet;

use super::item::Item;

pub const MAX_SUGGESTIONS: usize = 5;

const SUBSTRING_BASE: u32 = 1000;
const CHAR_SCORE: u32 = 10;
const ADJACENT_BONUS: u32 = 5;

/// Score `query` against `target`, case-insensitively. Zero means no match.
///
/// A contiguous substring scores `1000 - position`. Otherwise the target is
/// walked once, greedily taking the next query character wherever it first
/// appears; every match earns 10 and a match directly after the previous one
/// earns 5 more. Leftover query characters void the score.
pub fn score(query: &str, target: &str) -> u32 {
    let query = query.to_lowercase();
    let target = target.to_lowercase();
    if query.is_empty() {
        return 0;
    }

    if let Some(byte_idx) = target.find(&query) {
        let char_idx = target[..byte_idx].chars().count() as u32;
        return SUBSTRING_BASE.saturating_sub(char_idx).max(1);
    }

    let query_chars: Vec<char> = query.chars().collect();
    let mut next = 0;
    let mut total = 0;
    let mut last_match: Option<usize> = None;

    for (pos, ch) in target.chars().enumerate() {
        if next == query_chars.len() {
            break;
        }
        if ch == query_chars[next] {
            total += CHAR_SCORE;
            if last_match.is_some_and(|prev| prev + 1 == pos) {
                total += ADJACENT_BONUS;
            }
            last_match = Some(pos);
            next += 1;
        }
    }

    if next == query_chars.len() { total } else { 0 }
}

/// Best matches for an autocomplete box, one per case-insensitive name.
pub fn rank<'a>(query: &str, items: &'a [Item]) -> Vec<&'a Item> {
    let mut scored: Vec<(u32, &Item)> = items
        .iter()
        .map(|item| (score(query, &item.name), item))
        .filter(|(s, _)| *s > 0)
        .collect();

    // Stable: equal scores keep snapshot order
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    let mut seen = HashSet::new();
    scored
        .into_iter()
        .filter(|(_, item)| seen.insert(item.name.to_lowercase()))
        .map(|(_, item)| item)
        .take(MAX_SUGGESTIONS)
        .collect()
}
