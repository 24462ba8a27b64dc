//! Summary codec.
//!
//! The to-do provider stores one plain-text summary per item. Quantity,
//! category and notes ride inside it using a small suffix grammar:
//!
//! ```text
//! <name> [(<quantity>)] [[<category>]] [// <notes>]
//! ```
//!
//! Stages are peeled from the outside in: notes first, then category, then
//! quantity, each anchored to the end of what is left. Anything that does not
//! match a stage stays part of the name.

use regex::Regex;
use std::sync::LazyLock;

use super::item::ItemFields;

pub const NOTES_DELIMITER: &str = " // ";

static CATEGORY_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)\s*\[([^\[\]]*)\]\s*$").expect("valid category pattern"));

static QUANTITY_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)\s*\((\d+)\)\s*$").expect("valid quantity pattern"));

/// Grammar switches. The card variants differ only in these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecOptions {
    /// Recognise and render a trailing `[category]` group
    pub categories: bool,
    /// Notes live after ` // ` in the summary rather than in the description field
    pub notes_in_summary: bool,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            categories: true,
            notes_in_summary: true,
        }
    }
}

pub fn decode(raw: &str, options: &CodecOptions) -> ItemFields {
    let (rest, notes) = if options.notes_in_summary {
        split_notes(raw)
    } else {
        (raw, "")
    };
    let mut rest = rest.trim();

    let mut category = String::new();
    if options.categories
        && let Some(caps) = CATEGORY_SUFFIX.captures(rest)
    {
        category = caps[2].trim().to_string();
        rest = caps.get(1).map_or("", |m| m.as_str()).trim();
    }

    let mut quantity = 1;
    if let Some(caps) = QUANTITY_SUFFIX.captures(rest)
        && let Ok(parsed) = caps[2].parse::<u32>()
        && parsed > 0
    {
        quantity = parsed;
        rest = caps.get(1).map_or("", |m| m.as_str()).trim();
    }

    ItemFields {
        name: rest.to_string(),
        quantity,
        category,
        notes: notes.to_string(),
    }
}

pub fn encode(fields: &ItemFields, options: &CodecOptions) -> String {
    let mut summary = fields.name.clone();
    if fields.quantity > 1 {
        summary.push_str(&format!(" ({})", fields.quantity));
    }
    if options.categories && !fields.category.is_empty() {
        summary.push_str(&format!(" [{}]", fields.category));
    }
    if options.notes_in_summary && !fields.notes.is_empty() {
        summary.push_str(NOTES_DELIMITER);
        summary.push_str(&fields.notes);
    }
    summary
}

/// Parse what a user typed into the add box. Notes are always recognised
/// here, even when they end up stored in the description field.
pub fn parse_input(text: &str, options: &CodecOptions) -> ItemFields {
    let options = CodecOptions {
        notes_in_summary: true,
        ..*options
    };
    decode(text.trim(), &options)
}

fn split_notes(raw: &str) -> (&str, &str) {
    match raw.split_once(NOTES_DELIMITER) {
        Some((head, notes)) => (head, notes.trim()),
        None => (raw, ""),
    }
}
