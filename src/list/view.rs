use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::item::Item;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    /// Whatever order the store returns
    #[default]
    Manual,
    Alphabetical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewOptions {
    pub sort_mode: SortMode,
    pub group_by_category: bool,
}

/// Presentation split of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ListView {
    pub active: Vec<Item>,
    pub completed: Vec<Item>,
}

impl ListView {
    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.completed.is_empty()
    }

    /// Consecutive runs of active items sharing a category, for section headers.
    /// Only meaningful when the view was projected with category grouping.
    pub fn category_groups(&self) -> Vec<(&str, Vec<&Item>)> {
        let mut groups: Vec<(&str, Vec<&Item>)> = Vec::new();
        for item in &self.active {
            let continues = groups
                .last()
                .is_some_and(|(category, _)| *category == item.category.as_str());
            if continues && let Some((_, members)) = groups.last_mut() {
                members.push(item);
            } else {
                groups.push((item.category.as_str(), vec![item]));
            }
        }
        groups
    }
}

pub fn project(snapshot: &[Item], options: &ViewOptions) -> ListView {
    let (mut active, mut completed): (Vec<Item>, Vec<Item>) = snapshot
        .iter()
        .cloned()
        .partition(|item| !item.is_completed());

    let by_category = options.group_by_category && snapshot.iter().any(Item::has_category);

    if by_category {
        active.sort_by(compare_by_category);
        completed.sort_by(compare_by_category);
    } else if options.sort_mode == SortMode::Alphabetical {
        active.sort_by(|a, b| compare_text(&a.name, &b.name));
        completed.sort_by(|a, b| compare_text(&a.name, &b.name));
    }

    ListView { active, completed }
}

fn compare_by_category(a: &Item, b: &Item) -> Ordering {
    // Categorised items first
    b.has_category()
        .cmp(&a.has_category())
        .then_with(|| compare_text(&a.category, &b.category))
        .then_with(|| compare_text(&a.name, &b.name))
}

/// Case-folded comparison, raw text as tie-break so the order is total.
fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}
