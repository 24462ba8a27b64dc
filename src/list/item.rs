use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Completion status as the to-do provider names it on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    NeedsAction,
    Completed,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::NeedsAction => "needs_action",
            ItemStatus::Completed => "completed",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            ItemStatus::NeedsAction => ItemStatus::Completed,
            ItemStatus::Completed => ItemStatus::NeedsAction,
        }
    }

    pub fn is_completed(self) -> bool {
        self == ItemStatus::Completed
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "needs_action" | "active" => Ok(ItemStatus::NeedsAction),
            "completed" | "complete" => Ok(ItemStatus::Completed),
            _ => Err(format!("Invalid item status: {}", s)),
        }
    }
}

/// The structured record carried inside a summary string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFields {
    pub name: String,
    pub quantity: u32,
    pub category: String,
    pub notes: String,
}

impl ItemFields {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quantity: 1,
            category: String::new(),
            notes: String::new(),
        }
    }
}

impl Default for ItemFields {
    fn default() -> Self {
        Self::named("")
    }
}

/// A cached list entry. The store owns it; this is the engine's local copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub quantity: u32,
    pub category: String,
    pub notes: String,
    pub status: ItemStatus,
    /// Raw summary last read from (or written to) the store
    pub summary: String,
}

impl Item {
    pub fn from_fields(
        id: impl Into<String>,
        fields: ItemFields,
        status: ItemStatus,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: fields.name,
            quantity: fields.quantity,
            category: fields.category,
            notes: fields.notes,
            status,
            summary: summary.into(),
        }
    }

    pub fn fields(&self) -> ItemFields {
        ItemFields {
            name: self.name.clone(),
            quantity: self.quantity,
            category: self.category.clone(),
            notes: self.notes.clone(),
        }
    }

    pub fn apply_fields(&mut self, fields: ItemFields) {
        self.name = fields.name;
        self.quantity = fields.quantity;
        self.category = fields.category;
        self.notes = fields.notes;
    }

    pub fn is_completed(&self) -> bool {
        self.status.is_completed()
    }

    pub fn has_category(&self) -> bool {
        !self.category.is_empty()
    }

    /// Case-insensitive name comparison used by smart add and suggestions.
    pub fn name_matches(&self, name: &str) -> bool {
        self.name.trim().to_lowercase() == name.trim().to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(ItemStatus::NeedsAction.to_string(), "needs_action");
        assert_eq!(ItemStatus::Completed.to_string(), "completed");
        assert_eq!(
            serde_json::to_string(&ItemStatus::Completed).unwrap(),
            "\"completed\""
        );
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("needs_action".parse(), Ok(ItemStatus::NeedsAction));
        assert_eq!("COMPLETED".parse(), Ok(ItemStatus::Completed));
        assert!("done-ish".parse::<ItemStatus>().is_err());
    }

    #[test]
    fn test_toggled() {
        assert_eq!(ItemStatus::NeedsAction.toggled(), ItemStatus::Completed);
        assert_eq!(ItemStatus::Completed.toggled(), ItemStatus::NeedsAction);
    }

    #[test]
    fn test_name_matches_ignores_case_and_padding() {
        let item = Item::from_fields("1", ItemFields::named("Milk"), ItemStatus::NeedsAction, "Milk");
        assert!(item.name_matches(" milk "));
        assert!(!item.name_matches("oat milk"));
    }
}
