//! External item stores.
//!
//! The engine only sees [`ItemStore`]: a remote list of raw summaries with
//! add/update/remove and a payload-free change signal. Backends decide how ids
//! are assigned and how out-of-band edits are noticed.

pub mod hass;
pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::list::ItemStatus;
use crate::utils::paths::get_database_path;

pub use hass::HassStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// One entry exactly as the store holds it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteItem {
    pub id: String,
    pub summary: String,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Partial update. `None` leaves a field untouched; an empty description clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemPatch {
    pub summary: Option<String>,
    pub status: Option<ItemStatus>,
    pub description: Option<String>,
}

impl ItemPatch {
    pub fn summary(summary: impl Into<String>) -> Self {
        Self {
            summary: Some(summary.into()),
            ..Self::default()
        }
    }

    pub fn status(status: ItemStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn description(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.status.is_none() && self.description.is_none()
    }
}

/// Yields once per observed change; carries no data, consumers re-fetch.
pub type ChangeStream = BoxStream<'static, ()>;

#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn list(&self, list_id: &str) -> Result<Vec<RemoteItem>>;

    async fn add(&self, list_id: &str, summary: &str, description: Option<&str>) -> Result<()>;

    async fn update(&self, list_id: &str, id: &str, patch: ItemPatch) -> Result<()>;

    async fn remove(&self, list_id: &str, ids: &[String]) -> Result<()>;

    async fn subscribe(&self, list_id: &str) -> Result<ChangeStream>;
}

/// Build the backend selected in the config file.
pub fn open(config: &StoreConfig) -> Result<Arc<dyn ItemStore>> {
    let store: Arc<dyn ItemStore> = match config {
        StoreConfig::Memory => Arc::new(MemoryStore::new()),
        StoreConfig::Sqlite { path } => {
            let path = match path {
                Some(p) => p.clone(),
                None => get_database_path()?,
            };
            Arc::new(SqliteStore::open(path)?)
        }
        StoreConfig::HomeAssistant {
            url,
            token,
            poll_interval_secs,
        } => Arc::new(HassStore::new(
            url,
            token,
            std::time::Duration::from_secs(*poll_interval_secs),
        )?),
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_constructors() {
        assert!(ItemPatch::default().is_empty());
        assert_eq!(ItemPatch::summary("Milk").summary.as_deref(), Some("Milk"));
        assert_eq!(
            ItemPatch::status(ItemStatus::Completed).status,
            Some(ItemStatus::Completed)
        );
        assert!(!ItemPatch::description("").is_empty());
    }

    #[test]
    fn test_remote_item_json_shape() {
        let item = RemoteItem {
            id: "abc".to_string(),
            summary: "Milk (2)".to_string(),
            status: ItemStatus::NeedsAction,
            description: None,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["status"], "needs_action");
        assert!(json.get("description").is_none());
    }

    #[tokio::test]
    async fn test_open_memory_backend() {
        let store = open(&StoreConfig::Memory).unwrap();
        store.add("shopping", "Milk", None).await.unwrap();
        assert_eq!(store.list("shopping").await.unwrap().len(), 1);
    }
}
