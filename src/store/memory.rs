use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use super::{ChangeStream, ItemPatch, ItemStore, RemoteItem};
use crate::list::ItemStatus;

/// In-process store keyed by list id. Every mutation broadcasts the list id
/// so subscribers see changes made through any handle.
pub struct MemoryStore {
    lists: Mutex<HashMap<String, Vec<RemoteItem>>>,
    changes: broadcast::Sender<String>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            lists: Mutex::new(HashMap::new()),
            changes,
        }
    }

    /// Seed an item the way another client would, returning its new id.
    pub fn insert(&self, list_id: &str, summary: &str, status: ItemStatus) -> String {
        let id = Uuid::new_v4().simple().to_string();
        self.lock()
            .entry(list_id.to_string())
            .or_default()
            .push(RemoteItem {
                id: id.clone(),
                summary: summary.to_string(),
                status,
                description: None,
            });
        self.notify(list_id);
        id
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<RemoteItem>>> {
        self.lists.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, list_id: &str) {
        // No receivers is fine
        let _ = self.changes.send(list_id.to_string());
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn list(&self, list_id: &str) -> Result<Vec<RemoteItem>> {
        Ok(self.lock().get(list_id).cloned().unwrap_or_default())
    }

    async fn add(&self, list_id: &str, summary: &str, description: Option<&str>) -> Result<()> {
        if summary.trim().is_empty() {
            bail!("Item summary cannot be empty");
        }
        let id = Uuid::new_v4().simple().to_string();
        debug!(list_id = %list_id, id = %id, "memory store add");
        self.lock()
            .entry(list_id.to_string())
            .or_default()
            .push(RemoteItem {
                id,
                summary: summary.to_string(),
                status: ItemStatus::NeedsAction,
                description: description.filter(|d| !d.is_empty()).map(str::to_string),
            });
        self.notify(list_id);
        Ok(())
    }

    async fn update(&self, list_id: &str, id: &str, patch: ItemPatch) -> Result<()> {
        {
            let mut lists = self.lock();
            let item = lists
                .get_mut(list_id)
                .and_then(|items| items.iter_mut().find(|item| item.id == id))
                .ok_or_else(|| anyhow!("Item {} not found in list {}", id, list_id))?;

            if let Some(summary) = patch.summary {
                if summary.trim().is_empty() {
                    bail!("Item summary cannot be empty");
                }
                item.summary = summary;
            }
            if let Some(status) = patch.status {
                item.status = status;
            }
            if let Some(description) = patch.description {
                item.description = if description.is_empty() {
                    None
                } else {
                    Some(description)
                };
            }
        }
        self.notify(list_id);
        Ok(())
    }

    async fn remove(&self, list_id: &str, ids: &[String]) -> Result<()> {
        {
            let mut lists = self.lock();
            let items = lists
                .get_mut(list_id)
                .ok_or_else(|| anyhow!("List {} not found", list_id))?;
            if let Some(missing) = ids.iter().find(|id| !items.iter().any(|item| &item.id == *id)) {
                bail!("Item {} not found in list {}", missing, list_id);
            }
            items.retain(|item| !ids.contains(&item.id));
        }
        self.notify(list_id);
        Ok(())
    }

    async fn subscribe(&self, list_id: &str) -> Result<ChangeStream> {
        let rx = self.changes.subscribe();
        let wanted = list_id.to_string();
        let changes = stream::unfold(rx, move |mut rx| {
            let wanted = wanted.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(changed) if changed == wanted => return Some(((), rx)),
                        Ok(_) => continue,
                        // Missed some; one re-fetch covers them all
                        Err(broadcast::error::RecvError::Lagged(_)) => return Some(((), rx)),
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });
        Ok(changes.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_add_assigns_ids_in_order() {
        let store = MemoryStore::new();
        store.add("list", "Milk", None).await.unwrap();
        store.add("list", "Eggs", Some("free range")).await.unwrap();

        let items = store.list("list").await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].summary, "Milk");
        assert_eq!(items[1].description.as_deref(), Some("free range"));
        assert_ne!(items[0].id, items[1].id);
    }

    #[tokio::test]
    async fn test_lists_are_separate() {
        let store = MemoryStore::new();
        store.add("a", "Milk", None).await.unwrap();
        assert!(store.list("b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_partial_fields() {
        let store = MemoryStore::new();
        let id = store.insert("list", "Milk", ItemStatus::NeedsAction);

        store
            .update("list", &id, ItemPatch::status(ItemStatus::Completed))
            .await
            .unwrap();
        store
            .update("list", &id, ItemPatch::description("2%"))
            .await
            .unwrap();

        let item = &store.list("list").await.unwrap()[0];
        assert_eq!(item.summary, "Milk");
        assert_eq!(item.status, ItemStatus::Completed);
        assert_eq!(item.description.as_deref(), Some("2%"));

        store
            .update("list", &id, ItemPatch::description(""))
            .await
            .unwrap();
        assert_eq!(store.list("list").await.unwrap()[0].description, None);
    }

    #[tokio::test]
    async fn test_update_unknown_id_fails() {
        let store = MemoryStore::new();
        store.insert("list", "Milk", ItemStatus::NeedsAction);
        assert!(
            store
                .update("list", "nope", ItemPatch::summary("x"))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_remove_batch() {
        let store = MemoryStore::new();
        let a = store.insert("list", "A", ItemStatus::Completed);
        let _b = store.insert("list", "B", ItemStatus::NeedsAction);
        let c = store.insert("list", "C", ItemStatus::Completed);

        store.remove("list", &[a, c]).await.unwrap();

        let items = store.list("list").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].summary, "B");
    }

    #[tokio::test]
    async fn test_remove_unknown_id_leaves_list_untouched() {
        let store = MemoryStore::new();
        let a = store.insert("list", "A", ItemStatus::NeedsAction);
        assert!(store.remove("list", &[a, "ghost".to_string()]).await.is_err());
        assert_eq!(store.list("list").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_filters_by_list() {
        let store = MemoryStore::new();
        let mut changes = store.subscribe("mine").await.unwrap();

        store.insert("other", "X", ItemStatus::NeedsAction);
        store.insert("mine", "Y", ItemStatus::NeedsAction);

        assert_eq!(changes.next().await, Some(()));
        let items = store.list("mine").await.unwrap();
        assert_eq!(items[0].summary, "Y");
    }
}
