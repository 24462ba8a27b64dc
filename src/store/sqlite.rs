use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use futures_util::stream;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use rusqlite::{Connection, OptionalExtension, params};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{ChangeStream, ItemPatch, ItemStore, RemoteItem};
use crate::list::ItemStatus;

/// Local SQLite-backed list store. Several lists share one table.
///
/// Other processes writing the same file are noticed through a filesystem
/// watch on the database directory.
pub struct SqliteStore {
    path: PathBuf,
}

/// Raw row before the status column is parsed
struct ItemRowData {
    id: String,
    summary: String,
    status_str: String,
    description: Option<String>,
}

impl ItemRowData {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            summary: row.get(1)?,
            status_str: row.get(2)?,
            description: row.get(3)?,
        })
    }

    fn into_remote_item(self) -> RemoteItem {
        let status = self.status_str.parse().unwrap_or_else(|_| {
            warn!(id = %self.id, status = %self.status_str, "Unknown status in database, treating as active");
            ItemStatus::NeedsAction
        });
        RemoteItem {
            id: self.id,
            summary: self.summary,
            status,
            description: self.description,
        }
    }
}

impl SqliteStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { path: path.into() };

        if let Some(parent) = store.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        init_schema(&open_connection(&store.path)?)?;
        Ok(store)
    }

    /// Run `f` against a fresh connection on the blocking thread pool.
    async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = open_connection(&path)?;
            f(&mut conn)
        })
        .await
        .context("Database task panicked or was cancelled")?
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    Connection::open(path).with_context(|| format!("Failed to open database at {:?}", path))
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS items (
            id TEXT PRIMARY KEY,
            list_id TEXT NOT NULL,
            summary TEXT NOT NULL,
            status TEXT NOT NULL,
            description TEXT,
            position INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_items_list_position ON items(list_id, position)",
        [],
    )?;

    Ok(())
}

fn select_items(conn: &Connection, list_id: &str) -> Result<Vec<RemoteItem>> {
    let mut stmt = conn.prepare(
        "SELECT id, summary, status, description
         FROM items
         WHERE list_id = ?1
         ORDER BY position ASC",
    )?;

    let rows = stmt.query_map(params![list_id], ItemRowData::from_row)?;

    let mut result = Vec::new();
    for row in rows {
        result.push(row?.into_remote_item());
    }
    Ok(result)
}

fn update_item(conn: &mut Connection, list_id: &str, id: &str, patch: ItemPatch) -> Result<()> {
    let tx = conn.transaction()?;

    let current: Option<RemoteItem> = tx
        .query_row(
            "SELECT id, summary, status, description FROM items WHERE list_id = ?1 AND id = ?2",
            params![list_id, id],
            ItemRowData::from_row,
        )
        .optional()?
        .map(ItemRowData::into_remote_item);

    let mut item = current.ok_or_else(|| anyhow!("Item {} not found in list {}", id, list_id))?;

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

    tx.execute(
        "UPDATE items SET summary = ?1, status = ?2, description = ?3, updated_at = ?4
         WHERE list_id = ?5 AND id = ?6",
        params![
            item.summary,
            item.status.as_str(),
            item.description,
            Utc::now().to_rfc3339(),
            list_id,
            id
        ],
    )?;
    tx.commit()?;
    Ok(())
}

fn delete_items(conn: &mut Connection, list_id: &str, ids: &[String]) -> Result<()> {
    let tx = conn.transaction()?;
    for id in ids {
        let deleted = tx.execute(
            "DELETE FROM items WHERE list_id = ?1 AND id = ?2",
            params![list_id, id],
        )?;
        if deleted == 0 {
            // Dropping the transaction rolls back the earlier deletes
            bail!("Item {} not found in list {}", id, list_id);
        }
    }
    tx.commit()?;
    Ok(())
}

#[async_trait]
impl ItemStore for SqliteStore {
    async fn list(&self, list_id: &str) -> Result<Vec<RemoteItem>> {
        let list_id = list_id.to_string();
        self.with_connection(move |conn| select_items(conn, &list_id))
            .await
    }

    async fn add(&self, list_id: &str, summary: &str, description: Option<&str>) -> Result<()> {
        if summary.trim().is_empty() {
            bail!("Item summary cannot be empty");
        }

        let now = Utc::now().to_rfc3339();
        let id = Uuid::new_v4().simple().to_string();
        let list_id = list_id.to_string();
        let summary = summary.to_string();
        let description = description.filter(|d| !d.is_empty()).map(str::to_string);

        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO items (id, list_id, summary, status, description, position, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5,
                         (SELECT COALESCE(MAX(position) + 1, 0) FROM items WHERE list_id = ?2),
                         ?6, ?6)",
                params![
                    id,
                    list_id,
                    summary,
                    ItemStatus::NeedsAction.as_str(),
                    description,
                    now
                ],
            )?;
            debug!(list_id = %list_id, id = %id, "sqlite store add");
            Ok(())
        })
        .await
    }

    async fn update(&self, list_id: &str, id: &str, patch: ItemPatch) -> Result<()> {
        let list_id = list_id.to_string();
        let id = id.to_string();
        self.with_connection(move |conn| update_item(conn, &list_id, &id, patch))
            .await
    }

    async fn remove(&self, list_id: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let list_id = list_id.to_string();
        let ids = ids.to_vec();
        self.with_connection(move |conn| delete_items(conn, &list_id, &ids))
            .await
    }

    async fn subscribe(&self, list_id: &str) -> Result<ChangeStream> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("Database path has no file name: {:?}", self.path))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    if touches_database(&event, &file_name) {
                        let _ = tx.send(());
                    }
                }
                Err(e) => warn!(error = %e, "Database watch error"),
            })?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;

        debug!(list_id = %list_id, dir = %dir.display(), "Watching database for changes");

        // The watcher lives as long as the stream
        let changes = stream::unfold((rx, watcher), |(mut rx, watcher)| async move {
            rx.recv().await?;
            // Collapse a burst of filesystem events into one signal
            while rx.try_recv().is_ok() {}
            Some(((), (rx, watcher)))
        });
        Ok(changes.boxed())
    }
}

/// Whether a filesystem event concerns the database file or its journal.
fn touches_database(event: &notify::Event, file_name: &str) -> bool {
    if !matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    ) {
        return false;
    }
    event.paths.iter().any(|p| {
        p.file_name()
            .map(|n| n.to_string_lossy().starts_with(file_name))
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, SqliteStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path().join("items.db")).unwrap();
        (dir, store)
    }

    fn summaries(items: &[RemoteItem]) -> Vec<&str> {
        items.iter().map(|i| i.summary.as_str()).collect()
    }

    #[tokio::test]
    async fn test_add_preserves_insertion_order() {
        let (_dir, store) = temp_store();
        store.add("groceries", "Milk", None).await.unwrap();
        store.add("groceries", "Bread (2)", None).await.unwrap();
        store.add("hardware", "Nails", None).await.unwrap();
        store.add("groceries", "Eggs", Some("dozen")).await.unwrap();

        let items = store.list("groceries").await.unwrap();
        assert_eq!(summaries(&items), vec!["Milk", "Bread (2)", "Eggs"]);
        assert_eq!(items[2].description.as_deref(), Some("dozen"));
        assert!(items.iter().all(|i| i.status == ItemStatus::NeedsAction));
    }

    #[tokio::test]
    async fn test_add_rejects_empty_summary() {
        let (_dir, store) = temp_store();
        assert!(store.add("groceries", "   ", None).await.is_err());
    }

    #[tokio::test]
    async fn test_update_merges_patch() {
        let (_dir, store) = temp_store();
        store.add("groceries", "Milk", Some("2%")).await.unwrap();
        let id = store.list("groceries").await.unwrap()[0].id.clone();

        store
            .update("groceries", &id, ItemPatch::summary("Milk (3)"))
            .await
            .unwrap();
        store
            .update("groceries", &id, ItemPatch::status(ItemStatus::Completed))
            .await
            .unwrap();

        let item = &store.list("groceries").await.unwrap()[0];
        assert_eq!(item.summary, "Milk (3)");
        assert_eq!(item.status, ItemStatus::Completed);
        assert_eq!(item.description.as_deref(), Some("2%"));
    }

    #[tokio::test]
    async fn test_update_unknown_item() {
        let (_dir, store) = temp_store();
        let err = store
            .update("groceries", "missing", ItemPatch::summary("x"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_remove_batch_is_atomic() {
        let (_dir, store) = temp_store();
        for name in ["A", "B", "C"] {
            store.add("groceries", name, None).await.unwrap();
        }
        let ids: Vec<String> = store
            .list("groceries")
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();

        let bad = vec![ids[0].clone(), "ghost".to_string()];
        assert!(store.remove("groceries", &bad).await.is_err());
        assert_eq!(store.list("groceries").await.unwrap().len(), 3);

        store
            .remove("groceries", &[ids[0].clone(), ids[2].clone()])
            .await
            .unwrap();
        assert_eq!(summaries(&store.list("groceries").await.unwrap()), vec!["B"]);
    }

    #[tokio::test]
    async fn test_position_continues_after_removal() {
        let (_dir, store) = temp_store();
        store.add("groceries", "A", None).await.unwrap();
        store.add("groceries", "B", None).await.unwrap();
        let first = store.list("groceries").await.unwrap()[0].id.clone();
        store.remove("groceries", &[first]).await.unwrap();
        store.add("groceries", "C", None).await.unwrap();

        assert_eq!(summaries(&store.list("groceries").await.unwrap()), vec!["B", "C"]);
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("items.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.add("groceries", "Milk", None).await.unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.list("groceries").await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_writers_share_the_file() {
        let (_dir, store) = temp_store();
        let store = std::sync::Arc::new(store);

        let adds = (0..8).map(|n| {
            let store = store.clone();
            tokio::spawn(async move { store.add("groceries", &format!("Item {n}"), None).await })
        });
        for result in futures_util::future::join_all(adds).await {
            result.unwrap().unwrap();
        }

        let items = store.list("groceries").await.unwrap();
        assert_eq!(items.len(), 8);
        let mut names = summaries(&items);
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 8);
    }

    #[test]
    fn test_touches_database_filters_paths() {
        let event = notify::Event::new(EventKind::Modify(notify::event::ModifyKind::Any))
            .add_path(PathBuf::from("/tmp/x/items.db-journal"));
        assert!(touches_database(&event, "items.db"));

        let other = notify::Event::new(EventKind::Modify(notify::event::ModifyKind::Any))
            .add_path(PathBuf::from("/tmp/x/config.toml"));
        assert!(!touches_database(&other, "items.db"));

        let access = notify::Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(PathBuf::from("/tmp/x/items.db"));
        assert!(!touches_database(&access, "items.db"));
    }
}
