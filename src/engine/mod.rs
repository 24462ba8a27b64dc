//! Reconciliation engine.
//!
//! [`ShoppingList`] keeps a local snapshot of one remote list. Every edit is
//! applied to the snapshot first and published to subscribers, then written
//! to the store, then followed by a full re-fetch; the store is the source of
//! truth and the snapshot is only ever a provisional copy of it.
//!
//! Quantity edits are debounced per item: a new edit within [`DEBOUNCE`]
//! replaces the scheduled write, so one write carries the last value. An
//! item never has two quantity writes in flight; edits that arrive during a
//! write are sent in one follow-up once it returns. All other edits are
//! written immediately. Store failures are logged and never
//! leave this module.

mod pending;


use futures_util::StreamExt;
use futures_util::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ConfigError;
use crate::list::codec::{self, CodecOptions};
use crate::list::fuzzy;
use crate::list::view::{self, ListView, ViewOptions};
use crate::list::{Item, ItemFields, ItemStatus};
use crate::store::{ItemPatch, ItemStore, RemoteItem};

use pending::PendingWrites;

/// Quiet period before a quantity edit is written.
pub const DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOptions {
    pub list_id: String,
    pub codec: CodecOptions,
    pub view: ViewOptions,
}

impl ListOptions {
    pub fn new(list_id: impl Into<String>) -> Self {
        Self {
            list_id: list_id.into(),
            codec: CodecOptions::default(),
            view: ViewOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No fetch has succeeded yet
    Uninitialized,
    /// Snapshot mirrors the last successful fetch plus local edits
    Synced,
}

struct ListState {
    phase: EngineState,
    items: Vec<Item>,
    pending: PendingWrites,
}

struct Inner {
    store: Arc<dyn ItemStore>,
    options: ListOptions,
    state: Mutex<ListState>,
    snapshot_tx: watch::Sender<Vec<Item>>,
    fetch_gate: tokio::sync::Mutex<()>,
    fetch_requested: AtomicU64,
    fetch_covered: AtomicU64,
    writes_settled: Notify,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let listener = self.listener.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(task) = listener.take() {
            task.abort();
        }
    }
}

/// Controller for one shopping list. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ShoppingList {
    inner: Arc<Inner>,
}

impl ShoppingList {
    pub fn new(store: Arc<dyn ItemStore>, options: ListOptions) -> Self {
        let (snapshot_tx, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(Inner {
                store,
                options,
                state: Mutex::new(ListState {
                    phase: EngineState::Uninitialized,
                    items: Vec::new(),
                    pending: PendingWrites::default(),
                }),
                snapshot_tx,
                fetch_gate: tokio::sync::Mutex::new(()),
                fetch_requested: AtomicU64::new(0),
                fetch_covered: AtomicU64::new(0),
                writes_settled: Notify::new(),
                listener: Mutex::new(None),
            }),
        }
    }

    pub fn options(&self) -> &ListOptions {
        &self.inner.options
    }

    pub fn state(&self) -> EngineState {
        self.lock_state().phase
    }

    pub fn snapshot(&self) -> Vec<Item> {
        self.lock_state().items.clone()
    }

    pub fn get(&self, id: &str) -> Option<Item> {
        self.lock_state().items.iter().find(|i| i.id == id).cloned()
    }

    /// Look an item up by id, falling back to a case-insensitive name
    /// (active items win over completed ones).
    pub fn find(&self, id_or_name: &str) -> Option<Item> {
        let state = self.lock_state();
        state
            .items
            .iter()
            .find(|i| i.id == id_or_name)
            .or_else(|| {
                state
                    .items
                    .iter()
                    .find(|i| !i.is_completed() && i.name_matches(id_or_name))
            })
            .or_else(|| state.items.iter().find(|i| i.name_matches(id_or_name)))
            .cloned()
    }

    /// Receives the snapshot after every local edit and every fetch.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Item>> {
        self.inner.snapshot_tx.subscribe()
    }

    pub fn view(&self) -> ListView {
        view::project(&self.lock_state().items, &self.inner.options.view)
    }

    pub fn suggest(&self, query: &str) -> Vec<Item> {
        let state = self.lock_state();
        fuzzy::rank(query, &state.items).into_iter().cloned().collect()
    }

    pub fn pending_writes(&self) -> usize {
        self.lock_state().pending.len()
    }

    /// Load the list and follow out-of-band changes from the store.
    ///
    /// A failed first fetch is not fatal: the list stays
    /// [`EngineState::Uninitialized`] until a later fetch succeeds.
    pub async fn start(&self) -> Result<(), ConfigError> {
        let list_id = &self.inner.options.list_id;
        if list_id.trim().is_empty() {
            return Err(ConfigError::MissingListId);
        }

        info!(list_id = %list_id, "Starting shopping list");
        self.fetch_all().await;
        if self.state() == EngineState::Uninitialized {
            warn!(list_id = %list_id, "Initial fetch failed, waiting for the next change");
        }

        self.listen_for_changes().await;
        Ok(())
    }

    /// Write out pending quantities and stop following store changes.
    pub async fn shutdown(&self) {
        self.flush().await;
        if let Some(task) = self.lock_listener().take() {
            task.abort();
        }
        info!(list_id = %self.inner.options.list_id, "Shopping list stopped");
    }

    async fn listen_for_changes(&self) {
        let list_id = &self.inner.options.list_id;
        let mut changes = match self.inner.store.subscribe(list_id).await {
            Ok(changes) => changes,
            Err(e) => {
                warn!(list_id = %list_id, error = %e, "Could not subscribe to store changes");
                return;
            }
        };

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            while changes.next().await.is_some() {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                debug!("Store reported a change, re-fetching");
                ShoppingList { inner }.fetch_all().await;
            }
        });

        if let Some(previous) = self.lock_listener().replace(task) {
            previous.abort();
        }
    }

    /// Replace the snapshot with the store's current list.
    ///
    /// Overlapping calls are coalesced: a fetch that starts after a call was
    /// made answers that call, so queued callers whose request it covers
    /// return without fetching again.
    pub async fn fetch_all(&self) {
        let inner = &self.inner;
        let ticket = inner.fetch_requested.fetch_add(1, Ordering::SeqCst) + 1;

        let _gate = inner.fetch_gate.lock().await;
        if inner.fetch_covered.load(Ordering::SeqCst) >= ticket {
            debug!(ticket, "Fetch covered by one already completed");
            return;
        }
        inner
            .fetch_covered
            .store(inner.fetch_requested.load(Ordering::SeqCst), Ordering::SeqCst);

        match inner.store.list(&inner.options.list_id).await {
            Ok(remote) => self.replace_snapshot(remote),
            Err(e) => warn!(
                list_id = %inner.options.list_id,
                error = %e,
                "Fetch failed, keeping previous snapshot"
            ),
        }
    }

    fn replace_snapshot(&self, remote: Vec<RemoteItem>) {
        let codec = &self.inner.options.codec;
        let mut items: Vec<Item> = remote
            .into_iter()
            .map(|r| decode_remote(r, codec))
            .collect();

        let mut state = self.lock_state();
        // A stepper still inside its debounce window keeps its local value
        for item in &mut items {
            if let Some(quantity) = state.pending.quantity(&item.id) {
                item.quantity = quantity;
            }
        }
        state.items = items;
        state.phase = EngineState::Synced;
        debug!(count = state.items.len(), "Snapshot replaced");
        self.publish(&state);
    }

    /// Smart add.
    ///
    /// `text` may carry the summary grammar (`Eggs (12) [Dairy] // large`).
    /// An active item with the same name has its quantity raised through the
    /// debounced path; a completed one is reactivated immediately; otherwise
    /// a new item is added.
    pub async fn add_or_bump(&self, text: &str) {
        let input = codec::parse_input(text, &self.inner.options.codec);
        if input.name.is_empty() {
            warn!(text = %text, "Ignoring add with an empty name");
            return;
        }

        let existing = {
            let state = self.lock_state();
            let active = state
                .items
                .iter()
                .find(|i| !i.is_completed() && i.name_matches(&input.name));
            let completed = state
                .items
                .iter()
                .find(|i| i.is_completed() && i.name_matches(&input.name));
            active.or(completed).map(|i| (i.id.clone(), i.status))
        };

        match existing {
            Some((id, ItemStatus::NeedsAction)) => self.bump(&id, input).await,
            Some((id, ItemStatus::Completed)) => self.reactivate(&id, input).await,
            None => self.create(input).await,
        }
    }

    /// Raise an active item's quantity through the debounced path. Typed
    /// category or notes are written straight away on top of the live record.
    async fn bump(&self, id: &str, input: ItemFields) {
        debug!(id = %id, name = %input.name, "Bumping existing item");
        let added = i64::from(input.quantity);
        self.adjust_quantity(id, |current| i64::from(current) + added);

        if input.category.is_empty() && input.notes.is_empty() {
            return;
        }
        let patch = self.patch_cached(id, "update typed fields", |item, codec| {
            let mut fields = item.fields();
            if !input.category.is_empty() {
                fields.category = input.category;
            }
            let new_notes = !input.notes.is_empty();
            if new_notes {
                fields.notes = input.notes;
            }
            let description = (new_notes && !codec.notes_in_summary).then(|| fields.notes.clone());
            let mut patch = summary_patch(item, fields, codec);
            patch.description = description;
            patch
        });
        self.commit(id, patch, "update typed fields").await;
    }

    async fn reactivate(&self, id: &str, input: ItemFields) {
        info!(id = %id, name = %input.name, "Reactivating completed item");
        let patch = self.patch_cached(id, "reactivate", |item, codec| {
            item.status = ItemStatus::NeedsAction;
            let carries_fields =
                input.quantity > 1 || !input.category.is_empty() || !input.notes.is_empty();
            if !carries_fields {
                return ItemPatch::status(ItemStatus::NeedsAction);
            }

            let mut fields = item.fields();
            fields.quantity = input.quantity;
            if !input.category.is_empty() {
                fields.category = input.category;
            }
            let new_notes = !input.notes.is_empty();
            if new_notes {
                fields.notes = input.notes;
            }
            let description = (new_notes && !codec.notes_in_summary).then(|| fields.notes.clone());
            let mut patch = summary_patch(item, fields, codec);
            patch.status = Some(ItemStatus::NeedsAction);
            patch.description = description;
            patch
        });
        self.commit(id, patch, "reactivate").await;
    }

    async fn create(&self, input: ItemFields) {
        let inner = &self.inner;
        let codec = &inner.options.codec;
        let summary = codec::encode(&input, codec);
        let description = (!codec.notes_in_summary && !input.notes.is_empty())
            .then_some(input.notes.as_str());

        info!(summary = %summary, "Adding new item");
        if let Err(e) = inner
            .store
            .add(&inner.options.list_id, &summary, description)
            .await
        {
            warn!(summary = %summary, error = %e, "Store add failed");
        }
        self.fetch_all().await;
    }

    /// Set an item's quantity (clamped to at least 1). The snapshot changes
    /// now; the store write follows after [`DEBOUNCE`] of quiet.
    pub fn set_quantity(&self, id: &str, quantity: i64) {
        self.adjust_quantity(id, |_| quantity);
    }

    pub fn increment(&self, id: &str) {
        self.adjust_quantity(id, |current| i64::from(current) + 1);
    }

    pub fn decrement(&self, id: &str) {
        self.adjust_quantity(id, |current| i64::from(current) - 1);
    }

    fn adjust_quantity(&self, id: &str, target: impl FnOnce(u32) -> i64) {
        let mut state = self.lock_state();
        let Some(item) = state.items.iter_mut().find(|i| i.id == id) else {
            warn!(id = %id, "Quantity change for an item not in the snapshot");
            return;
        };
        let quantity = clamp_quantity(target(item.quantity));
        item.quantity = quantity;

        let list = self.clone();
        let key = id.to_string();
        state.pending.schedule(id, quantity, move |generation| {
            tokio::spawn(async move {
                tokio::time::sleep(DEBOUNCE).await;
                list.fire_pending(&key, generation).await;
            })
        });
        debug!(id = %id, quantity, "Quantity write scheduled");
        self.publish(&state);
    }

    async fn fire_pending(&self, id: &str, generation: u64) {
        let quantity = self.lock_state().pending.begin_write(id, generation);
        let Some(quantity) = quantity else {
            return;
        };
        self.drive_write(id, quantity).await;
        self.fetch_all().await;
    }

    /// Write `quantity`, then keep writing whatever the item was changed to
    /// while the previous write was in flight.
    async fn drive_write(&self, id: &str, mut quantity: u32) {
        loop {
            self.write_quantity(id, quantity).await;
            let follow_up = self.lock_state().pending.finish_write(id);
            match follow_up {
                Some(next) => {
                    debug!(id = %id, quantity = next, "Item changed during write, following up");
                    quantity = next;
                }
                None => break,
            }
        }
        self.inner.writes_settled.notify_waiters();
    }

    /// Encode the live cached record with `quantity` and write it.
    async fn write_quantity(&self, id: &str, quantity: u32) {
        let summary = {
            let state = self.lock_state();
            let Some(item) = state.items.iter().find(|i| i.id == id) else {
                debug!(id = %id, "Item gone before its quantity write");
                return;
            };
            let mut fields = item.fields();
            fields.quantity = quantity;
            codec::encode(&fields, &self.inner.options.codec)
        };
        info!(id = %id, quantity, "Writing quantity");
        self.write(id, ItemPatch::summary(summary), "set quantity").await;
    }

    /// Fire every debounced write now instead of waiting for its timer, and
    /// wait for writes already in flight. Returns once nothing is pending.
    pub async fn flush(&self) {
        loop {
            let settled = self.inner.writes_settled.notified();
            let (claimed, outstanding) = {
                let mut state = self.lock_state();
                let claimed = state.pending.claim_idle();
                (claimed, state.pending.len())
            };
            if outstanding == 0 {
                return;
            }
            if claimed.is_empty() {
                settled.await;
                continue;
            }

            info!(count = claimed.len(), "Flushing pending quantity writes");
            join_all(
                claimed
                    .iter()
                    .map(|(id, quantity)| self.drive_write(id, *quantity)),
            )
            .await;
            self.fetch_all().await;
        }
    }

    pub async fn toggle_complete(&self, id: &str) {
        let patch = self.patch_cached(id, "toggle complete", |item, _| {
            item.status = item.status.toggled();
            ItemPatch::status(item.status)
        });
        self.commit(id, patch, "toggle complete").await;
    }

    pub async fn rename(&self, id: &str, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            warn!(id = %id, "Ignoring rename to an empty name");
            return;
        }
        let patch = self.patch_cached(id, "rename", |item, codec| {
            let mut fields = item.fields();
            fields.name = name.to_string();
            summary_patch(item, fields, codec)
        });
        self.commit(id, patch, "rename").await;
    }

    pub async fn set_notes(&self, id: &str, notes: &str) {
        let notes = notes.trim().to_string();
        let patch = self.patch_cached(id, "set notes", |item, codec| {
            if codec.notes_in_summary {
                let mut fields = item.fields();
                fields.notes = notes;
                summary_patch(item, fields, codec)
            } else {
                item.notes = notes.clone();
                ItemPatch::description(notes)
            }
        });
        self.commit(id, patch, "set notes").await;
    }

    pub async fn set_category(&self, id: &str, category: &str) {
        if !self.inner.options.codec.categories {
            warn!(id = %id, "Categories are disabled for this list");
            return;
        }
        let category = category.trim().to_string();
        let patch = self.patch_cached(id, "set category", |item, codec| {
            let mut fields = item.fields();
            fields.category = category;
            summary_patch(item, fields, codec)
        });
        self.commit(id, patch, "set category").await;
    }

    pub async fn remove(&self, id: &str) {
        let removed = {
            let mut state = self.lock_state();
            state.pending.cancel(id);
            let before = state.items.len();
            state.items.retain(|i| i.id != id);
            let removed = state.items.len() != before;
            if removed {
                self.publish(&state);
            }
            removed
        };
        if !removed {
            warn!(id = %id, "Remove for an item not in the snapshot");
            return;
        }
        self.remove_remote(&[id.to_string()]).await;
    }

    /// Remove every completed item in one store call.
    pub async fn clear_completed(&self) {
        let ids: Vec<String> = {
            let mut state = self.lock_state();
            let ids: Vec<String> = state
                .items
                .iter()
                .filter(|i| i.is_completed())
                .map(|i| i.id.clone())
                .collect();
            if ids.is_empty() {
                return;
            }
            for id in &ids {
                state.pending.cancel(id);
            }
            state.items.retain(|i| !i.is_completed());
            self.publish(&state);
            ids
        };
        info!(count = ids.len(), "Clearing completed items");
        self.remove_remote(&ids).await;
    }

    async fn remove_remote(&self, ids: &[String]) {
        let inner = &self.inner;
        if let Err(e) = inner.store.remove(&inner.options.list_id, ids).await {
            warn!(count = ids.len(), error = %e, "Store remove failed");
        }
        self.fetch_all().await;
    }

    /// Apply `edit` to the live cached item and publish; returns the patch
    /// to write, or `None` if the item is unknown.
    fn patch_cached(
        &self,
        id: &str,
        action: &str,
        edit: impl FnOnce(&mut Item, &CodecOptions) -> ItemPatch,
    ) -> Option<ItemPatch> {
        let mut state = self.lock_state();
        let Some(item) = state.items.iter_mut().find(|i| i.id == id) else {
            warn!(id = %id, action, "Item not in the snapshot");
            return None;
        };
        let patch = edit(item, &self.inner.options.codec);
        state.pending.mark_stale(id);
        self.publish(&state);
        Some(patch)
    }

    async fn commit(&self, id: &str, patch: Option<ItemPatch>, action: &str) {
        let Some(patch) = patch else {
            return;
        };
        self.write(id, patch, action).await;
        self.fetch_all().await;
    }

    async fn write(&self, id: &str, patch: ItemPatch, action: &str) {
        let inner = &self.inner;
        if let Err(e) = inner.store.update(&inner.options.list_id, id, patch).await {
            warn!(id = %id, action, error = %e, "Store update failed");
        }
    }

    fn publish(&self, state: &ListState) {
        self.inner.snapshot_tx.send_replace(state.items.clone());
    }

    fn lock_state(&self) -> MutexGuard<'_, ListState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_listener(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.inner.listener.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn decode_remote(remote: RemoteItem, codec: &CodecOptions) -> Item {
    let mut fields = codec::decode(&remote.summary, codec);
    if !codec.notes_in_summary {
        fields.notes = remote.description.as_deref().unwrap_or("").trim().to_string();
    }
    Item::from_fields(remote.id, fields, remote.status, remote.summary)
}

/// Re-encode `item` with `fields`, updating the cached copy to match.
fn summary_patch(item: &mut Item, fields: ItemFields, codec: &CodecOptions) -> ItemPatch {
    let summary = codec::encode(&fields, codec);
    item.apply_fields(fields);
    item.summary = summary.clone();
    ItemPatch::summary(summary)
}

fn clamp_quantity(quantity: i64) -> u32 {
    quantity.clamp(1, i64::from(u32::MAX)) as u32
}
