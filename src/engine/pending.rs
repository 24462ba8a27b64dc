use std::collections::HashMap;
use tokio::task::JoinHandle;

struct PendingWrite {
    /// Latest quantity the user asked for
    quantity: u32,
    generation: u64,
    /// Debounce timer; `None` once the write has started
    timer: Option<JoinHandle<()>>,
    in_flight: bool,
    /// The item changed while its write was in flight
    stale: bool,
}

/// Debounced quantity writes, at most one entry per item id.
///
/// An entry lives from the first edit until the store has acknowledged a
/// write of its latest quantity. While a write is in flight, further edits
/// only move the target and flag the entry stale; the writer then chains one
/// follow-up write instead of a second write racing the first.
///
/// Each timer gets a generation number and only starts a write if its
/// generation is still the registered one, so a timer that woke just as it
/// was being replaced cannot write a superseded value.
#[derive(Default)]
pub(crate) struct PendingWrites {
    entries: HashMap<String, PendingWrite>,
    next_generation: u64,
}

impl PendingWrites {
    /// Register `quantity` for `id`. An idle entry gets a fresh timer from
    /// `spawn` (which receives the new generation) and its old timer is
    /// aborted; an entry whose write is in flight is only marked stale.
    pub fn schedule(
        &mut self,
        id: &str,
        quantity: u32,
        spawn: impl FnOnce(u64) -> JoinHandle<()>,
    ) {
        self.next_generation += 1;
        let generation = self.next_generation;

        match self.entries.get_mut(id) {
            Some(entry) if entry.in_flight => {
                entry.quantity = quantity;
                entry.generation = generation;
                entry.stale = true;
            }
            Some(entry) => {
                entry.quantity = quantity;
                entry.generation = generation;
                if let Some(previous) = entry.timer.replace(spawn(generation)) {
                    previous.abort();
                }
            }
            None => {
                self.entries.insert(
                    id.to_string(),
                    PendingWrite {
                        quantity,
                        generation,
                        timer: Some(spawn(generation)),
                        in_flight: false,
                        stale: false,
                    },
                );
            }
        }
    }

    /// Called by a timer: claim the write for `id` if `generation` is still
    /// current and nothing is in flight. Returns the quantity to write.
    pub fn begin_write(&mut self, id: &str, generation: u64) -> Option<u32> {
        let entry = self.entries.get_mut(id)?;
        if entry.in_flight || entry.generation != generation {
            return None;
        }
        // The timer is the task calling us; let it finish
        entry.timer = None;
        entry.in_flight = true;
        Some(entry.quantity)
    }

    /// A write for `id` returned. Hands back the quantity for the follow-up
    /// write if the entry went stale meanwhile (it stays in flight);
    /// otherwise the entry is done and removed.
    pub fn finish_write(&mut self, id: &str) -> Option<u32> {
        let entry = self.entries.get_mut(id)?;
        if entry.stale {
            entry.stale = false;
            return Some(entry.quantity);
        }
        self.entries.remove(id);
        None
    }

    /// Another write changed the item's summary; make an in-flight quantity
    /// write follow up with the current record.
    pub fn mark_stale(&mut self, id: &str) {
        if let Some(entry) = self.entries.get_mut(id)
            && entry.in_flight
        {
            entry.stale = true;
        }
    }

    pub fn cancel(&mut self, id: &str) -> bool {
        match self.entries.remove(id) {
            Some(entry) => {
                if let Some(timer) = entry.timer {
                    timer.abort();
                }
                true
            }
            None => false,
        }
    }

    /// Stop every idle timer and claim those writes for the caller. Entries
    /// already in flight are left to their writer.
    pub fn claim_idle(&mut self) -> Vec<(String, u32)> {
        self.entries
            .iter_mut()
            .filter(|(_, entry)| !entry.in_flight)
            .map(|(id, entry)| {
                if let Some(timer) = entry.timer.take() {
                    timer.abort();
                }
                entry.in_flight = true;
                (id.clone(), entry.quantity)
            })
            .collect()
    }

    /// Quantity to show for `id` until the store has caught up.
    pub fn quantity(&self, id: &str) -> Option<u32> {
        self.entries.get(id).map(|p| p.quantity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
