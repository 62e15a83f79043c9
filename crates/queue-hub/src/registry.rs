//! In-memory queue registry.
//!
//! Owns every queue, its item list and the last emitted snapshot. Item lists
//! are shared as `Arc<Vec<_>>` and only ever replaced as a whole, so readers
//! never observe a half-applied mutation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, bail};
use queue_hub_types::PlayerState;

use crate::error::{QueueError, Result};
use crate::models::{PlayerQueue, QueueItem, QueueSnapshot};
use crate::snapshot_store::{SnapshotStore, queue_base_key};

const STATE_KEY: &str = "state";
const ITEMS_KEY: &str = "items";

/// Lookup of a queue item by position or by id.
#[derive(Clone, Copy, Debug)]
pub enum ItemKey<'a> {
    Index(usize),
    Id(&'a str),
}

impl From<usize> for ItemKey<'_> {
    fn from(index: usize) -> Self {
        ItemKey::Index(index)
    }
}

impl<'a> From<&'a str> for ItemKey<'a> {
    fn from(id: &'a str) -> Self {
        ItemKey::Id(id)
    }
}

#[derive(Default)]
struct RegistryInner {
    queues: HashMap<String, PlayerQueue>,
    items: HashMap<String, Arc<Vec<QueueItem>>>,
    prev_states: HashMap<String, QueueSnapshot>,
}

pub struct QueueRegistry {
    inner: Mutex<RegistryInner>,
    store: Arc<dyn SnapshotStore>,
}

impl QueueRegistry {
    /// Create an empty registry persisting snapshots to `store`.
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            store,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Create the queue for a player, restoring a persisted snapshot when possible.
    ///
    /// A snapshot that cannot be read or validated is logged and dropped; the
    /// queue then starts empty.
    pub fn register(&self, queue_id: &str, display_name: &str, available: bool) -> PlayerQueue {
        let (mut queue, items) = match self.restore(queue_id) {
            Ok(Some(restored)) => restored,
            Ok(None) => (PlayerQueue::new(queue_id, display_name, available), Vec::new()),
            Err(err) => {
                tracing::warn!(
                    queue_id = %queue_id,
                    error = %err,
                    "failed to restore queue snapshot, starting empty"
                );
                (PlayerQueue::new(queue_id, display_name, available), Vec::new())
            }
        };
        queue.display_name = display_name.to_string();
        queue.available = available;
        queue.items = items.len();

        let mut inner = self.lock();
        inner.queues.insert(queue_id.to_string(), queue.clone());
        inner.items.insert(queue_id.to_string(), Arc::new(items));
        inner.prev_states.remove(queue_id);
        queue
    }

    fn restore(&self, queue_id: &str) -> anyhow::Result<Option<(PlayerQueue, Vec<QueueItem>)>> {
        let base_key = queue_base_key(queue_id);
        let Some(raw_state) = self.store.get(&base_key, STATE_KEY)? else {
            return Ok(None);
        };
        let mut queue: PlayerQueue =
            serde_json::from_str(&raw_state).context("parse queue state snapshot")?;
        let items: Vec<QueueItem> = match self.store.get(&base_key, ITEMS_KEY)? {
            Some(raw_items) => {
                serde_json::from_str(&raw_items).context("parse queue items snapshot")?
            }
            None => Vec::new(),
        };
        if queue.queue_id != queue_id {
            bail!(
                "snapshot belongs to queue {} instead of {queue_id}",
                queue.queue_id
            );
        }
        if let Some(index) = queue.current_index {
            if index >= items.len() {
                bail!(
                    "snapshot current_index {index} is out of range for {} items",
                    items.len()
                );
            }
        }
        if items.iter().any(|item| item.queue_id != queue_id) {
            bail!("snapshot contains items of another queue");
        }

        // transient playback state never survives a restart
        queue.active = false;
        queue.state = PlayerState::Idle;
        queue.next_item = None;
        queue.next_track_enqueued = None;
        queue.flow_mode_stream_log.clear();
        queue.index_in_buffer = queue.current_index;
        queue.current_item = queue.current_index.and_then(|index| items.get(index).cloned());
        Ok(Some((queue, items)))
    }

    /// Return a copy of a queue.
    pub fn get(&self, queue_id: &str) -> Option<PlayerQueue> {
        self.lock().queues.get(queue_id).cloned()
    }

    pub fn contains(&self, queue_id: &str) -> bool {
        self.lock().queues.contains_key(queue_id)
    }

    /// All queues, ordered by id.
    pub fn all(&self) -> Vec<PlayerQueue> {
        let mut queues: Vec<PlayerQueue> = self.lock().queues.values().cloned().collect();
        queues.sort_by(|a, b| a.queue_id.cmp(&b.queue_id));
        queues
    }

    /// Drop a queue from memory and delete its persisted snapshot.
    pub fn deregister(&self, queue_id: &str) -> bool {
        let existed = {
            let mut inner = self.lock();
            inner.items.remove(queue_id);
            inner.prev_states.remove(queue_id);
            inner.queues.remove(queue_id).is_some()
        };
        if let Err(err) = self.store.delete(&queue_base_key(queue_id)) {
            tracing::warn!(queue_id = %queue_id, error = %err, "failed to delete queue snapshot");
        }
        existed
    }

    /// Current item list (empty for unknown queues).
    pub fn items(&self, queue_id: &str) -> Arc<Vec<QueueItem>> {
        self.lock()
            .items
            .get(queue_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Page of items.
    pub fn items_page(&self, queue_id: &str, limit: usize, offset: usize) -> Vec<QueueItem> {
        self.items(queue_id)
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Consistent read of a queue together with its item list.
    pub fn snapshot(&self, queue_id: &str) -> Option<(PlayerQueue, Arc<Vec<QueueItem>>)> {
        let inner = self.lock();
        let queue = inner.queues.get(queue_id)?.clone();
        let items = inner.items.get(queue_id).cloned().unwrap_or_default();
        Some((queue, items))
    }

    pub fn get_item<'a>(&self, queue_id: &str, key: impl Into<ItemKey<'a>>) -> Option<QueueItem> {
        let items = self.items(queue_id);
        find_item(&items, key.into()).cloned()
    }

    pub fn index_of(&self, queue_id: &str, queue_item_id: &str) -> Option<usize> {
        self.items(queue_id)
            .iter()
            .position(|item| item.queue_item_id == queue_item_id)
    }

    /// Mutate a queue in place and return the closure result.
    pub fn update_queue<R>(
        &self,
        queue_id: &str,
        f: impl FnOnce(&mut PlayerQueue) -> R,
    ) -> Result<R> {
        let mut inner = self.lock();
        let queue = inner
            .queues
            .get_mut(queue_id)
            .ok_or_else(|| QueueError::unavailable(queue_id))?;
        Ok(f(queue))
    }

    /// Mutate a queue and its item list together; the new list replaces the old one.
    pub fn update<R>(
        &self,
        queue_id: &str,
        f: impl FnOnce(&mut PlayerQueue, &mut Vec<QueueItem>) -> R,
    ) -> Result<R> {
        let mut inner = self.lock();
        let RegistryInner { queues, items, .. } = &mut *inner;
        let queue = queues
            .get_mut(queue_id)
            .ok_or_else(|| QueueError::unavailable(queue_id))?;
        let mut list: Vec<QueueItem> = items
            .get(queue_id)
            .map(|current| current.as_ref().clone())
            .unwrap_or_default();
        let result = f(queue, &mut list);
        queue.items = list.len();
        items.insert(queue_id.to_string(), Arc::new(list));
        Ok(result)
    }

    /// Replace the item list of a queue.
    pub fn replace_items(&self, queue_id: &str, new_items: Vec<QueueItem>) -> Result<PlayerQueue> {
        self.update(queue_id, |queue, items| {
            *items = new_items;
            queue.items = items.len();
            queue.clone()
        })
    }

    /// Mutate a single item; returns the updated copy, `None` when the item is gone.
    pub fn update_item(
        &self,
        queue_id: &str,
        queue_item_id: &str,
        f: impl FnOnce(&mut QueueItem),
    ) -> Result<Option<QueueItem>> {
        self.update(queue_id, |queue, items| {
            let item = items
                .iter_mut()
                .find(|item| item.queue_item_id == queue_item_id)?;
            f(item);
            let updated = item.clone();
            if let Some(current) = queue
                .current_item
                .as_mut()
                .filter(|current| current.queue_item_id == queue_item_id)
            {
                *current = updated.clone();
            }
            Some(updated)
        })
    }

    pub fn prev_snapshot(&self, queue_id: &str) -> Option<QueueSnapshot> {
        self.lock().prev_states.get(queue_id).cloned()
    }

    pub fn set_prev_snapshot(&self, queue_id: &str, snapshot: QueueSnapshot) {
        self.lock()
            .prev_states
            .insert(queue_id.to_string(), snapshot);
    }

    pub fn clear_prev_snapshot(&self, queue_id: &str) {
        self.lock().prev_states.remove(queue_id);
    }

    /// Best-effort write of the queue state (and optionally its items) to the store.
    pub fn persist(&self, queue_id: &str, items_changed: bool) {
        let Some((queue, items)) = self.snapshot(queue_id) else {
            return;
        };
        if let Err(err) = self.write_snapshot(&queue, items_changed.then_some(items.as_slice())) {
            tracing::warn!(queue_id = %queue_id, error = %err, "failed to persist queue snapshot");
        }
    }

    fn write_snapshot(&self, queue: &PlayerQueue, items: Option<&[QueueItem]>) -> anyhow::Result<()> {
        let base_key = queue_base_key(&queue.queue_id);
        if let Some(items) = items {
            let raw = serde_json::to_string(items).context("serialize queue items")?;
            self.store.set(&base_key, ITEMS_KEY, &raw)?;
        }
        let raw = serde_json::to_string(queue).context("serialize queue state")?;
        self.store.set(&base_key, STATE_KEY, &raw)?;
        Ok(())
    }
}

/// Find an item in a list by index or id.
pub fn find_item<'i>(items: &'i [QueueItem], key: ItemKey<'_>) -> Option<&'i QueueItem> {
    match key {
        ItemKey::Index(index) => items.get(index),
        ItemKey::Id(id) => items.iter().find(|item| item.queue_item_id == id),
    }
}
