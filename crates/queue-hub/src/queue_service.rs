//! Queue item mutations.
//!
//! Owns load/move/delete/clear of queue items and the shuffle/repeat settings.
//! Every mutation reads and rewrites the item list under a single registry
//! lock and then signals an update (event + snapshot write).

use std::sync::Arc;

use queue_hub_types::PlayerState;
use rand::seq::SliceRandom;

use crate::error::{QueueError, Result};
use crate::events::EventBus;
use crate::models::{PlayerQueue, QueueItem, RepeatMode};
use crate::registry::{ItemKey, QueueRegistry};

/// Placement of a batch of items in [`QueueService::load`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadOptions {
    /// Insert the batch at this index.
    pub insert_at: usize,
    /// Append the items that were at/after `insert_at` behind the batch.
    pub keep_remaining: bool,
    /// Keep the items before `insert_at`.
    pub keep_played: bool,
    /// Shuffle everything from `insert_at` onwards.
    pub shuffle: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            insert_at: 0,
            keep_remaining: true,
            keep_played: true,
            shuffle: false,
        }
    }
}

impl LoadOptions {
    pub fn at(insert_at: usize) -> Self {
        Self {
            insert_at,
            ..Self::default()
        }
    }

    /// Drop everything that is currently in the queue.
    pub fn replace() -> Self {
        Self {
            keep_remaining: false,
            keep_played: false,
            ..Self::default()
        }
    }

    pub fn keep_remaining(mut self, keep: bool) -> Self {
        self.keep_remaining = keep;
        self
    }

    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }
}

#[derive(Clone)]
pub struct QueueService {
    registry: Arc<QueueRegistry>,
    events: EventBus,
}

impl QueueService {
    /// Create a queue service backed by the shared registry.
    pub fn new(registry: Arc<QueueRegistry>, events: EventBus) -> Self {
        Self { registry, events }
    }

    pub fn registry(&self) -> &Arc<QueueRegistry> {
        &self.registry
    }

    /// Splice a batch of items into a queue.
    pub fn load(&self, queue_id: &str, batch: Vec<QueueItem>, options: LoadOptions) -> Result<()> {
        self.mutate_items(queue_id, |_, items| {
            splice(items, batch, options);
            Ok(true)
        })
    }

    /// Run `f` against the queue and its items under the registry lock.
    ///
    /// `f` returns whether it changed anything; only then is the preload
    /// marker reset and an update signalled.
    fn mutate_items(
        &self,
        queue_id: &str,
        f: impl FnOnce(&mut PlayerQueue, &mut Vec<QueueItem>) -> Result<bool>,
    ) -> Result<()> {
        let changed = self.registry.update(queue_id, |queue, items| {
            let changed = f(queue, items)?;
            if changed {
                queue.next_track_enqueued = None;
            }
            Ok::<_, QueueError>(changed)
        })??;
        if changed {
            self.signal_update(queue_id, true);
        }
        Ok(())
    }

    /// Move an item `shift` positions (0 moves it right after the current item).
    pub fn move_item(&self, queue_id: &str, queue_item_id: &str, shift: i64) -> Result<()> {
        self.mutate_items(queue_id, |queue, items| {
            let item_index = items
                .iter()
                .position(|item| item.queue_item_id == queue_item_id)
                .ok_or_else(|| QueueError::NotFound(format!("queue item {queue_item_id}")))?;
            if queue.is_buffered(item_index) {
                return Err(QueueError::AlreadyBuffered { index: item_index });
            }

            let cur_index = queue.current_index.unwrap_or(0) as i64;
            let new_index = match shift {
                0 if queue.state == PlayerState::Playing => cur_index + 1,
                0 => cur_index,
                shift => item_index as i64 + shift,
            };
            if new_index < cur_index || new_index > items.len() as i64 {
                return Ok(false);
            }
            let item = items.remove(item_index);
            let new_index = (new_index as usize).min(items.len());
            items.insert(new_index, item);
            Ok(true)
        })
    }

    /// Delete an item; items already played or buffered are left alone.
    pub fn delete_item(&self, queue_id: &str, key: ItemKey<'_>) -> Result<()> {
        self.mutate_items(queue_id, |queue, items| {
            let index = match key {
                ItemKey::Index(index) if index < items.len() => index,
                ItemKey::Index(index) => {
                    return Err(QueueError::NotFound(format!("queue index {index}")));
                }
                ItemKey::Id(id) => items
                    .iter()
                    .position(|item| item.queue_item_id == id)
                    .ok_or_else(|| QueueError::NotFound(format!("queue item {id}")))?,
            };
            if queue.is_buffered(index) {
                tracing::warn!(
                    queue_id = %queue_id,
                    index,
                    "delete requested for item already loaded in buffer"
                );
                return Ok(false);
            }
            items.remove(index);
            Ok(true)
        })
    }

    /// Drop all items and playback position; returns the state before clearing.
    pub fn clear_items(&self, queue_id: &str) -> Result<PlayerState> {
        let prev_state = self.registry.update(queue_id, |queue, list| {
            queue.radio_source.clear();
            queue.current_index = None;
            queue.current_item = None;
            queue.next_item = None;
            queue.elapsed_time = 0.0;
            queue.index_in_buffer = None;
            queue.next_track_enqueued = None;
            list.clear();
            queue.state
        })?;
        self.signal_update(queue_id, true);
        Ok(prev_state)
    }

    /// Toggle shuffle; disabling restores insertion order of the upcoming items.
    pub fn set_shuffle(&self, queue_id: &str, enabled: bool) -> Result<()> {
        self.mutate_items(queue_id, |queue, items| {
            if queue.shuffle_enabled == enabled {
                return Ok(false);
            }
            queue.shuffle_enabled = enabled;

            let next_index = queue
                .index_in_buffer
                .or(queue.current_index)
                .map(|index| index + 1)
                .unwrap_or(0);
            // without a position every item is still upcoming
            let mut next_items: Vec<QueueItem> = items.iter().skip(next_index).cloned().collect();
            if !enabled {
                next_items.sort_by_key(|item| item.sort_index);
            }
            splice(
                items,
                next_items,
                LoadOptions::at(next_index)
                    .keep_remaining(false)
                    .shuffle(enabled),
            );
            Ok(true)
        })
    }

    pub fn set_repeat(&self, queue_id: &str, mode: RepeatMode) -> Result<()> {
        let changed = self.registry.update_queue(queue_id, |queue| {
            let changed = queue.repeat_mode != mode;
            queue.repeat_mode = mode;
            changed
        })?;
        if changed {
            self.signal_update(queue_id, false);
        }
        Ok(())
    }

    /// Publish the queue state and persist a snapshot.
    pub fn signal_update(&self, queue_id: &str, items_changed: bool) {
        let Some(queue) = self.registry.get(queue_id) else {
            return;
        };
        if items_changed {
            self.events.items_updated(&queue);
        }
        self.events.queue_updated(&queue);
        self.registry.persist(queue_id, items_changed);
    }
}

/// Insert `batch` into `items` according to `options`, renumbering sort indices.
fn splice(items: &mut Vec<QueueItem>, batch: Vec<QueueItem>, options: LoadOptions) {
    let insert_at = options.insert_at.min(items.len());
    let remaining = items.split_off(insert_at);
    if !options.keep_played {
        items.clear();
    }

    let batch_len = batch.len();
    let mut next_items: Vec<QueueItem> = batch
        .into_iter()
        .enumerate()
        .map(|(offset, mut item)| {
            item.sort_index = (insert_at + offset) as u64;
            item
        })
        .collect();
    if options.keep_remaining {
        let tail_offset = (insert_at + batch_len) as u64;
        next_items.extend(remaining.into_iter().map(|mut item| {
            item.sort_index += tail_offset;
            item
        }));
    }
    if options.shuffle {
        next_items.shuffle(&mut rand::thread_rng());
    }
    items.extend(next_items);
}
