//! In-process event bus for queue updates.
//!
//! Provides a lightweight broadcast channel for transport layers to subscribe to.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{MediaItem, PlayerQueue};

/// Details of an item that finished (or was skipped) on a player.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MediaItemPlayed {
    pub queue_id: String,
    pub queue_item_id: String,
    pub media_item: MediaItem,
    /// Seconds the item was played.
    pub seconds_played: u32,
    /// `true` when played up to (nominal duration - 5s).
    pub fully_played: bool,
}

/// Queue event payloads published by core services.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueueEvent {
    QueueAdded { queue_id: String, queue: PlayerQueue },
    QueueUpdated { queue_id: String, queue: PlayerQueue },
    ItemsUpdated { queue_id: String, items: usize },
    TimeUpdated { queue_id: String, elapsed_time: f64 },
    MediaItemPlayed(MediaItemPlayed),
}

impl QueueEvent {
    /// Queue the event belongs to.
    pub fn queue_id(&self) -> &str {
        match self {
            QueueEvent::QueueAdded { queue_id, .. }
            | QueueEvent::QueueUpdated { queue_id, .. }
            | QueueEvent::ItemsUpdated { queue_id, .. }
            | QueueEvent::TimeUpdated { queue_id, .. } => queue_id,
            QueueEvent::MediaItemPlayed(played) => &played.queue_id,
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<QueueEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a new event bus with a bounded broadcast channel.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.sender.subscribe()
    }

    /// Notify subscribers that a queue was registered.
    pub fn queue_added(&self, queue: &PlayerQueue) {
        let _ = self.sender.send(QueueEvent::QueueAdded {
            queue_id: queue.queue_id.clone(),
            queue: queue.clone(),
        });
    }

    /// Notify subscribers that queue state changed.
    pub fn queue_updated(&self, queue: &PlayerQueue) {
        let _ = self.sender.send(QueueEvent::QueueUpdated {
            queue_id: queue.queue_id.clone(),
            queue: queue.clone(),
        });
    }

    /// Notify subscribers that the item list changed.
    pub fn items_updated(&self, queue: &PlayerQueue) {
        let _ = self.sender.send(QueueEvent::ItemsUpdated {
            queue_id: queue.queue_id.clone(),
            items: queue.items,
        });
    }

    /// Notify subscribers that only the elapsed time moved.
    pub fn time_updated(&self, queue: &PlayerQueue) {
        let _ = self.sender.send(QueueEvent::TimeUpdated {
            queue_id: queue.queue_id.clone(),
            elapsed_time: queue.elapsed_time,
        });
    }

    /// Notify subscribers that an item was played.
    pub fn media_item_played(&self, played: MediaItemPlayed) {
        let _ = self.sender.send(QueueEvent::MediaItemPlayed(played));
    }
}
