//! Per-player playback queues for a multi-room audio hub.
//!
//! Hosts feed player reports into [`UpdateReconciler`] and issue queue
//! commands through [`PlaybackManager`]; devices, the media catalog and stream
//! resolution stay behind the traits in [`providers`].

pub mod config;
pub mod error;
pub mod events;
pub mod flow;
pub mod index;
pub mod models;
pub mod playback_manager;
pub mod providers;
pub mod queue_service;
pub mod radio;
pub mod reconciler;
pub mod registry;
pub mod resolve;
pub mod scheduler;
pub mod snapshot_store;
pub mod startup;
pub mod state;
pub mod throttle;

#[cfg(test)]
mod test_support;

pub use config::HubConfig;
pub use error::{QueueError, Result};
pub use events::{EventBus, QueueEvent};
pub use models::{MediaItem, PlayerQueue, QueueItem, QueueOption, RepeatMode};
pub use playback_manager::{MediaRef, PlaybackManager};
pub use reconciler::UpdateReconciler;
pub use startup::QueueHub;
