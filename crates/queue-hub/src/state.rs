//! Shared hub state.
//!
//! Bundles the registry, event bus, scheduler and collaborators handed to
//! every service.

use std::sync::Arc;

use crate::config::{HubConfig, Timings};
use crate::events::EventBus;
use crate::providers::{MusicCatalog, PlayerControl, StreamResolver};
use crate::registry::QueueRegistry;
use crate::scheduler::TaskScheduler;
use crate::snapshot_store::SnapshotStore;
use crate::throttle::Throttler;

#[derive(Clone)]
pub struct HubState {
    pub config: Arc<HubConfig>,
    /// Timing tunables resolved from `config`.
    pub timings: Timings,
    pub registry: Arc<QueueRegistry>,
    pub events: EventBus,
    pub scheduler: TaskScheduler,
    /// Spaces out background catalog calls.
    pub throttler: Arc<Throttler>,
    pub players: Arc<dyn PlayerControl>,
    pub catalog: Arc<dyn MusicCatalog>,
    pub streams: Arc<dyn StreamResolver>,
}

impl HubState {
    /// Wire up shared state from config, a snapshot store and the collaborators.
    pub fn new(
        config: HubConfig,
        store: Arc<dyn SnapshotStore>,
        players: Arc<dyn PlayerControl>,
        catalog: Arc<dyn MusicCatalog>,
        streams: Arc<dyn StreamResolver>,
    ) -> Self {
        let timings = config.timings();
        Self {
            config: Arc::new(config),
            timings,
            registry: Arc::new(QueueRegistry::new(store)),
            events: EventBus::new(),
            scheduler: TaskScheduler::new(),
            throttler: Arc::new(Throttler::new(timings.catalog_min_interval)),
            players,
            catalog,
            streams,
        }
    }
}
