//! Hub wiring.
//!
//! Picks the snapshot store from config and assembles the playback manager
//! and reconciler around the host's collaborators.

use std::sync::Arc;

use anyhow::Result;

use crate::config::{HubConfig, snapshot_db_path_from_config};
use crate::events::EventBus;
use crate::playback_manager::PlaybackManager;
use crate::providers::{MusicCatalog, PlayerControl, StreamResolver};
use crate::reconciler::UpdateReconciler;
use crate::snapshot_store::{MemorySnapshotStore, SnapshotStore, SqliteSnapshotStore};
use crate::state::HubState;

/// Entry point for hosts: commands go to `manager`, player reports to `reconciler`.
#[derive(Clone)]
pub struct QueueHub {
    pub manager: PlaybackManager,
    pub reconciler: UpdateReconciler,
}

impl QueueHub {
    /// Build a hub, persisting snapshots to SQLite when `snapshot_db_path` is configured.
    pub fn open(
        config: HubConfig,
        players: Arc<dyn PlayerControl>,
        catalog: Arc<dyn MusicCatalog>,
        streams: Arc<dyn StreamResolver>,
    ) -> Result<Self> {
        let store: Arc<dyn SnapshotStore> = match snapshot_db_path_from_config(&config) {
            Some(path) => {
                tracing::info!(path = %path.display(), "using sqlite queue snapshots");
                Arc::new(SqliteSnapshotStore::open(&path)?)
            }
            None => {
                tracing::info!("queue snapshots kept in memory");
                Arc::new(MemorySnapshotStore::new())
            }
        };
        Ok(Self::with_store(config, store, players, catalog, streams))
    }

    pub fn with_store(
        config: HubConfig,
        store: Arc<dyn SnapshotStore>,
        players: Arc<dyn PlayerControl>,
        catalog: Arc<dyn MusicCatalog>,
        streams: Arc<dyn StreamResolver>,
    ) -> Self {
        let state = HubState::new(config, store, players, catalog, streams);
        let manager = PlaybackManager::new(state);
        let reconciler = UpdateReconciler::new(manager.clone());
        Self {
            manager,
            reconciler,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.manager.state().events
    }

    /// Stop active queues and drop pending jobs.
    pub async fn shutdown(&self) {
        tracing::info!("shutting down queue hub");
        self.manager.shutdown().await;
    }
}
