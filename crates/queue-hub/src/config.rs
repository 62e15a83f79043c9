//! Configuration loading and parsing.
//!
//! Defines the hub config schema (enqueue defaults, timing tunables, per-player
//! settings) and resolves defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use queue_hub_types::MediaType;
use serde::Deserialize;

use crate::models::QueueOption;

/// Top-level hub configuration loaded from TOML.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct HubConfig {
    /// Default enqueue behaviour and container expansion preferences.
    pub enqueue: Option<EnqueueConfig>,
    /// Debounce and grace-period tunables.
    pub timing: Option<TimingConfig>,
    /// Per-player settings keyed by player id.
    pub players: Option<HashMap<String, PlayerConfig>>,
    /// Optional full path to the queue snapshot SQLite DB file.
    pub snapshot_db_path: Option<String>,
}

/// Enqueue defaults from TOML.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct EnqueueConfig {
    pub artist: Option<QueueOption>,
    pub album: Option<QueueOption>,
    pub track: Option<QueueOption>,
    pub radio: Option<QueueOption>,
    pub playlist: Option<QueueOption>,
    pub audiobook: Option<QueueOption>,
    pub podcast: Option<QueueOption>,
    pub podcast_episode: Option<QueueOption>,
    pub folder: Option<QueueOption>,
    pub unknown: Option<QueueOption>,
    /// Which tracks to enqueue when an artist is played.
    pub artist_select: Option<ArtistSelect>,
    /// Which tracks to enqueue when an album is played.
    pub album_select: Option<AlbumSelect>,
}

/// Track selection when expanding an artist.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArtistSelect {
    /// Artist tracks present in the library.
    LibraryTracks,
    /// Tracks of the artist's library albums.
    LibraryAlbumTracks,
    /// All artist tracks known to the providers.
    #[default]
    AllTracks,
    /// Tracks of all albums of the artist.
    AllAlbumTracks,
}

impl ArtistSelect {
    pub fn in_library_only(&self) -> bool {
        matches!(
            self,
            ArtistSelect::LibraryTracks | ArtistSelect::LibraryAlbumTracks
        )
    }

    pub fn album_tracks(&self) -> bool {
        matches!(
            self,
            ArtistSelect::LibraryAlbumTracks | ArtistSelect::AllAlbumTracks
        )
    }
}

/// Track selection when expanding an album.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlbumSelect {
    LibraryTracks,
    #[default]
    AllTracks,
}

/// Timing tunables in milliseconds.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TimingConfig {
    /// Delay before a play command is dispatched (default: 100).
    pub play_delay_ms: Option<u64>,
    /// Delay used when the previous item is still in the player buffer (default: 1000).
    pub play_debounce_ms: Option<u64>,
    /// Delay before a radio refill runs (default: 5000).
    pub radio_fill_delay_ms: Option<u64>,
    /// Interval between end-of-queue checks (default: 1000).
    pub clear_check_interval_ms: Option<u64>,
    /// Number of end-of-queue checks before clearing (default: 5).
    pub clear_check_attempts: Option<u32>,
    /// Wait after dissolving a player group during transfer (default: 3000).
    pub group_dissolve_delay_ms: Option<u64>,
    /// Minimum delay between background catalog calls (default: 0, disabled).
    pub catalog_min_interval_ms: Option<u64>,
}

/// Per-player settings.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PlayerConfig {
    /// Send the queue as one continuous stream.
    pub flow_mode: Option<bool>,
    /// Crossfade between tracks (requires silence stripping).
    pub crossfade: Option<bool>,
}

/// Timing tunables with defaults applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub play_delay: Duration,
    pub play_debounce: Duration,
    pub radio_fill_delay: Duration,
    pub clear_check_interval: Duration,
    pub clear_check_attempts: u32,
    pub group_dissolve_delay: Duration,
    pub catalog_min_interval: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            play_delay: Duration::from_millis(100),
            play_debounce: Duration::from_millis(1000),
            radio_fill_delay: Duration::from_millis(5000),
            clear_check_interval: Duration::from_millis(1000),
            clear_check_attempts: 5,
            group_dissolve_delay: Duration::from_millis(3000),
            catalog_min_interval: Duration::ZERO,
        }
    }
}

impl HubConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        Self::from_toml_str(&raw).with_context(|| format!("parse config {:?}", path))
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let cfg = toml::from_str::<HubConfig>(raw).context("parse hub config")?;
        Ok(cfg)
    }

    /// Default enqueue option for a media type.
    pub fn default_enqueue_option(&self, media_type: MediaType) -> QueueOption {
        let enqueue = self.enqueue.clone().unwrap_or_default();
        let configured = match media_type {
            MediaType::Artist => enqueue.artist,
            MediaType::Album => enqueue.album,
            MediaType::Track => enqueue.track,
            MediaType::Radio => enqueue.radio,
            MediaType::Playlist => enqueue.playlist,
            MediaType::Audiobook => enqueue.audiobook,
            MediaType::Podcast => enqueue.podcast,
            MediaType::PodcastEpisode => enqueue.podcast_episode,
            MediaType::Folder => enqueue.folder,
            MediaType::FlowStream | MediaType::Unknown => enqueue.unknown,
        };
        configured.unwrap_or(match media_type {
            MediaType::Track => QueueOption::Play,
            _ => QueueOption::Replace,
        })
    }

    pub fn artist_select(&self) -> ArtistSelect {
        self.enqueue
            .as_ref()
            .and_then(|e| e.artist_select)
            .unwrap_or_default()
    }

    pub fn album_select(&self) -> AlbumSelect {
        self.enqueue
            .as_ref()
            .and_then(|e| e.album_select)
            .unwrap_or_default()
    }

    /// Resolve timing tunables.
    pub fn timings(&self) -> Timings {
        let defaults = Timings::default();
        let Some(timing) = self.timing.as_ref() else {
            return defaults;
        };
        let ms = |value: Option<u64>, fallback: Duration| {
            value.map(Duration::from_millis).unwrap_or(fallback)
        };
        Timings {
            play_delay: ms(timing.play_delay_ms, defaults.play_delay),
            play_debounce: ms(timing.play_debounce_ms, defaults.play_debounce),
            radio_fill_delay: ms(timing.radio_fill_delay_ms, defaults.radio_fill_delay),
            clear_check_interval: ms(timing.clear_check_interval_ms, defaults.clear_check_interval),
            clear_check_attempts: timing
                .clear_check_attempts
                .unwrap_or(defaults.clear_check_attempts),
            group_dissolve_delay: ms(timing.group_dissolve_delay_ms, defaults.group_dissolve_delay),
            catalog_min_interval: ms(timing.catalog_min_interval_ms, defaults.catalog_min_interval),
        }
    }

    fn player(&self, player_id: &str) -> Option<&PlayerConfig> {
        self.players.as_ref().and_then(|p| p.get(player_id))
    }

    /// Return true when flow mode is enabled for the player.
    pub fn flow_mode(&self, player_id: &str) -> bool {
        self.player(player_id)
            .and_then(|p| p.flow_mode)
            .unwrap_or(false)
    }

    /// Return true when crossfade is enabled for the player.
    pub fn crossfade(&self, player_id: &str) -> bool {
        self.player(player_id)
            .and_then(|p| p.crossfade)
            .unwrap_or(false)
    }
}

/// Extract the optional snapshot DB path from config.
pub fn snapshot_db_path_from_config(cfg: &HubConfig) -> Option<PathBuf> {
    cfg.snapshot_db_path.as_deref().and_then(|path| {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(PathBuf::from(trimmed))
        }
    })
}
