//! Queue data model.
//!
//! Defines queues, queue items, media references and the comparison snapshot
//! used for change detection.

use std::collections::VecDeque;

use queue_hub_types::{MediaType, PlayerState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of top-level requests remembered for radio seeding.
pub const MAX_ENQUEUED_MEDIA_HISTORY: usize = 10;

/// Repeat behaviour of a queue.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    #[default]
    Off,
    /// Replay the current item until skipped.
    One,
    /// Wrap around to the first item after the last one.
    All,
}

/// Defines how a play request interacts with the existing queue.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueOption {
    /// Insert after the current item and start playing the new items.
    Play,
    /// Replace the whole queue and start playing.
    Replace,
    /// Insert after the current (buffered) item, keep the rest.
    Next,
    /// Insert after the current (buffered) item, drop the rest.
    ReplaceNext,
    /// Append to the end of the queue.
    Add,
}

/// Lightweight reference to a related media item (album of a track, podcast of an episode).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemRef {
    pub item_id: String,
    pub provider: String,
    pub name: String,
    pub uri: String,
}

/// Chapter marker of an audiobook.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Chapter {
    /// 1-based chapter position.
    pub position: u32,
    pub name: String,
    /// Chapter start in seconds.
    pub start: f64,
}

/// Kind-specific media details.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "media_type", rename_all = "snake_case")]
pub enum MediaKind {
    Track {
        /// Album the track belongs to, if known.
        #[serde(default)]
        album: Option<ItemRef>,
        /// Display string of the track artists.
        #[serde(default)]
        artist: Option<String>,
    },
    Album,
    Artist,
    Playlist,
    /// Live radio station (not seekable).
    Radio,
    Audiobook {
        #[serde(default)]
        chapters: Vec<Chapter>,
        #[serde(default)]
        resume_position_ms: Option<u64>,
        #[serde(default)]
        fully_played: bool,
    },
    Podcast,
    PodcastEpisode {
        #[serde(default)]
        podcast: Option<ItemRef>,
        #[serde(default)]
        resume_position_ms: Option<u64>,
        #[serde(default)]
        fully_played: bool,
    },
    Folder,
    Unknown,
}

/// A media item provided by the catalog.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MediaItem {
    pub item_id: String,
    pub provider: String,
    pub name: String,
    /// Unique uri of the item, used as its identity.
    pub uri: String,
    /// Nominal duration in seconds.
    #[serde(default)]
    pub duration: Option<u32>,
    /// `false` once the item was found to be unplayable.
    pub available: bool,
    #[serde(default)]
    pub image: Option<String>,
    pub kind: MediaKind,
}

impl MediaItem {
    pub fn media_type(&self) -> MediaType {
        match self.kind {
            MediaKind::Track { .. } => MediaType::Track,
            MediaKind::Album => MediaType::Album,
            MediaKind::Artist => MediaType::Artist,
            MediaKind::Playlist => MediaType::Playlist,
            MediaKind::Radio => MediaType::Radio,
            MediaKind::Audiobook { .. } => MediaType::Audiobook,
            MediaKind::Podcast => MediaType::Podcast,
            MediaKind::PodcastEpisode { .. } => MediaType::PodcastEpisode,
            MediaKind::Folder => MediaType::Folder,
            MediaKind::Unknown => MediaType::Unknown,
        }
    }

    /// Album of a track, if any.
    pub fn album(&self) -> Option<&ItemRef> {
        match &self.kind {
            MediaKind::Track { album, .. } => album.as_ref(),
            _ => None,
        }
    }

    /// Artist display string of a track, if any.
    pub fn artist(&self) -> Option<&str> {
        match &self.kind {
            MediaKind::Track { artist, .. } => artist.as_deref(),
            _ => None,
        }
    }

    /// Resume position of an audiobook or podcast episode.
    pub fn resume_position_ms(&self) -> Option<u64> {
        match &self.kind {
            MediaKind::Audiobook {
                resume_position_ms, ..
            }
            | MediaKind::PodcastEpisode {
                resume_position_ms, ..
            } => *resume_position_ms,
            _ => None,
        }
    }

    /// Set the resume position; ignored for kinds without resume support.
    pub fn set_resume_position_ms(&mut self, value: Option<u64>) {
        match &mut self.kind {
            MediaKind::Audiobook {
                resume_position_ms, ..
            }
            | MediaKind::PodcastEpisode {
                resume_position_ms, ..
            } => *resume_position_ms = value,
            _ => {}
        }
    }

    pub fn fully_played(&self) -> bool {
        match &self.kind {
            MediaKind::Audiobook { fully_played, .. }
            | MediaKind::PodcastEpisode { fully_played, .. } => *fully_played,
            _ => false,
        }
    }

    /// Return true for top-level requests remembered for "don't stop the music".
    pub fn is_radio_seed_kind(&self) -> bool {
        matches!(
            self.media_type(),
            MediaType::Track | MediaType::Album | MediaType::Playlist | MediaType::Artist
        )
    }

    pub fn same_media(&self, other: &MediaItem) -> bool {
        self.uri == other.uri
    }
}

/// Stream details resolved for a queue item right before playback.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct StreamDetails {
    pub provider: String,
    pub item_id: String,
    pub media_type: Option<MediaType>,
    /// Actual duration of the stream in seconds, if known.
    pub duration: Option<u32>,
    /// Seconds skipped at the start of the stream (seek).
    pub seek_position: u32,
    pub fade_in: bool,
    /// Dynamic title of live streams.
    pub stream_title: Option<String>,
    /// Output content type (e.g. `flac`).
    pub content_type: Option<String>,
    pub prefer_album_loudness: bool,
    pub strip_silence_begin: bool,
    pub strip_silence_end: bool,
}

/// One entry of a queue's play list.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QueueItem {
    pub queue_item_id: String,
    pub queue_id: String,
    pub name: String,
    pub uri: String,
    /// Nominal duration in seconds.
    pub duration: Option<u32>,
    /// Insert order, used to restore the order after shuffle is disabled.
    pub sort_index: u64,
    /// Underlying media item; `None` for bare streams.
    pub media_item: Option<MediaItem>,
    /// Lazily resolved when the item is loaded for playback.
    #[serde(default)]
    pub streamdetails: Option<StreamDetails>,
    #[serde(default)]
    pub image: Option<String>,
    /// `false` once the item was found to be unplayable.
    pub available: bool,
}

impl QueueItem {
    /// Wrap a media item in a fresh queue item.
    pub fn from_media_item(queue_id: &str, media: MediaItem) -> Self {
        Self {
            queue_item_id: Uuid::new_v4().simple().to_string(),
            queue_id: queue_id.to_string(),
            name: media.name.clone(),
            uri: media.uri.clone(),
            duration: media.duration,
            sort_index: 0,
            image: media.image.clone(),
            available: media.available,
            media_item: Some(media),
            streamdetails: None,
        }
    }

    pub fn media_type(&self) -> MediaType {
        self.media_item
            .as_ref()
            .map(|m| m.media_type())
            .unwrap_or(MediaType::Unknown)
    }

    /// Return true when this item should be skipped when looking for the next track.
    pub fn is_unplayable(&self) -> bool {
        !self.available || self.media_item.as_ref().is_some_and(|m| !m.available)
    }

    /// Mark the item (and its media) as unplayable.
    pub fn mark_unavailable(&mut self) {
        self.available = false;
        if let Some(media) = self.media_item.as_mut() {
            media.available = false;
        }
    }
}

/// Streaming log entry written while flow mode is active.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FlowStreamLogEntry {
    pub queue_item_id: String,
    /// Nominal duration in seconds.
    pub duration: Option<u32>,
    /// Seconds actually streamed; `None` while unknown (may be 0 after a stream error).
    pub seconds_streamed: Option<f64>,
}

/// Playback queue of a single player.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PlayerQueue {
    pub queue_id: String,
    /// `true` when this queue is the active source of its player.
    pub active: bool,
    pub display_name: String,
    pub available: bool,
    #[serde(default)]
    pub state: PlayerState,
    pub shuffle_enabled: bool,
    pub repeat_mode: RepeatMode,
    pub current_index: Option<usize>,
    /// Furthest index whose stream started loading into the player.
    pub index_in_buffer: Option<usize>,
    pub current_item: Option<QueueItem>,
    #[serde(default)]
    pub next_item: Option<QueueItem>,
    /// Seconds played of the current item.
    pub elapsed_time: f64,
    /// Unix timestamp (seconds) of the last elapsed-time update.
    pub elapsed_time_last_updated: f64,
    /// Position (seconds) to resume from after stop/pause.
    pub resume_pos: u32,
    pub flow_mode: bool,
    #[serde(default)]
    pub flow_mode_stream_log: Vec<FlowStreamLogEntry>,
    /// Id of the next item already handed to the player for gapless playback.
    #[serde(default)]
    pub next_track_enqueued: Option<String>,
    /// Id of the next item a running preload job is loading.
    #[serde(skip)]
    pub preload_in_flight: Option<String>,
    pub radio_source: Vec<MediaItem>,
    /// Recent top-level requests (oldest first), used by "don't stop the music".
    pub enqueued_media_items: VecDeque<MediaItem>,
    pub dont_stop_the_music_enabled: bool,
    /// Number of items in the queue.
    pub items: usize,
}

impl PlayerQueue {
    /// Create an empty queue for a player.
    pub fn new(queue_id: &str, display_name: &str, available: bool) -> Self {
        Self {
            queue_id: queue_id.to_string(),
            active: false,
            display_name: display_name.to_string(),
            available,
            state: PlayerState::Idle,
            shuffle_enabled: false,
            repeat_mode: RepeatMode::Off,
            current_index: None,
            index_in_buffer: None,
            current_item: None,
            next_item: None,
            elapsed_time: 0.0,
            elapsed_time_last_updated: 0.0,
            resume_pos: 0,
            flow_mode: false,
            flow_mode_stream_log: Vec::new(),
            next_track_enqueued: None,
            preload_in_flight: None,
            radio_source: Vec::new(),
            enqueued_media_items: VecDeque::new(),
            dont_stop_the_music_enabled: false,
            items: 0,
        }
    }

    /// Elapsed time corrected for the time passed since the last update.
    pub fn corrected_elapsed_time(&self) -> f64 {
        self.corrected_elapsed_time_at(queue_hub_types::unix_now())
    }

    pub fn corrected_elapsed_time_at(&self, now: f64) -> f64 {
        if self.state == PlayerState::Playing && self.elapsed_time_last_updated > 0.0 {
            self.elapsed_time + (now - self.elapsed_time_last_updated).max(0.0)
        } else {
            self.elapsed_time
        }
    }

    /// Remember a top-level request, evicting the oldest beyond the history limit.
    pub fn remember_enqueued(&mut self, media: MediaItem) {
        self.enqueued_media_items.push_back(media);
        while self.enqueued_media_items.len() > MAX_ENQUEUED_MEDIA_HISTORY {
            self.enqueued_media_items.pop_front();
        }
    }

    /// Number of items from the current index (inclusive) to the end.
    pub fn items_remaining(&self) -> Option<usize> {
        self.current_index
            .map(|index| self.items.saturating_sub(index))
    }

    /// Return true when `index` is already played or committed to the player buffer.
    pub fn is_buffered(&self, index: usize) -> bool {
        self.index_in_buffer.is_some_and(|buffered| index <= buffered)
    }

    /// Index new items should be inserted at (right after the playing/buffered item).
    pub fn insert_index(&self, has_items: bool) -> usize {
        if !has_items {
            return 0;
        }
        let cur_index = match self.state {
            PlayerState::Playing | PlayerState::Paused => self.index_in_buffer.unwrap_or(0),
            _ => self.current_index.unwrap_or(0),
        };
        cur_index + 1
    }
}

/// Fixed-shape snapshot of the observable queue state, compared on every tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueueSnapshot {
    pub state: PlayerState,
    pub current_item_id: Option<String>,
    pub next_item_id: Option<String>,
    /// Whole seconds elapsed.
    pub elapsed_time: i64,
    pub stream_title: Option<String>,
    pub content_type: Option<String>,
}

impl QueueSnapshot {
    /// Build a snapshot from the queue's current fields.
    pub fn of(queue: &PlayerQueue) -> Self {
        let details = queue
            .current_item
            .as_ref()
            .and_then(|item| item.streamdetails.as_ref());
        Self {
            state: queue.state,
            current_item_id: queue
                .current_item
                .as_ref()
                .map(|item| item.queue_item_id.clone()),
            next_item_id: queue
                .next_item
                .as_ref()
                .map(|item| item.queue_item_id.clone()),
            elapsed_time: queue.elapsed_time as i64,
            stream_title: details.and_then(|d| d.stream_title.clone()),
            content_type: details.and_then(|d| d.content_type.clone()),
        }
    }

    /// Field-by-field difference against a newer snapshot.
    pub fn diff(&self, newer: &QueueSnapshot) -> SnapshotDiff {
        SnapshotDiff {
            state: self.state != newer.state,
            current_item: self.current_item_id != newer.current_item_id,
            next_item: self.next_item_id != newer.next_item_id,
            elapsed_time: self.elapsed_time != newer.elapsed_time,
            stream_title: self.stream_title != newer.stream_title,
            content_type: self.content_type != newer.content_type,
        }
    }
}

/// Which snapshot fields changed between two ticks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub state: bool,
    pub current_item: bool,
    pub next_item: bool,
    pub elapsed_time: bool,
    pub stream_title: bool,
    pub content_type: bool,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        *self == SnapshotDiff::default()
    }

    /// Return true when only the elapsed time moved.
    pub fn only_elapsed_time(&self) -> bool {
        *self
            == SnapshotDiff {
                elapsed_time: true,
                ..SnapshotDiff::default()
            }
    }

    /// Return true when the diff changes which items the queue points at.
    pub fn affects_items(&self) -> bool {
        self.current_item || self.next_item
    }
}
