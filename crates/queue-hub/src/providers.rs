//! Collaborator seams: players, media catalog and stream resolution.
//!
//! The queue core only talks to the outside world through these traits.

use async_trait::async_trait;
use queue_hub_types::{MediaType, PlayerMedia, PlayerReport};

use crate::error::Result;
use crate::models::{ItemRef, MediaItem, QueueItem, StreamDetails};

/// Player registry and device command surface.
#[async_trait]
pub trait PlayerControl: Send + Sync {
    /// Latest report of a player, `None` when the player is unknown.
    fn get(&self, player_id: &str) -> Option<PlayerReport>;
    /// Start playing media on a player.
    async fn play_media(&self, player_id: &str, media: PlayerMedia) -> Result<()>;
    /// Hand the next media to a player for gapless playback.
    async fn enqueue_next_media(&self, player_id: &str, media: PlayerMedia) -> Result<()>;
    /// Unpause.
    async fn cmd_play(&self, player_id: &str) -> Result<()>;
    async fn cmd_pause(&self, player_id: &str) -> Result<()>;
    async fn cmd_stop(&self, player_id: &str) -> Result<()>;
    async fn cmd_power(&self, player_id: &str, powered: bool) -> Result<()>;
}

/// Resume information of an audiobook as known by its provider or the play log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResumeInfo {
    pub fully_played: bool,
    pub resume_position_ms: Option<u64>,
}

/// Play-log entry reported to the catalog.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayedReport {
    pub media_type: MediaType,
    pub item_id: String,
    pub provider: String,
    /// `None` for container plays (playlist, album, artist, podcast).
    pub fully_played: Option<bool>,
    pub seconds_played: Option<u32>,
}

impl PlayedReport {
    /// Report a container (playlist/album/artist/podcast) being played.
    pub fn container(item: &MediaItem) -> Self {
        Self {
            media_type: item.media_type(),
            item_id: item.item_id.clone(),
            provider: item.provider.clone(),
            fully_played: None,
            seconds_played: None,
        }
    }
}

/// Media catalog and provider metadata layer.
#[async_trait]
pub trait MusicCatalog: Send + Sync {
    /// Resolve a uri into a media item; `NotFound` when unknown.
    async fn get_item_by_uri(&self, uri: &str) -> Result<MediaItem>;
    /// Authoritative library copy of an item, if the library holds one.
    async fn get_library_item(&self, item: &MediaItem) -> Result<Option<MediaItem>>;
    async fn artist_tracks(&self, artist: &MediaItem, in_library_only: bool)
    -> Result<Vec<MediaItem>>;
    async fn artist_albums(&self, artist: &MediaItem, in_library_only: bool)
    -> Result<Vec<MediaItem>>;
    async fn album_tracks(&self, album: &MediaItem, in_library_only: bool) -> Result<Vec<MediaItem>>;
    async fn playlist_tracks(&self, playlist: &MediaItem) -> Result<Vec<MediaItem>>;
    /// All episodes of a podcast, in provider order.
    async fn podcast_episodes(&self, podcast: &ItemRef) -> Result<Vec<MediaItem>>;
    /// Seed tracks for radio mode; `UnsupportedFeature` when the item has no radio source.
    async fn radio_mode_base_tracks(&self, item: &MediaItem) -> Result<Vec<MediaItem>>;
    async fn similar_tracks(&self, track: &MediaItem, allow_lookup: bool) -> Result<Vec<MediaItem>>;
    /// Return true when any source can provide similar tracks.
    fn supports_similar_tracks(&self) -> bool;
    /// Resume point of an audiobook.
    async fn resume_info(&self, audiobook: &MediaItem) -> Result<Option<ResumeInfo>>;
    /// Play-log and resume bookkeeping.
    async fn mark_item_played(&self, report: PlayedReport) -> Result<()>;
}

/// Options for fetching stream details.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamRequest {
    pub seek_position: u32,
    pub fade_in: bool,
    pub prefer_album_loudness: bool,
}

/// Stream details resolver and stream url builder.
#[async_trait]
pub trait StreamResolver: Send + Sync {
    /// Resolve stream details; `NotFound` for unplayable items.
    async fn get_stream_details(
        &self,
        item: &QueueItem,
        request: StreamRequest,
    ) -> Result<StreamDetails>;
    /// Url the player should fetch the item (or the flow stream) from.
    fn resolve_stream_url(&self, item: &QueueItem, flow_mode: bool) -> String;
    /// Tell the stream's provider how long the item streamed.
    async fn on_streamed(
        &self,
        details: &StreamDetails,
        seconds_played: u32,
        fully_played: bool,
    ) -> Result<()>;
}
