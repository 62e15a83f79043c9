use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Playback state as reported by a player (and mirrored on its queue).
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    #[default]
    Idle,
    Playing,
    Paused,
    /// Stream details for the requested item are being fetched.
    Buffering,
}

/// Kind of media a queue item or player media refers to.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Track,
    Album,
    Artist,
    Playlist,
    Radio,
    Audiobook,
    Podcast,
    PodcastEpisode,
    Folder,
    /// One continuous stream concatenating several queue items.
    FlowStream,
    Unknown,
}

impl MediaType {
    /// Stable snake_case name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Track => "track",
            MediaType::Album => "album",
            MediaType::Artist => "artist",
            MediaType::Playlist => "playlist",
            MediaType::Radio => "radio",
            MediaType::Audiobook => "audiobook",
            MediaType::Podcast => "podcast",
            MediaType::PodcastEpisode => "podcast_episode",
            MediaType::Folder => "folder",
            MediaType::FlowStream => "flow_stream",
            MediaType::Unknown => "unknown",
        }
    }
}

/// Media currently loaded on a player, as reported by the player itself.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurrentMedia {
    /// Stream URI the player is rendering.
    pub uri: Option<String>,
    /// Queue that dispatched this media, if the player knows it.
    pub queue_id: Option<String>,
    /// Queue item id that dispatched this media, if the player knows it.
    pub queue_item_id: Option<String>,
}

/// Player status delivered on every state tick.
///
/// Carries everything the queue reconciler needs: source selection, grouping,
/// power state and the playback position.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PlayerReport {
    /// Stable player id (also the id of its queue).
    pub player_id: String,
    /// User-visible player name.
    pub display_name: String,
    /// `true` when the player is reachable.
    pub available: bool,
    /// `true` when the player is powered on.
    pub powered: bool,
    /// Playback state, `None` when the player did not report one.
    pub state: Option<PlayerState>,
    /// Id of the source currently active on the player (a queue id or external source).
    pub active_source: Option<String>,
    /// Player id this player is synced to, if it is a sync child.
    pub synced_to: Option<String>,
    /// Group player id that is currently active for this player.
    pub active_group: Option<String>,
    /// Elapsed seconds of the current stream at `elapsed_time_last_updated`.
    pub elapsed_time: Option<f64>,
    /// Unix timestamp (seconds) of the last elapsed-time update.
    pub elapsed_time_last_updated: Option<f64>,
    /// Media the player is currently rendering.
    pub current_media: Option<CurrentMedia>,
    /// `true` while an announcement interrupts normal playback.
    pub announcement_in_progress: bool,
}

impl PlayerReport {
    /// Elapsed time corrected for the time passed since the last report.
    pub fn corrected_elapsed_time(&self) -> Option<f64> {
        self.corrected_elapsed_time_at(unix_now())
    }

    /// Same as [`PlayerReport::corrected_elapsed_time`] using an explicit clock.
    pub fn corrected_elapsed_time_at(&self, now: f64) -> Option<f64> {
        let elapsed = self.elapsed_time?;
        match (self.state, self.elapsed_time_last_updated) {
            (Some(PlayerState::Playing), Some(updated)) if now > updated => {
                Some(elapsed + (now - updated))
            }
            _ => Some(elapsed),
        }
    }

    /// Return true when the player is grouped under another player.
    pub fn is_grouped(&self) -> bool {
        self.active_group.is_some() || self.synced_to.is_some()
    }
}

/// Media payload dispatched to a player.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PlayerMedia {
    /// Stream URI the player should render.
    pub uri: String,
    pub media_type: MediaType,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub image_url: Option<String>,
    /// Nominal duration in seconds.
    pub duration: Option<u32>,
    pub queue_id: Option<String>,
    pub queue_item_id: Option<String>,
}

/// Current unix time in (fractional) seconds.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
