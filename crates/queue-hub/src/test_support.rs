//! Fixtures and in-memory collaborators shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use queue_hub_types::{PlayerMedia, PlayerReport, PlayerState};
use tracing_subscriber::EnvFilter;

use crate::config::HubConfig;
use crate::error::{QueueError, Result};
use crate::models::{ItemRef, MediaItem, MediaKind, QueueItem, StreamDetails};
use crate::providers::{
    MusicCatalog, PlayedReport, PlayerControl, ResumeInfo, StreamRequest, StreamResolver,
};
use crate::snapshot_store::MemorySnapshotStore;
use crate::state::HubState;

pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn track(id: &str, duration: u32) -> MediaItem {
    MediaItem {
        item_id: id.to_string(),
        provider: "test".to_string(),
        name: format!("Track {id}"),
        uri: format!("test://track/{id}"),
        duration: Some(duration),
        available: true,
        image: None,
        kind: MediaKind::Track {
            album: None,
            artist: None,
        },
    }
}

pub fn container(kind: MediaKind, id: &str) -> MediaItem {
    let item = MediaItem {
        item_id: id.to_string(),
        provider: "test".to_string(),
        name: id.to_string(),
        uri: String::new(),
        duration: None,
        available: true,
        image: None,
        kind,
    };
    MediaItem {
        uri: format!("test://{}/{id}", item.media_type().as_str()),
        ..item
    }
}

pub fn episode(id: &str, podcast: &ItemRef, fully_played: bool) -> MediaItem {
    MediaItem {
        item_id: id.to_string(),
        provider: "test".to_string(),
        name: format!("Episode {id}"),
        uri: format!("test://podcast_episode/{id}"),
        duration: Some(1800),
        available: true,
        image: None,
        kind: MediaKind::PodcastEpisode {
            podcast: Some(podcast.clone()),
            resume_position_ms: None,
            fully_played,
        },
    }
}

pub fn queue_items(queue_id: &str, ids: &[&str]) -> Vec<QueueItem> {
    ids.iter()
        .enumerate()
        .map(|(index, id)| QueueItem {
            sort_index: index as u64,
            ..QueueItem::from_media_item(queue_id, track(id, 180))
        })
        .collect()
}

/// Report of a powered, idle player that has its own queue as active source.
pub fn player_report(player_id: &str) -> PlayerReport {
    PlayerReport {
        player_id: player_id.to_string(),
        display_name: player_id.to_string(),
        available: true,
        powered: true,
        state: Some(PlayerState::Idle),
        active_source: Some(player_id.to_string()),
        ..PlayerReport::default()
    }
}

#[derive(Default)]
struct CatalogData {
    items: HashMap<String, MediaItem>,
    library: HashMap<String, MediaItem>,
    children: HashMap<String, Vec<MediaItem>>,
    artist_albums: HashMap<String, Vec<MediaItem>>,
    radio_base: HashMap<String, Vec<MediaItem>>,
    default_similar: Vec<MediaItem>,
    lookup_similar: Vec<MediaItem>,
    resume: HashMap<String, ResumeInfo>,
    played: Vec<PlayedReport>,
    supports_similar: bool,
}

#[derive(Default)]
pub struct FakeCatalog {
    data: Mutex<CatalogData>,
}

impl FakeCatalog {
    fn data(&self) -> std::sync::MutexGuard<'_, CatalogData> {
        self.data.lock().unwrap()
    }

    pub fn add_item(&self, item: MediaItem) {
        self.data().items.insert(item.uri.clone(), item);
    }

    pub fn set_library_item(&self, item: MediaItem) {
        self.data().library.insert(item.uri.clone(), item);
    }

    /// Tracks of an album/playlist/artist or episodes of a podcast.
    pub fn set_children(&self, uri: &str, children: Vec<MediaItem>) {
        self.data().children.insert(uri.to_string(), children);
    }

    pub fn set_artist_albums(&self, uri: &str, albums: Vec<MediaItem>) {
        self.data().artist_albums.insert(uri.to_string(), albums);
    }

    pub fn set_radio_base_tracks(&self, uri: &str, tracks: Vec<MediaItem>) {
        self.data().radio_base.insert(uri.to_string(), tracks);
    }

    pub fn set_default_similar(&self, tracks: Vec<MediaItem>) {
        self.data().default_similar = tracks;
    }

    pub fn set_lookup_similar(&self, tracks: Vec<MediaItem>) {
        self.data().lookup_similar = tracks;
    }

    pub fn set_resume_info(&self, uri: &str, info: ResumeInfo) {
        self.data().resume.insert(uri.to_string(), info);
    }

    pub fn set_supports_similar(&self, supported: bool) {
        self.data().supports_similar = supported;
    }

    pub fn played(&self) -> Vec<PlayedReport> {
        self.data().played.clone()
    }

    fn children(&self, uri: &str) -> Vec<MediaItem> {
        self.data().children.get(uri).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl MusicCatalog for FakeCatalog {
    async fn get_item_by_uri(&self, uri: &str) -> Result<MediaItem> {
        self.data()
            .items
            .get(uri)
            .cloned()
            .ok_or_else(|| QueueError::NotFound(uri.to_string()))
    }

    async fn get_library_item(&self, item: &MediaItem) -> Result<Option<MediaItem>> {
        Ok(self.data().library.get(&item.uri).cloned())
    }

    async fn artist_tracks(&self, artist: &MediaItem, _in_library_only: bool) -> Result<Vec<MediaItem>> {
        Ok(self.children(&artist.uri))
    }

    async fn artist_albums(&self, artist: &MediaItem, _in_library_only: bool) -> Result<Vec<MediaItem>> {
        Ok(self
            .data()
            .artist_albums
            .get(&artist.uri)
            .cloned()
            .unwrap_or_default())
    }

    async fn album_tracks(&self, album: &MediaItem, _in_library_only: bool) -> Result<Vec<MediaItem>> {
        Ok(self.children(&album.uri))
    }

    async fn playlist_tracks(&self, playlist: &MediaItem) -> Result<Vec<MediaItem>> {
        Ok(self.children(&playlist.uri))
    }

    async fn podcast_episodes(&self, podcast: &ItemRef) -> Result<Vec<MediaItem>> {
        Ok(self.children(&podcast.uri))
    }

    async fn radio_mode_base_tracks(&self, item: &MediaItem) -> Result<Vec<MediaItem>> {
        self.data()
            .radio_base
            .get(&item.uri)
            .cloned()
            .ok_or_else(|| QueueError::UnsupportedFeature(format!("no radio for {}", item.uri)))
    }

    async fn similar_tracks(&self, _track: &MediaItem, allow_lookup: bool) -> Result<Vec<MediaItem>> {
        let data = self.data();
        Ok(if allow_lookup {
            data.lookup_similar.clone()
        } else {
            data.default_similar.clone()
        })
    }

    fn supports_similar_tracks(&self) -> bool {
        self.data().supports_similar
    }

    async fn resume_info(&self, audiobook: &MediaItem) -> Result<Option<ResumeInfo>> {
        Ok(self.data().resume.get(&audiobook.uri).copied())
    }

    async fn mark_item_played(&self, report: PlayedReport) -> Result<()> {
        self.data().played.push(report);
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PlayerCommand {
    PlayMedia(String, PlayerMedia),
    EnqueueNext(String, PlayerMedia),
    Play(String),
    Pause(String),
    Stop(String),
    Power(String, bool),
}

#[derive(Default)]
pub struct FakePlayers {
    reports: Mutex<HashMap<String, PlayerReport>>,
    commands: Mutex<Vec<PlayerCommand>>,
}

impl FakePlayers {
    pub fn set_report(&self, report: PlayerReport) {
        self.reports
            .lock()
            .unwrap()
            .insert(report.player_id.clone(), report);
    }

    pub fn commands(&self) -> Vec<PlayerCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn played_media(&self) -> Vec<PlayerMedia> {
        self.commands()
            .into_iter()
            .filter_map(|command| match command {
                PlayerCommand::PlayMedia(_, media) => Some(media),
                _ => None,
            })
            .collect()
    }

    pub fn enqueued_media(&self) -> Vec<PlayerMedia> {
        self.commands()
            .into_iter()
            .filter_map(|command| match command {
                PlayerCommand::EnqueueNext(_, media) => Some(media),
                _ => None,
            })
            .collect()
    }

    fn record(&self, command: PlayerCommand) -> Result<()> {
        self.commands.lock().unwrap().push(command);
        Ok(())
    }
}

#[async_trait]
impl PlayerControl for FakePlayers {
    fn get(&self, player_id: &str) -> Option<PlayerReport> {
        self.reports.lock().unwrap().get(player_id).cloned()
    }

    async fn play_media(&self, player_id: &str, media: PlayerMedia) -> Result<()> {
        self.record(PlayerCommand::PlayMedia(player_id.to_string(), media))
    }

    async fn enqueue_next_media(&self, player_id: &str, media: PlayerMedia) -> Result<()> {
        self.record(PlayerCommand::EnqueueNext(player_id.to_string(), media))
    }

    async fn cmd_play(&self, player_id: &str) -> Result<()> {
        self.record(PlayerCommand::Play(player_id.to_string()))
    }

    async fn cmd_pause(&self, player_id: &str) -> Result<()> {
        self.record(PlayerCommand::Pause(player_id.to_string()))
    }

    async fn cmd_stop(&self, player_id: &str) -> Result<()> {
        self.record(PlayerCommand::Stop(player_id.to_string()))
    }

    async fn cmd_power(&self, player_id: &str, powered: bool) -> Result<()> {
        self.record(PlayerCommand::Power(player_id.to_string(), powered))
    }
}

#[derive(Default)]
pub struct FakeStreams {
    unplayable: Mutex<HashSet<String>>,
    requests: Mutex<Vec<(String, StreamRequest)>>,
    streamed: Mutex<Vec<(String, u32, bool)>>,
    latency: Mutex<Duration>,
}

impl FakeStreams {
    /// Make stream resolution of `uri` fail with `NotFound`.
    pub fn set_unplayable(&self, uri: &str) {
        self.unplayable.lock().unwrap().insert(uri.to_string());
    }

    /// Delay every stream details lookup by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    /// Requests as `(media item id, request)`.
    pub fn requests(&self) -> Vec<(String, StreamRequest)> {
        self.requests.lock().unwrap().clone()
    }

    /// Streamed reports as `(item id, seconds, fully played)`.
    pub fn streamed(&self) -> Vec<(String, u32, bool)> {
        self.streamed.lock().unwrap().clone()
    }
}

#[async_trait]
impl StreamResolver for FakeStreams {
    async fn get_stream_details(
        &self,
        item: &QueueItem,
        request: StreamRequest,
    ) -> Result<StreamDetails> {
        if self.unplayable.lock().unwrap().contains(&item.uri) {
            return Err(QueueError::NotFound(format!("no stream for {}", item.uri)));
        }
        let (provider, item_id) = match &item.media_item {
            Some(media) => (media.provider.clone(), media.item_id.clone()),
            None => ("test".to_string(), item.queue_item_id.clone()),
        };
        self.requests
            .lock()
            .unwrap()
            .push((item_id.clone(), request));
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(StreamDetails {
            provider,
            item_id,
            media_type: Some(item.media_type()),
            duration: item.duration,
            seek_position: request.seek_position,
            fade_in: request.fade_in,
            content_type: Some("flac".to_string()),
            prefer_album_loudness: request.prefer_album_loudness,
            ..StreamDetails::default()
        })
    }

    fn resolve_stream_url(&self, item: &QueueItem, flow_mode: bool) -> String {
        if flow_mode {
            return format!("stream://{}/flow/{}.flac", item.queue_id, item.queue_item_id);
        }
        format!("stream://{}/{}.flac", item.queue_id, item.queue_item_id)
    }

    async fn on_streamed(
        &self,
        details: &StreamDetails,
        seconds_played: u32,
        fully_played: bool,
    ) -> Result<()> {
        self.streamed
            .lock()
            .unwrap()
            .push((details.item_id.clone(), seconds_played, fully_played));
        Ok(())
    }
}

/// Hub state wired to fakes, with the fakes kept for inspection.
pub struct TestHub {
    pub state: HubState,
    pub players: Arc<FakePlayers>,
    pub catalog: Arc<FakeCatalog>,
    pub streams: Arc<FakeStreams>,
    pub store: Arc<MemorySnapshotStore>,
}

pub fn test_hub(config: HubConfig) -> TestHub {
    init_test_tracing();
    let players = Arc::new(FakePlayers::default());
    let catalog = Arc::new(FakeCatalog::default());
    let streams = Arc::new(FakeStreams::default());
    let store = Arc::new(MemorySnapshotStore::new());
    let state = HubState::new(
        config,
        store.clone(),
        players.clone(),
        catalog.clone(),
        streams.clone(),
    );
    TestHub {
        state,
        players,
        catalog,
        streams,
        store,
    }
}
