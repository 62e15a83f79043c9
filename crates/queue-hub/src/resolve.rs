//! Expansion of requested media into playable items.
//!
//! Containers (playlists, albums, artists, podcasts) become their tracks or
//! episodes; audiobooks get their resume point attached.

use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::config::{AlbumSelect, HubConfig};
use crate::error::{QueueError, Result};
use crate::models::{ItemRef, MediaItem, MediaKind};
use crate::providers::{MusicCatalog, PlayedReport};
use crate::scheduler::TaskScheduler;
use crate::throttle::Throttler;

#[derive(Clone)]
pub struct MediaResolver {
    catalog: Arc<dyn MusicCatalog>,
    throttler: Arc<Throttler>,
    config: Arc<HubConfig>,
    scheduler: TaskScheduler,
}

/// Which episode of a podcast playback starts from.
enum EpisodeStart<'a> {
    /// Match by uri or item id.
    Key(&'a str),
    /// First episode not fully played (or the first one).
    FirstUnplayed,
}

/// Keep only available tracks, starting at `start_item` (uri or item id) if given.
fn tracks_from_start(tracks: Vec<MediaItem>, start_item: Option<&str>) -> Vec<MediaItem> {
    let mut found = start_item.is_none();
    tracks
        .into_iter()
        .filter(|track| track.available)
        .filter(|track| {
            if let Some(start) = start_item {
                if start == track.item_id || start == track.uri {
                    found = true;
                }
            }
            found
        })
        .collect()
}

fn podcast_ref(item: &MediaItem) -> ItemRef {
    ItemRef {
        item_id: item.item_id.clone(),
        provider: item.provider.clone(),
        name: item.name.clone(),
        uri: item.uri.clone(),
    }
}

impl MediaResolver {
    pub fn new(
        catalog: Arc<dyn MusicCatalog>,
        throttler: Arc<Throttler>,
        config: Arc<HubConfig>,
        scheduler: TaskScheduler,
    ) -> Self {
        Self {
            catalog,
            throttler,
            config,
            scheduler,
        }
    }

    /// Resolve a uri through the catalog.
    pub async fn item_by_uri(&self, uri: &str) -> Result<MediaItem> {
        self.throttler.acquire().await;
        self.catalog.get_item_by_uri(uri).await
    }

    /// Expand a requested item into the items to enqueue.
    pub async fn expand(&self, item: MediaItem, start_item: Option<&str>) -> Result<Vec<MediaItem>> {
        match &item.kind {
            MediaKind::Playlist => {
                self.report_container_played(&item);
                tracing::debug!(playlist = %item.name, "fetching tracks to play for playlist");
                self.throttler.acquire().await;
                let tracks = self.catalog.playlist_tracks(&item).await?;
                Ok(tracks_from_start(tracks, start_item))
            }
            MediaKind::Artist => {
                self.report_container_played(&item);
                self.artist_tracks(&item).await
            }
            MediaKind::Album => {
                self.report_container_played(&item);
                tracing::debug!(album = %item.name, "fetching tracks to play for album");
                let in_library_only = self.config.album_select() == AlbumSelect::LibraryTracks;
                self.throttler.acquire().await;
                let tracks = self.catalog.album_tracks(&item, in_library_only).await?;
                Ok(tracks_from_start(tracks, start_item))
            }
            MediaKind::Audiobook { .. } => {
                let resume_ms = self.audiobook_resume_point(&item, start_item).await?;
                let mut item = item;
                if resume_ms > 0 {
                    item.set_resume_position_ms(Some(resume_ms));
                }
                Ok(vec![item])
            }
            MediaKind::Podcast => {
                self.report_container_played(&item);
                let start = match start_item {
                    Some(key) => EpisodeStart::Key(key),
                    None => EpisodeStart::FirstUnplayed,
                };
                self.podcast_episodes(&podcast_ref(&item), start).await
            }
            MediaKind::PodcastEpisode { podcast, .. } => {
                let podcast = podcast.clone().ok_or_else(|| {
                    QueueError::InvalidData(format!("episode {} has no podcast", item.name))
                })?;
                self.podcast_episodes(&podcast, EpisodeStart::Key(&item.uri))
                    .await
            }
            _ => Ok(vec![item]),
        }
    }

    fn report_container_played(&self, item: &MediaItem) {
        let catalog = self.catalog.clone();
        let report = PlayedReport::container(item);
        self.scheduler.spawn("mark_item_played", async move {
            catalog.mark_item_played(report).await
        });
    }

    async fn artist_tracks(&self, artist: &MediaItem) -> Result<Vec<MediaItem>> {
        let select = self.config.artist_select();
        tracing::debug!(artist = %artist.name, select = ?select, "fetching tracks to play for artist");
        let mut all_items: Vec<MediaItem> = Vec::new();
        if select.album_tracks() {
            self.throttler.acquire().await;
            let albums = self
                .catalog
                .artist_albums(artist, select.in_library_only())
                .await?;
            for album in albums {
                self.throttler.acquire().await;
                for track in self.catalog.album_tracks(&album, false).await? {
                    if !all_items.iter().any(|t| t.same_media(&track)) {
                        all_items.push(track);
                    }
                }
            }
        } else {
            self.throttler.acquire().await;
            all_items = self
                .catalog
                .artist_tracks(artist, select.in_library_only())
                .await?;
        }
        all_items.shuffle(&mut rand::thread_rng());
        Ok(all_items)
    }

    /// Resume point (ms) of an audiobook, or the start of an explicit chapter.
    async fn audiobook_resume_point(&self, book: &MediaItem, chapter: Option<&str>) -> Result<u64> {
        if let Some(chapter) = chapter {
            let MediaKind::Audiobook { chapters, .. } = &book.kind else {
                return Ok(0);
            };
            let position: Option<u32> = chapter.trim().parse().ok();
            return chapters
                .iter()
                .find(|c| Some(c.position) == position)
                .map(|c| (c.start * 1000.0) as u64)
                .ok_or_else(|| {
                    QueueError::InvalidData(format!(
                        "unable to resolve chapter {chapter} of audiobook {}",
                        book.name
                    ))
                });
        }
        self.throttler.acquire().await;
        Ok(match self.catalog.resume_info(book).await? {
            Some(info) if info.fully_played => 0,
            Some(info) => info.resume_position_ms.unwrap_or(0),
            None => 0,
        })
    }

    async fn podcast_episodes(
        &self,
        podcast: &ItemRef,
        start: EpisodeStart<'_>,
    ) -> Result<Vec<MediaItem>> {
        tracing::debug!(podcast = %podcast.name, "fetching episodes to play for podcast");
        self.throttler.acquire().await;
        let mut episodes = self.catalog.podcast_episodes(podcast).await?;
        let index = match start {
            EpisodeStart::Key(key) => episodes
                .iter()
                .position(|e| e.uri == key || e.item_id == key),
            EpisodeStart::FirstUnplayed => episodes
                .iter()
                .position(|e| !e.fully_played())
                .or_else(|| (!episodes.is_empty()).then_some(0)),
        };
        let index = index.ok_or_else(|| {
            QueueError::InvalidData(format!(
                "unable to resolve episode to play for podcast {}",
                podcast.name
            ))
        })?;
        Ok(episodes.split_off(index))
    }
}
