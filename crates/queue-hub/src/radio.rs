//! Radio mode track generation.
//!
//! Builds continuation batches from the queue's radio source: a random sample
//! of base tracks expanded with similar tracks from the catalog.

use std::collections::HashSet;
use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::error::{QueueError, Result};
use crate::models::MediaItem;
use crate::providers::MusicCatalog;
use crate::throttle::Throttler;

/// Number of base tracks sampled per batch.
const BASE_TRACK_SAMPLE_SIZE: usize = 5;
/// Stop asking for similar tracks once this many were collected.
const MAX_DYNAMIC_TRACKS: usize = 50;
/// Similar tracks longer than this (mixes, full albums) are ignored.
const RADIO_TRACK_MAX_DURATION_SECS: u32 = 20 * 60;
/// Similar tracks interleaved after each base track in an initial batch.
const SIMILAR_PER_BASE_TRACK: usize = 2;
/// Similar tracks appended at the end of every batch.
const TRAILING_DYNAMIC_TRACKS: usize = 25;

#[derive(Clone)]
pub struct RadioGenerator {
    catalog: Arc<dyn MusicCatalog>,
    throttler: Arc<Throttler>,
}

fn shuffled<T: Clone>(items: &[T]) -> Vec<T> {
    let mut items = items.to_vec();
    items.shuffle(&mut rand::thread_rng());
    items
}

/// Remove and return up to `count` random items of `pool`.
fn take_random(pool: &mut Vec<MediaItem>, count: usize) -> Vec<MediaItem> {
    pool.shuffle(&mut rand::thread_rng());
    let count = count.min(pool.len());
    pool.drain(..count).collect()
}

impl RadioGenerator {
    pub fn new(catalog: Arc<dyn MusicCatalog>, throttler: Arc<Throttler>) -> Self {
        Self { catalog, throttler }
    }

    /// Generate a batch of radio tracks for `radio_source`.
    ///
    /// An initial batch starts with the sampled base tracks interleaved with
    /// similar tracks (one base, two similar); every batch ends with up to 25
    /// unused similar tracks. An empty source yields an empty batch.
    pub async fn generate(
        &self,
        queue_id: &str,
        radio_source: &[MediaItem],
        is_initial: bool,
    ) -> Result<Vec<MediaItem>> {
        if radio_source.is_empty() {
            return Ok(Vec::new());
        }
        tracing::info!(
            queue_id = %queue_id,
            source = %radio_source
                .iter()
                .map(|item| item.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            "fetching radio tracks"
        );

        let mut available_base_tracks: Vec<MediaItem> = Vec::new();
        for radio_item in shuffled(radio_source) {
            self.throttler.acquire().await;
            match self.catalog.radio_mode_base_tracks(&radio_item).await {
                Ok(tracks) => {
                    for track in tracks {
                        if !available_base_tracks.iter().any(|t| t.same_media(&track)) {
                            available_base_tracks.push(track);
                        }
                    }
                }
                Err(QueueError::UnsupportedFeature(reason)) => {
                    tracing::debug!(uri = %radio_item.uri, reason = %reason, "skip radio source");
                }
                Err(err) => return Err(err),
            }
        }
        if available_base_tracks.is_empty() {
            return Err(QueueError::UnsupportedFeature(
                "radio mode not available for source items".to_string(),
            ));
        }

        let mut base_tracks = shuffled(&available_base_tracks);
        base_tracks.truncate(BASE_TRACK_SAMPLE_SIZE);
        let base_uris: HashSet<&str> = base_tracks.iter().map(|t| t.uri.as_str()).collect();

        let mut dynamic_tracks: Vec<MediaItem> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for allow_lookup in [false, true] {
            if !dynamic_tracks.is_empty() {
                break;
            }
            for base_track in &base_tracks {
                self.throttler.acquire().await;
                let similar = match self.catalog.similar_tracks(base_track, allow_lookup).await {
                    Ok(similar) => similar,
                    Err(QueueError::UnsupportedFeature(reason)) => {
                        tracing::debug!(uri = %base_track.uri, reason = %reason, "no similar tracks");
                        continue;
                    }
                    Err(err) => return Err(err),
                };
                for track in similar {
                    if base_uris.contains(track.uri.as_str())
                        || track
                            .duration
                            .is_some_and(|d| d > RADIO_TRACK_MAX_DURATION_SECS)
                        || !seen.insert(track.uri.clone())
                    {
                        continue;
                    }
                    dynamic_tracks.push(track);
                }
                if dynamic_tracks.len() >= MAX_DYNAMIC_TRACKS {
                    break;
                }
            }
        }

        let mut queue_tracks: Vec<MediaItem> = Vec::new();
        if is_initial {
            let mut bases = base_tracks.into_iter();
            if let Some(first) = bases.next() {
                queue_tracks.push(first);
            }
            for base_track in bases {
                queue_tracks.push(base_track);
                queue_tracks.extend(take_random(&mut dynamic_tracks, SIMILAR_PER_BASE_TRACK));
            }
        }
        queue_tracks.extend(take_random(&mut dynamic_tracks, TRAILING_DYNAMIC_TRACKS));
        Ok(queue_tracks)
    }
}
