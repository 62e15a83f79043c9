//! Player state reconciliation.
//!
//! Folds every player report into its queue: position, current/next item,
//! change events, played-item bookkeeping and the follow-up jobs (preload,
//! radio refill, clearing a finished queue).

use queue_hub_types::{PlayerReport, PlayerState, unix_now};

use crate::events::MediaItemPlayed;
use crate::flow::flow_stream_position;
use crate::index::next_item;
use crate::models::{PlayerQueue, QueueItem, QueueSnapshot, StreamDetails};
use crate::playback_manager::PlaybackManager;
use crate::providers::PlayedReport;
use crate::state::HubState;

/// Elapsed seconds required before the next item is preloaded.
const PRELOAD_MIN_ELAPSED_SECS: f64 = 2.0;
/// Fallback item length used for the preload threshold.
const PRELOAD_FALLBACK_DURATION_SECS: u32 = 10;
/// Fallback item length used to decide whether an item was fully played.
const PLAYED_FALLBACK_DURATION_SECS: u32 = 3600;
/// An item counts as fully played when less than this many seconds remained.
const FULLY_PLAYED_MARGIN_SECS: u32 = 5;
/// Items played for at most this many seconds are not recorded as played.
const MIN_PLAYED_SECS: u32 = 2;
/// Radio tracks are refilled when fewer items than this remain.
const RADIO_REFILL_THRESHOLD: usize = 5;

/// Folds player reports into queues.
///
/// Follow-up work is spawned on the ambient tokio runtime, so every entry
/// point must be called from within one.
#[derive(Clone)]
pub struct UpdateReconciler {
    manager: PlaybackManager,
}

impl UpdateReconciler {
    pub fn new(manager: PlaybackManager) -> Self {
        Self { manager }
    }

    fn hub(&self) -> &HubState {
        self.manager.state()
    }

    /// Create (or restore) the queue of a newly registered player.
    pub fn on_player_register(&self, report: &PlayerReport) -> PlayerQueue {
        let hub = self.hub();
        let queue = hub
            .registry
            .register(&report.player_id, &report.display_name, report.available);
        tracing::info!(queue_id = %queue.queue_id, items = queue.items, "registered player queue");
        self.on_player_update(report);
        let queue = hub.registry.get(&report.player_id).unwrap_or(queue);
        hub.events.queue_added(&queue);
        queue
    }

    /// Drop a player's queue and its pending jobs.
    pub fn on_player_remove(&self, player_id: &str) {
        let hub = self.hub();
        let cancelled = hub.scheduler.cancel_queue(player_id);
        if hub.registry.deregister(player_id) {
            tracing::info!(queue_id = %player_id, cancelled, "removed player queue");
        }
    }

    /// Reconcile a player report into its queue.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime and the report needs a
    /// follow-up job (preload, radio refill, played reporting or clearing).
    pub fn on_player_update(&self, report: &PlayerReport) {
        let hub = self.hub();
        let queue_id = report.player_id.as_str();
        if !hub.registry.contains(queue_id) || report.announcement_in_progress {
            return;
        }
        let prev_snapshot = hub.registry.prev_snapshot(queue_id);
        let items = hub.registry.items(queue_id);

        let updated = hub.registry.update_queue(queue_id, |queue| {
            queue.display_name = report.display_name.clone();
            queue.available = report.available;
            queue.items = items.len();
            let active_source = report.active_source.as_deref().unwrap_or(queue_id);
            queue.active = active_source == queue.queue_id;
            if !queue.active && prev_snapshot.is_none() {
                queue.state = PlayerState::Idle;
                return None;
            }

            if report.state == Some(PlayerState::Playing) {
                let elapsed = report.corrected_elapsed_time().unwrap_or(0.0);
                if queue.flow_mode {
                    let (index, item_elapsed) = flow_stream_position(
                        queue.current_index,
                        &queue.flow_mode_stream_log,
                        &items,
                        elapsed,
                    );
                    queue.current_index = index;
                    queue.elapsed_time = item_elapsed;
                } else {
                    queue.elapsed_time = elapsed.floor();
                    if let Some(item_id) = current_item_id(queue_id, report, &items) {
                        queue.current_index =
                            items.iter().position(|item| item.queue_item_id == item_id);
                    }
                }
                queue.state = PlayerState::Playing;
                queue.elapsed_time_last_updated = unix_now();
            } else {
                queue.state = report.state.unwrap_or(PlayerState::Idle);
            }

            queue.current_item = queue
                .current_index
                .and_then(|index| items.get(index))
                .cloned();
            queue.next_item = next_item(&items, queue.repeat_mode, queue.current_index).cloned();

            if queue.state == PlayerState::Playing && !queue.flow_mode {
                let seek = queue
                    .current_item
                    .as_ref()
                    .and_then(|item| item.streamdetails.as_ref())
                    .map_or(0, |details| details.seek_position);
                queue.elapsed_time += f64::from(seek);
            }
            Some(queue.clone())
        });
        let Ok(Some(queue)) = updated else {
            return;
        };

        let prev = prev_snapshot.unwrap_or_default();
        let new = QueueSnapshot::of(&queue);
        if queue.state == PlayerState::Playing
            && (new.next_item_id != prev.next_item_id || queue.next_track_enqueued.is_none())
        {
            self.preload_next_item(&queue);
        }

        let diff = prev.diff(&new);
        if diff.is_empty() {
            return;
        }
        if diff.only_elapsed_time() {
            hub.events.time_updated(&queue);
        } else {
            self.manager
                .queue_service()
                .signal_update(queue_id, diff.affects_items());
        }
        if queue.active {
            hub.registry.set_prev_snapshot(queue_id, new.clone());
        } else {
            hub.registry.clear_prev_snapshot(queue_id);
        }

        let end_of_queue_reached = prev.state == PlayerState::Playing
            && new.state == PlayerState::Idle
            && queue.current_item.is_some()
            && queue.next_item.is_none();

        if let Some(prev_item_id) = prev.current_item_id.as_deref() {
            if Some(prev_item_id) != new.current_item_id.as_deref() || end_of_queue_reached {
                let prev_item = items.iter().find(|item| item.queue_item_id == prev_item_id);
                if let Some(prev_item) = prev_item {
                    if let Some(details) = prev_item.streamdetails.clone() {
                        self.report_played(queue_id, prev_item, details, prev.elapsed_time);
                    }
                }
            }
        }

        if end_of_queue_reached {
            tracing::debug!(queue_id = %queue_id, "end of queue reached");
            self.schedule_clear_check(queue_id);
        }

        if diff.current_item {
            self.on_current_item_changed(&queue);
        }
    }

    fn on_current_item_changed(&self, queue: &PlayerQueue) {
        let hub = self.hub();
        let Some(remaining) = queue.items_remaining() else {
            return;
        };
        let mut has_radio_source = !queue.radio_source.is_empty();
        if queue.dont_stop_the_music_enabled
            && !queue.enqueued_media_items.is_empty()
            && remaining <= 1
        {
            tracing::info!(
                queue_id = %queue.queue_id,
                "queue is almost finished, adding radio tracks"
            );
            let adopted = hub.registry.update_queue(&queue.queue_id, |queue| {
                queue.radio_source = queue.enqueued_media_items.iter().cloned().collect();
            });
            has_radio_source |= adopted.is_ok();
        }
        if has_radio_source && remaining < RADIO_REFILL_THRESHOLD {
            self.manager.schedule_radio_fill(&queue.queue_id);
        }
    }

    fn report_played(
        &self,
        queue_id: &str,
        item: &QueueItem,
        details: StreamDetails,
        elapsed_time: i64,
    ) {
        let hub = self.hub();
        let seconds_played = u32::try_from(elapsed_time.max(0)).unwrap_or(u32::MAX);
        let duration = details
            .duration
            .or(item.duration)
            .unwrap_or(PLAYED_FALLBACK_DURATION_SECS);
        let fully_played = seconds_played >= duration.saturating_sub(FULLY_PLAYED_MARGIN_SECS);
        tracing::debug!(
            queue_id = %queue_id,
            item = %item.name,
            seconds_played,
            fully_played,
            "item finished playing"
        );

        let streams = hub.streams.clone();
        let streamed = details.clone();
        hub.scheduler.spawn("on_streamed", async move {
            streams
                .on_streamed(&streamed, seconds_played, fully_played)
                .await
        });

        let Some(media_item) = item.media_item.clone() else {
            return;
        };
        if !fully_played && seconds_played <= MIN_PLAYED_SECS {
            return;
        }
        let catalog = hub.catalog.clone();
        let report = PlayedReport {
            media_type: details.media_type.unwrap_or_else(|| media_item.media_type()),
            item_id: details.item_id.clone(),
            provider: details.provider.clone(),
            fully_played: Some(fully_played),
            seconds_played: Some(seconds_played),
        };
        hub.scheduler.spawn("mark_item_played", async move {
            catalog.mark_item_played(report).await
        });
        hub.events.media_item_played(MediaItemPlayed {
            queue_id: queue_id.to_string(),
            queue_item_id: item.queue_item_id.clone(),
            media_item,
            seconds_played,
            fully_played,
        });
    }

    /// Preload the next item once the current one is far enough along.
    fn preload_next_item(&self, queue: &PlayerQueue) {
        let (Some(current), Some(next)) = (&queue.current_item, &queue.next_item) else {
            return;
        };
        if queue.next_track_enqueued.as_deref() == Some(next.queue_item_id.as_str()) {
            return;
        }
        let elapsed = queue.corrected_elapsed_time();
        if elapsed < PRELOAD_MIN_ELAPSED_SECS {
            return;
        }
        let track_time = current
            .streamdetails
            .as_ref()
            .and_then(|details| details.duration)
            .or(current.duration)
            .unwrap_or(PRELOAD_FALLBACK_DURATION_SECS);
        if elapsed < f64::from(track_time) / 2.0 {
            return;
        }

        // one preload per queue at a time; the job releases the claim when done
        let claimed = self
            .hub()
            .registry
            .update_queue(&queue.queue_id, |queue| {
                if queue.preload_in_flight.is_some() {
                    return false;
                }
                queue.preload_in_flight = Some(next.queue_item_id.clone());
                true
            })
            .unwrap_or(false);
        if !claimed {
            return;
        }

        let manager = self.manager.clone();
        let queue_id = queue.queue_id.clone();
        let current_item_id = current.queue_item_id.clone();
        self.hub().scheduler.call_later(
            format!("preload_next_item_{queue_id}"),
            std::time::Duration::ZERO,
            async move { manager.preload_next_item(&queue_id, &current_item_id).await },
        );
    }

    /// Clear the queue once it stayed finished for the whole grace period.
    fn schedule_clear_check(&self, queue_id: &str) {
        let timings = self.hub().timings;
        let manager = self.manager.clone();
        let queue_id = queue_id.to_string();
        let grace = timings.clear_check_interval * timings.clear_check_attempts;
        self.hub().scheduler.call_later(
            format!("clear_queue_{queue_id}"),
            grace,
            async move {
                for _ in 0..timings.clear_check_attempts {
                    tokio::time::sleep(timings.clear_check_interval).await;
                    let Some((queue, items)) = manager.state().registry.snapshot(&queue_id) else {
                        return Ok(());
                    };
                    let at_end = queue.current_index.unwrap_or(0) + 1 >= items.len();
                    if queue.state != PlayerState::Idle || queue.next_item.is_some() || !at_end {
                        return Ok(());
                    }
                }
                tracing::info!(queue_id = %queue_id, "end of queue reached, clearing items");
                manager.clear(&queue_id)
            },
        );
    }
}

/// Queue item id of the media a player is rendering, if it came from this queue.
fn current_item_id(queue_id: &str, report: &PlayerReport, items: &[QueueItem]) -> Option<String> {
    let media = report.current_media.as_ref()?;
    if media.queue_id.as_deref().is_some_and(|id| id != queue_id) {
        return None;
    }
    if let Some(item_id) = &media.queue_item_id {
        return Some(item_id.clone());
    }
    let uri = media.uri.as_deref()?;
    if !uri.contains(queue_id) {
        return None;
    }
    let candidate = uri.rsplit('/').next()?.split('.').next()?;
    items
        .iter()
        .any(|item| item.queue_item_id == candidate)
        .then(|| candidate.to_string())
}
