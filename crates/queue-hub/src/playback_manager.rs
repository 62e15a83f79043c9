//! Playback orchestration.
//!
//! Implements the queue command surface on top of the queue service, index
//! resolution and the player/catalog/stream collaborators.

use std::sync::Arc;

use queue_hub_types::{MediaType, PlayerMedia, PlayerState};

use crate::error::{QueueError, Result};
use crate::index::next_index;
use crate::models::{
    FlowStreamLogEntry, MediaItem, PlayerQueue, QueueItem, QueueOption, RepeatMode,
};
use crate::providers::StreamRequest;
use crate::queue_service::{LoadOptions, QueueService};
use crate::radio::RadioGenerator;
use crate::registry::{ItemKey, QueueRegistry, find_item};
use crate::resolve::MediaResolver;
use crate::state::HubState;
use crate::throttle::interactive;

/// Title sent to players for the continuous flow stream.
const FLOW_STREAM_TITLE: &str = "Queue Hub";
/// Resume positions at or below this many seconds restart the item.
const MIN_RESUME_POSITION_SECS: f64 = 10.0;
/// Maximum depth when following player sync/group links.
const MAX_ACTIVE_QUEUE_DEPTH: usize = 5;

/// Requested media: a catalog uri or an already resolved item.
#[derive(Clone, Debug, PartialEq)]
pub enum MediaRef {
    Uri(String),
    Item(MediaItem),
}

impl From<&str> for MediaRef {
    fn from(uri: &str) -> Self {
        MediaRef::Uri(uri.to_string())
    }
}

impl From<MediaItem> for MediaRef {
    fn from(item: MediaItem) -> Self {
        MediaRef::Item(item)
    }
}

#[derive(Clone)]
pub struct PlaybackManager {
    state: HubState,
    queues: QueueService,
    resolver: MediaResolver,
    radio: RadioGenerator,
}

impl PlaybackManager {
    /// Create a playback manager over the shared hub state.
    pub fn new(state: HubState) -> Self {
        let queues = QueueService::new(state.registry.clone(), state.events.clone());
        let resolver = MediaResolver::new(
            state.catalog.clone(),
            state.throttler.clone(),
            state.config.clone(),
            state.scheduler.clone(),
        );
        let radio = RadioGenerator::new(state.catalog.clone(), state.throttler.clone());
        Self {
            state,
            queues,
            resolver,
            radio,
        }
    }

    pub fn state(&self) -> &HubState {
        &self.state
    }

    pub fn queue_service(&self) -> &QueueService {
        &self.queues
    }

    fn registry(&self) -> &Arc<QueueRegistry> {
        &self.state.registry
    }

    fn queue(&self, queue_id: &str) -> Result<PlayerQueue> {
        self.registry()
            .get(queue_id)
            .ok_or_else(|| QueueError::unavailable(queue_id))
    }

    /// All registered queues.
    pub fn list_queues(&self) -> Vec<PlayerQueue> {
        self.registry().all()
    }

    pub fn get_queue(&self, queue_id: &str) -> Option<PlayerQueue> {
        self.registry().get(queue_id)
    }

    pub fn get_items(&self, queue_id: &str, limit: usize, offset: usize) -> Vec<QueueItem> {
        self.registry().items_page(queue_id, limit, offset)
    }

    /// Queue currently feeding a player, following sync and group links.
    pub fn get_active_queue(&self, player_id: &str) -> Option<PlayerQueue> {
        let queue_id = self.active_queue_id(player_id, 0)?;
        self.registry().get(&queue_id)
    }

    fn active_queue_id(&self, player_id: &str, depth: usize) -> Option<String> {
        let own = || {
            self.registry()
                .contains(player_id)
                .then(|| player_id.to_string())
        };
        let Some(player) = self.state.players.get(player_id) else {
            return own();
        };
        if depth < MAX_ACTIVE_QUEUE_DEPTH {
            if let Some(leader) = player.synced_to.as_deref().filter(|id| *id != player_id) {
                return self.active_queue_id(leader, depth + 1);
            }
            if let Some(group) = player.active_group.as_deref().filter(|id| *id != player_id) {
                return self.active_queue_id(group, depth + 1);
            }
        }
        player
            .active_source
            .filter(|source| self.registry().contains(source))
            .or_else(own)
    }

    pub fn set_shuffle(&self, queue_id: &str, enabled: bool) -> Result<()> {
        self.queues.set_shuffle(queue_id, enabled)
    }

    pub fn set_repeat(&self, queue_id: &str, mode: RepeatMode) -> Result<()> {
        self.queues.set_repeat(queue_id, mode)
    }

    /// Toggle "don't stop the music"; seeds radio right away when the queue is about to run out.
    pub fn set_dont_stop_the_music(&self, queue_id: &str, enabled: bool) -> Result<()> {
        if enabled && !self.state.catalog.supports_similar_tracks() {
            return Err(QueueError::UnsupportedFeature(
                "don't stop the music is not supported by any of the available sources".to_string(),
            ));
        }
        let queue = self
            .registry()
            .update_queue(queue_id, |queue| {
                queue.dont_stop_the_music_enabled = enabled;
                queue.clone()
            })?;
        self.queues.signal_update(queue_id, false);

        let about_to_end = queue.items_remaining().is_some_and(|left| left <= 1);
        if enabled && !queue.enqueued_media_items.is_empty() && about_to_end {
            self.registry().update_queue(queue_id, |queue| {
                queue.radio_source = queue.enqueued_media_items.iter().cloned().collect();
            })?;
            self.schedule_radio_fill(queue_id);
        }
        Ok(())
    }

    /// Schedule a (debounced) radio refill for a queue.
    pub(crate) fn schedule_radio_fill(&self, queue_id: &str) {
        let manager = self.clone();
        let queue_id = queue_id.to_string();
        self.state.scheduler.call_later(
            format!("fill_radio_tracks_{queue_id}"),
            self.state.timings.radio_fill_delay,
            async move { manager.fill_radio_tracks(&queue_id).await },
        );
    }

    /// Play (or enqueue) media on a queue.
    ///
    /// Unresolvable references are logged and skipped. Fails with `NotFound`
    /// when nothing playable remains.
    pub async fn play_media(
        &self,
        queue_id: &str,
        media: Vec<MediaRef>,
        option: Option<QueueOption>,
        radio_mode: bool,
        start_item: Option<&str>,
    ) -> Result<()> {
        interactive(self.play_media_inner(queue_id, media, option, radio_mode, start_item)).await
    }

    async fn play_media_inner(
        &self,
        queue_id: &str,
        media: Vec<MediaRef>,
        mut option: Option<QueueOption>,
        radio_mode: bool,
        start_item: Option<&str>,
    ) -> Result<()> {
        let queue = self.queue(queue_id)?;
        let player = self
            .state
            .players
            .get(queue_id)
            .ok_or_else(|| QueueError::unavailable(queue_id))?;
        if player.announcement_in_progress {
            tracing::warn!(queue_id = %queue_id, "ignore queue command: an announcement is in progress");
            return Ok(());
        }

        // a finished queue starts over; index 0 never counts as finished
        let items_len = self.registry().items(queue_id).len();
        if queue.state == PlayerState::Idle
            && queue
                .current_index
                .is_some_and(|index| index > 0 && index + 1 >= items_len)
        {
            self.registry().update(queue_id, |queue, items| {
                queue.current_index = None;
                queue.current_item = None;
                items.clear();
            })?;
        }
        if option == Some(QueueOption::Replace) {
            self.clear(queue_id)?;
        }
        let appending = matches!(option, Some(QueueOption::Add | QueueOption::Next));
        if !appending {
            self.registry()
                .update_queue(queue_id, |queue| queue.enqueued_media_items.clear())?;
        }

        let mut media_items: Vec<MediaItem> = Vec::new();
        let mut radio_source: Vec<MediaItem> = Vec::new();
        for reference in media {
            let item = match reference {
                MediaRef::Uri(uri) => match self.resolver.item_by_uri(&uri).await {
                    Ok(item) => item,
                    Err(err) => {
                        tracing::warn!(queue_id = %queue_id, uri = %uri, error = %err, "skipping media");
                        continue;
                    }
                },
                MediaRef::Item(item) => item,
            };
            if item.is_radio_seed_kind() {
                let remembered = item.clone();
                self.registry()
                    .update_queue(queue_id, |queue| queue.remember_enqueued(remembered))?;
            }
            if option.is_none() {
                let default_option = self.state.config.default_enqueue_option(item.media_type());
                if default_option == QueueOption::Replace {
                    self.clear(queue_id)?;
                }
                option = Some(default_option);
            }
            if radio_mode {
                radio_source.push(item);
                continue;
            }
            let uri = item.uri.clone();
            match self.resolver.expand(item, start_item).await {
                Ok(expanded) => media_items.extend(expanded),
                Err(err) => {
                    tracing::warn!(queue_id = %queue_id, uri = %uri, error = %err, "skipping media");
                }
            }
        }

        let option = option.unwrap_or(QueueOption::Play);
        let replace_radio = !matches!(option, QueueOption::Add | QueueOption::Next);
        let queue = self.registry().update_queue(queue_id, |queue| {
            if replace_radio {
                queue.radio_source = radio_source;
            } else {
                queue.radio_source.extend(radio_source);
            }
            queue.clone()
        })?;
        if radio_mode {
            media_items = self
                .radio
                .generate(queue_id, &queue.radio_source, true)
                .await?;
        }

        let queue_items: Vec<QueueItem> = media_items
            .into_iter()
            .filter(|item| item.available)
            .map(|item| QueueItem::from_media_item(queue_id, item))
            .collect();
        if queue_items.is_empty() {
            return Err(QueueError::NotFound("no playable items found".to_string()));
        }

        let (queue, current) = self
            .registry()
            .snapshot(queue_id)
            .ok_or_else(|| QueueError::unavailable(queue_id))?;
        let insert_at = queue.insert_index(!current.is_empty());
        // radio batches come in an order worth keeping
        let shuffle = queue.shuffle_enabled && queue_items.len() > 1 && !radio_mode;

        match option {
            QueueOption::Replace => {
                self.queues
                    .load(queue_id, queue_items, LoadOptions::replace().shuffle(shuffle))?;
                self.play_index(queue_id, ItemKey::Index(0), 0, false, false)
                    .await
            }
            QueueOption::Next => self
                .queues
                .load(queue_id, queue_items, LoadOptions::at(insert_at).shuffle(shuffle)),
            QueueOption::ReplaceNext => self.queues.load(
                queue_id,
                queue_items,
                LoadOptions::at(insert_at)
                    .keep_remaining(false)
                    .shuffle(shuffle),
            ),
            QueueOption::Play => {
                self.queues
                    .load(queue_id, queue_items, LoadOptions::at(insert_at).shuffle(shuffle))?;
                let len = self.registry().items(queue_id).len();
                let index = insert_at.min(len.saturating_sub(1));
                self.play_index(queue_id, ItemKey::Index(index), 0, false, false)
                    .await
            }
            QueueOption::Add => {
                let added = queue_items.len();
                let at = if queue.shuffle_enabled {
                    insert_at
                } else {
                    current.len()
                };
                self.queues.load(
                    queue_id,
                    queue_items,
                    LoadOptions::at(at).shuffle(queue.shuffle_enabled),
                )?;
                if queue.current_index.is_none() {
                    let first = self.registry().get_item(queue_id, 0);
                    self.registry().update_queue(queue_id, |queue| {
                        queue.current_index = Some(0);
                        queue.current_item = first;
                    })?;
                    tracing::debug!(queue_id = %queue_id, added, "marked first added item as current");
                    self.queues.signal_update(queue_id, false);
                }
                Ok(())
            }
        }
    }

    /// Move an upcoming item; see [`QueueService::move_item`].
    pub fn move_item(&self, queue_id: &str, queue_item_id: &str, shift: i64) -> Result<()> {
        self.queues.move_item(queue_id, queue_item_id, shift)
    }

    pub fn delete_item(&self, queue_id: &str, key: ItemKey<'_>) -> Result<()> {
        self.queues.delete_item(queue_id, key)
    }

    /// Clear all items; a queue that was not idle is stopped in the background.
    pub fn clear(&self, queue_id: &str) -> Result<()> {
        let prev_state = self.queues.clear_items(queue_id)?;
        if prev_state != PlayerState::Idle {
            let manager = self.clone();
            let queue_id = queue_id.to_string();
            self.state
                .scheduler
                .spawn("stop", async move { manager.stop(&queue_id).await });
        }
        Ok(())
    }

    /// Stop playback, remembering the position for a later resume.
    pub async fn stop(&self, queue_id: &str) -> Result<()> {
        self.registry().update_queue(queue_id, |queue| {
            if queue.active {
                queue.resume_pos = queue.corrected_elapsed_time() as u32;
            }
        })?;
        self.state.players.cmd_stop(queue_id).await
    }

    /// Unpause a paused queue, otherwise resume it.
    pub async fn play(&self, queue_id: &str) -> Result<()> {
        let player = self
            .state
            .players
            .get(queue_id)
            .ok_or_else(|| QueueError::unavailable(queue_id))?;
        let queue = self.queue(queue_id)?;
        if queue.active && player.state == Some(PlayerState::Paused) {
            return self.state.players.cmd_play(queue_id).await;
        }
        self.resume(queue_id, None).await
    }

    pub async fn pause(&self, queue_id: &str) -> Result<()> {
        self.registry().update_queue(queue_id, |queue| {
            queue.resume_pos = queue.corrected_elapsed_time() as u32;
        })?;
        self.state.players.cmd_pause(queue_id).await
    }

    pub async fn play_pause(&self, queue_id: &str) -> Result<()> {
        if self.queue(queue_id)?.state == PlayerState::Playing {
            return self.pause(queue_id).await;
        }
        self.play(queue_id).await
    }

    /// Skip to the next playable item (debounced); unplayable items are skipped.
    pub async fn next(&self, queue_id: &str) -> Result<()> {
        let Some(queue) = self.registry().get(queue_id).filter(|q| q.active) else {
            return Ok(());
        };
        let len = self.registry().items(queue_id).len();
        let mut cursor = queue.current_index;
        for _ in 0..len {
            let Some(index) = next_index(len, queue.repeat_mode, cursor, true, true) else {
                break;
            };
            match self
                .play_index(queue_id, ItemKey::Index(index), 0, false, true)
                .await
            {
                Ok(()) => break,
                Err(err) if err.is_not_found() => {
                    tracing::warn!(
                        queue_id = %queue_id,
                        index,
                        error = %err,
                        "failed to fetch next track, trying next item"
                    );
                    cursor = Some(index);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    pub async fn previous(&self, queue_id: &str) -> Result<()> {
        let Some(queue) = self.registry().get(queue_id).filter(|q| q.active) else {
            return Ok(());
        };
        let Some(current_index) = queue.current_index else {
            return Ok(());
        };
        self.play_index(
            queue_id,
            ItemKey::Index(current_index.saturating_sub(1)),
            0,
            false,
            true,
        )
        .await
    }

    /// Seek relative to the current position (negative skips back).
    pub async fn skip(&self, queue_id: &str, seconds: i64) -> Result<()> {
        let Some(queue) = self.registry().get(queue_id).filter(|q| q.active) else {
            return Ok(());
        };
        self.seek(queue_id, queue.elapsed_time as i64 + seconds).await
    }

    /// Restart the current item at `position` seconds.
    pub async fn seek(&self, queue_id: &str, position: i64) -> Result<()> {
        let Some(queue) = self.registry().get(queue_id) else {
            return Ok(());
        };
        let Some(current_item) = queue.current_item else {
            return Err(QueueError::InvalidCommand(format!(
                "queue {} has no item(s) loaded",
                queue.display_name
            )));
        };
        let duration = match current_item.duration {
            Some(duration) if duration > 0 => duration,
            _ => {
                return Err(QueueError::InvalidCommand(
                    "can not seek items without duration".to_string(),
                ));
            }
        };
        let position = position.max(0);
        if position > i64::from(duration) {
            return Err(QueueError::InvalidCommand(
                "can not seek outside of duration range".to_string(),
            ));
        }
        self.play_index(
            queue_id,
            ItemKey::Id(&current_item.queue_item_id),
            position as u32,
            false,
            false,
        )
        .await
    }

    /// Resume from the stored position, the current item or the first item.
    pub async fn resume(&self, queue_id: &str, fade_in: Option<bool>) -> Result<()> {
        let (queue, items) = self
            .registry()
            .snapshot(queue_id)
            .ok_or_else(|| QueueError::unavailable(queue_id))?;
        let mut resume_pos = if queue.state == PlayerState::Playing {
            queue.corrected_elapsed_time()
        } else {
            f64::from(queue.resume_pos)
        };
        let mut resume_item = queue.current_item.clone();
        if resume_item.is_none() && !items.is_empty() {
            resume_item = items.get(queue.current_index.unwrap_or(0)).cloned();
            resume_pos = 0.0;
        }
        let Some(resume_item) = resume_item else {
            return Err(QueueError::QueueEmpty(format!(
                "resume requested but queue {} is empty",
                queue.display_name
            )));
        };

        if resume_pos <= MIN_RESUME_POSITION_SECS {
            resume_pos = 0.0;
        }
        let powered = self
            .state
            .players
            .get(queue_id)
            .is_some_and(|player| player.powered);
        let fade_in = fade_in.unwrap_or(!powered && resume_pos > 0.0);
        if resume_item.media_type() == MediaType::Radio {
            // live radio can not seek
            resume_pos = 0.0;
        }
        self.play_index(
            queue_id,
            ItemKey::Id(&resume_item.queue_item_id),
            resume_pos as u32,
            fade_in,
            false,
        )
        .await
    }

    /// Load the item at `key` and dispatch it to the player.
    ///
    /// Stream details are fetched before the play command is scheduled so an
    /// unplayable item fails here. The dispatch is keyed per queue so rapid
    /// repeated commands only send the last one.
    pub async fn play_index(
        &self,
        queue_id: &str,
        key: ItemKey<'_>,
        seek_position: u32,
        fade_in: bool,
        debounce: bool,
    ) -> Result<()> {
        interactive(self.play_index_inner(queue_id, key, seek_position, fade_in, debounce)).await
    }

    async fn play_index_inner(
        &self,
        queue_id: &str,
        key: ItemKey<'_>,
        mut seek_position: u32,
        fade_in: bool,
        debounce: bool,
    ) -> Result<()> {
        let (queue, items) = self
            .registry()
            .snapshot(queue_id)
            .ok_or_else(|| QueueError::unavailable(queue_id))?;
        let index = match key {
            ItemKey::Index(index) => index,
            ItemKey::Id(id) => items
                .iter()
                .position(|item| item.queue_item_id == id)
                .ok_or_else(|| QueueError::NotFound(format!("unknown queue item {id}")))?,
        };
        let queue_item = find_item(&items, ItemKey::Index(index))
            .cloned()
            .ok_or_else(|| QueueError::NotFound(format!("unknown queue index {index}")))?;

        let flow_mode = self.state.config.flow_mode(queue_id);
        let prior_state = queue.state;
        self.registry().update_queue(queue_id, |queue| {
            queue.resume_pos = 0;
            queue.current_index = Some(index);
            queue.index_in_buffer = Some(index);
            queue.flow_mode_stream_log.clear();
            queue.flow_mode = flow_mode;
            queue.current_item = Some(queue_item.clone());
            queue.next_track_enqueued = None;
            queue.state = PlayerState::Buffering;
        })?;

        if seek_position == 0 {
            if let Some(resume_ms) = queue_item
                .media_item
                .as_ref()
                .and_then(|media| media.resume_position_ms())
            {
                seek_position = (resume_ms.saturating_sub(500) / 1000) as u32;
            }
        }

        let following = next_index(items.len(), queue.repeat_mode, Some(index), false, false);
        let loaded = match self
            .load_item(queue_id, &queue_item, following, true, seek_position, fade_in)
            .await
        {
            Ok(loaded) => loaded,
            Err(err) => {
                self.registry()
                    .update_queue(queue_id, |queue| restore_state(queue, prior_state))?;
                if err.is_not_found() {
                    self.registry().update_item(
                        queue_id,
                        &queue_item.queue_item_id,
                        QueueItem::mark_unavailable,
                    )?;
                }
                return Err(err);
            }
        };

        self.registry().update_queue(queue_id, |queue| {
            restore_state(queue, prior_state);
            queue.current_item = Some(loaded.clone());
        })?;

        let media = self.player_media_from_queue_item(&loaded, flow_mode);
        let delay = if debounce {
            self.state.timings.play_debounce
        } else {
            self.state.timings.play_delay
        };
        let players = self.state.players.clone();
        let player_id = queue_id.to_string();
        self.state.scheduler.call_later(
            format!("play_media_{queue_id}"),
            delay,
            async move { players.play_media(&player_id, media).await },
        );
        self.queues.signal_update(queue_id, false);
        Ok(())
    }

    /// Move a queue with its settings and items to another player.
    pub async fn transfer(
        &self,
        source_queue_id: &str,
        target_queue_id: &str,
        auto_play: Option<bool>,
    ) -> Result<()> {
        let source = self.queue(source_queue_id)?;
        self.queue(target_queue_id)?;
        let auto_play = auto_play.unwrap_or(source.state == PlayerState::Playing);

        if let Some(target_player) = self.state.players.get(target_queue_id) {
            if let Some(group) = target_player
                .active_group
                .clone()
                .or(target_player.synced_to.clone())
            {
                // playback moves out of a group: dissolve it first
                self.state.players.cmd_power(&group, false).await?;
                tokio::time::sleep(self.state.timings.group_dissolve_delay).await;
            }
        }

        let source_items: Vec<QueueItem> = self
            .registry()
            .items(source_queue_id)
            .iter()
            .cloned()
            .map(|mut item| {
                item.queue_id = target_queue_id.to_string();
                item
            })
            .collect();
        self.registry().update_queue(target_queue_id, |target| {
            target.repeat_mode = source.repeat_mode;
            target.shuffle_enabled = source.shuffle_enabled;
            target.dont_stop_the_music_enabled = source.dont_stop_the_music_enabled;
            target.radio_source = source.radio_source.clone();
            target.enqueued_media_items = source.enqueued_media_items.clone();
            target.resume_pos = source.elapsed_time as u32;
            target.current_index = source.current_index;
            if let Some(mut item) = source.current_item.clone() {
                item.queue_id = target_queue_id.to_string();
                target.current_item = Some(item);
            }
        })?;
        self.clear(source_queue_id)?;
        self.queues
            .load(target_queue_id, source_items, LoadOptions::replace())?;
        if auto_play {
            self.resume(target_queue_id, None).await?;
        }
        Ok(())
    }

    /// Fetch the next playable item after `current_item_id`, loading its stream details.
    ///
    /// Unplayable items are marked unavailable and skipped, at most once per
    /// queue item.
    pub async fn load_next_item(&self, queue_id: &str, current_item_id: &str) -> Result<QueueItem> {
        self.queue(queue_id)?;
        let cur_index = self
            .registry()
            .index_of(queue_id, current_item_id)
            .ok_or_else(|| QueueError::NotFound(format!("queue item {current_item_id}")))?;
        let attempts = self.registry().items(queue_id).len();
        for attempt in 0..attempts {
            let (queue, items) = self
                .registry()
                .snapshot(queue_id)
                .ok_or_else(|| QueueError::unavailable(queue_id))?;
            let Some(index) = next_index(
                items.len(),
                queue.repeat_mode,
                Some(cur_index + attempt),
                false,
                true,
            ) else {
                break;
            };
            let Some(queue_item) = items.get(index).cloned() else {
                break;
            };
            let following = next_index(items.len(), queue.repeat_mode, Some(index), false, false);
            match self
                .load_item(queue_id, &queue_item, following, false, 0, false)
                .await
            {
                Ok(loaded) => return Ok(loaded),
                Err(err) if err.is_not_found() => {
                    tracing::debug!(
                        queue_id = %queue_id,
                        uri = %queue_item.uri,
                        "skipping unplayable item"
                    );
                    self.registry().update_item(
                        queue_id,
                        &queue_item.queue_item_id,
                        QueueItem::mark_unavailable,
                    )?;
                }
                Err(err) => return Err(err),
            }
        }
        Err(QueueError::QueueEmpty(
            "no more (playable) tracks left in the queue".to_string(),
        ))
    }

    /// Resolve stream details for an item and store the result on the queue item.
    async fn load_item(
        &self,
        queue_id: &str,
        queue_item: &QueueItem,
        next_index: Option<usize>,
        is_start: bool,
        seek_position: u32,
        fade_in: bool,
    ) -> Result<QueueItem> {
        interactive(async {
            let items = self.registry().items(queue_id);
            let prefer_album_loudness = next_index
                .and_then(|index| items.get(index))
                .is_some_and(|next| {
                    let album = queue_item.media_item.as_ref().and_then(|m| m.album());
                    let next_album = next.media_item.as_ref().and_then(|m| m.album());
                    matches!((album, next_album), (Some(a), Some(b)) if a.item_id == b.item_id)
                });

            let mut item = queue_item.clone();
            if let Some(media) = item.media_item.clone() {
                match self.state.catalog.get_library_item(&media).await? {
                    Some(library_item) => item.media_item = Some(library_item),
                    None if media.image.is_none() => {
                        match self.state.catalog.get_item_by_uri(&item.uri).await {
                            Ok(full) => item.media_item = Some(full),
                            Err(err) => {
                                tracing::debug!(uri = %item.uri, error = %err, "keeping queued media item");
                            }
                        }
                    }
                    None => {}
                }
            }

            let mut details = self
                .state
                .streams
                .get_stream_details(
                    &item,
                    StreamRequest {
                        seek_position,
                        fade_in,
                        prefer_album_loudness,
                    },
                )
                .await?;
            if self.state.config.crossfade(queue_id) {
                details.strip_silence_end = true;
                details.strip_silence_begin = !is_start;
            }
            item.streamdetails = Some(details);

            let media_item = item.media_item.clone();
            let streamdetails = item.streamdetails.clone();
            self.registry()
                .update_item(queue_id, &item.queue_item_id, |stored| {
                    stored.media_item = media_item;
                    stored.streamdetails = streamdetails;
                })?;
            Ok::<_, QueueError>(item)
        })
        .await
    }

    /// Player notification: an item started loading into its buffer.
    pub fn track_loaded_in_buffer(&self, queue_id: &str, queue_item_id: &str) -> Result<()> {
        let index = self.registry().index_of(queue_id, queue_item_id);
        self.registry()
            .update_queue(queue_id, |queue| queue.index_in_buffer = index)?;
        self.queues.signal_update(queue_id, false);
        Ok(())
    }

    /// Append a streaming log entry; ignored outside flow mode.
    pub fn log_flow_stream(&self, queue_id: &str, entry: FlowStreamLogEntry) -> Result<()> {
        self.registry().update_queue(queue_id, |queue| {
            if queue.flow_mode {
                queue.flow_mode_stream_log.push(entry);
            }
        })
    }

    /// Append a batch of radio tracks to the end of the queue.
    pub async fn fill_radio_tracks(&self, queue_id: &str) -> Result<()> {
        tracing::debug!(queue_id = %queue_id, "filling radio tracks");
        let queue = self.queue(queue_id)?;
        let tracks = self
            .radio
            .generate(queue_id, &queue.radio_source, false)
            .await?;
        if tracks.is_empty() {
            return Ok(());
        }
        let queue_items: Vec<QueueItem> = tracks
            .into_iter()
            .filter(|track| track.available)
            .map(|track| QueueItem::from_media_item(queue_id, track))
            .collect();
        let len = self.registry().items(queue_id).len();
        self.queues.load(queue_id, queue_items, LoadOptions::at(len))
    }

    /// Load the next item and hand it to the player for gapless playback.
    ///
    /// Releases the queue's preload claim whether or not loading succeeded.
    pub(crate) async fn preload_next_item(&self, queue_id: &str, current_item_id: &str) -> Result<()> {
        let result = self.enqueue_next_item(queue_id, current_item_id).await;
        // the queue may be gone by now
        let _ = self
            .registry()
            .update_queue(queue_id, |queue| queue.preload_in_flight = None);
        result
    }

    async fn enqueue_next_item(&self, queue_id: &str, current_item_id: &str) -> Result<()> {
        let next_item = self.load_next_item(queue_id, current_item_id).await?;
        let queue = self.queue(queue_id)?;
        if queue.next_track_enqueued.as_deref() == Some(next_item.queue_item_id.as_str()) {
            return Ok(());
        }
        if !queue.flow_mode {
            let media = self.player_media_from_queue_item(&next_item, false);
            self.state.players.enqueue_next_media(queue_id, media).await?;
        }
        self.registry().update_queue(queue_id, |queue| {
            queue.next_track_enqueued = Some(next_item.queue_item_id.clone());
        })?;
        tracing::debug!(queue_id = %queue_id, item = %next_item.name, "preloaded next track");
        Ok(())
    }

    /// Stop every queue that is playing or paused.
    pub async fn shutdown(&self) {
        self.state.scheduler.cancel_all();
        for queue in self.registry().all() {
            if matches!(queue.state, PlayerState::Playing | PlayerState::Paused) {
                if let Err(err) = self.stop(&queue.queue_id).await {
                    tracing::warn!(queue_id = %queue.queue_id, error = %err, "failed to stop queue");
                }
            }
        }
    }

    /// Media payload sent to a player for a queue item.
    pub fn player_media_from_queue_item(&self, item: &QueueItem, flow_mode: bool) -> PlayerMedia {
        let uri = self.state.streams.resolve_stream_url(item, flow_mode);
        if flow_mode {
            return PlayerMedia {
                uri,
                media_type: MediaType::FlowStream,
                title: Some(FLOW_STREAM_TITLE.to_string()),
                artist: None,
                album: None,
                image_url: None,
                duration: item.duration,
                queue_id: Some(item.queue_id.clone()),
                queue_item_id: Some(item.queue_item_id.clone()),
            };
        }
        let media = item.media_item.as_ref();
        PlayerMedia {
            uri,
            media_type: item.media_type(),
            title: Some(media.map_or(&item.name, |m| &m.name).clone()),
            artist: media.and_then(|m| m.artist()).map(str::to_string),
            album: media.and_then(|m| m.album()).map(|album| album.name.clone()),
            image_url: item.image.clone(),
            duration: item.duration,
            queue_id: Some(item.queue_id.clone()),
            queue_item_id: Some(item.queue_item_id.clone()),
        }
    }
}

/// Leave the transient buffering state, unless a player report replaced it meanwhile.
fn restore_state(queue: &mut PlayerQueue, prior_state: PlayerState) {
    if queue.state == PlayerState::Buffering {
        queue.state = prior_state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use crate::models::{ItemRef, MediaKind};
    use crate::snapshot_store::{SnapshotStore, queue_base_key};
    use crate::test_support::{
        PlayerCommand, TestHub, player_report, queue_items, test_hub, track,
    };
    use std::time::Duration;

    fn setup(queue_ids: &[&str]) -> (TestHub, PlaybackManager) {
        setup_with(HubConfig::default(), queue_ids)
    }

    fn setup_with(config: HubConfig, queue_ids: &[&str]) -> (TestHub, PlaybackManager) {
        let hub = test_hub(config);
        for id in queue_ids {
            hub.players.set_report(player_report(id));
            hub.state.registry.register(id, id, true);
        }
        let manager = PlaybackManager::new(hub.state.clone());
        (hub, manager)
    }

    fn load(manager: &PlaybackManager, ids: &[&str]) -> Vec<QueueItem> {
        manager
            .queue_service()
            .load("den", queue_items("den", ids), LoadOptions::default())
            .unwrap();
        manager.registry().items("den").as_ref().clone()
    }

    fn activate(manager: &PlaybackManager, current_index: usize) {
        let current = manager.registry().get_item("den", current_index);
        manager
            .registry()
            .update_queue("den", |q| {
                q.active = true;
                q.current_index = Some(current_index);
                q.current_item = current;
            })
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn replace_drops_existing_items_and_dispatches_after_delay() {
        let (hub, manager) = setup(&["den"]);
        load(&manager, &["a", "b", "c"]);
        let replacement = track("x", 200);
        hub.catalog.add_item(replacement.clone());

        manager
            .play_media("den", vec![replacement.uri.as_str().into()], Some(QueueOption::Replace), false, None)
            .await
            .unwrap();

        let items = manager.registry().items("den");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].uri, replacement.uri);
        let queue = manager.get_queue("den").unwrap();
        assert_eq!(queue.current_index, Some(0));
        assert_eq!(queue.state, PlayerState::Idle);
        assert!(hub.players.played_media().is_empty());

        tokio::time::sleep(Duration::from_millis(150)).await;
        let played = hub.players.played_media();
        assert_eq!(played.len(), 1);
        assert_eq!(played[0].queue_item_id.as_deref(), Some(items[0].queue_item_id.as_str()));
        assert_eq!(played[0].uri, format!("stream://den/{}.flac", items[0].queue_item_id));
        assert_eq!(played[0].title.as_deref(), Some("Track x"));
    }

    #[tokio::test(start_paused = true)]
    async fn unresolvable_media_is_skipped() {
        let (hub, manager) = setup(&["den"]);
        let good = track("good", 200);
        hub.catalog.add_item(good.clone());

        manager
            .play_media(
                "den",
                vec!["test://track/missing".into(), good.uri.as_str().into()],
                Some(QueueOption::Add),
                false,
                None,
            )
            .await
            .unwrap();
        assert_eq!(manager.get_items("den", 10, 0).len(), 1);

        let err = manager
            .play_media("den", vec!["test://track/missing".into()], Some(QueueOption::Add), false, None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn add_marks_first_item_current_without_playing() {
        let (hub, manager) = setup(&["den"]);
        let media: Vec<MediaRef> = ["a", "b"].iter().map(|id| track(id, 100).into()).collect();

        manager
            .play_media("den", media, Some(QueueOption::Add), false, None)
            .await
            .unwrap();

        let queue = manager.get_queue("den").unwrap();
        assert_eq!(queue.current_index, Some(0));
        assert_eq!(queue.current_item.map(|i| i.uri), Some("test://track/a".to_string()));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(hub.players.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn enqueued_media_history_is_capped() {
        let (_hub, manager) = setup(&["den"]);
        for n in 1..=12 {
            manager
                .play_media(
                    "den",
                    vec![track(&format!("t{n}"), 100).into()],
                    Some(QueueOption::Add),
                    false,
                    None,
                )
                .await
                .unwrap();
        }
        let queue = manager.get_queue("den").unwrap();
        assert_eq!(queue.items, 12);
        assert_eq!(queue.enqueued_media_items.len(), 10);
        assert_eq!(queue.enqueued_media_items[0].item_id, "t3");
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_next_commands_only_dispatch_the_last_item() {
        let (hub, manager) = setup(&["den"]);
        let items = load(&manager, &["a", "b", "c", "d"]);
        activate(&manager, 0);

        for _ in 0..3 {
            manager.next("den").await.unwrap();
        }
        assert_eq!(manager.get_queue("den").unwrap().current_index, Some(3));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let played = hub.players.played_media();
        assert_eq!(played.len(), 1);
        assert_eq!(played[0].queue_item_id.as_deref(), Some(items[3].queue_item_id.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn next_skips_unplayable_items() {
        let (hub, manager) = setup(&["den"]);
        let items = load(&manager, &["a", "b", "c"]);
        activate(&manager, 0);
        hub.streams.set_unplayable(&items[1].uri);

        manager.next("den").await.unwrap();

        let queue = manager.get_queue("den").unwrap();
        assert_eq!(queue.current_index, Some(2));
        assert!(!manager.registry().items("den")[1].available);
        assert_eq!(queue.state, PlayerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn next_and_previous_ignore_inactive_queues() {
        let (hub, manager) = setup(&["den"]);
        load(&manager, &["a", "b"]);
        manager.next("den").await.unwrap();
        manager.previous("den").await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(hub.players.commands().is_empty());
        assert_eq!(manager.get_queue("den").unwrap().current_index, None);
    }

    #[tokio::test(start_paused = true)]
    async fn seek_validates_position() {
        let (hub, manager) = setup(&["den"]);
        let err = manager.seek("den", 10).await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidCommand(_)));

        load(&manager, &["a"]);
        activate(&manager, 0);
        let err = manager.seek("den", 500).await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidCommand(_)));

        manager.seek("den", 60).await.unwrap();
        manager.seek("den", -5).await.unwrap();
        let seeks: Vec<u32> = hub.streams.requests().iter().map(|(_, r)| r.seek_position).collect();
        assert_eq!(seeks, [60, 0]);

        manager
            .registry()
            .update_queue("den", |q| {
                if let Some(item) = q.current_item.as_mut() {
                    item.duration = None;
                }
            })
            .unwrap();
        let err = manager.seek("den", 10).await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidCommand(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn resume_uses_stored_position_above_threshold() {
        let (hub, manager) = setup(&["den"]);
        let err = manager.resume("den", None).await.unwrap_err();
        assert!(matches!(err, QueueError::QueueEmpty(_)));

        let items = load(&manager, &["a", "b"]);
        manager.resume("den", None).await.unwrap();
        assert_eq!(manager.get_queue("den").unwrap().current_index, Some(0));

        let second = items[1].clone();
        manager
            .registry()
            .update_queue("den", |q| {
                q.current_item = Some(second);
                q.resume_pos = 42;
            })
            .unwrap();
        manager.resume("den", None).await.unwrap();
        assert_eq!(manager.get_queue("den").unwrap().current_index, Some(1));

        manager
            .registry()
            .update_queue("den", |q| q.resume_pos = 5)
            .unwrap();
        manager.resume("den", None).await.unwrap();

        let requests = hub.streams.requests();
        let seeks: Vec<u32> = requests.iter().map(|(_, r)| r.seek_position).collect();
        assert_eq!(seeks, [0, 42, 0]);
        assert!(requests.iter().all(|(_, r)| !r.fade_in));
    }

    #[tokio::test(start_paused = true)]
    async fn resume_point_of_media_is_used_when_no_seek_is_given() {
        let (hub, manager) = setup(&["den"]);
        let episode = MediaItem {
            kind: crate::models::MediaKind::PodcastEpisode {
                podcast: None,
                resume_position_ms: Some(90_700),
                fully_played: false,
            },
            ..track("ep", 1800)
        };
        manager
            .queue_service()
            .load("den", vec![QueueItem::from_media_item("den", episode)], LoadOptions::default())
            .unwrap();

        manager
            .play_index("den", ItemKey::Index(0), 0, false, false)
            .await
            .unwrap();
        assert_eq!(hub.streams.requests()[0].1.seek_position, 90);
    }

    #[tokio::test(start_paused = true)]
    async fn unplayable_item_restores_state_and_fails() {
        let (hub, manager) = setup(&["den"]);
        let items = load(&manager, &["a"]);
        hub.streams.set_unplayable(&items[0].uri);

        let err = manager
            .play_index("den", ItemKey::Index(0), 0, false, false)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(manager.get_queue("den").unwrap().state, PlayerState::Idle);
        assert!(manager.play_index("den", ItemKey::Index(9), 0, false, false).await.unwrap_err().is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn load_next_item_skips_unplayable_items() {
        let (hub, manager) = setup(&["den"]);
        let items = load(&manager, &["a", "b", "c"]);
        hub.streams.set_unplayable(&items[1].uri);

        let next = manager
            .load_next_item("den", &items[0].queue_item_id)
            .await
            .unwrap();
        assert_eq!(next.queue_item_id, items[2].queue_item_id);
        assert!(next.streamdetails.is_some());
        assert!(!manager.registry().items("den")[1].available);

        let err = manager
            .load_next_item("den", &items[2].queue_item_id)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::QueueEmpty(_)));
    }

    fn album_track(id: &str, album: &str) -> MediaItem {
        MediaItem {
            kind: MediaKind::Track {
                album: Some(ItemRef {
                    item_id: album.to_string(),
                    provider: "test".to_string(),
                    name: album.to_string(),
                    uri: format!("test://album/{album}"),
                }),
                artist: None,
            },
            ..track(id, 180)
        }
    }

    fn load_media(manager: &PlaybackManager, media: Vec<MediaItem>) -> Vec<QueueItem> {
        let batch = media
            .into_iter()
            .map(|media| QueueItem::from_media_item("den", media))
            .collect();
        manager
            .queue_service()
            .load("den", batch, LoadOptions::default())
            .unwrap();
        manager.registry().items("den").as_ref().clone()
    }

    #[tokio::test(start_paused = true)]
    async fn album_loudness_is_preferred_when_the_next_track_shares_the_album() {
        let (hub, manager) = setup(&["den"]);
        let items = load_media(
            &manager,
            vec![album_track("a", "one"), album_track("b", "one"), album_track("c", "two")],
        );

        manager
            .play_index("den", ItemKey::Index(0), 0, false, false)
            .await
            .unwrap();
        manager
            .load_next_item("den", &items[0].queue_item_id)
            .await
            .unwrap();

        let hints: Vec<(String, bool)> = hub
            .streams
            .requests()
            .into_iter()
            .map(|(item_id, request)| (item_id, request.prefer_album_loudness))
            .collect();
        assert_eq!(hints, [("a".to_string(), true), ("b".to_string(), false)]);
        let details = manager.registry().items("den")[0].streamdetails.clone().unwrap();
        assert!(!details.strip_silence_begin && !details.strip_silence_end);
    }

    #[tokio::test(start_paused = true)]
    async fn crossfade_strips_silence_except_before_the_first_track() {
        let config = HubConfig::from_toml_str("[players.den]\ncrossfade = true\n").unwrap();
        let (_hub, manager) = setup_with(config, &["den"]);
        let items = load(&manager, &["a", "b"]);

        manager
            .play_index("den", ItemKey::Index(0), 0, false, false)
            .await
            .unwrap();
        let started = manager.get_queue("den").unwrap().current_item.unwrap();
        let started = started.streamdetails.unwrap();
        assert!(!started.strip_silence_begin);
        assert!(started.strip_silence_end);

        let next = manager
            .load_next_item("den", &items[0].queue_item_id)
            .await
            .unwrap();
        let next = next.streamdetails.unwrap();
        assert!(next.strip_silence_begin);
        assert!(next.strip_silence_end);
    }

    #[tokio::test(start_paused = true)]
    async fn loading_prefers_library_items_and_refreshes_missing_images() {
        let (hub, manager) = setup(&["den"]);
        let items = load(&manager, &["a", "b", "c"]);
        hub.catalog.set_library_item(MediaItem {
            name: "Library a".to_string(),
            image: Some("a.jpg".to_string()),
            ..track("a", 180)
        });
        hub.catalog.add_item(MediaItem {
            image: Some("b.jpg".to_string()),
            ..track("b", 180)
        });

        manager
            .play_index("den", ItemKey::Index(0), 0, false, false)
            .await
            .unwrap();
        let current = manager.get_queue("den").unwrap().current_item.unwrap();
        let media = current.media_item.unwrap();
        assert_eq!(media.name, "Library a");
        assert_eq!(media.image.as_deref(), Some("a.jpg"));

        let next = manager
            .load_next_item("den", &items[0].queue_item_id)
            .await
            .unwrap();
        assert_eq!(next.media_item.unwrap().image.as_deref(), Some("b.jpg"));

        // nothing in the catalog: the queued media is kept
        let last = manager
            .load_next_item("den", &items[1].queue_item_id)
            .await
            .unwrap();
        assert_eq!(last.media_item, items[2].media_item);

        let stored = manager.registry().items("den");
        assert_eq!(stored[0].media_item.as_ref().unwrap().name, "Library a");
        assert_eq!(stored[1].media_item.as_ref().unwrap().image.as_deref(), Some("b.jpg"));
    }

    #[tokio::test(start_paused = true)]
    async fn play_index_buffers_while_loading_and_keeps_a_newer_state() {
        let (hub, manager) = setup(&["den"]);
        load(&manager, &["a", "b"]);
        hub.streams.set_latency(Duration::from_secs(2));

        let loading = tokio::spawn({
            let manager = manager.clone();
            async move {
                manager
                    .play_index("den", ItemKey::Index(0), 0, false, false)
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(manager.get_queue("den").unwrap().state, PlayerState::Buffering);

        // a player report lands while the stream is still resolving
        manager
            .registry()
            .update_queue("den", |q| q.state = PlayerState::Playing)
            .unwrap();
        loading.await.unwrap().unwrap();
        assert_eq!(manager.get_queue("den").unwrap().state, PlayerState::Playing);

        manager
            .play_index("den", ItemKey::Index(1), 0, false, false)
            .await
            .unwrap();
        assert_eq!(manager.get_queue("den").unwrap().state, PlayerState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn queue_changes_are_written_to_the_snapshot_store() {
        let (hub, manager) = setup(&["den"]);
        let replacement = track("x", 200);
        hub.catalog.add_item(replacement.clone());

        manager
            .play_media("den", vec![replacement.uri.as_str().into()], Some(QueueOption::Replace), false, None)
            .await
            .unwrap();
        manager.set_repeat("den", RepeatMode::One).unwrap();

        let base_key = queue_base_key("den");
        let raw_items = hub.store.get(&base_key, "items").unwrap().unwrap();
        let stored: Vec<QueueItem> = serde_json::from_str(&raw_items).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].uri, replacement.uri);

        let raw_state = hub.store.get(&base_key, "state").unwrap().unwrap();
        let queue: PlayerQueue = serde_json::from_str(&raw_state).unwrap();
        assert_eq!(queue.repeat_mode, RepeatMode::One);
        assert_eq!(queue.current_index, Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn transfer_moves_items_and_settings() {
        let (hub, manager) = setup(&["den", "kitchen"]);
        let items = load(&manager, &["a", "b", "c"]);
        let current = items[1].clone();
        manager
            .registry()
            .update_queue("den", |q| {
                q.repeat_mode = RepeatMode::All;
                q.current_index = Some(1);
                q.current_item = Some(current);
                q.elapsed_time = 30.0;
            })
            .unwrap();
        hub.players.set_report(queue_hub_types::PlayerReport {
            active_group: Some("group1".to_string()),
            ..player_report("kitchen")
        });

        manager.transfer("den", "kitchen", Some(false)).await.unwrap();

        assert!(hub.players.commands().contains(&PlayerCommand::Power("group1".to_string(), false)));
        let target = manager.get_queue("kitchen").unwrap();
        assert_eq!(target.repeat_mode, RepeatMode::All);
        assert_eq!(target.resume_pos, 30);
        assert_eq!(target.current_index, Some(1));
        assert_eq!(target.current_item.map(|i| i.queue_id), Some("kitchen".to_string()));
        let moved = manager.registry().items("kitchen");
        assert_eq!(moved.len(), 3);
        assert!(moved.iter().all(|item| item.queue_id == "kitchen"));
        assert!(manager.registry().items("den").is_empty());
        assert!(hub.players.played_media().is_empty());
    }

    #[tokio::test]
    async fn transfer_requires_both_queues() {
        let (_hub, manager) = setup(&["den"]);
        let err = manager.transfer("den", "ghost", None).await.unwrap_err();
        assert!(matches!(err, QueueError::Unavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_and_pause_remember_position() {
        let (hub, manager) = setup(&["den"]);
        load(&manager, &["a"]);
        activate(&manager, 0);
        manager
            .registry()
            .update_queue("den", |q| q.elapsed_time = 75.0)
            .unwrap();

        manager.stop("den").await.unwrap();
        assert_eq!(manager.get_queue("den").unwrap().resume_pos, 75);
        manager.pause("den").await.unwrap();
        assert_eq!(
            hub.players.commands(),
            [PlayerCommand::Stop("den".to_string()), PlayerCommand::Pause("den".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn play_unpauses_a_paused_player() {
        let (hub, manager) = setup(&["den"]);
        load(&manager, &["a"]);
        activate(&manager, 0);
        hub.players.set_report(queue_hub_types::PlayerReport {
            state: Some(PlayerState::Paused),
            ..player_report("den")
        });
        manager.play("den").await.unwrap();
        assert_eq!(hub.players.commands(), [PlayerCommand::Play("den".to_string())]);
    }

    #[tokio::test]
    async fn dont_stop_the_music_requires_similar_tracks() {
        let (hub, manager) = setup(&["den"]);
        let err = manager.set_dont_stop_the_music("den", true).unwrap_err();
        assert!(matches!(err, QueueError::UnsupportedFeature(_)));

        hub.catalog.set_supports_similar(true);
        manager.set_dont_stop_the_music("den", true).unwrap();
        assert!(manager.get_queue("den").unwrap().dont_stop_the_music_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn radio_mode_replaces_seeds_and_fills_queue() {
        let (hub, manager) = setup(&["den"]);
        let seed = track("seed", 200);
        hub.catalog.set_radio_base_tracks(&seed.uri, vec![track("base1", 200)]);
        hub.catalog
            .set_default_similar((1..=4).map(|n| track(&format!("s{n}"), 200)).collect());

        manager
            .play_media("den", vec![seed.clone().into()], Some(QueueOption::Replace), true, None)
            .await
            .unwrap();

        let queue = manager.get_queue("den").unwrap();
        assert_eq!(queue.radio_source, [seed]);
        let items = manager.registry().items("den");
        assert_eq!(items[0].uri, "test://track/base1");
        assert_eq!(items.len(), 5);

        manager.fill_radio_tracks("den").await.unwrap();
        assert_eq!(manager.registry().items("den").len(), 9);
    }

    #[test]
    fn active_queue_follows_sync_leader() {
        let (hub, manager) = setup(&["den"]);
        hub.players.set_report(queue_hub_types::PlayerReport {
            synced_to: Some("den".to_string()),
            ..player_report("satellite")
        });
        assert_eq!(manager.get_active_queue("satellite").map(|q| q.queue_id), Some("den".to_string()));
        assert_eq!(manager.get_active_queue("den").map(|q| q.queue_id), Some("den".to_string()));
        assert!(manager.get_active_queue("nobody").is_none());
    }

    #[test]
    fn flow_mode_media_hides_item_metadata() {
        let (_hub, manager) = setup(&["den"]);
        let item = QueueItem::from_media_item("den", track("a", 100));
        let media = manager.player_media_from_queue_item(&item, true);
        assert_eq!(media.media_type, MediaType::FlowStream);
        assert_eq!(media.title.as_deref(), Some(FLOW_STREAM_TITLE));
        assert!(media.album.is_none());
        assert!(media.uri.contains("/flow/"));
    }
}
