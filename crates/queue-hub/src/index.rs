//! Next-index resolution honouring repeat modes and unplayable items.

use crate::models::{QueueItem, RepeatMode};

/// Return the index that follows `cur_index` in a queue of `len` items.
///
/// `None` means there is nothing (more) to play.
pub fn next_index(
    len: usize,
    repeat_mode: RepeatMode,
    cur_index: Option<usize>,
    is_skip: bool,
    allow_repeat: bool,
) -> Option<usize> {
    let cur_index = cur_index?;
    if len == 0 {
        return None;
    }
    if repeat_mode == RepeatMode::One && !is_skip {
        return allow_repeat.then_some(cur_index);
    }
    if cur_index >= len - 1 {
        return (allow_repeat && repeat_mode == RepeatMode::All).then_some(0);
    }
    Some(cur_index + 1)
}

/// Return the index of the first playable item after `cur_index`.
///
/// Items marked unplayable are skipped. The walk is bounded by the list
/// length so a queue of only unplayable items (or repeat-one on one) ends.
pub fn next_playable_index(
    items: &[QueueItem],
    repeat_mode: RepeatMode,
    cur_index: Option<usize>,
) -> Option<usize> {
    let mut cursor = cur_index;
    for _ in 0..items.len() {
        let index = next_index(items.len(), repeat_mode, cursor, false, true)?;
        match items.get(index) {
            Some(item) if !item.is_unplayable() => return Some(index),
            Some(_) => cursor = Some(index),
            None => return None,
        }
    }
    None
}

/// Same as [`next_playable_index`], returning the item.
pub fn next_item(
    items: &[QueueItem],
    repeat_mode: RepeatMode,
    cur_index: Option<usize>,
) -> Option<&QueueItem> {
    next_playable_index(items, repeat_mode, cur_index).and_then(|index| items.get(index))
}
