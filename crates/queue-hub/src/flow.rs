//! Flow-mode position translation.
//!
//! In flow mode the player renders one continuous stream; the queue position
//! is recovered by walking the streaming log.

use crate::models::{FlowStreamLogEntry, QueueItem};

/// Fallback length of a log entry with neither streamed seconds nor duration.
const UNKNOWN_ENTRY_SECS: f64 = 3600.0 * 24.0 * 7.0;

fn effective_duration(entry: &FlowStreamLogEntry) -> f64 {
    // seconds_streamed may legitimately be 0 after a stream error
    match entry.seconds_streamed {
        Some(streamed) => streamed,
        None => entry
            .duration
            .map(f64::from)
            .unwrap_or(UNKNOWN_ENTRY_SECS),
    }
}

/// Map the cumulative elapsed seconds of a flow stream to `(index, track elapsed)`.
///
/// Without a current index the total elapsed time is returned unchanged. When
/// the log is exhausted the current index is kept with zero elapsed time.
pub fn flow_stream_position(
    current_index: Option<usize>,
    stream_log: &[FlowStreamLogEntry],
    items: &[QueueItem],
    total_elapsed: f64,
) -> (Option<usize>, f64) {
    let Some(current_index) = current_index else {
        return (None, total_elapsed);
    };
    let mut played = 0.0;
    for entry in stream_log {
        let duration = effective_duration(entry);
        if total_elapsed > played + duration {
            played += duration;
            continue;
        }
        let index = items
            .iter()
            .position(|item| item.queue_item_id == entry.queue_item_id);
        let seek_offset = index
            .and_then(|index| items[index].streamdetails.as_ref())
            .map(|details| f64::from(details.seek_position))
            .unwrap_or(0.0);
        return (
            index.or(Some(current_index)),
            total_elapsed + seek_offset - played,
        );
    }
    (Some(current_index), 0.0)
}
