//! Error taxonomy for queue commands and background jobs.

use thiserror::Error;

/// Errors surfaced by queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Media (or the next track) could not be resolved or is unplayable.
    #[error("media not found: {0}")]
    NotFound(String),
    /// No playable items are left in the queue.
    #[error("queue is empty: {0}")]
    QueueEmpty(String),
    /// The target player or queue does not exist (anymore).
    #[error("player unavailable: {0}")]
    Unavailable(String),
    /// No source supports the requested feature (e.g. radio mode).
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
    /// The command is not valid for the current queue state.
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    /// Input data could not be resolved unambiguously.
    #[error("invalid data: {0}")]
    InvalidData(String),
    /// The item is already played or committed to the player buffer.
    #[error("item at index {index} is already played/buffered")]
    AlreadyBuffered { index: usize },
    /// Opaque failure of an external collaborator.
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl QueueError {
    pub(crate) fn unavailable(queue_id: &str) -> Self {
        QueueError::Unavailable(format!("queue {queue_id} is not available"))
    }

    /// Return true for errors that mark a single item as unplayable.
    pub fn is_not_found(&self) -> bool {
        matches!(self, QueueError::NotFound(_))
    }
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
