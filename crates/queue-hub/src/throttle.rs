//! Request throttling for catalog traffic.
//!
//! Background work is spaced out by a minimum interval; tasks running a
//! user-initiated playback command are marked interactive and bypass it.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

tokio::task_local! {
    static INTERACTIVE: bool;
}

/// Run `fut` with the interactive flag set for the current task.
pub async fn interactive<F: Future>(fut: F) -> F::Output {
    if is_interactive() {
        return fut.await;
    }
    INTERACTIVE.scope(true, fut).await
}

/// Return true inside [`interactive`].
pub fn is_interactive() -> bool {
    INTERACTIVE.try_with(|flag| *flag).unwrap_or(false)
}

pub struct Throttler {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Throttler {
    /// Create a throttler; a zero interval disables throttling.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Wait for the next free slot unless the current task is interactive.
    pub async fn acquire(&self) {
        if self.min_interval.is_zero() || is_interactive() {
            return;
        }
        let mut next_slot = self.next_slot.lock().await;
        if let Some(at) = *next_slot {
            if at > Instant::now() {
                tokio::time::sleep_until(at).await;
            }
        }
        *next_slot = Some(Instant::now() + self.min_interval);
    }
}
