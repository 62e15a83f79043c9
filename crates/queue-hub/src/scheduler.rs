//! Keyed delayed-task scheduler.
//!
//! Scheduling a job under a key that is still waiting replaces the waiting
//! job. Once a job leaves its delay it runs to completion.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::error::Result;

struct PendingJob {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Clone, Default)]
pub struct TaskScheduler {
    pending: Arc<Mutex<HashMap<String, PendingJob>>>,
    generation: Arc<AtomicU64>,
}

fn lock(pending: &Mutex<HashMap<String, PendingJob>>) -> MutexGuard<'_, HashMap<String, PendingJob>> {
    pending.lock().unwrap_or_else(|err| err.into_inner())
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `job` after `delay`, superseding a job still waiting under `key`.
    pub fn call_later<F>(&self, key: impl Into<String>, delay: Duration, job: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let key = key.into();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let pending = self.pending.clone();
        let task_key = key.clone();

        // hold the map while spawning so the job cannot look itself up before it is inserted
        let mut jobs = lock(&self.pending);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut jobs = lock(&pending);
                match jobs.get(&task_key) {
                    Some(job) if job.generation == generation => {
                        jobs.remove(&task_key);
                    }
                    _ => return,
                }
            }
            tracing::debug!(job = %task_key, "running scheduled job");
            if let Err(err) = job.await {
                tracing::warn!(job = %task_key, error = %err, "scheduled job failed");
            }
        });
        if let Some(previous) = jobs.insert(key, PendingJob { generation, handle }) {
            previous.handle.abort();
        }
    }

    /// Run `job` now in the background, logging its failure.
    pub fn spawn<F>(&self, name: &'static str, job: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        tokio::spawn(async move {
            if let Err(err) = job.await {
                tracing::warn!(job = name, error = %err, "background job failed");
            }
        })
    }

    /// Cancel a waiting job; returns true when one was pending.
    pub fn cancel(&self, key: &str) -> bool {
        match lock(&self.pending).remove(key) {
            Some(job) => {
                job.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every waiting job scheduled for a queue (keys ending in `_<queue_id>`).
    pub fn cancel_queue(&self, queue_id: &str) -> usize {
        let suffix = format!("_{queue_id}");
        let mut jobs = lock(&self.pending);
        let keys: Vec<String> = jobs
            .keys()
            .filter(|key| key.ends_with(&suffix))
            .cloned()
            .collect();
        for key in &keys {
            if let Some(job) = jobs.remove(key) {
                job.handle.abort();
            }
        }
        keys.len()
    }

    /// Return true while a job waits under `key`.
    pub fn is_pending(&self, key: &str) -> bool {
        lock(&self.pending).contains_key(key)
    }

    /// Cancel everything that is still waiting.
    pub fn cancel_all(&self) {
        for (_, job) in lock(&self.pending).drain() {
            job.handle.abort();
        }
    }
}
