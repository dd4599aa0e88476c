//! One-shot deferred jobs.
//!
//! A job is scheduled for an instant and runs on its own task, independent of
//! whoever scheduled it. There is no cancellation: once queued, a job fires.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use futures::future::BoxFuture;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

/// Deferred unit of work.
pub type DeferredJob = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

pub trait JobQueue: Send + Sync {
    /// Run `job` once, no earlier than `at`.
    fn schedule_at(&self, at: Instant, name: &'static str, job: DeferredJob);

    /// Number of jobs queued but not yet finished.
    fn pending(&self) -> usize;
}

/// Job queue backed by spawned tokio tasks.
#[derive(Debug, Clone, Default)]
pub struct TokioJobQueue {
    pending: Arc<AtomicUsize>,
}

impl TokioJobQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobQueue for TokioJobQueue {
    fn schedule_at(&self, at: Instant, name: &'static str, job: DeferredJob) {
        let pending = self.pending.clone();
        pending.fetch_add(1, Ordering::SeqCst);

        debug!(
            target = "purgekeeper::jobs",
            job = name,
            delay_ms = at.saturating_duration_since(Instant::now()).as_millis() as u64,
            "deferred job queued"
        );

        tokio::spawn(async move {
            sleep_until(at).await;
            job().await;
            pending.fetch_sub(1, Ordering::SeqCst);
            debug!(target = "purgekeeper::jobs", job = name, "deferred job finished");
        });
    }

    fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}
