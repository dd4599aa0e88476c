//! Debounced purge scheduling.
//!
//! Bursts of purge requests collapse into one deferred purge that fires once
//! the window has passed without a new request. The armed state lives in the
//! keyed store; while it exists, further requests only push its expiry out.
//!
//! The queued job follows the re-armed expiry: when it wakes and finds the state
//! still live, it moves itself to the new expiry instead of firing. Two requests
//! that race past an empty state may both queue a job; the duplicate purge is
//! harmless and accepted.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{error, info};

use super::jobs::JobQueue;
use super::orchestrator::{PurgeOrchestrator, PurgePath};
use super::store::KeyedStore;

pub const DEBOUNCE_STATE_KEY: &str = "purgekeeper_purge_scheduled";
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_secs(3);

const METRIC_DEBOUNCE_REARM: &str = "purgekeeper_debounce_rearm_total";
const DEFERRED_JOB_NAME: &str = "deferred_purge";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebounceState {
    pub scheduled: bool,
    /// Label of the most recent request in the burst.
    pub trigger: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// A new deferred purge was queued.
    Scheduled,
    /// An armed purge already existed; its window was extended.
    Rearmed,
}

#[derive(Clone)]
pub struct DebounceScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    store: Arc<dyn KeyedStore>,
    jobs: Arc<dyn JobQueue>,
    orchestrator: Arc<PurgeOrchestrator>,
    window: Duration,
}

impl DebounceScheduler {
    pub fn new(
        store: Arc<dyn KeyedStore>,
        jobs: Arc<dyn JobQueue>,
        orchestrator: Arc<PurgeOrchestrator>,
        window: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                store,
                jobs,
                orchestrator,
                window,
            }),
        }
    }

    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Whether a deferred purge is currently armed.
    pub fn is_armed(&self) -> bool {
        self.inner.current_state().is_some()
    }

    pub fn request_purge(&self, trigger: &str) -> ScheduleOutcome {
        let inner = &self.inner;
        let log = inner.orchestrator.log();
        let state = DebounceState {
            scheduled: true,
            trigger: trigger.to_string(),
        };
        let already_armed = inner.current_state().is_some_and(|state| state.scheduled);

        inner
            .store
            .set(DEBOUNCE_STATE_KEY, state_value(&state), inner.window);

        if already_armed {
            log.write(format!(
                "purge already scheduled, resetting timer ({trigger})."
            ));
            counter!(METRIC_DEBOUNCE_REARM).increment(1);
            return ScheduleOutcome::Rearmed;
        }

        log.write(format!(
            "scheduling purge in {}s ({trigger}).",
            inner.window.as_secs_f64()
        ));
        info!(
            target = "purgekeeper::scheduler",
            trigger,
            window_ms = inner.window.as_millis() as u64,
            "deferred purge scheduled"
        );
        SchedulerInner::enqueue(
            self.inner.clone(),
            Instant::now() + inner.window,
            trigger.to_string(),
        );
        ScheduleOutcome::Scheduled
    }
}

impl SchedulerInner {
    fn current_state(&self) -> Option<DebounceState> {
        let entry = self.store.get(DEBOUNCE_STATE_KEY)?;
        serde_json::from_value(entry.value).ok()
    }

    fn enqueue(inner: Arc<Self>, at: Instant, trigger: String) {
        let jobs = inner.jobs.clone();
        jobs.schedule_at(
            at,
            DEFERRED_JOB_NAME,
            Box::new(move || SchedulerInner::fire(inner, trigger).boxed()),
        );
    }

    async fn fire(inner: Arc<Self>, trigger: String) {
        if let Some(entry) = inner.store.get(DEBOUNCE_STATE_KEY) {
            let latest = serde_json::from_value::<DebounceState>(entry.value)
                .map(|state| state.trigger)
                .unwrap_or(trigger);
            inner
                .orchestrator
                .log()
                .write("purge timer was reset, deferring.");
            SchedulerInner::enqueue(inner.clone(), entry.expires_at, latest);
            return;
        }

        inner.store.delete(DEBOUNCE_STATE_KEY);

        if let Err(err) = inner
            .orchestrator
            .run_purge(&trigger, PurgePath::Deferred)
            .await
        {
            error!(
                target = "purgekeeper::scheduler",
                trigger,
                error = %err,
                "deferred purge failed"
            );
        }
    }
}

fn state_value(state: &DebounceState) -> serde_json::Value {
    serde_json::json!({
        "scheduled": state.scheduled,
        "trigger": state.trigger,
    })
}
