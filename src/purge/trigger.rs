//! Purge trigger.
//!
//! Entry point used by event bindings, the HTTP surface and the CLI. Offers
//! the immediate path, which runs the orchestrator inline, and the debounced
//! path, which hands the request to the scheduler.

use std::sync::Arc;

use tracing::debug;

use super::error::PurgeError;
use super::orchestrator::{PurgeOrchestrator, PurgePath};
use super::scheduler::{DebounceScheduler, ScheduleOutcome};

/// Cache purge trigger.
///
/// # Usage
///
/// ```ignore
/// // A plugin was activated: purge right away.
/// trigger.purge_now("plugin-activated").await?;
///
/// // A metadata field changed: coalesce with whatever follows.
/// trigger.request_purge("meta-updated");
/// ```
#[derive(Clone)]
pub struct PurgeTrigger {
    orchestrator: Arc<PurgeOrchestrator>,
    scheduler: DebounceScheduler,
}

impl PurgeTrigger {
    pub fn new(orchestrator: Arc<PurgeOrchestrator>, scheduler: DebounceScheduler) -> Self {
        Self {
            orchestrator,
            scheduler,
        }
    }

    pub fn orchestrator(&self) -> &Arc<PurgeOrchestrator> {
        &self.orchestrator
    }

    pub fn scheduler(&self) -> &DebounceScheduler {
        &self.scheduler
    }

    /// Run a purge now, bypassing the debounce state entirely.
    pub async fn purge_now(&self, trigger: &str) -> Result<(), PurgeError> {
        debug!(target = "purgekeeper::trigger", trigger, "immediate purge requested");
        self.orchestrator
            .run_purge(trigger, PurgePath::Immediate)
            .await
    }

    /// Ask for a purge that fires once requests stop arriving.
    pub fn request_purge(&self, trigger: &str) -> ScheduleOutcome {
        debug!(target = "purgekeeper::trigger", trigger, "debounced purge requested");
        self.scheduler.request_purge(trigger)
    }
}
