//! Purge orchestrator.
//!
//! Runs a purge in a fixed order: object cache flush, builder assets, then the
//! first available edge cache. Steps never overlap.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{info, instrument};

use super::backends::{CachePurger, PurgerKind};
use super::diagnostics::DiagnosticLog;
use super::error::PurgeError;
use super::object_cache::ObjectCache;

const METRIC_PURGE_RUNS: &str = "purgekeeper_purge_runs_total";
const METRIC_PURGE_MS: &str = "purgekeeper_purge_ms";

/// Which invocation route reached the orchestrator; used as a metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgePath {
    Immediate,
    Deferred,
}

impl PurgePath {
    pub fn as_str(self) -> &'static str {
        match self {
            PurgePath::Immediate => "immediate",
            PurgePath::Deferred => "deferred",
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct PurgeOutcome {
    builder_cleared: bool,
    edge_purged: bool,
}

pub struct PurgeOrchestrator {
    object_cache: Arc<dyn ObjectCache>,
    purgers: Vec<Arc<dyn CachePurger>>,
    log: DiagnosticLog,
}

impl PurgeOrchestrator {
    /// Builder-asset purgers are moved ahead of edge purgers; the relative order
    /// of edge purgers is kept and decides which one wins.
    pub fn new(
        object_cache: Arc<dyn ObjectCache>,
        mut purgers: Vec<Arc<dyn CachePurger>>,
        log: DiagnosticLog,
    ) -> Self {
        purgers.sort_by_key(|purger| purger.kind());
        Self {
            object_cache,
            purgers,
            log,
        }
    }

    pub fn log(&self) -> &DiagnosticLog {
        &self.log
    }

    pub fn object_cache(&self) -> &Arc<dyn ObjectCache> {
        &self.object_cache
    }

    /// The builder-asset purgers, for callers that clear assets ahead of a purge.
    pub fn builder_purgers(&self) -> impl Iterator<Item = &Arc<dyn CachePurger>> {
        self.purgers
            .iter()
            .filter(|purger| purger.kind() == PurgerKind::BuilderAsset)
    }

    /// Whether any builder-asset backend is currently present.
    pub async fn builder_available(&self) -> bool {
        for purger in self.builder_purgers() {
            if purger.is_available().await {
                return true;
            }
        }
        false
    }

    /// Run a full purge.
    ///
    /// A backend failure aborts the run and is returned to the caller.
    #[instrument(skip(self, path), fields(path = path.as_str()))]
    pub async fn run_purge(&self, trigger: &str, path: PurgePath) -> Result<(), PurgeError> {
        let started_at = Instant::now();
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        self.log
            .write(format!("purge initiated on {trigger} at {timestamp}"));

        self.object_cache.flush();
        self.log.write("object cache flushed.");

        let mut outcome = PurgeOutcome::default();
        for purger in &self.purgers {
            let kind = purger.kind();
            if kind == PurgerKind::EdgeCache && outcome.edge_purged {
                continue;
            }

            if !purger.is_available().await {
                self.log
                    .write(format!("{} not detected, skipping.", purger.name()));
                continue;
            }

            purger.purge_all().await?;

            match kind {
                PurgerKind::BuilderAsset => outcome.builder_cleared = true,
                PurgerKind::EdgeCache => outcome.edge_purged = true,
            }
        }

        if outcome.edge_purged {
            self.log.write("cache purge completed.");
        } else {
            self.log.write("no backend purged.");
        }

        info!(
            target = "purgekeeper::purge",
            trigger,
            builder_cleared = outcome.builder_cleared,
            edge_purged = outcome.edge_purged,
            "purge run finished"
        );

        counter!(METRIC_PURGE_RUNS, "path" => path.as_str()).increment(1);
        histogram!(METRIC_PURGE_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        Ok(())
    }
}
