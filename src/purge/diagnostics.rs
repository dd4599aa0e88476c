//! Conditional diagnostic sink for purge lifecycle steps.
//!
//! Lines are emitted under the `purgekeeper::diagnostics` tracing target and only
//! when diagnostics are switched on (`logging.purge_diagnostics`). A capturing
//! log additionally keeps every line in memory, which the manual trigger page
//! and the tests read back.

use std::sync::{Arc, Mutex};

use tracing::info;

use super::lock::recover;

const SOURCE: &str = "purge::diagnostics";

#[derive(Debug, Clone, Default)]
pub struct DiagnosticLog {
    enabled: bool,
    captured: Option<Arc<Mutex<Vec<String>>>>,
}

impl DiagnosticLog {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            captured: None,
        }
    }

    /// A log that is always enabled and records each line it writes.
    pub fn capturing() -> Self {
        Self {
            enabled: true,
            captured: Some(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn write(&self, message: impl AsRef<str>) {
        if !self.enabled {
            return;
        }

        let message = message.as_ref();
        info!(target: "purgekeeper::diagnostics", "{message}");

        if let Some(captured) = &self.captured {
            recover(captured.lock(), SOURCE, "write").push(message.to_string());
        }
    }

    /// Lines recorded so far; empty unless the log was built with [`DiagnosticLog::capturing`].
    pub fn lines(&self) -> Vec<String> {
        match &self.captured {
            Some(captured) => recover(captured.lock(), SOURCE, "lines").clone(),
            None => Vec::new(),
        }
    }

    pub fn clear(&self) {
        if let Some(captured) = &self.captured {
            recover(captured.lock(), SOURCE, "clear").clear();
        }
    }
}
