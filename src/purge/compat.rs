//! Compatibility registry for third-party cache monitors.
//!
//! A monitoring agent discovers which caches it may clear by listing the
//! registered compatibilities, then asks one of them to clear by name.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use super::error::PurgeError;
use super::lock::recover;
use super::trigger::PurgeTrigger;

const SOURCE: &str = "purge::compat";

/// Name this service registers itself under.
pub const SELF_COMPATIBILITY: &str = "purgekeeper";

#[async_trait]
pub trait CacheCompatibility: Send + Sync {
    fn name(&self) -> &str;

    async fn clear(&self) -> Result<(), PurgeError>;
}

#[derive(Debug, Error)]
pub enum CompatError {
    #[error("compatibility `{0}` is already registered")]
    Duplicate(String),
    #[error("no compatibility registered as `{0}`")]
    Unknown(String),
    #[error(transparent)]
    Purge(#[from] PurgeError),
}

#[derive(Default)]
pub struct CompatibilityRegistry {
    entries: RwLock<BTreeMap<String, Arc<dyn CacheCompatibility>>>,
}

impl CompatibilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a compatibility. A name can be registered only once.
    pub fn register(&self, compat: Arc<dyn CacheCompatibility>) -> Result<(), CompatError> {
        let name = compat.name().to_string();
        let mut entries = recover(self.entries.write(), SOURCE, "register");
        if entries.contains_key(&name) {
            return Err(CompatError::Duplicate(name));
        }
        info!(target = "purgekeeper::compat", name, "compatibility registered");
        entries.insert(name, compat);
        Ok(())
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        recover(self.entries.read(), SOURCE, "names")
            .keys()
            .cloned()
            .collect()
    }

    pub async fn clear(&self, name: &str) -> Result<(), CompatError> {
        let compat = recover(self.entries.read(), SOURCE, "clear")
            .get(name)
            .cloned()
            .ok_or_else(|| CompatError::Unknown(name.to_string()))?;
        compat.clear().await?;
        Ok(())
    }
}

/// Exposes this service's own immediate purge to the monitoring agent.
pub struct TriggerCompatibility {
    trigger: PurgeTrigger,
}

impl TriggerCompatibility {
    pub fn new(trigger: PurgeTrigger) -> Self {
        Self { trigger }
    }
}

#[async_trait]
impl CacheCompatibility for TriggerCompatibility {
    fn name(&self) -> &str {
        SELF_COMPATIBILITY
    }

    async fn clear(&self) -> Result<(), PurgeError> {
        self.trigger.purge_now("monitor-clear").await
    }
}
