//! Release updater.
//!
//! Answers the host's update-check and plugin-information queries from the
//! latest published release and relocates freshly installed packages.
//!
//! Release lookups go through three layers: an in-process memo kept in the
//! object cache, the keyed store, and finally the release source. A failed
//! lookup is remembered as an error sentinel so the source is left alone for
//! the failure cooldown.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::error::UpdateError;
use super::source::{ReleaseInfo, ReleaseSource};
use super::version::is_newer;
use crate::purge::object_cache::ObjectCache;
use crate::purge::store::KeyedStore;

pub const RELEASE_CACHE_KEY: &str = "purgekeeper_release_response";
pub const DEFAULT_SUCCESS_TTL: Duration = Duration::from_secs(4 * 60 * 60);
pub const DEFAULT_FAILURE_TTL: Duration = Duration::from_secs(60 * 60);

/// Action name that asks for plugin information.
pub const PLUGIN_INFORMATION_ACTION: &str = "plugin_information";

const METRIC_RELEASE_LOOKUP: &str = "purgekeeper_release_lookup_total";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Icons {
    #[serde(rename = "1x")]
    pub small: String,
    #[serde(rename = "2x")]
    pub large: String,
}

#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    pub slug: String,
    /// Package identifier the host keys its version table by, e.g. `purgekeeper/purgekeeper.php`.
    pub basename: String,
    pub display_name: String,
    pub install_dir: PathBuf,
    /// Host version reported as `tested`.
    pub host_version: String,
    pub success_ttl: Duration,
    pub failure_ttl: Duration,
    pub icons: Option<Icons>,
}

/// Stored lookup result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CachedRelease {
    Release(ReleaseInfo),
    Error { reason: String },
}

impl CachedRelease {
    fn into_release(self) -> Option<ReleaseInfo> {
        match self {
            CachedRelease::Release(release) => Some(release),
            CachedRelease::Error { .. } => None,
        }
    }
}

/// Memo entry; the deadline is measured from the updater's own epoch so it
/// follows the same clock as the keyed store.
#[derive(Debug, Serialize, Deserialize)]
struct MemoEntry {
    cached: CachedRelease,
    deadline_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCheck {
    /// Installed versions keyed by package basename.
    #[serde(default)]
    pub checked: BTreeMap<String, String>,
    /// Offers keyed by package basename.
    #[serde(default)]
    pub response: BTreeMap<String, UpdateOffer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOffer {
    pub slug: String,
    pub package: String,
    pub new_version: String,
    pub tested: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icons: Option<Icons>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub slug: String,
    pub version: String,
    pub tested: String,
    pub last_updated: String,
    pub download_link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icons: Option<Icons>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallResult {
    pub destination: PathBuf,
    /// Fields the host attached that are handed back untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub struct ReleaseUpdater {
    config: UpdaterConfig,
    source: Arc<dyn ReleaseSource>,
    store: Arc<dyn KeyedStore>,
    memo: Arc<dyn ObjectCache>,
    epoch: Instant,
}

impl ReleaseUpdater {
    pub fn new(
        config: UpdaterConfig,
        source: Arc<dyn ReleaseSource>,
        store: Arc<dyn KeyedStore>,
        memo: Arc<dyn ObjectCache>,
    ) -> Self {
        Self {
            config,
            source,
            store,
            memo,
            epoch: Instant::now(),
        }
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    /// Latest release, or `None` while no usable release is known.
    pub async fn repository_info(&self) -> Option<ReleaseInfo> {
        if let Some(cached) = self.memo_get() {
            counter!(METRIC_RELEASE_LOOKUP, "result" => "memo").increment(1);
            return cached.into_release();
        }

        if let Some(entry) = self.store.get(RELEASE_CACHE_KEY)
            && let Ok(cached) = serde_json::from_value::<CachedRelease>(entry.value)
        {
            counter!(METRIC_RELEASE_LOOKUP, "result" => "store").increment(1);
            self.memo_put(&cached, entry.expires_at);
            return cached.into_release();
        }

        match self.source.latest_release().await {
            Ok(release) => {
                counter!(METRIC_RELEASE_LOOKUP, "result" => "fetched").increment(1);
                info!(
                    target = "purgekeeper::updater",
                    version = %release.version,
                    "latest release fetched"
                );
                self.remember(CachedRelease::Release(release.clone()), self.config.success_ttl);
                Some(release)
            }
            Err(err) => {
                counter!(METRIC_RELEASE_LOOKUP, "result" => "failed").increment(1);
                warn!(
                    target = "purgekeeper::updater",
                    error = %err,
                    cooldown_secs = self.config.failure_ttl.as_secs(),
                    "release lookup failed"
                );
                self.remember(
                    CachedRelease::Error {
                        reason: err.to_string(),
                    },
                    self.config.failure_ttl,
                );
                None
            }
        }
    }

    /// Add an offer for this package when a newer release exists.
    pub async fn check_update(&self, mut check: UpdateCheck) -> UpdateCheck {
        if check.checked.is_empty() {
            return check;
        }

        let Some(release) = self.repository_info().await else {
            return check;
        };

        let current = check
            .checked
            .get(&self.config.basename)
            .map(String::as_str)
            .unwrap_or_default();

        if is_newer(&release.version, current) {
            check.response.insert(
                self.config.basename.clone(),
                UpdateOffer {
                    slug: self.config.slug.clone(),
                    package: release.package_url,
                    new_version: release.version,
                    tested: self.config.host_version.clone(),
                    icons: self.config.icons.clone(),
                },
            );
        }

        check
    }

    pub async fn plugin_info(&self, action: &str, slug: &str) -> Option<PluginInfo> {
        if action != PLUGIN_INFORMATION_ACTION || slug != self.config.slug {
            return None;
        }

        let release = self.repository_info().await?;
        Some(PluginInfo {
            name: self.config.display_name.clone(),
            slug: self.config.slug.clone(),
            version: release.version,
            tested: self.config.host_version.clone(),
            last_updated: release.published_at.unwrap_or_default(),
            download_link: release.package_url,
            icons: self.config.icons.clone(),
        })
    }

    /// Move an extracted package into the install directory.
    pub async fn after_install(&self, mut result: InstallResult) -> Result<InstallResult, UpdateError> {
        let target = self.config.install_dir.clone();
        if result.destination == target {
            return Ok(result);
        }

        relocate(&result.destination, &target).await?;
        info!(
            target = "purgekeeper::updater",
            from = %result.destination.display(),
            to = %target.display(),
            "installed package relocated"
        );

        result.destination = target;
        Ok(result)
    }

    fn remember(&self, cached: CachedRelease, ttl: Duration) {
        match serde_json::to_value(&cached) {
            Ok(value) => self.store.set(RELEASE_CACHE_KEY, value, ttl),
            Err(err) => warn!(
                target = "purgekeeper::updater",
                error = %err,
                "release lookup could not be cached"
            ),
        }
        self.memo_put(&cached, Instant::now() + ttl);
    }

    fn memo_get(&self) -> Option<CachedRelease> {
        let entry: MemoEntry = serde_json::from_value(self.memo.get(RELEASE_CACHE_KEY)?).ok()?;
        (self.elapsed_ms(Instant::now()) < entry.deadline_ms).then_some(entry.cached)
    }

    fn memo_put(&self, cached: &CachedRelease, deadline: Instant) {
        let entry = MemoEntry {
            cached: cached.clone(),
            deadline_ms: self.elapsed_ms(deadline),
        };
        if let Ok(value) = serde_json::to_value(&entry) {
            self.memo.insert(RELEASE_CACHE_KEY, value);
        }
    }

    fn elapsed_ms(&self, at: Instant) -> u64 {
        at.saturating_duration_since(self.epoch).as_millis() as u64
    }
}

/// Swap `from` into `to`, keeping the current install aside until the move
/// succeeds and putting it back when it does not.
async fn relocate(from: &Path, to: &Path) -> Result<(), UpdateError> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| UpdateError::install(from, to, err))?;
    }

    let backup = backup_path(to);
    let had_install = tokio::fs::try_exists(to).await.unwrap_or(false);
    if had_install {
        if tokio::fs::try_exists(&backup).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(&backup)
                .await
                .map_err(|err| UpdateError::install(from, to, err))?;
        }
        tokio::fs::rename(to, &backup)
            .await
            .map_err(|err| UpdateError::install(from, to, err))?;
    }

    if let Err(err) = tokio::fs::rename(from, to).await {
        if had_install && let Err(restore_err) = tokio::fs::rename(&backup, to).await {
            error!(
                target = "purgekeeper::updater",
                backup = %backup.display(),
                error = %restore_err,
                "previous install could not be restored"
            );
        }
        return Err(UpdateError::install(from, to, err));
    }

    if had_install && let Err(err) = tokio::fs::remove_dir_all(&backup).await {
        warn!(
            target = "purgekeeper::updater",
            backup = %backup.display(),
            error = %err,
            "previous install left behind"
        );
    }
    Ok(())
}

fn backup_path(to: &Path) -> PathBuf {
    let mut name = to.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    name.push(".old");
    to.with_file_name(name)
}
