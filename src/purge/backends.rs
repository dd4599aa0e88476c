//! Backend purgers.
//!
//! Each purger reports its own availability, which is recomputed on every run
//! because backends come and go between requests. An unavailable backend is a
//! normal skip. Errors raised by a backend's purge call are returned as-is.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use url::Url;

use super::diagnostics::DiagnosticLog;
use super::error::PurgeError;

const LITESPEED_PURGE_HEADER: &str = "X-LiteSpeed-Purge";
const USER_AGENT: &str = concat!("purgekeeper/", env!("CARGO_PKG_VERSION"));

/// Orchestration class of a purger.
///
/// Builder-asset purgers always run before edge caches; among edge caches only
/// the first available one runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PurgerKind {
    BuilderAsset,
    EdgeCache,
}

#[async_trait]
pub trait CachePurger: Send + Sync {
    fn name(&self) -> &'static str;

    fn kind(&self) -> PurgerKind;

    async fn is_available(&self) -> bool;

    async fn purge_all(&self) -> Result<(), PurgeError>;
}

/// Build the HTTP client shared by the edge purgers.
pub fn purge_http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
}

/// Clears the page-builder's derived asset cache for all content items.
///
/// The builder is considered loaded when its asset cache directory exists.
pub struct BuilderAssetPurger {
    cache_dir: Option<PathBuf>,
    log: DiagnosticLog,
}

impl BuilderAssetPurger {
    pub fn new(cache_dir: Option<PathBuf>, log: DiagnosticLog) -> Self {
        Self { cache_dir, log }
    }
}

#[async_trait]
impl CachePurger for BuilderAssetPurger {
    fn name(&self) -> &'static str {
        "builder-assets"
    }

    fn kind(&self) -> PurgerKind {
        PurgerKind::BuilderAsset
    }

    async fn is_available(&self) -> bool {
        let Some(dir) = &self.cache_dir else {
            return false;
        };
        tokio::fs::metadata(dir)
            .await
            .is_ok_and(|metadata| metadata.is_dir())
    }

    async fn purge_all(&self) -> Result<(), PurgeError> {
        let Some(dir) = &self.cache_dir else {
            return Ok(());
        };

        self.log.write("builder asset cache detected, clearing assets for all content items.");

        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|err| PurgeError::io(dir, err))?;
        let mut removed = 0usize;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| PurgeError::io(dir, err))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|err| PurgeError::io(&path, err))?;
            let result = if file_type.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            result.map_err(|err| PurgeError::io(&path, err))?;
            removed += 1;
        }

        self.log
            .write(format!("builder asset cache cleared ({removed} entries)."));
        Ok(())
    }
}

/// Reverse-proxy helper purge (edge cache A).
///
/// Available when the helper is switched on and has published a purge
/// endpoint. Purging issues `PURGE <endpoint>`.
pub struct ReverseProxyPurger {
    enabled: bool,
    endpoint: Option<Url>,
    client: Client,
    log: DiagnosticLog,
}

impl ReverseProxyPurger {
    pub fn new(enabled: bool, endpoint: Option<Url>, client: Client, log: DiagnosticLog) -> Self {
        Self {
            enabled,
            endpoint,
            client,
            log,
        }
    }
}

#[async_trait]
impl CachePurger for ReverseProxyPurger {
    fn name(&self) -> &'static str {
        "reverse-proxy"
    }

    fn kind(&self) -> PurgerKind {
        PurgerKind::EdgeCache
    }

    async fn is_available(&self) -> bool {
        self.enabled && self.endpoint.is_some()
    }

    async fn purge_all(&self) -> Result<(), PurgeError> {
        let Some(endpoint) = &self.endpoint else {
            return Ok(());
        };

        self.log.write("reverse-proxy helper detected, purging cache.");

        let method = Method::from_bytes(b"PURGE")
            .map_err(|err| PurgeError::backend(self.name(), err.to_string()))?;
        let response = self
            .client
            .request(method, endpoint.clone())
            .send()
            .await
            .map_err(|err| PurgeError::http(self.name(), err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PurgeError::Status {
                backend: self.name(),
                status,
            });
        }

        self.log.write("reverse-proxy cache purged.");
        Ok(())
    }
}

/// LiteSpeed server cache purge (edge cache B).
///
/// Available when a purge-all endpoint is registered. Purging posts to it with
/// `X-LiteSpeed-Purge: *`.
pub struct LiteSpeedPurger {
    endpoint: Option<Url>,
    client: Client,
    log: DiagnosticLog,
}

impl LiteSpeedPurger {
    pub fn new(endpoint: Option<Url>, client: Client, log: DiagnosticLog) -> Self {
        Self {
            endpoint,
            client,
            log,
        }
    }
}

#[async_trait]
impl CachePurger for LiteSpeedPurger {
    fn name(&self) -> &'static str {
        "litespeed"
    }

    fn kind(&self) -> PurgerKind {
        PurgerKind::EdgeCache
    }

    async fn is_available(&self) -> bool {
        self.endpoint.is_some()
    }

    async fn purge_all(&self) -> Result<(), PurgeError> {
        let Some(endpoint) = &self.endpoint else {
            return Ok(());
        };

        self.log.write("litespeed cache detected, purging cache.");

        let response = self
            .client
            .post(endpoint.clone())
            .header(LITESPEED_PURGE_HEADER, "*")
            .send()
            .await
            .map_err(|err| PurgeError::http(self.name(), err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PurgeError::Status {
                backend: self.name(),
                status,
            });
        }

        self.log.write("litespeed cache purged.");
        Ok(())
    }
}

/// Stand-in for a backend that is not configured at all.
pub struct NullPurger {
    name: &'static str,
    kind: PurgerKind,
}

impl NullPurger {
    pub fn new(name: &'static str, kind: PurgerKind) -> Self {
        Self { name, kind }
    }
}

#[async_trait]
impl CachePurger for NullPurger {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> PurgerKind {
        self.kind
    }

    async fn is_available(&self) -> bool {
        false
    }

    async fn purge_all(&self) -> Result<(), PurgeError> {
        Ok(())
    }
}
