//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::purge::bindings::BuilderEventPolicy;
use crate::purge::scheduler::DEFAULT_DEBOUNCE_WINDOW;
use crate::updater::Icons;
use crate::updater::service::{DEFAULT_FAILURE_TTL, DEFAULT_SUCCESS_TTL};

mod cli;

pub use cli::{
    CheckUpdateArgs, CliArgs, Command, CommonOverrides, PurgeArgs, ServeArgs, ServeOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "purgekeeper";
const ENV_PREFIX: &str = "PURGEKEEPER";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8420;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_API_BASE: &str = "https://api.github.com";
const DEFAULT_OWNER: &str = "purgekeeper";
const DEFAULT_REPO: &str = "purgekeeper";
const DEFAULT_BASENAME: &str = "purgekeeper/purgekeeper.php";
const DEFAULT_DISPLAY_NAME: &str = "Purgekeeper";
const DEFAULT_INSTALL_DIR: &str = "plugins/purgekeeper";
const DEFAULT_HOST_VERSION: &str = "6.6";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub admin: AdminSettings,
    pub purge: PurgeSettings,
    pub updater: UpdaterSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
    /// Emit the per-step purge diagnostic lines.
    pub purge_diagnostics: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone, Default)]
pub struct AdminSettings {
    /// Bearer token that grants admin privilege; admin routes are closed without one.
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PurgeSettings {
    pub debounce_window: Duration,
    pub builder_events: BuilderEventPolicy,
    pub builder_asset_dir: Option<PathBuf>,
    pub reverse_proxy: ReverseProxySettings,
    pub litespeed: LiteSpeedSettings,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct ReverseProxySettings {
    pub enabled: bool,
    pub purge_url: Option<Url>,
}

#[derive(Debug, Clone, Default)]
pub struct LiteSpeedSettings {
    pub purge_url: Option<Url>,
}

#[derive(Debug, Clone)]
pub struct UpdaterSettings {
    pub enabled: bool,
    pub api_base: Url,
    pub owner: String,
    pub repo: String,
    pub slug: String,
    pub basename: String,
    pub display_name: String,
    pub install_dir: PathBuf,
    pub host_version: String,
    pub success_ttl: Duration,
    pub failure_ttl: Duration,
    pub icons: Option<Icons>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Purge(args)) => raw.apply_common_overrides(&args.overrides),
        Some(Command::CheckUpdate(args)) => raw.apply_common_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    admin: RawAdminSettings,
    purge: RawPurgeSettings,
    updater: RawUpdaterSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_common_overrides(&overrides.common);

        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(token) = overrides.admin_token.as_ref() {
            self.admin.token = Some(token.clone());
        }
        if let Some(seconds) = overrides.debounce_window_seconds {
            self.purge.debounce_window_seconds = Some(seconds);
        }
        if let Some(policy) = overrides.builder_events.as_ref() {
            self.purge.builder_events = Some(policy.clone());
        }
        if let Some(enabled) = overrides.updater_enabled {
            self.updater.enabled = Some(enabled);
        }
    }

    fn apply_common_overrides(&mut self, overrides: &CommonOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(enabled) = overrides.purge_diagnostics {
            self.logging.purge_diagnostics = Some(enabled);
        }
        if let Some(dir) = overrides.builder_asset_dir.as_ref() {
            self.purge.builder_asset_dir = Some(dir.clone());
        }
        if let Some(enabled) = overrides.reverse_proxy_enabled {
            self.purge.reverse_proxy.enabled = Some(enabled);
        }
        if let Some(url) = overrides.reverse_proxy_purge_url.as_ref() {
            self.purge.reverse_proxy.purge_url = Some(url.clone());
        }
        if let Some(url) = overrides.litespeed_purge_url.as_ref() {
            self.purge.litespeed.purge_url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            admin,
            purge,
            updater,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            admin: build_admin_settings(admin),
            purge: build_purge_settings(purge)?,
            updater: build_updater_settings(updater)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_shutdown = positive_seconds(
        server
            .graceful_shutdown_seconds
            .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS),
        "server.graceful_shutdown_seconds",
    )?;

    Ok(ServerSettings {
        addr,
        graceful_shutdown,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings {
        level,
        format,
        purge_diagnostics: logging.purge_diagnostics.unwrap_or(false),
    })
}

fn build_admin_settings(admin: RawAdminSettings) -> AdminSettings {
    AdminSettings {
        token: non_empty(admin.token),
    }
}

fn build_purge_settings(purge: RawPurgeSettings) -> Result<PurgeSettings, LoadError> {
    let debounce_window = match purge.debounce_window_seconds {
        Some(seconds) => positive_seconds(seconds, "purge.debounce_window_seconds")?,
        None => DEFAULT_DEBOUNCE_WINDOW,
    };

    let builder_events = match purge.builder_events {
        Some(value) => BuilderEventPolicy::from_str(&value)
            .map_err(|reason| LoadError::invalid("purge.builder_events", reason))?,
        None => BuilderEventPolicy::default(),
    };

    let builder_asset_dir = purge
        .builder_asset_dir
        .filter(|dir| !dir.as_os_str().is_empty());

    let reverse_proxy = ReverseProxySettings {
        enabled: purge.reverse_proxy.enabled.unwrap_or(false),
        purge_url: parse_optional_url(
            purge.reverse_proxy.purge_url,
            "purge.reverse_proxy.purge_url",
        )?,
    };
    let litespeed = LiteSpeedSettings {
        purge_url: parse_optional_url(purge.litespeed.purge_url, "purge.litespeed.purge_url")?,
    };

    let request_timeout = positive_seconds(
        purge
            .request_timeout_seconds
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        "purge.request_timeout_seconds",
    )?;

    Ok(PurgeSettings {
        debounce_window,
        builder_events,
        builder_asset_dir,
        reverse_proxy,
        litespeed,
        request_timeout,
    })
}

fn build_updater_settings(updater: RawUpdaterSettings) -> Result<UpdaterSettings, LoadError> {
    let api_base = parse_optional_url(updater.api_base, "updater.api_base")?
        .map_or_else(|| Url::parse(DEFAULT_API_BASE), Ok)
        .map_err(|err| LoadError::invalid("updater.api_base", err.to_string()))?;

    let owner = non_empty(updater.owner).unwrap_or_else(|| DEFAULT_OWNER.to_string());
    let repo = non_empty(updater.repo).unwrap_or_else(|| DEFAULT_REPO.to_string());
    let basename = non_empty(updater.basename).unwrap_or_else(|| DEFAULT_BASENAME.to_string());
    let slug = match non_empty(updater.slug) {
        Some(slug) => slug,
        None => slug_from_basename(&basename)
            .ok_or_else(|| LoadError::invalid("updater.slug", "cannot derive slug from basename"))?,
    };

    let success_ttl = match updater.success_ttl_seconds {
        Some(seconds) => positive_seconds(seconds, "updater.success_ttl_seconds")?,
        None => DEFAULT_SUCCESS_TTL,
    };
    let failure_ttl = match updater.failure_ttl_seconds {
        Some(seconds) => positive_seconds(seconds, "updater.failure_ttl_seconds")?,
        None => DEFAULT_FAILURE_TTL,
    };

    let icons = match updater.icons {
        Some(RawIcons {
            small: Some(small),
            large: Some(large),
        }) => Some(Icons { small, large }),
        Some(RawIcons {
            small: None,
            large: None,
        })
        | None => None,
        Some(_) => {
            return Err(LoadError::invalid(
                "updater.icons",
                "both `small` and `large` must be set",
            ));
        }
    };

    Ok(UpdaterSettings {
        enabled: updater.enabled.unwrap_or(false),
        api_base,
        owner,
        repo,
        slug,
        basename,
        display_name: non_empty(updater.display_name)
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string()),
        install_dir: updater
            .install_dir
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INSTALL_DIR)),
        host_version: non_empty(updater.host_version)
            .unwrap_or_else(|| DEFAULT_HOST_VERSION.to_string()),
        success_ttl,
        failure_ttl,
        icons,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
    purge_diagnostics: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAdminSettings {
    token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPurgeSettings {
    debounce_window_seconds: Option<u64>,
    builder_events: Option<String>,
    builder_asset_dir: Option<PathBuf>,
    reverse_proxy: RawReverseProxySettings,
    litespeed: RawLiteSpeedSettings,
    request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawReverseProxySettings {
    enabled: Option<bool>,
    purge_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLiteSpeedSettings {
    purge_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUpdaterSettings {
    enabled: Option<bool>,
    api_base: Option<String>,
    owner: Option<String>,
    repo: Option<String>,
    slug: Option<String>,
    basename: Option<String>,
    display_name: Option<String>,
    install_dir: Option<PathBuf>,
    host_version: Option<String>,
    success_ttl_seconds: Option<u64>,
    failure_ttl_seconds: Option<u64>,
    icons: Option<RawIcons>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawIcons {
    small: Option<String>,
    large: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn parse_optional_url(value: Option<String>, key: &'static str) -> Result<Option<Url>, LoadError> {
    non_empty(value)
        .map(|raw| {
            Url::parse(&raw).map_err(|err| LoadError::invalid(key, format!("`{raw}`: {err}")))
        })
        .transpose()
}

fn positive_seconds(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// `purgekeeper/purgekeeper.php` → `purgekeeper`; a bare file name loses its extension.
fn slug_from_basename(basename: &str) -> Option<String> {
    let slug = match basename.split_once('/') {
        Some((dir, _)) => dir,
        None => basename.rsplit_once('.').map_or(basename, |(stem, _)| stem),
    };
    (!slug.is_empty()).then(|| slug.to_string())
}
