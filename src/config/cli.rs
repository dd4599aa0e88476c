use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the purgekeeper binary.
#[derive(Debug, Parser)]
#[command(name = "purgekeeper", version, about = "Debounced cache purge coordinator")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "PURGEKEEPER_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service (default).
    Serve(Box<ServeArgs>),
    /// Run one immediate purge and exit.
    Purge(PurgeArgs),
    /// Query the release source and print the resulting update offer.
    #[command(name = "check-update")]
    CheckUpdate(CheckUpdateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct PurgeArgs {
    /// Label recorded as the purge trigger.
    #[arg(long, default_value = "manual-cli", value_name = "LABEL")]
    pub trigger: String,

    #[command(flatten)]
    pub overrides: CommonOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CheckUpdateArgs {
    /// Installed version to compare against; defaults to this binary's version.
    #[arg(long = "current-version", value_name = "VERSION")]
    pub current_version: Option<String>,

    #[command(flatten)]
    pub overrides: CommonOverrides,
}

/// Overrides accepted by every command.
#[derive(Debug, Args, Default, Clone)]
pub struct CommonOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Toggle purge diagnostic lines.
    #[arg(
        long = "purge-diagnostics",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub purge_diagnostics: Option<bool>,

    /// Override the page-builder asset cache directory.
    #[arg(long = "builder-asset-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub builder_asset_dir: Option<PathBuf>,

    /// Toggle the reverse-proxy purge helper.
    #[arg(
        long = "reverse-proxy-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub reverse_proxy_enabled: Option<bool>,

    /// Override the reverse-proxy purge endpoint.
    #[arg(long = "reverse-proxy-purge-url", value_name = "URL")]
    pub reverse_proxy_purge_url: Option<String>,

    /// Override the LiteSpeed purge-all endpoint.
    #[arg(long = "litespeed-purge-url", value_name = "URL")]
    pub litespeed_purge_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub common: CommonOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the admin bearer token.
    #[arg(long = "admin-token", value_name = "TOKEN")]
    pub admin_token: Option<String>,

    /// Override the debounce window.
    #[arg(long = "debounce-window-seconds", value_name = "SECONDS")]
    pub debounce_window_seconds: Option<u64>,

    /// Path for page-builder events (immediate|debounced).
    #[arg(long = "builder-events", value_name = "POLICY")]
    pub builder_events: Option<String>,

    /// Toggle the release updater endpoints.
    #[arg(
        long = "updater-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub updater_enabled: Option<bool>,
}
