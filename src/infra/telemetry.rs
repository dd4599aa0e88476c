use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Purge diagnostic lines are emitted at `info` under `purgekeeper::diagnostics`;
/// when they are switched on that target is kept visible even below a stricter
/// base level.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let mut env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();
    if logging.purge_diagnostics {
        let directive = "purgekeeper::diagnostics=info".parse().map_err(|err| {
            InfraError::telemetry(format!("invalid diagnostics directive: {err}"))
        })?;
        env_filter = env_filter.add_directive(directive);
    }

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "purgekeeper_purge_runs_total",
            Unit::Count,
            "Total number of completed purge runs, labelled by path."
        );
        describe_histogram!(
            "purgekeeper_purge_ms",
            Unit::Milliseconds,
            "Purge run latency in milliseconds."
        );
        describe_counter!(
            "purgekeeper_debounce_rearm_total",
            Unit::Count,
            "Total number of purge requests that extended an armed debounce window."
        );
        describe_counter!(
            "purgekeeper_release_lookup_total",
            Unit::Count,
            "Total number of release lookups, labelled by where the answer came from."
        );
    });
}
