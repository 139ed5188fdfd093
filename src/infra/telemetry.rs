use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::{
    application::{
        compute::{
            METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_CACHE_PENDING, METRIC_COMPUTE_ENQUEUED,
        },
        jobs::{
            METRIC_COMPUTE_COMPLETED, METRIC_COMPUTE_FAILED, METRIC_COMPUTE_MS,
            METRIC_PENDING_PURGED,
        },
    },
    config::{LogFormat, LoggingSettings},
};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr so the `cache` subcommand can print entries on stdout.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .with_writer(std::io::stderr)
            .compact()
            .with_target(true)
            .boxed(),
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
            METRIC_CACHE_HIT,
            Unit::Count,
            "Cache lookups that found a ready value."
        );
        describe_counter!(
            METRIC_CACHE_MISS,
            Unit::Count,
            "Cache lookups that returned no value."
        );
        describe_counter!(
            METRIC_CACHE_PENDING,
            Unit::Count,
            "Cache lookups that found a computation still pending."
        );
        describe_counter!(
            METRIC_COMPUTE_ENQUEUED,
            Unit::Count,
            "Compute requests accepted and handed to the dispatcher."
        );
        describe_counter!(
            METRIC_COMPUTE_COMPLETED,
            Unit::Count,
            "Compute jobs whose result was written to the cache."
        );
        describe_counter!(
            METRIC_COMPUTE_FAILED,
            Unit::Count,
            "Compute job attempts that failed."
        );
        describe_counter!(
            METRIC_PENDING_PURGED,
            Unit::Count,
            "Pending entries removed after their lease elapsed."
        );
        describe_histogram!(
            METRIC_COMPUTE_MS,
            Unit::Milliseconds,
            "Compute job latency in milliseconds."
        );
    });
}
