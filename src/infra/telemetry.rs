use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::{
    METRIC_CLEAR_TOTAL, METRIC_FORGET_TOTAL, METRIC_INDEX_ERROR_TOTAL, METRIC_PURGED_TOTAL,
    METRIC_WRITE_ERROR_TOTAL, METRIC_WRITE_TOTAL,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
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
            METRIC_WRITE_TOTAL,
            Unit::Count,
            "Total number of cache artifacts written to disk."
        );
        describe_counter!(
            METRIC_WRITE_ERROR_TOTAL,
            Unit::Count,
            "Total number of artifact writes that failed."
        );
        describe_counter!(
            METRIC_INDEX_ERROR_TOTAL,
            Unit::Count,
            "Total number of expiry index records that could not be stored."
        );
        describe_counter!(
            METRIC_FORGET_TOTAL,
            Unit::Count,
            "Total number of single-page invalidations."
        );
        describe_counter!(
            METRIC_CLEAR_TOTAL,
            Unit::Count,
            "Total number of directory invalidations."
        );
        describe_counter!(
            METRIC_PURGED_TOTAL,
            Unit::Count,
            "Total number of expired artifacts removed by the purge sweep."
        );
    });
}
