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
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| InfraError::Telemetry(err.to_string()))
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "feedline_cache_hit_total",
            Unit::Count,
            "Feed loads served from the client store."
        );
        describe_counter!(
            "feedline_cache_miss_total",
            Unit::Count,
            "Feed loads that required a first page fetch."
        );
        describe_counter!(
            "feedline_cache_evict_total",
            Unit::Count,
            "Feed entries evicted from the client store due to capacity."
        );
        describe_counter!(
            "feedline_fetch_discarded_total",
            Unit::Count,
            "Fetched pages dropped because a mutation cancelled the fetch."
        );
        describe_histogram!(
            "feedline_fetch_ms",
            Unit::Milliseconds,
            "Feed page fetch latency in milliseconds."
        );
        describe_counter!(
            "feedline_mutation_committed_total",
            Unit::Count,
            "Speculative mutations confirmed by the backing write."
        );
        describe_counter!(
            "feedline_mutation_rolled_back_total",
            Unit::Count,
            "Speculative mutations reverted after a failed backing write."
        );
        describe_counter!(
            "feedline_http_requests_total",
            Unit::Count,
            "HTTP API responses by status class."
        );
    });
}
