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
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "chirp_query_cache_hit_total",
            Unit::Count,
            "Query cache reads served from a fresh entry."
        );
        describe_counter!(
            "chirp_query_cache_miss_total",
            Unit::Count,
            "Query cache reads that started a remote fetch."
        );
        describe_counter!(
            "chirp_query_cache_dedup_total",
            Unit::Count,
            "Query cache reads that joined a fetch already in flight."
        );
        describe_counter!(
            "chirp_query_cache_evict_total",
            Unit::Count,
            "Query cache entries evicted due to capacity."
        );
        describe_counter!(
            "chirp_page_cache_hit_total",
            Unit::Count,
            "Rendered pages served from the page cache."
        );
        describe_counter!(
            "chirp_page_cache_miss_total",
            Unit::Count,
            "Rendered pages generated on request."
        );
        describe_counter!(
            "chirp_page_cache_evict_total",
            Unit::Count,
            "Rendered pages evicted due to capacity."
        );
        describe_counter!(
            "chirp_invalidation_total",
            Unit::Count,
            "Mutation invalidations applied, labelled by mutation."
        );
        describe_histogram!(
            "chirp_prefetch_ms",
            Unit::Milliseconds,
            "Server prefetch latency in milliseconds, labelled by procedure."
        );
    });
}
