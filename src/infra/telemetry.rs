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

/// Install the global tracing subscriber. Logs go to stderr so command
/// output on stdout stays machine-readable.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
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

/// Register units and help text for every metric the crate emits.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        // Query cache reads and the fetches they trigger.
        describe_counter!(
            "agenda_cache_hit_total",
            Unit::Count,
            "Reads served from a fresh cache entry."
        );
        describe_counter!(
            "agenda_cache_miss_total",
            Unit::Count,
            "Reads that started a backend fetch."
        );
        describe_counter!(
            "agenda_cache_inflight_join_total",
            Unit::Count,
            "Reads that joined a fetch already in flight."
        );
        describe_counter!(
            "agenda_cache_fetch_total",
            Unit::Count,
            "Backend fetches executed on behalf of the cache."
        );
        describe_histogram!(
            "agenda_cache_fetch_ms",
            Unit::Milliseconds,
            "Backend fetch latency in milliseconds."
        );

        // Writes and the invalidations they signal.
        describe_counter!(
            "agenda_cache_invalidate_total",
            Unit::Count,
            "Invalidation signals per cache key."
        );
        describe_counter!(
            "agenda_mutation_total",
            Unit::Count,
            "Completed mutations by operation and result."
        );
    });
}
