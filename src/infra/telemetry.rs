use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

pub const CACHE_HIT_TOTAL: &str = "magforge_cache_hit_total";
pub const CACHE_MISS_TOTAL: &str = "magforge_cache_miss_total";
pub const CACHE_CORRUPT_TOTAL: &str = "magforge_cache_corrupt_total";
pub const JOBS_COALESCED_TOTAL: &str = "magforge_jobs_coalesced_total";
pub const JOBS_IN_FLIGHT: &str = "magforge_jobs_in_flight";
pub const RENDER_MS: &str = "magforge_render_ms";
pub const RETRY_TOTAL: &str = "magforge_generation_retry_total";
pub const FAILURE_TOTAL: &str = "magforge_generation_failure_total";

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
            CACHE_HIT_TOTAL,
            Unit::Count,
            "Generation requests served from the artifact store."
        );
        describe_counter!(
            CACHE_MISS_TOTAL,
            Unit::Count,
            "Generation requests that required a render."
        );
        describe_counter!(
            CACHE_CORRUPT_TOTAL,
            Unit::Count,
            "Visible artifacts that failed to read and were regenerated."
        );
        describe_counter!(
            JOBS_COALESCED_TOTAL,
            Unit::Count,
            "Submissions that joined an in-flight job for the same fingerprint."
        );
        describe_gauge!(
            JOBS_IN_FLIGHT,
            Unit::Count,
            "Render jobs currently pending or running."
        );
        describe_histogram!(
            RENDER_MS,
            Unit::Milliseconds,
            "Wall time of one render attempt including completion polling."
        );
        describe_counter!(
            RETRY_TOTAL,
            Unit::Count,
            "Render attempts resubmitted after a transient failure."
        );
        describe_counter!(
            FAILURE_TOTAL,
            Unit::Count,
            "Generation requests that ended in an error."
        );
    });
}
