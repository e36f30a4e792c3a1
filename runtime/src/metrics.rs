//! Prometheus metrics for engagement operations.
//!
//! Counters and histograms are recorded through the `metrics` facade; the
//! server installs a Prometheus recorder once at startup and the web layer
//! renders it at `GET /metrics`. Without an installed recorder every
//! recording call is a no-op, which is what unit tests rely on.
//!
//! # Example
//!
//! ```rust,no_run
//! use bookshelf_runtime::metrics::install_recorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let handle = install_recorder()?;
//! println!("{}", handle.render());
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

fn builder() -> Result<PrometheusBuilder, MetricsError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            LATENCY_BUCKETS,
        )
        .map_err(|e: BuildError| MetricsError::Build(e.to_string()))
}

/// Install the global Prometheus recorder and describe every metric.
///
/// # Errors
///
/// Returns [`MetricsError::Install`] if a recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, MetricsError> {
    let handle = builder()?
        .install_recorder()
        .map_err(|e| MetricsError::Install(e.to_string()))?;
    register_metrics();
    tracing::info!("Prometheus metrics recorder installed");
    Ok(handle)
}

/// A handle backed by a recorder that is not installed globally.
///
/// Renders an empty exposition. Used when metrics are disabled and in tests.
#[must_use]
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// Register all metric descriptions.
fn register_metrics() {
    // Engagement
    describe_counter!(
        "bookshelf_ratings_submitted_total",
        "Ratings folded into a book's aggregate"
    );
    describe_counter!(
        "bookshelf_comments_posted_total",
        "Comments appended to a book's thread"
    );
    describe_counter!(
        "bookshelf_rejected_requests_total",
        "Engagement requests rejected, labelled by error kind"
    );
    describe_counter!(
        "bookshelf_version_conflicts_total",
        "Conditional writes retried after a version conflict"
    );
    describe_counter!(
        "bookshelf_retries_exhausted_total",
        "Writes abandoned after exhausting conflict retries"
    );

    // Fan-out
    describe_counter!(
        "bookshelf_fanout_events_total",
        "Events published to realtime channels"
    );
    describe_counter!(
        "bookshelf_fanout_deliveries_total",
        "Subscriber deliveries across all published events"
    );
    describe_counter!(
        "bookshelf_fanout_failures_total",
        "Broadcasts that failed after a successful write"
    );
    describe_counter!(
        "bookshelf_fanout_lagged_events_total",
        "Events skipped by subscribers that fell behind"
    );

    // Store
    describe_histogram!(
        "bookshelf_store_operation_duration_seconds",
        "Latency of store operations, labelled by operation"
    );
}

/// Engagement metrics recorder.
pub struct EngagementMetrics;

impl EngagementMetrics {
    /// Record an accepted rating.
    pub fn record_rating() {
        counter!("bookshelf_ratings_submitted_total").increment(1);
    }

    /// Record an accepted comment.
    pub fn record_comment() {
        counter!("bookshelf_comments_posted_total").increment(1);
    }

    /// Record a rejected request.
    pub fn record_rejection(operation: &'static str, kind: &'static str) {
        counter!("bookshelf_rejected_requests_total", "operation" => operation, "kind" => kind)
            .increment(1);
    }

    /// Record a retry caused by a version conflict.
    pub fn record_conflict_retry(operation: &'static str) {
        counter!("bookshelf_version_conflicts_total", "operation" => operation).increment(1);
    }

    /// Record a write abandoned after exhausting retries.
    pub fn record_retries_exhausted(operation: &'static str) {
        counter!("bookshelf_retries_exhausted_total", "operation" => operation).increment(1);
    }
}

/// Fan-out metrics recorder.
pub struct FanoutMetrics;

impl FanoutMetrics {
    /// Record a published event and how many subscribers received it.
    pub fn record_publish(receivers: usize) {
        counter!("bookshelf_fanout_events_total").increment(1);
        counter!("bookshelf_fanout_deliveries_total").increment(receivers as u64);
    }

    /// Record a failed broadcast.
    pub fn record_failure() {
        counter!("bookshelf_fanout_failures_total").increment(1);
    }

    /// Record events skipped by a lagging subscriber.
    pub fn record_lagged(skipped: u64) {
        counter!("bookshelf_fanout_lagged_events_total").increment(skipped);
    }
}

/// Store metrics recorder.
pub struct StoreMetrics;

impl StoreMetrics {
    /// Record the latency of a store operation.
    pub fn record_operation(operation: &'static str, duration: Duration) {
        histogram!("bookshelf_store_operation_duration_seconds", "operation" => operation)
            .record(duration.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_a_recorder_is_a_noop() {
        EngagementMetrics::record_rating();
        EngagementMetrics::record_rejection("submit_rating", "ValidationError");
        FanoutMetrics::record_publish(3);
        StoreMetrics::record_operation("load", Duration::from_millis(2));
    }

    #[test]
    fn detached_handle_renders() {
        let handle = detached_handle();
        assert!(!handle.render().contains("bookshelf_ratings_submitted_total"));
    }
}
