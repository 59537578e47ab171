//! Metrics and observability utilities
//!
//! Prometheus metrics for the upload, deletion and download flows
//! with standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all MDL metrics
pub const METRICS_PREFIX: &str = "mdl";

/// Buckets for upload duration; artifacts range from KB to hundreds of MB
pub const UPLOAD_BUCKETS: &[f64] = &[
    0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00, 30.00, 60.00, 120.0, 300.0,
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of GraphQL requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "GraphQL request latency in seconds"
    );

    // Upload metrics
    describe_counter!(
        format!("{}_uploads_total", METRICS_PREFIX),
        Unit::Count,
        "Total model uploads attempted"
    );

    describe_counter!(
        format!("{}_uploads_failed_total", METRICS_PREFIX),
        Unit::Count,
        "Model uploads that failed after validation"
    );

    describe_histogram!(
        format!("{}_upload_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Model upload latency in seconds"
    );

    describe_counter!(
        format!("{}_compensations_total", METRICS_PREFIX),
        Unit::Count,
        "Compensating deletes run after a failed upload"
    );

    describe_counter!(
        format!("{}_compensations_failed_total", METRICS_PREFIX),
        Unit::Count,
        "Compensating deletes that gave up"
    );

    // Deletion metrics
    describe_counter!(
        format!("{}_models_deleted_total", METRICS_PREFIX),
        Unit::Count,
        "Model rows deleted"
    );

    describe_counter!(
        format!("{}_blob_cleanup_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Artifact blobs that could not be removed"
    );

    // Download metrics
    describe_counter!(
        format!("{}_download_links_total", METRICS_PREFIX),
        Unit::Count,
        "Signed download links issued"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    operation: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(operation: &str) -> Self {
        Self {
            start: Instant::now(),
            operation: operation.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, success: bool) {
        let duration = self.start.elapsed().as_secs_f64();
        let status = if success { "ok" } else { "error" };

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "operation" => self.operation.clone(),
            "status" => status
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "operation" => self.operation
        )
        .record(duration);
    }
}

/// Helper to record upload metrics
pub fn record_upload(duration_secs: f64, success: bool) {
    counter!(format!("{}_uploads_total", METRICS_PREFIX)).increment(1);

    if success {
        histogram!(format!("{}_upload_duration_seconds", METRICS_PREFIX)).record(duration_secs);
    } else {
        counter!(format!("{}_uploads_failed_total", METRICS_PREFIX)).increment(1);
    }
}

/// Helper to record a compensating action; `step` is `row` or `blob`
pub fn record_compensation(step: &'static str, success: bool) {
    counter!(
        format!("{}_compensations_total", METRICS_PREFIX),
        "step" => step
    )
    .increment(1);

    if !success {
        counter!(
            format!("{}_compensations_failed_total", METRICS_PREFIX),
            "step" => step
        )
        .increment(1);
    }
}

/// Helper to record bulk deletion metrics
pub fn record_deletion(models_deleted: u64, blob_failures: usize) {
    counter!(format!("{}_models_deleted_total", METRICS_PREFIX)).increment(models_deleted);

    if blob_failures > 0 {
        counter!(format!("{}_blob_cleanup_failures_total", METRICS_PREFIX))
            .increment(blob_failures as u64);
    }
}

pub fn record_download_links(count: usize) {
    counter!(format!("{}_download_links_total", METRICS_PREFIX)).increment(count as u64);
}
