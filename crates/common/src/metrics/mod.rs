//! Metrics and observability utilities
//!
//! Provides Prometheus-style metrics with latency histograms
//! and standardized naming conventions. Recording is a no-op until the
//! binary installs a recorder.

use crate::errors::Result;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all RecallForge metrics
pub const METRICS_PREFIX: &str = "recallforge";

/// Histogram buckets for retrieval and stream latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
];

/// Outcome label for a single stream fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Ok,
    Error,
    Timeout,
}

impl StreamOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamOutcome::Ok => "ok",
            StreamOutcome::Error => "error",
            StreamOutcome::Timeout => "timeout",
        }
    }
}

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    describe_counter!(
        format!("{}_retrievals_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of orchestrated retrievals"
    );

    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end retrieval latency in seconds"
    );

    describe_gauge!(
        format!("{}_retrieval_documents", METRICS_PREFIX),
        Unit::Count,
        "Documents selected into the last context window"
    );

    describe_counter!(
        format!("{}_stream_fetches_total", METRICS_PREFIX),
        Unit::Count,
        "Recall stream fetches by stream and outcome"
    );

    describe_histogram!(
        format!("{}_stream_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Recall stream latency in seconds"
    );

    describe_counter!(
        format!("{}_screened_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Queries screened for injection, by verdict"
    );

    describe_counter!(
        format!("{}_threat_findings_total", METRICS_PREFIX),
        Unit::Count,
        "Injection findings by category"
    );

    describe_counter!(
        format!("{}_documents_ingested_total", METRICS_PREFIX),
        Unit::Count,
        "Documents accepted by ingestion"
    );

    describe_gauge!(
        format!("{}_index_documents", METRICS_PREFIX),
        Unit::Count,
        "Documents in the current local index snapshot"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }

    /// Record completion with the status the handler's result maps to
    pub fn finish_result<T>(self, result: &Result<T>) {
        self.finish(response_status(result));
    }
}

/// HTTP status for a handler result: 200 on success, the error's status otherwise
pub fn response_status<T>(result: &Result<T>) -> u16 {
    match result {
        Ok(_) => 200,
        Err(e) => e.status_code().as_u16(),
    }
}

/// Helper to record an orchestrated retrieval
pub fn record_retrieval(duration_secs: f64, strategy: &str, document_count: usize) {
    counter!(
        format!("{}_retrievals_total", METRICS_PREFIX),
        "strategy" => strategy.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        "strategy" => strategy.to_string()
    )
    .record(duration_secs);

    gauge!(
        format!("{}_retrieval_documents", METRICS_PREFIX),
        "strategy" => strategy.to_string()
    )
    .set(document_count as f64);
}

/// Helper to record one recall stream fetch
pub fn record_stream(stream: &str, duration_secs: f64, outcome: StreamOutcome) {
    counter!(
        format!("{}_stream_fetches_total", METRICS_PREFIX),
        "stream" => stream.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);

    histogram!(
        format!("{}_stream_duration_seconds", METRICS_PREFIX),
        "stream" => stream.to_string()
    )
    .record(duration_secs);
}

/// Helper to record a screening verdict and its finding categories
pub fn record_screening<'a>(is_safe: bool, categories: impl IntoIterator<Item = &'a str>) {
    let verdict = if is_safe { "safe" } else { "unsafe" };

    counter!(
        format!("{}_screened_queries_total", METRICS_PREFIX),
        "verdict" => verdict
    )
    .increment(1);

    for category in categories {
        counter!(
            format!("{}_threat_findings_total", METRICS_PREFIX),
            "category" => category.to_string()
        )
        .increment(1);
    }
}

/// Helper to record ingestion
pub fn record_ingestion(accepted: usize, index_size: usize) {
    counter!(format!("{}_documents_ingested_total", METRICS_PREFIX)).increment(accepted as u64);
    gauge!(format!("{}_index_documents", METRICS_PREFIX)).set(index_size as f64);
}
