//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Counsel metrics
pub const METRICS_PREFIX: &str = "counsel";

/// SLO-aligned histogram buckets for request latency (in seconds).
/// Model calls dominate, so the tail reaches well past a second.
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms - retrieval target
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s - answer P50 target
    10.00,  // 10s
    20.00,  // 20s
    40.00,  // 40s
];

/// Buckets for embedding latency
pub const EMBEDDING_BUCKETS: &[f64] = &[
    0.001,  // 1ms (local hashing)
    0.010,  // 10ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
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

    // Query metrics
    describe_counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total queries answered, by status"
    );

    describe_histogram!(
        format!("{}_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end query latency in seconds"
    );

    describe_counter!(
        format!("{}_answers_degraded_total", METRICS_PREFIX),
        Unit::Count,
        "Answers returned after every model candidate failed"
    );

    // Summary, analysis and drafting tasks
    describe_counter!(
        format!("{}_tasks_total", METRICS_PREFIX),
        Unit::Count,
        "Total model-backed tasks, by task and status"
    );

    describe_histogram!(
        format!("{}_task_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end task latency in seconds"
    );

    // Retrieval metrics
    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embed plus index search latency in seconds"
    );

    describe_gauge!(
        format!("{}_retrieval_results_count", METRICS_PREFIX),
        Unit::Count,
        "Number of fragments returned by the last retrieval"
    );

    describe_gauge!(
        format!("{}_index_fragments", METRICS_PREFIX),
        Unit::Count,
        "Fragments currently stored in the vector index"
    );

    // Embedding metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API errors"
    );

    // Model routing metrics
    describe_counter!(
        format!("{}_model_attempts_total", METRICS_PREFIX),
        Unit::Count,
        "Model invocation attempts, by model and outcome"
    );

    describe_histogram!(
        format!("{}_model_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Latency of individual model attempts in seconds"
    );

    describe_counter!(
        format!("{}_model_served_total", METRICS_PREFIX),
        Unit::Count,
        "Answers served, by the model that produced them"
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
}

/// Record an answered query ("completed" or "degraded")
pub fn record_query(duration_secs: f64, status: &str) {
    counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_query_duration_seconds", METRICS_PREFIX),
        "status" => status.to_string()
    )
    .record(duration_secs);
}

/// Record a finished summary, analysis or drafting task
pub fn record_task(task: &str, duration_secs: f64, status: &str) {
    counter!(
        format!("{}_tasks_total", METRICS_PREFIX),
        "task" => task.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_task_duration_seconds", METRICS_PREFIX),
        "task" => task.to_string()
    )
    .record(duration_secs);
}

pub fn record_degraded() {
    counter!(format!("{}_answers_degraded_total", METRICS_PREFIX)).increment(1);
}

/// Helper to record retrieval metrics
pub fn record_retrieval(duration_secs: f64, result_count: usize) {
    histogram!(format!("{}_retrieval_duration_seconds", METRICS_PREFIX)).record(duration_secs);
    gauge!(format!("{}_retrieval_results_count", METRICS_PREFIX)).set(result_count as f64);
}

pub fn set_index_size(fragments: usize) {
    gauge!(format!("{}_index_fragments", METRICS_PREFIX)).set(fragments as f64);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string(),
            "batch" => if batch_size > 1 { "batch" } else { "single" }
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_embedding_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

/// Record one model attempt; `outcome` is "success", "timeout", "malformed", ...
pub fn record_model_attempt(model: &str, outcome: &str, duration_secs: f64) {
    counter!(
        format!("{}_model_attempts_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_model_duration_seconds", METRICS_PREFIX),
        "model" => model.to_string()
    )
    .record(duration_secs);
}

pub fn record_served_model(model: &str) {
    counter!(
        format!("{}_model_served_total", METRICS_PREFIX),
        "model" => model.to_string()
    )
    .increment(1);
}
