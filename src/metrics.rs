//! Metrics and telemetry for the DAU pipeline
//!
//! Prometheus metrics for chunk execution, session acquisition and per-day
//! outcomes.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Encoder,
    Histogram, TextEncoder,
};

lazy_static! {
    /// Executed chunks by outcome
    pub static ref CHUNKS_TOTAL: CounterVec = register_counter_vec!(
        "dau_chunks_executed_total",
        "Total chunks executed against the store",
        &["status"]
    ).unwrap();

    /// Statements executed in successful chunks
    pub static ref STATEMENTS_TOTAL: Counter = register_counter!(
        "dau_statements_executed_total",
        "Total bound statements executed successfully"
    ).unwrap();

    /// Chunk execution latency
    pub static ref CHUNK_DURATION: Histogram = register_histogram!(
        "dau_chunk_duration_seconds",
        "Chunk execution latency in seconds",
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();

    /// Executions of an empty statement set
    pub static ref EMPTY_REQUESTS_TOTAL: Counter = register_counter!(
        "dau_empty_requests_total",
        "Executions requested with no bound statements"
    ).unwrap();

    /// Day pipelines by outcome
    pub static ref DAYS_TOTAL: CounterVec = register_counter_vec!(
        "dau_days_total",
        "Day pipelines completed",
        &["status"]
    ).unwrap();

    /// Session acquisitions by outcome
    pub static ref SESSIONS_TOTAL: CounterVec = register_counter_vec!(
        "dau_sessions_acquired_total",
        "Session acquisitions from the pool",
        &["status"]
    ).unwrap();
}

/// Force registration of all metrics
pub fn init() {
    lazy_static::initialize(&CHUNKS_TOTAL);
    lazy_static::initialize(&STATEMENTS_TOTAL);
    lazy_static::initialize(&CHUNK_DURATION);
    lazy_static::initialize(&EMPTY_REQUESTS_TOTAL);
    lazy_static::initialize(&DAYS_TOTAL);
    lazy_static::initialize(&SESSIONS_TOTAL);
}

/// Record a finished chunk
pub fn record_chunk(success: bool, statements: usize, seconds: f64) {
    let status = if success { "ok" } else { "error" };
    CHUNKS_TOTAL.with_label_values(&[status]).inc();
    CHUNK_DURATION.observe(seconds);
    if success {
        STATEMENTS_TOTAL.inc_by(statements as f64);
    }
}

/// Record an execution of an empty statement set
pub fn record_empty_request() {
    EMPTY_REQUESTS_TOTAL.inc();
}

/// Record a finished day pipeline
pub fn record_day(success: bool) {
    let status = if success { "ok" } else { "error" };
    DAYS_TOTAL.with_label_values(&[status]).inc();
}

/// Record a session acquisition attempt
pub fn record_session(success: bool) {
    let status = if success { "ok" } else { "error" };
    SESSIONS_TOTAL.with_label_values(&[status]).inc();
}

/// Render all registered metrics in the Prometheus text format
pub fn gather_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| format!("Metrics are not UTF-8: {}", e))
}
