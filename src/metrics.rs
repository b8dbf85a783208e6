/// Metrics for the authentication gate
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - Cache lookups per tier and outcome
/// - Authoritative store lookups
/// - Authentication outcomes by rejection reason
/// - Lockouts and decay sweeps
/// - HTTP requests

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // ========== Session cache ==========

    /// Cache lookups by tier (combined, validity, snapshot) and outcome
    pub static ref CACHE_LOOKUPS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "authgate_cache_lookups_total",
        "Session cache lookups by tier and outcome",
        &["tier", "outcome"]
    )
    .unwrap();

    /// Cache writes that failed and were swallowed
    pub static ref CACHE_WRITE_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "authgate_cache_write_failures_total",
        "Failed fire-and-forget cache writes by tier",
        &["tier"]
    )
    .unwrap();

    // ========== Store ==========

    /// Session store lookups by outcome
    pub static ref STORE_LOOKUPS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "authgate_store_lookups_total",
        "Authoritative session lookups by outcome",
        &["outcome"]
    )
    .unwrap();

    // ========== Authentication ==========

    /// Authentication attempts by outcome
    pub static ref AUTH_OUTCOMES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "authgate_authentications_total",
        "Authentication attempts by outcome",
        &["outcome"]
    )
    .unwrap();

    /// Sessions currently held in the activity debounce map
    pub static ref ACTIVITY_TRACKED_SESSIONS: IntGauge = register_int_gauge!(
        "authgate_activity_tracked_sessions",
        "Sessions in the activity debounce map"
    )
    .unwrap();

    // ========== Lockout ==========

    /// Lockouts applied after failed logins
    pub static ref LOCKOUTS_APPLIED_TOTAL: IntCounter = register_int_counter!(
        "authgate_lockouts_applied_total",
        "Account lockouts applied"
    )
    .unwrap();

    /// Failure counts decremented by the decay sweep
    pub static ref DECAY_DECREMENTS_TOTAL: IntCounter = register_int_counter!(
        "authgate_decay_decrements_total",
        "Failed-login counters decremented by decay sweeps"
    )
    .unwrap();

    // ========== HTTP ==========

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "authgate_http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path", "status"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record a cache tier lookup
pub fn record_cache_lookup(tier: &str, outcome: &str) {
    CACHE_LOOKUPS_TOTAL.with_label_values(&[tier, outcome]).inc();
}

/// Record a swallowed cache write failure
pub fn record_cache_write_failure(tier: &str) {
    CACHE_WRITE_FAILURES_TOTAL.with_label_values(&[tier]).inc();
}

/// Record a store lookup
pub fn record_store_lookup(outcome: &str) {
    STORE_LOOKUPS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record an authentication outcome
pub fn record_auth_outcome(outcome: &str) {
    AUTH_OUTCOMES_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path, &status.to_string()])
        .observe(duration);
}
