use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, TextEncoder, register_counter,
    register_counter_vec, register_gauge, register_histogram,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("clinic_requests_total", "Total number of API requests").unwrap();
    pub static ref RATE_LIMITED_TOTAL: Counter = register_counter!(
        "clinic_rate_limited_total",
        "Requests rejected by the rate limiter"
    )
    .unwrap();
    pub static ref AUTH_FAILURES: Counter = register_counter!(
        "clinic_auth_failures_total",
        "Admin requests rejected for a bad or missing key"
    )
    .unwrap();
    pub static ref WEBHOOK_REJECTED: Counter = register_counter!(
        "clinic_webhook_rejected_total",
        "Webhooks rejected for a missing or invalid signature"
    )
    .unwrap();
    pub static ref AI_FALLBACKS: CounterVec = register_counter_vec!(
        "clinic_ai_fallbacks_total",
        "Assistant answers produced by the keyword fallback",
        &["operation"]
    )
    .unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "clinic_request_latency_seconds",
        "Assistant request latency in seconds"
    )
    .unwrap();
    pub static ref RATE_LIMIT_ENTRIES: Gauge = register_gauge!(
        "clinic_rate_limit_entries",
        "Current number of buckets in the rate limit table"
    )
    .unwrap();
}

/// Render the default registry in the Prometheus text format.
pub fn render() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("encode error: {}", e))?;
    String::from_utf8(buffer).map_err(|e| format!("utf8 error: {}", e))
}
