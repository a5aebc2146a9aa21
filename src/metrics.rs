use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Histogram, TextEncoder, register_counter, register_counter_vec,
    register_histogram,
};


lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("docshrink_requests_total", "Total number of compression requests").unwrap();
    pub static ref RATE_LIMITED: Counter =
        register_counter!("docshrink_rate_limited_total", "Requests refused by the rate limiter").unwrap();
    pub static ref QUOTA_REJECTIONS: Counter =
        register_counter!("docshrink_quota_rejections_total", "Requests refused for an exhausted daily quota").unwrap();
    pub static ref COMPRESSIONS: CounterVec = register_counter_vec!(
        "docshrink_compressions_total",
        "Completed compressions by execution path",
        &["path"]
    )
    .unwrap();
    pub static ref BYTES_SAVED: Counter =
        register_counter!("docshrink_bytes_saved_total", "Bytes removed by compression").unwrap();
    pub static ref COMPRESSION_LATENCY: Histogram = register_histogram!(
        "docshrink_compression_latency_seconds",
        "Compression latency in seconds"
    )
    .unwrap();
    pub static ref ENTITLEMENTS_GRANTED: Counter =
        register_counter!("docshrink_entitlements_granted_total", "Successful payment verifications").unwrap();
    pub static ref SIGNATURE_REJECTIONS: Counter =
        register_counter!("docshrink_signature_rejections_total", "Payment verifications with a bad signature").unwrap();
}

// Prometheus text exposition of every registered metric
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "metrics encoding failed");
    }
    String::from_utf8(buffer).unwrap_or_default()
}
