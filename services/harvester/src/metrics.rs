//! Prometheus metrics exposition
//!
//! - `gateway_requests_total` (counter): label `status`
//! - `gateway_request_duration_seconds` (histogram): label `status`
//! - `gateway_rejected_total` (counter): label `reason`
//! - `token_pool_requests_total` (counter): label `outcome`, recorded by the pool

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("gateway_request_duration_seconds".to_string()),
        DURATION_BUCKETS,
    )
}

/// Install the global Prometheus recorder and return a handle for `/metrics`.
///
/// Request durations render as a histogram (with `_bucket` lines) rather than
/// the default summary.
pub fn install_recorder() -> PrometheusHandle {
    builder()
        .expect("failed to set histogram buckets")
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a forwarded request's final status.
pub fn record_request(status: u16, duration_secs: f64) {
    let status = status.to_string();
    metrics::counter!("gateway_requests_total", "status" => status.clone()).increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "status" => status)
        .record(duration_secs);
}

/// Record a request refused before reaching upstream.
pub fn record_rejected(reason: &'static str) {
    metrics::counter!("gateway_rejected_total", "reason" => reason).increment(1);
}
