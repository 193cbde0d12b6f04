//! Prometheus metrics exposition
//!
//! The credential engine records its own metrics through the `metrics`
//! facade. This module installs the exporter and adds the service's:
//!
//! - `viewer_link_requests_total` (counter): labels `route`, `status`
//! - `viewer_link_request_duration_seconds` (histogram): label `route`
//! - `viewer_link_published_total` (counter)
//! - `viewer_link_expiry_timestamp_seconds` (gauge): wall-clock expiry of the published link

use std::time::SystemTime;

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Bucket boundaries from 1ms to 30s. `/rotate` may wait on STS with retries.
const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("viewer_link_request_duration_seconds".to_string()),
        DURATION_BUCKETS,
    )
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Must run before the engine starts so the startup rotation is counted.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record a handled HTTP request.
pub fn record_request(route: &'static str, status: u16, duration_secs: f64) {
    metrics::counter!(
        "viewer_link_requests_total",
        "route" => route,
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("viewer_link_request_duration_seconds", "route" => route)
        .record(duration_secs);
}

/// Record a newly published join link expiring at `expires_at`.
pub fn record_link_published(expires_at: SystemTime) {
    metrics::counter!("viewer_link_published_total").increment(1);
    let expiry = expires_at
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    metrics::gauge!("viewer_link_expiry_timestamp_seconds").set(expiry);
}
