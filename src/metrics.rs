//! Prometheus metrics for the gateway.
//!
//! This module owns the recorder installation (a process-global Prometheus
//! recorder from `metrics-exporter-prometheus`) and a small set of helper
//! functions and RAII timers wrapping the `metrics` crate macros. The
//! rendered exposition is served by the `/metrics` endpoint.
//!
//! Provided metrics (labels vary by family):
//! * `fcg_http_requests_total` (counter, labels: service, method, status)
//! * `fcg_http_request_duration_seconds` (histogram, labels: service, method)
//! * `fcg_http_requests_in_flight` (gauge)
//! * `fcg_upstream_requests_total` (counter, labels: cluster, destination, status)
//! * `fcg_upstream_request_duration_seconds` (histogram, labels: cluster, destination)
//! * `fcg_destination_health_status` (gauge per destination)
//!
//! Every HTTP-level family carries a constant `service` label so that
//! aggregated dashboards can tell gateway traffic apart from backends.
//!
//! The `*Timer` structs leverage `Drop` to record durations safely even when
//! early returns or errors occur.
use std::time::Instant;

use eyre::{Result, eyre};
use metrics::{
    Unit, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::config::SERVICE_NAME;

pub const FCG_HTTP_REQUESTS_TOTAL: &str = "fcg_http_requests_total";
pub const FCG_HTTP_REQUEST_DURATION_SECONDS: &str = "fcg_http_request_duration_seconds";
pub const FCG_HTTP_REQUESTS_IN_FLIGHT: &str = "fcg_http_requests_in_flight";
pub const FCG_UPSTREAM_REQUESTS_TOTAL: &str = "fcg_upstream_requests_total";
pub const FCG_UPSTREAM_REQUEST_DURATION_SECONDS: &str = "fcg_upstream_request_duration_seconds";
pub const FCG_DESTINATION_HEALTH_STATUS: &str = "fcg_destination_health_status";

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the process-global Prometheus recorder and return a handle for
/// rendering the exposition. Idempotent: repeated calls return the same
/// handle, which keeps tests and embedders safe.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PROMETHEUS_HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| eyre!("Failed to install Prometheus recorder: {e}"))?;
        describe_metrics();
        Ok::<_, eyre::Report>(handle)
    })?;
    Ok(handle.clone())
}

fn describe_metrics() {
    describe_counter!(
        FCG_HTTP_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of HTTP requests processed by the gateway."
    );
    describe_histogram!(
        FCG_HTTP_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of HTTP requests processed by the gateway."
    );
    describe_gauge!(
        FCG_HTTP_REQUESTS_IN_FLIGHT,
        "Number of HTTP requests currently being processed."
    );
    describe_counter!(
        FCG_UPSTREAM_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of HTTP requests forwarded to cluster destinations."
    );
    describe_histogram!(
        FCG_UPSTREAM_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of HTTP requests forwarded to cluster destinations."
    );
    describe_gauge!(
        FCG_DESTINATION_HEALTH_STATUS,
        "Health status of individual destinations (1 for healthy, 0 for unhealthy)."
    );
}

/// Increment the total request counter for an inbound gateway request.
pub fn increment_http_request(method: &str, status: u16) {
    counter!(
        FCG_HTTP_REQUESTS_TOTAL,
        "service" => SERVICE_NAME,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a completed inbound request's duration.
pub fn record_http_request_duration(method: &str, duration: std::time::Duration) {
    histogram!(
        FCG_HTTP_REQUEST_DURATION_SECONDS,
        "service" => SERVICE_NAME,
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Adjust the in-flight request gauge by the given delta.
pub fn adjust_requests_in_flight(delta: f64) {
    gauge!(FCG_HTTP_REQUESTS_IN_FLIGHT).increment(delta);
}

/// Increment total count of requests forwarded to a destination.
pub fn increment_upstream_request(cluster: &str, destination: &str, status: u16) {
    counter!(
        FCG_UPSTREAM_REQUESTS_TOTAL,
        "cluster" => cluster.to_string(),
        "destination" => destination.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a completed upstream request duration.
pub fn record_upstream_request_duration(
    cluster: &str,
    destination: &str,
    duration: std::time::Duration,
) {
    histogram!(
        FCG_UPSTREAM_REQUEST_DURATION_SECONDS,
        "cluster" => cluster.to_string(),
        "destination" => destination.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Set (and record) the health status gauge for a destination.
pub fn set_destination_health(cluster: &str, destination: &str, is_healthy: bool) {
    let health_value = if is_healthy { 1.0 } else { 0.0 };
    gauge!(
        FCG_DESTINATION_HEALTH_STATUS,
        "cluster" => cluster.to_string(),
        "destination" => destination.to_string()
    )
    .set(health_value);
}

/// RAII helper measuring inbound request duration.
pub struct RequestTimer {
    start: Instant,
    method: String,
}

impl RequestTimer {
    pub fn new(method: &str) -> Self {
        Self {
            start: Instant::now(),
            method: method.to_string(),
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        record_http_request_duration(&self.method, self.start.elapsed());
    }
}

/// RAII helper measuring upstream request duration.
pub struct UpstreamTimer {
    start: Instant,
    cluster: String,
    destination: String,
}

impl UpstreamTimer {
    pub fn new(cluster: &str, destination: &str) -> Self {
        Self {
            start: Instant::now(),
            cluster: cluster.to_string(),
            destination: destination.to_string(),
        }
    }
}

impl Drop for UpstreamTimer {
    fn drop(&mut self) {
        record_upstream_request_duration(&self.cluster, &self.destination, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_recorder_is_idempotent() {
        let first = install_recorder();
        let second = install_recorder();
        assert!(first.is_ok());
        assert!(second.is_ok());
    }

    #[test]
    fn test_render_contains_recorded_family() {
        let handle = install_recorder().unwrap();
        increment_http_request("GET", 200);
        let rendered = handle.render();
        assert!(rendered.contains(FCG_HTTP_REQUESTS_TOTAL));
        assert!(rendered.contains("service=\"fcg-gateway\""));
    }

    #[test]
    fn test_request_timer_records_on_drop() {
        let _ = install_recorder();
        let timer = RequestTimer::new("GET");
        drop(timer);
    }

    #[test]
    fn test_upstream_timer_records_on_drop() {
        let _ = install_recorder();
        let timer = UpstreamTimer::new("games", "http://games:8080");
        drop(timer);
    }
}
