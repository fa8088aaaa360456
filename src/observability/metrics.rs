//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by method and status
//! - `http_request_duration_seconds` (histogram): end-to-end latency
//! - `pipeline_results_total` (counter): final pipeline label by pipeline
//! - `filter_results_total` (counter): non-empty labels by filter and kind
//! - `time_limiter_timeouts_total` (counter): deadlines hit, by filter and rule
//!
//! # Design Decisions
//! - Prometheus exporter serves its own listener, separate from traffic
//! - Empty labels are not counted per filter; they are the common case

use std::net::SocketAddr;
use std::time::Instant;

use ::metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("http_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_pipeline_result(pipeline: &str, label: &str) {
    counter!(
        "pipeline_results_total",
        "pipeline" => pipeline.to_string(),
        "result" => label.to_string()
    )
    .increment(1);
}

pub fn record_filter_result(pipeline: &str, filter: &str, kind: &str, label: &str) {
    if label.is_empty() {
        return;
    }
    counter!(
        "filter_results_total",
        "pipeline" => pipeline.to_string(),
        "filter" => filter.to_string(),
        "kind" => kind.to_string(),
        "result" => label.to_string()
    )
    .increment(1);
}

pub fn record_timeout(filter: &str, rule: &str) {
    counter!(
        "time_limiter_timeouts_total",
        "filter" => filter.to_string(),
        "rule" => rule.to_string()
    )
    .increment(1);
}
