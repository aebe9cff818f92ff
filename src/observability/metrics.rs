//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define guard metrics (requests, rejections, rate limiting, conflicts)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `guardrail_requests_total` (counter): requests by route, status
//! - `guardrail_request_duration_seconds` (histogram): latency by route
//! - `guardrail_rejections_total` (counter): validator rejections by kind
//! - `guardrail_rate_limited_total` (counter): denials by scope, action
//! - `guardrail_reorder_conflicts_total` (counter)
//! - `guardrail_rate_limit_entries` (gauge): live rate limit counters
//!
//! # Design Decisions
//! - Low-overhead metric updates through the `metrics` facade; without an
//!   installed recorder every call is a no-op (tests, CLI)
//! - Labels are low-cardinality: never keys, IPs or owner ids

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(route: &str, status: u16, start: Instant) {
    metrics::counter!(
        "guardrail_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("guardrail_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rejection(kind: &'static str) {
    metrics::counter!("guardrail_rejections_total", "kind" => kind).increment(1);
}

pub fn record_rate_limited(scope: &'static str, action: &'static str) {
    metrics::counter!("guardrail_rate_limited_total", "scope" => scope, "action" => action)
        .increment(1);
}

pub fn record_reorder_conflict() {
    metrics::counter!("guardrail_reorder_conflicts_total").increment(1);
}

pub fn record_rate_limit_entries(count: usize) {
    metrics::gauge!("guardrail_rate_limit_entries").set(count as f64);
}
