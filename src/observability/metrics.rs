//! Metrics collection and exposition.
//!
//! # Metrics
//! - `resilience_retry_attempts_total` (counter): attempts started by retry executors
//! - `resilience_retry_exhausted_total` (counter): operations that ran out of attempts
//! - `resilience_circuit_transitions_total` (counter): breaker transitions by breaker, from, to
//! - `resilience_circuit_rejections_total` (counter): calls refused by a breaker, by reason
//! - `resilience_reported_errors_total` (counter): reports received by the degradation controller
//! - `resilience_emergency_mode` (gauge): 1=degraded, 0=normal
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup
//! - Prometheus exporter is opt-in from the binary

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_retry_attempt(attempt: u32) {
    let kind = if attempt <= 1 { "initial" } else { "retry" };
    metrics::counter!("resilience_retry_attempts_total", "kind" => kind).increment(1);
}

pub fn record_retry_exhausted() {
    metrics::counter!("resilience_retry_exhausted_total").increment(1);
}

pub fn record_circuit_transition(breaker: &str, from: &'static str, to: &'static str) {
    metrics::counter!(
        "resilience_circuit_transitions_total",
        "breaker" => breaker.to_string(),
        "from" => from,
        "to" => to
    )
    .increment(1);
}

pub fn record_circuit_rejection(breaker: &str, reason: &'static str) {
    metrics::counter!(
        "resilience_circuit_rejections_total",
        "breaker" => breaker.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_reported_error() {
    metrics::counter!("resilience_reported_errors_total").increment(1);
}

pub fn record_emergency_mode(active: bool) {
    metrics::gauge!("resilience_emergency_mode").set(if active { 1.0 } else { 0.0 });
}
