//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): inbound requests by method, status
//! - `proxy_request_duration_seconds` (histogram): inbound latency
//! - `hedge_attempts_total` (counter): attempts by outcome (won, discarded, failed)
//! - `hedge_attempt_duration_seconds` (histogram): upstream attempt latency
//! - `hedge_groups_created_total` (counter): race groups opened
//! - `hedge_groups_completed_total` (counter): race groups closed, by result
//! - `hedge_groups_active` (gauge): race groups currently open
//! - `hedge_waiters_resolved_total` (counter): callers answered by a group outcome
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so the hedging core
//!   records unconditionally and tests need no setup

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed inbound request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

/// Record the fate of one upstream attempt.
pub fn record_attempt(outcome: &'static str) {
    counter!("hedge_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_attempt_duration(start: Instant) {
    histogram!("hedge_attempt_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_group_created() {
    counter!("hedge_groups_created_total").increment(1);
    gauge!("hedge_groups_active").increment(1.0);
}

/// Record a race group outcome and the number of waiters it answered.
pub fn record_group_completed(result: &'static str, waiters: usize) {
    counter!("hedge_groups_completed_total", "result" => result).increment(1);
    counter!("hedge_waiters_resolved_total").increment(waiters as u64);
    gauge!("hedge_groups_active").decrement(1.0);
}
