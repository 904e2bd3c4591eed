//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by protocol, status
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency by protocol
//! - `gateway_upstream_attempts_total` (counter): outbound attempts by outcome
//! - `gateway_cache_events_total` (counter): hit, miss, bypass, store, errors
//! - `gateway_registry_auth_total` (counter): registry token flow transitions
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until a
//!   recorder is installed, so tests need no setup
//! - Prometheus exposition only when enabled in config

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

const LATENCY_BUCKETS: &[f64] = &[0.005, 0.025, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Install the Prometheus recorder with an HTTP scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets(LATENCY_BUCKETS)?
        .install()?;

    describe_counter!("gateway_requests_total", "Requests handled, by protocol and status");
    describe_histogram!(
        "gateway_request_duration_seconds",
        "End-to-end request latency in seconds"
    );
    describe_counter!("gateway_upstream_attempts_total", "Outbound attempts by outcome");
    describe_counter!("gateway_cache_events_total", "Cache events by kind");
    describe_counter!("gateway_registry_auth_total", "Registry auth state transitions");

    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(protocol: &'static str, status: u16, start: Instant) {
    counter!("gateway_requests_total", "protocol" => protocol, "status" => status.to_string())
        .increment(1);
    histogram!("gateway_request_duration_seconds", "protocol" => protocol)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_attempt(outcome: &'static str) {
    counter!("gateway_upstream_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_cache_event(event: &'static str) {
    counter!("gateway_cache_events_total", "event" => event).increment(1);
}

pub fn record_registry_auth(state: &'static str) {
    counter!("gateway_registry_auth_total", "state" => state).increment(1);
}
