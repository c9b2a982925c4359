//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (adapter calls, circuit transitions, batches)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track per-adapter and aggregate metrics
//!
//! # Metrics
//! - `adapter_calls_total` (counter): calls by adapter, outcome
//! - `adapter_call_duration_seconds` (histogram): per-call latency
//! - `circuit_transitions_total` (counter): transitions by adapter, target state
//! - `circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `adapter_batches_total` (counter): fan-out batches by strategy, outcome
//! - `adapter_batch_duration_seconds` (histogram): batch latency
//! - `adapter_cache_size` (gauge): cached instances per cache
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Labels for adapter, outcome, strategy

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_adapter_call(adapter: &str, outcome: &'static str, latency: Duration) {
    metrics::counter!(
        "adapter_calls_total",
        "adapter" => adapter.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("adapter_call_duration_seconds", "adapter" => adapter.to_string())
        .record(latency.as_secs_f64());
}

pub fn record_circuit_transition(adapter: &str, to: CircuitState) {
    metrics::counter!(
        "circuit_transitions_total",
        "adapter" => adapter.to_string(),
        "to" => to.as_str()
    )
    .increment(1);
    metrics::gauge!("circuit_state", "adapter" => adapter.to_string()).set(to.as_gauge());
}

pub fn record_batch(strategy: &'static str, outcome: &'static str, elapsed: Duration) {
    metrics::counter!("adapter_batches_total", "strategy" => strategy, "outcome" => outcome)
        .increment(1);
    metrics::histogram!("adapter_batch_duration_seconds", "strategy" => strategy)
        .record(elapsed.as_secs_f64());
}

pub fn record_cache_size(cache: &str, size: usize) {
    metrics::gauge!("adapter_cache_size", "cache" => cache.to_string()).set(size as f64);
}
