//! Circuit state change hooks.

use std::sync::Arc;

use crate::observability::metrics;
use crate::resilience::circuit_breaker::{BreakerSnapshot, CircuitState};

/// Observer of circuit transitions. Called after the breaker lock is released.
pub trait CircuitEventHandler: Send + Sync {
    fn on_open(&self, _snapshot: &BreakerSnapshot, _reason: &str) {}
    fn on_close(&self, _snapshot: &BreakerSnapshot) {}
    fn on_half_open(&self, _snapshot: &BreakerSnapshot) {}
    fn on_reset(&self, _snapshot: &BreakerSnapshot) {}
}

/// Logs every transition through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEventHandler;

impl CircuitEventHandler for LoggingEventHandler {
    fn on_open(&self, snapshot: &BreakerSnapshot, reason: &str) {
        tracing::warn!(
            adapter = %snapshot.name,
            reason = %reason,
            consecutive_failures = snapshot.stats.consecutive_failures,
            retry_in_ms = snapshot.current_recovery_timeout_ms,
            open_count = snapshot.open_count,
            "Circuit opened"
        );
    }

    fn on_close(&self, snapshot: &BreakerSnapshot) {
        tracing::info!(
            adapter = %snapshot.name,
            consecutive_successes = snapshot.stats.consecutive_successes,
            "Circuit closed"
        );
    }

    fn on_half_open(&self, snapshot: &BreakerSnapshot) {
        tracing::info!(adapter = %snapshot.name, "Circuit half-open, allowing trial calls");
    }

    fn on_reset(&self, snapshot: &BreakerSnapshot) {
        tracing::info!(adapter = %snapshot.name, "Circuit manually reset");
    }
}

/// Feeds transition counters and the state gauge.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsEventHandler;

impl CircuitEventHandler for MetricsEventHandler {
    fn on_open(&self, snapshot: &BreakerSnapshot, _reason: &str) {
        metrics::record_circuit_transition(&snapshot.name, CircuitState::Open);
    }

    fn on_close(&self, snapshot: &BreakerSnapshot) {
        metrics::record_circuit_transition(&snapshot.name, CircuitState::Closed);
    }

    fn on_half_open(&self, snapshot: &BreakerSnapshot) {
        metrics::record_circuit_transition(&snapshot.name, CircuitState::HalfOpen);
    }

    fn on_reset(&self, snapshot: &BreakerSnapshot) {
        metrics::record_circuit_transition(&snapshot.name, CircuitState::Closed);
    }
}

/// Fans every event out to a list of handlers, in order.
#[derive(Clone, Default)]
pub struct CompositeEventHandler {
    handlers: Vec<Arc<dyn CircuitEventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handler: Arc<dyn CircuitEventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Logging plus metrics.
    pub fn standard() -> Self {
        Self::new()
            .with(Arc::new(LoggingEventHandler))
            .with(Arc::new(MetricsEventHandler))
    }
}

impl CircuitEventHandler for CompositeEventHandler {
    fn on_open(&self, snapshot: &BreakerSnapshot, reason: &str) {
        self.handlers.iter().for_each(|h| h.on_open(snapshot, reason));
    }

    fn on_close(&self, snapshot: &BreakerSnapshot) {
        self.handlers.iter().for_each(|h| h.on_close(snapshot));
    }

    fn on_half_open(&self, snapshot: &BreakerSnapshot) {
        self.handlers.iter().for_each(|h| h.on_half_open(snapshot));
    }

    fn on_reset(&self, snapshot: &BreakerSnapshot) {
        self.handlers.iter().for_each(|h| h.on_reset(snapshot));
    }
}
