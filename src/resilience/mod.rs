//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to adapter:
//!     → circuit_breaker.rs (gate: may this adapter be called now?)
//!     → executor enforces the per-call timeout
//!     → circuit_breaker.rs (record success / failure / timeout)
//!         → history.rs (bounded call and transition log)
//!         → events.rs (log + metrics on state change)
//!     → backoff.rs (recovery timeout grows on every re-open)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every adapter call has a deadline
//! - No retries inside a call; the breaker only decides whether to attempt it
//! - Circuit breaker prevents a failing adapter from absorbing capacity
//! - Breaker state is process-local

pub mod backoff;
pub mod circuit_breaker;
pub mod events;
pub mod history;

pub use circuit_breaker::{
    BreakerHistory, BreakerSnapshot, CallPermit, CircuitBreaker, CircuitBreakerStats, CircuitState,
};
pub use events::{CircuitEventHandler, CompositeEventHandler, LoggingEventHandler, MetricsEventHandler};
