//! Health reporting subsystem.
//!
//! # Data Flow
//! ```text
//! Circuit breakers (executor) + provider summary (registry)
//!     → report.rs (per-adapter health, overall status)
//!     → readiness ratio: healthy / total adapters
//!     → HTTP surface (/health/*)
//! ```
//!
//! # Design Decisions
//! - An adapter is healthy unless its circuit is open
//! - Adapters never called yet have no breaker and count as healthy
//! - No adapters at all is ready

pub mod report;

pub use report::{HealthStatus, ManagerHealth, Readiness};
