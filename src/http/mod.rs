//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace, timeout)
//!     → admin routes (/health/*)
//!     → FaultTolerantAdapterManager
//! ```

pub mod server;

pub use server::{AppState, HttpServer, X_REQUEST_ID};
