//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On reload signal:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → adapter registry swaps its definitions
//!     → cached adapters whose definition changed are closed and rebuilt lazily
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Breaker and execution settings are read once at startup; reload only touches adapters

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdapterConfig, AdapterSource, BreakerOverrides, CircuitBreakerConfig, ExecutionConfig,
    ExecutionStrategy, FaultToleranceConfig, GatewayConfig, HttpSourceConfig, ListenerConfig,
    StaticSourceConfig,
};
