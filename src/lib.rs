//! Fault-tolerant retrieval gateway library.
//!
//! Fans a query out to named retrieval adapters behind per-adapter circuit
//! breakers, bounded call timeouts and a concurrency ceiling, and exposes the
//! resulting health over a small HTTP surface.

pub mod adapters;
pub mod admin;
pub mod cache;
pub mod config;
pub mod executor;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod manager;
pub mod observability;
pub mod resilience;

pub use adapters::{Adapter, AdapterProvider, AdapterRegistry, ContextItem, RetrievalOptions};
pub use cache::CacheManager;
pub use config::schema::GatewayConfig;
pub use executor::{AdapterResult, ExecutionContext, ParallelAdapterExecutor};
pub use http::HttpServer;
pub use lifecycle::{Gateway, Shutdown};
pub use manager::FaultTolerantAdapterManager;
pub use resilience::{CircuitBreaker, CircuitState};
