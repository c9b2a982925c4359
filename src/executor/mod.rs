//! Parallel adapter execution subsystem.
//!
//! # Data Flow
//! ```text
//! execute_adapters(query, names)
//!     → one unit of work per name (FuturesUnordered)
//!         → circuit breaker gate (fail fast when open)
//!         → concurrency slot (Semaphore, max_concurrent_adapters)
//!         → resolve adapter + retrieve under call_timeout
//!         → record outcome on the breaker
//!     → strategy: all | first_success | best_effort, bounded by the batch timeout
//!     → Vec<AdapterResult>
//!     → combine_results (successes only, adapter order)
//! ```
//!
//! # Design Decisions
//! - Per-adapter failures become results; only a batch timeout is an error
//! - Cancellation is by drop and is never recorded on a breaker
//! - Results arrive in completion order; combination restores adapter order

pub mod context;
pub mod parallel;
pub mod result;

pub use context::ExecutionContext;
pub use parallel::{AdapterMemory, ExecutorHealth, MemoryUsage, ParallelAdapterExecutor, ShutdownStatus};
pub use result::{AdapterFailure, AdapterOutcome, AdapterResult, ExecutorError};
