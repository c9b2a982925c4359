//! Claim-once caching of expensive service instances.
//!
//! # Data Flow
//! ```text
//! caller wants key K
//!     → get(K) hit? return
//!     → claim_initialization(K)
//!         won  → construct → put(K, v) → release_initialization(K)
//!         lost → poll get(K) / is_initializing(K) (caller's policy)
//! ```
//!
//! # Design Decisions
//! - One mutex guards both the entries and the initializing set
//! - A key is never cached and initializing at the same instant
//! - Claims never block; waiting is the caller's concern

pub mod manager;

pub use manager::CacheManager;
