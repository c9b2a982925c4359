//! Retrieval adapter subsystem.
//!
//! # Data Flow
//! ```text
//! adapter name
//!     → registry.rs (definition lookup, claim-once construction, cache)
//!     → AdapterFactory (http.rs | static_source.rs)
//!     → Arc<dyn Adapter> handed to the executor
//! ```
//!
//! # Design Decisions
//! - One trait, one method that matters: bounded-time `retrieve`
//! - Backend families are a closed set selected by `source.type`
//! - Teardown is a separate trait so caches can close any value they hold

pub mod http;
pub mod registry;
pub mod static_source;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::executor::context::ExecutionContext;

pub use http::HttpAdapter;
pub use registry::{AdapterFactory, AdapterRegistry, PreloadOutcome, ReloadSummary, SourceFactory};
pub use static_source::StaticAdapter;

/// A single retrieved document or record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub content: String,

    #[serde(default)]
    pub metadata: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    /// Backend-specific fields, preserved as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContextItem {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Map::new(),
            score: None,
            extra: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Per-call options handed to every adapter.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOptions {
    pub context: ExecutionContext,

    /// Free-form options forwarded to the backend.
    pub extra: Map<String, Value>,
}

impl RetrievalOptions {
    pub fn new(context: ExecutionContext) -> Self {
        Self {
            context,
            extra: Map::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Errors raised by adapters and the provisioning layer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdapterError {
    #[error("backend request failed: {0}")]
    Backend(String),

    #[error("invalid backend response: {0}")]
    InvalidResponse(String),

    #[error("unknown adapter '{0}'")]
    Unknown(String),

    #[error("failed to construct adapter '{name}': {reason}")]
    Construction { name: String, reason: String },

    #[error("adapter '{name}' initialization timed out after {timeout_ms}ms")]
    InitTimeout { name: String, timeout_ms: u64 },

    #[error("adapter registry is closed")]
    Closed,
}

/// Release resources held by a long-lived instance.
#[async_trait]
pub trait Teardown: Send + Sync {
    async fn close(&self) {}
}

#[async_trait]
impl<T: Teardown + ?Sized> Teardown for Arc<T> {
    async fn close(&self) {
        (**self).close().await
    }
}

/// A pluggable retrieval backend.
#[async_trait]
pub trait Adapter: Teardown {
    fn name(&self) -> &str;

    /// Backend family, used in health output.
    fn kind(&self) -> &'static str {
        "custom"
    }

    async fn retrieve(
        &self,
        query: &str,
        options: &RetrievalOptions,
    ) -> Result<Vec<ContextItem>, AdapterError>;
}

/// Availability summary of a provider, merged into health output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProviderSummary {
    pub available_adapters: Vec<String>,
    pub cached_adapters: Vec<String>,
    pub initializing_adapters: Vec<String>,
    pub disabled_adapters: usize,
}

/// Resolves adapter names to live instances.
#[async_trait]
pub trait AdapterProvider: Send + Sync {
    /// Names of every adapter this provider can build, in configuration order.
    fn get_available_adapters(&self) -> Vec<String>;

    /// Resolve a name, constructing the adapter on first use.
    async fn get_adapter(&self, name: &str) -> Result<Arc<dyn Adapter>, AdapterError>;

    /// Names of adapters already constructed.
    fn get_cached_adapters(&self) -> Vec<String>;

    fn describe(&self) -> ProviderSummary {
        ProviderSummary {
            available_adapters: self.get_available_adapters(),
            cached_adapters: self.get_cached_adapters(),
            ..Default::default()
        }
    }

    /// Close every cached adapter.
    async fn close(&self) {}
}
