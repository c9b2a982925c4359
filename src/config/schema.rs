//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapters::ContextItem;

/// Root configuration for the retrieval gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Health/admin API listener.
    pub listener: ListenerConfig,

    /// Circuit breaking, fan-out and readiness settings.
    pub fault_tolerance: FaultToleranceConfig,

    /// Retrieval adapter definitions.
    pub adapters: Vec<AdapterConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Startup behaviour.
    pub startup: StartupConfig,
}

/// Listener configuration for the health/admin API.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Per-request timeout for API handlers in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Fault tolerance settings. There is deliberately no `enabled` switch.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FaultToleranceConfig {
    /// Per-adapter circuit breaker defaults.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Fan-out execution settings.
    pub execution: ExecutionConfig,

    /// Ready when healthy/total adapters is strictly above this ratio.
    pub readiness_threshold: f64,
}

impl Default for FaultToleranceConfig {
    fn default() -> Self {
        Self {
            circuit_breaker: CircuitBreakerConfig::default(),
            execution: ExecutionConfig::default(),
            readiness_threshold: 0.5,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Consecutive half-open successes that close the circuit.
    pub success_threshold: u32,

    /// Base recovery timeout in milliseconds.
    pub recovery_timeout_ms: u64,

    /// Ceiling for the exponential recovery backoff in milliseconds.
    pub max_recovery_timeout_ms: u64,

    /// Per-adapter call timeout in milliseconds.
    pub call_timeout_ms: u64,

    /// Trial calls allowed in flight while half-open.
    pub half_open_max_calls: u32,

    /// Grow the recovery timeout on every re-open.
    pub enable_exponential_backoff: bool,

    /// Random jitter added to the recovery timeout, as a fraction of it.
    pub recovery_jitter: f64,

    /// Retained call records per adapter.
    pub call_history_capacity: usize,

    /// Retained state transitions per adapter.
    pub transition_history_capacity: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            recovery_timeout_ms: 30_000,
            max_recovery_timeout_ms: 300_000,
            call_timeout_ms: 30_000,
            half_open_max_calls: 1,
            enable_exponential_backoff: true,
            recovery_jitter: 0.1,
            call_history_capacity: 1000,
            transition_history_capacity: 100,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    pub fn max_recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.max_recovery_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Apply per-adapter overrides on top of these defaults.
    pub fn with_overrides(&self, overrides: &BreakerOverrides) -> Self {
        let mut merged = self.clone();
        if let Some(v) = overrides.failure_threshold {
            merged.failure_threshold = v;
        }
        if let Some(v) = overrides.success_threshold {
            merged.success_threshold = v;
        }
        if let Some(v) = overrides.recovery_timeout_ms {
            merged.recovery_timeout_ms = v;
        }
        if let Some(v) = overrides.max_recovery_timeout_ms {
            merged.max_recovery_timeout_ms = v;
        }
        if let Some(v) = overrides.call_timeout_ms {
            merged.call_timeout_ms = v;
        }
        if let Some(v) = overrides.enable_exponential_backoff {
            merged.enable_exponential_backoff = v;
        }
        merged
    }
}

/// Per-adapter circuit breaker overrides; unset fields fall back to the defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerOverrides {
    pub failure_threshold: Option<u32>,
    pub success_threshold: Option<u32>,
    pub recovery_timeout_ms: Option<u64>,
    pub max_recovery_timeout_ms: Option<u64>,
    pub call_timeout_ms: Option<u64>,
    pub enable_exponential_backoff: Option<bool>,
}

/// Completion policy for a fan-out batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// Wait for every adapter.
    #[default]
    All,
    /// Return on the first success, cancelling the rest.
    FirstSuccess,
    /// Return whatever completed before the batch timeout.
    BestEffort,
}

impl ExecutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStrategy::All => "all",
            ExecutionStrategy::FirstSuccess => "first_success",
            ExecutionStrategy::BestEffort => "best_effort",
        }
    }
}

impl std::fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fan-out execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Completion strategy.
    pub strategy: ExecutionStrategy,

    /// Batch-level timeout in milliseconds.
    pub timeout_ms: u64,

    /// Maximum adapter calls in flight at once.
    pub max_concurrent_adapters: usize,

    /// How long shutdown waits for in-flight batches, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            strategy: ExecutionStrategy::All,
            timeout_ms: 35_000,
            max_concurrent_adapters: 10,
            shutdown_timeout_ms: 30_000,
        }
    }
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// A single retrieval adapter definition.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AdapterConfig {
    /// Unique adapter name used for routing and circuit breaking.
    pub name: String,

    /// Disabled adapters are skipped at load time.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Backend family and its settings.
    pub source: AdapterSource,

    /// Construction deadline in milliseconds.
    #[serde(default = "default_init_timeout_ms")]
    pub init_timeout_ms: u64,

    /// Per-adapter circuit breaker overrides.
    #[serde(default)]
    pub fault_tolerance: Option<BreakerOverrides>,
}

fn default_enabled() -> bool {
    true
}

fn default_init_timeout_ms() -> u64 {
    60_000
}

impl AdapterConfig {
    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }
}

/// Closed set of backend families.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdapterSource {
    /// Remote retrieval service reached over HTTP.
    Http(HttpSourceConfig),
    /// In-memory keyword-matched documents.
    Static(StaticSourceConfig),
}

impl AdapterSource {
    pub fn kind(&self) -> &'static str {
        match self {
            AdapterSource::Http(_) => "http",
            AdapterSource::Static(_) => "static",
        }
    }
}

/// HTTP retrieval backend settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HttpSourceConfig {
    /// Endpoint receiving `POST {query, ...}`.
    pub url: String,

    /// Optional bearer token sent with every call.
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Maximum results requested from the backend.
    #[serde(default)]
    pub top_k: Option<u32>,

    /// Extra headers sent with every call.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Static in-memory backend settings.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct StaticSourceConfig {
    /// Documents served by this adapter.
    #[serde(default)]
    pub items: Vec<ContextItem>,

    /// Maximum results per query.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize {
    10
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Require a bearer token for mutating admin actions.
    pub auth_enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            auth_enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

/// Startup behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StartupConfig {
    /// Construct every adapter before serving traffic.
    pub preload_adapters: bool,

    /// Per-adapter preload deadline in milliseconds.
    pub preload_timeout_ms: u64,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            preload_adapters: false,
            preload_timeout_ms: 30_000,
        }
    }
}

impl StartupConfig {
    pub fn preload_timeout(&self) -> Duration {
        Duration::from_millis(self.preload_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert_eq!(config.fault_tolerance.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.fault_tolerance.execution.strategy, ExecutionStrategy::All);
        assert_eq!(config.fault_tolerance.execution.max_concurrent_adapters, 10);
        assert!((config.fault_tolerance.readiness_threshold - 0.5).abs() < f64::EPSILON);
        assert!(config.adapters.is_empty());
    }

    #[test]
    fn test_adapter_sources_parse() {
        let raw = r#"
            [fault_tolerance.execution]
            strategy = "first_success"

            [[adapters]]
            name = "docs"
            source = { type = "http", url = "http://127.0.0.1:9000/search", top_k = 5 }

            [[adapters]]
            name = "faq"
            enabled = false
            source = { type = "static", items = [{ content = "opening hours" }] }
            fault_tolerance = { failure_threshold = 2 }
        "#;
        let config: GatewayConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.fault_tolerance.execution.strategy, ExecutionStrategy::FirstSuccess);
        assert_eq!(config.adapters.len(), 2);
        assert_eq!(config.adapters[0].source.kind(), "http");
        assert!(!config.adapters[1].enabled);
        assert_eq!(
            config.adapters[1].fault_tolerance.as_ref().and_then(|o| o.failure_threshold),
            Some(2)
        );
    }

    #[test]
    fn test_overrides_merge() {
        let base = CircuitBreakerConfig::default();
        let merged = base.with_overrides(&BreakerOverrides {
            call_timeout_ms: Some(250),
            success_threshold: Some(1),
            ..Default::default()
        });
        assert_eq!(merged.call_timeout(), Duration::from_millis(250));
        assert_eq!(merged.success_threshold, 1);
        assert_eq!(merged.failure_threshold, base.failure_threshold);
    }
}
