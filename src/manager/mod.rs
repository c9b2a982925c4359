//! Fault-tolerant retrieval surface.
//!
//! # Data Flow
//! ```text
//! get_relevant_context(query, names?)
//!     → names or every available adapter
//!     → ParallelAdapterExecutor (breakers, timeouts, strategy)
//!     → combine_results (adapter order, source annotations)
//!
//! Degraded mode (executor could not be built):
//!     → first target adapter only, called directly under its call timeout
//! ```
//!
//! # Design Decisions
//! - Fault tolerance cannot be switched off, only tuned
//! - Degraded mode is logged at construction and reported in health

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::adapters::{Adapter, AdapterError, AdapterProvider, ContextItem, RetrievalOptions};
use crate::config::schema::{CircuitBreakerConfig, GatewayConfig};
use crate::executor::{AdapterFailure, AdapterResult, ExecutorError, ParallelAdapterExecutor};
use crate::health::{HealthStatus, ManagerHealth, Readiness};
use crate::resilience::{BreakerHistory, CircuitState};

/// Result of an operator reset request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetOutcome {
    Reset,
    UnknownAdapter,
    ExecutorUnavailable,
}

/// Result of a history lookup.
#[derive(Debug, Clone)]
pub enum HistoryLookup {
    Found(BreakerHistory),
    UnknownAdapter,
    ExecutorUnavailable,
}

pub struct FaultTolerantAdapterManager {
    provider: Arc<dyn AdapterProvider>,
    executor: Option<ParallelAdapterExecutor>,
    degraded_reason: Option<String>,
    degraded_call_timeout: Duration,
    readiness_threshold: f64,
}

impl FaultTolerantAdapterManager {
    /// Build the manager. An executor construction failure is not fatal: the
    /// manager starts in degraded mode instead.
    pub fn new(provider: Arc<dyn AdapterProvider>, config: &GatewayConfig) -> Self {
        let ft = &config.fault_tolerance;
        match ParallelAdapterExecutor::new(Arc::clone(&provider), ft, &config.adapters) {
            Ok(executor) => {
                tracing::info!(
                    failure_threshold = ft.circuit_breaker.failure_threshold,
                    success_threshold = ft.circuit_breaker.success_threshold,
                    recovery_timeout_ms = ft.circuit_breaker.recovery_timeout_ms,
                    call_timeout_ms = ft.circuit_breaker.call_timeout_ms,
                    strategy = %ft.execution.strategy,
                    max_concurrent_adapters = ft.execution.max_concurrent_adapters,
                    "Fault-tolerant adapter manager initialized"
                );
                Self::with_executor(provider, executor, ft.readiness_threshold)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Executor unavailable, falling back to direct adapter access without circuit breaking"
                );
                Self {
                    provider,
                    executor: None,
                    degraded_reason: Some(e.to_string()),
                    degraded_call_timeout: degraded_timeout(&ft.circuit_breaker),
                    readiness_threshold: ft.readiness_threshold,
                }
            }
        }
    }

    pub fn with_executor(
        provider: Arc<dyn AdapterProvider>,
        executor: ParallelAdapterExecutor,
        readiness_threshold: f64,
    ) -> Self {
        let degraded_call_timeout = executor.default_breaker_config().call_timeout();
        Self {
            provider,
            executor: Some(executor),
            degraded_reason: None,
            degraded_call_timeout,
            readiness_threshold,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.executor.is_none()
    }

    pub fn executor(&self) -> Option<&ParallelAdapterExecutor> {
        self.executor.as_ref()
    }

    pub fn readiness_threshold(&self) -> f64 {
        self.readiness_threshold
    }

    /// Retrieve from `adapter_names`, or from every available adapter when `None`.
    pub async fn get_relevant_context(
        &self,
        query: &str,
        adapter_names: Option<&[String]>,
        options: RetrievalOptions,
    ) -> Result<Vec<ContextItem>, ExecutorError> {
        let names = match adapter_names {
            Some(names) => names.to_vec(),
            None => self.provider.get_available_adapters(),
        };
        if names.is_empty() {
            tracing::warn!("{} No adapters to query", options.context.log_prefix());
            return Ok(Vec::new());
        }

        match &self.executor {
            Some(executor) => {
                let results = executor.execute_adapters(query, &names, &options).await?;
                Ok(ParallelAdapterExecutor::combine_results(&results, &names))
            }
            None => Ok(self.degraded_retrieve(query, &names, &options).await),
        }
    }

    async fn degraded_retrieve(
        &self,
        query: &str,
        names: &[String],
        options: &RetrievalOptions,
    ) -> Vec<ContextItem> {
        let Some(name) = names.first() else {
            return Vec::new();
        };
        if names.len() > 1 {
            tracing::warn!(
                "{} Degraded mode: querying only '{}' of {} requested adapters",
                options.context.log_prefix(),
                name,
                names.len()
            );
        }

        let started = Instant::now();
        let call = async {
            let adapter = self.provider.get_adapter(name).await?;
            adapter.retrieve(query, options).await
        };
        let failure = match tokio::time::timeout(self.degraded_call_timeout, call).await {
            Ok(Ok(items)) => {
                let result =
                    AdapterResult::success(name.as_str(), items, started.elapsed(), options.context.clone());
                return ParallelAdapterExecutor::combine_results(&[result], names);
            }
            Ok(Err(e)) => AdapterFailure::Error(e),
            Err(_) => AdapterFailure::Timeout(self.degraded_call_timeout.as_millis() as u64),
        };
        tracing::error!(
            "{} Degraded retrieval from '{}' failed: {}",
            options.context.log_prefix(),
            name,
            failure
        );
        Vec::new()
    }

    pub fn get_available_adapters(&self) -> Vec<String> {
        self.provider.get_available_adapters()
    }

    pub async fn get_adapter(&self, name: &str) -> Result<Arc<dyn Adapter>, AdapterError> {
        self.provider.get_adapter(name).await
    }

    /// Adapters considered for health: every available adapter plus any with a breaker.
    fn adapter_health(&self) -> (usize, usize, Vec<String>) {
        let mut names: BTreeSet<String> = self.provider.get_available_adapters().into_iter().collect();
        let mut open = Vec::new();
        if let Some(executor) = &self.executor {
            for (name, snapshot) in executor.get_circuit_breaker_states() {
                if snapshot.state == CircuitState::Open {
                    open.push(name.clone());
                }
                names.insert(name);
            }
        }
        (names.len() - open.len(), names.len(), open)
    }

    pub fn get_health_status(&self) -> ManagerHealth {
        let (healthy, total, open_circuits) = self.adapter_health();
        ManagerHealth {
            status: HealthStatus::from_counts(healthy, total, self.is_degraded()),
            fault_tolerance_enabled: !self.is_degraded(),
            degraded_reason: self.degraded_reason.clone(),
            total_adapters: total,
            healthy_adapters: healthy,
            open_circuits,
            provider: self.provider.describe(),
            executor: self.executor.as_ref().map(|e| e.get_health_status()),
        }
    }

    /// Readiness against `threshold`, or the configured one.
    pub fn readiness(&self, threshold: Option<f64>) -> Readiness {
        let (healthy, total, _) = self.adapter_health();
        Readiness::evaluate(healthy, total, threshold.unwrap_or(self.readiness_threshold))
    }

    pub fn reset_circuit_breaker(&self, name: &str, clear_history: bool) -> ResetOutcome {
        let Some(executor) = &self.executor else {
            tracing::warn!(adapter = %name, "Circuit reset ignored: executor unavailable");
            return ResetOutcome::ExecutorUnavailable;
        };
        if executor.reset_circuit_breaker(name, clear_history) {
            ResetOutcome::Reset
        } else {
            ResetOutcome::UnknownAdapter
        }
    }

    pub fn breaker_history(&self, name: &str, limit: Option<(usize, usize)>) -> HistoryLookup {
        match &self.executor {
            None => HistoryLookup::ExecutorUnavailable,
            Some(executor) => match executor.breaker_history(name, limit) {
                Some(history) => HistoryLookup::Found(history),
                None => HistoryLookup::UnknownAdapter,
            },
        }
    }

    /// Drain the executor, then close every cached adapter.
    pub async fn shutdown(&self) {
        if let Some(executor) = &self.executor {
            executor.shutdown().await;
        }
        self.provider.close().await;
        tracing::info!("Adapter manager shut down");
    }
}

fn degraded_timeout(config: &CircuitBreakerConfig) -> Duration {
    if config.call_timeout_ms == 0 {
        CircuitBreakerConfig::default().call_timeout()
    } else {
        config.call_timeout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterRegistry;
    use crate::config::schema::{AdapterConfig, AdapterSource, StaticSourceConfig};

    fn config_with_faq() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.adapters.push(AdapterConfig {
            name: "faq".into(),
            enabled: true,
            source: AdapterSource::Static(StaticSourceConfig {
                items: vec![ContextItem::new("opening hours are nine to five")],
                max_results: 5,
            }),
            init_timeout_ms: 1_000,
            fault_tolerance: None,
        });
        config
    }

    fn manager(config: &GatewayConfig) -> FaultTolerantAdapterManager {
        let registry = Arc::new(AdapterRegistry::new(config.adapters.clone()));
        FaultTolerantAdapterManager::new(registry, config)
    }

    #[tokio::test]
    async fn test_defaults_to_every_available_adapter() {
        let config = config_with_faq();
        let manager = manager(&config);
        assert!(!manager.is_degraded());

        let items = manager
            .get_relevant_context("opening hours", None, RetrievalOptions::default())
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].metadata["source_adapter"], "faq");
    }

    #[tokio::test]
    async fn test_degraded_mode_calls_adapter_directly() {
        let mut config = config_with_faq();
        config.fault_tolerance.circuit_breaker.failure_threshold = 0;
        let manager = manager(&config);
        assert!(manager.is_degraded());

        let items = manager
            .get_relevant_context("opening", None, RetrievalOptions::default())
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].metadata.contains_key("execution_time_ms"));

        let health = manager.get_health_status();
        assert!(!health.fault_tolerance_enabled);
        assert_eq!(health.status, HealthStatus::Degraded);
        assert!(health.degraded_reason.is_some());
        assert_eq!(
            manager.reset_circuit_breaker("faq", false),
            ResetOutcome::ExecutorUnavailable
        );
    }

    #[tokio::test]
    async fn test_degraded_mode_swallows_errors() {
        let mut config = config_with_faq();
        config.fault_tolerance.execution.timeout_ms = 0;
        let manager = manager(&config);
        assert!(manager.is_degraded());

        let items = manager
            .get_relevant_context("x", Some(&["missing".to_string()]), RetrievalOptions::default())
            .await
            .unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_reset_outcomes() {
        let config = config_with_faq();
        let manager = manager(&config);
        assert_eq!(manager.reset_circuit_breaker("faq", false), ResetOutcome::UnknownAdapter);

        manager
            .get_relevant_context("opening", None, RetrievalOptions::default())
            .await
            .unwrap();
        assert_eq!(manager.reset_circuit_breaker("faq", true), ResetOutcome::Reset);
        assert!(matches!(
            manager.breaker_history("faq", None),
            HistoryLookup::Found(h) if h.calls.is_empty()
        ));
    }

    #[tokio::test]
    async fn test_readiness_counts_available_adapters() {
        let config = config_with_faq();
        let manager = manager(&config);
        let readiness = manager.readiness(None);
        assert!(readiness.ready);
        assert_eq!(readiness.total_adapters, 1);
    }
}
