//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the adapter registry and fault-tolerant manager from config
//! - Log a configuration summary
//! - Preload adapters when configured
//! - Apply hot-reloaded adapter definitions
//!
//! # Design Decisions
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::sync::Arc;

use crate::adapters::{AdapterFactory, AdapterRegistry, PreloadOutcome, ReloadSummary};
use crate::config::schema::GatewayConfig;
use crate::http::server::AppState;
use crate::manager::FaultTolerantAdapterManager;

/// The assembled core: registry, manager and the config they were built from.
pub struct Gateway {
    config: GatewayConfig,
    registry: Arc<AdapterRegistry>,
    manager: Arc<FaultTolerantAdapterManager>,
}

impl Gateway {
    pub fn build(config: GatewayConfig) -> Self {
        let registry = Arc::new(AdapterRegistry::new(config.adapters.clone()));
        Self::assemble(config, registry)
    }

    pub fn with_factory(config: GatewayConfig, factory: Arc<dyn AdapterFactory>) -> Self {
        let registry = Arc::new(AdapterRegistry::with_factory(config.adapters.clone(), factory));
        Self::assemble(config, registry)
    }

    fn assemble(config: GatewayConfig, registry: Arc<AdapterRegistry>) -> Self {
        let manager = Arc::new(FaultTolerantAdapterManager::new(registry.clone(), &config));
        Self {
            config,
            registry,
            manager,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    pub fn manager(&self) -> &Arc<FaultTolerantAdapterManager> {
        &self.manager
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(self.manager.clone(), self.config.admin.clone())
    }

    pub fn log_summary(&self) {
        let ft = &self.config.fault_tolerance;
        let cb = &ft.circuit_breaker;
        let enabled: Vec<&str> = self
            .config
            .adapters
            .iter()
            .filter(|a| a.enabled)
            .map(|a| a.name.as_str())
            .collect();
        let overridden = self
            .config
            .adapters
            .iter()
            .filter(|a| a.fault_tolerance.is_some())
            .count();

        tracing::info!(
            bind_address = %self.config.listener.bind_address,
            adapters = ?enabled,
            disabled = self.config.adapters.len() - enabled.len(),
            breaker_overrides = overridden,
            "Configuration loaded"
        );
        tracing::info!(
            failure_threshold = cb.failure_threshold,
            success_threshold = cb.success_threshold,
            recovery_timeout_ms = cb.recovery_timeout_ms,
            max_recovery_timeout_ms = cb.max_recovery_timeout_ms,
            call_timeout_ms = cb.call_timeout_ms,
            strategy = %ft.execution.strategy,
            batch_timeout_ms = ft.execution.timeout_ms,
            max_concurrent_adapters = ft.execution.max_concurrent_adapters,
            readiness_threshold = ft.readiness_threshold,
            degraded = self.manager.is_degraded(),
            "Fault tolerance settings"
        );
        if self.config.admin.auth_enabled && self.config.admin.api_key == "CHANGE_ME_IN_PRODUCTION" {
            tracing::warn!("Admin auth is enabled with the placeholder API key");
        }
    }

    pub async fn preload(&self) -> Vec<PreloadOutcome> {
        let outcomes = self
            .registry
            .preload_all(self.config.startup.preload_timeout())
            .await;
        for outcome in outcomes.iter().filter(|o| !o.loaded) {
            tracing::warn!(
                adapter = %outcome.name,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "Adapter preload failed, it will be built on first use"
            );
        }
        outcomes
    }

    /// Apply a reloaded config. Only adapter definitions change at runtime.
    pub async fn apply_reload(&self, config: GatewayConfig) -> ReloadSummary {
        if config.fault_tolerance.circuit_breaker != self.config.fault_tolerance.circuit_breaker {
            tracing::warn!("Circuit breaker settings changed on disk; restart to apply them");
        }
        self.registry.reload(config.adapters).await
    }

    pub async fn shutdown(&self) {
        self.manager.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{AdapterProvider, ContextItem};
    use crate::config::schema::{AdapterConfig, AdapterSource, StaticSourceConfig};

    fn static_adapter(name: &str) -> AdapterConfig {
        AdapterConfig {
            name: name.into(),
            enabled: true,
            source: AdapterSource::Static(StaticSourceConfig {
                items: vec![ContextItem::new("hello world")],
                max_results: 3,
            }),
            init_timeout_ms: 1_000,
            fault_tolerance: None,
        }
    }

    #[tokio::test]
    async fn test_build_preload_reload_shutdown() {
        let mut config = GatewayConfig::default();
        config.adapters = vec![static_adapter("a"), static_adapter("b")];
        let gateway = Gateway::build(config.clone());
        gateway.log_summary();

        let outcomes = gateway.preload().await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(gateway.registry().get_cached_adapters().len(), 2);

        config.adapters.pop();
        let summary = gateway.apply_reload(config).await;
        assert_eq!(summary.removed, vec!["b".to_string()]);
        assert_eq!(gateway.manager().get_available_adapters(), vec!["a".to_string()]);

        gateway.shutdown().await;
        assert!(gateway.registry().is_closed());
    }
}
