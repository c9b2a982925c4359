//! Lazy adapter provisioning with claim-once construction.
//!
//! # Responsibilities
//! - Hold enabled adapter definitions (hot-swappable)
//! - Build adapters on first use, exactly once per name under concurrency
//! - Evict and close instances on removal, reload and shutdown

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;

use crate::adapters::{
    Adapter, AdapterError, AdapterProvider, HttpAdapter, ProviderSummary, StaticAdapter, Teardown,
};
use crate::cache::CacheManager;
use crate::config::schema::{AdapterConfig, AdapterSource};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Builds an adapter instance from its definition.
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    async fn build(&self, config: &AdapterConfig) -> Result<Arc<dyn Adapter>, AdapterError>;
}

/// Factory for the built-in backend families.
#[derive(Debug, Default, Clone, Copy)]
pub struct SourceFactory;

#[async_trait]
impl AdapterFactory for SourceFactory {
    async fn build(&self, config: &AdapterConfig) -> Result<Arc<dyn Adapter>, AdapterError> {
        let adapter: Arc<dyn Adapter> = match &config.source {
            AdapterSource::Http(http) => Arc::new(HttpAdapter::new(&config.name, http)?),
            AdapterSource::Static(source) => Arc::new(StaticAdapter::new(&config.name, source)),
        };
        Ok(adapter)
    }
}

/// Per-adapter result of a preload pass.
#[derive(Debug, Clone, Serialize)]
pub struct PreloadOutcome {
    pub name: String,
    pub loaded: bool,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

/// What a definition reload changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReloadSummary {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
}

impl ReloadSummary {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

struct Definitions {
    order: Vec<String>,
    by_name: BTreeMap<String, AdapterConfig>,
    disabled: usize,
}

impl Definitions {
    fn from_configs(configs: Vec<AdapterConfig>) -> Self {
        let mut order = Vec::new();
        let mut by_name = BTreeMap::new();
        let mut disabled = 0;
        for config in configs {
            if !config.enabled {
                tracing::debug!(adapter = %config.name, "Skipping disabled adapter");
                disabled += 1;
                continue;
            }
            order.push(config.name.clone());
            by_name.insert(config.name.clone(), config);
        }
        Self {
            order,
            by_name,
            disabled,
        }
    }
}

/// Releases a construction claim when the builder finishes or is cancelled.
struct InitClaim<'a> {
    cache: &'a CacheManager<Arc<dyn Adapter>>,
    key: &'a str,
}

impl Drop for InitClaim<'_> {
    fn drop(&mut self) {
        self.cache.release_initialization(self.key);
    }
}

/// The default [`AdapterProvider`]: configured definitions plus a claim-once cache.
pub struct AdapterRegistry {
    definitions: ArcSwap<Definitions>,
    cache: CacheManager<Arc<dyn Adapter>>,
    factory: Arc<dyn AdapterFactory>,
    poll_interval: Duration,
    closed: AtomicBool,
}

impl AdapterRegistry {
    pub fn new(configs: Vec<AdapterConfig>) -> Self {
        Self::with_factory(configs, Arc::new(SourceFactory))
    }

    pub fn with_factory(configs: Vec<AdapterConfig>, factory: Arc<dyn AdapterFactory>) -> Self {
        let definitions = Definitions::from_configs(configs);
        tracing::info!(
            enabled = definitions.order.len(),
            disabled = definitions.disabled,
            "Adapter registry initialized"
        );
        Self {
            definitions: ArcSwap::from_pointee(definitions),
            cache: CacheManager::new("adapters"),
            factory,
            poll_interval: DEFAULT_POLL_INTERVAL,
            closed: AtomicBool::new(false),
        }
    }

    /// Interval at which callers that lost a construction claim re-check the cache.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn definition(&self, name: &str) -> Option<AdapterConfig> {
        self.definitions.load().by_name.get(name).cloned()
    }

    pub fn cache(&self) -> &CacheManager<Arc<dyn Adapter>> {
        &self.cache
    }

    async fn build(&self, config: &AdapterConfig) -> Result<Arc<dyn Adapter>, AdapterError> {
        let _claim = InitClaim {
            cache: &self.cache,
            key: &config.name,
        };
        let started = Instant::now();

        let adapter = match tokio::time::timeout(config.init_timeout(), self.factory.build(config)).await {
            Ok(Ok(adapter)) => adapter,
            Ok(Err(e)) => {
                tracing::error!(adapter = %config.name, error = %e, "Adapter construction failed");
                return Err(e);
            }
            Err(_) => {
                tracing::error!(
                    adapter = %config.name,
                    timeout_ms = config.init_timeout_ms,
                    "Adapter construction timed out"
                );
                return Err(AdapterError::InitTimeout {
                    name: config.name.clone(),
                    timeout_ms: config.init_timeout_ms,
                });
            }
        };

        // A reload may have dropped the definition while we were building.
        if self.closed.load(Ordering::Acquire) || self.definition(&config.name).as_ref() != Some(config) {
            adapter.close().await;
            return Err(AdapterError::Unknown(config.name.clone()));
        }

        self.cache.put(&config.name, adapter.clone());
        tracing::info!(
            adapter = %config.name,
            kind = adapter.kind(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Adapter constructed"
        );
        Ok(adapter)
    }

    /// Resolve an adapter, constructing it at most once across concurrent callers.
    pub async fn resolve(&self, name: &str) -> Result<Arc<dyn Adapter>, AdapterError> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(AdapterError::Closed);
            }
            if let Some(adapter) = self.cache.get(name) {
                return Ok(adapter);
            }
            let config = self
                .definition(name)
                .ok_or_else(|| AdapterError::Unknown(name.to_string()))?;

            if self.cache.claim_initialization(name) {
                return self.build(&config).await;
            }

            // Another caller is building; wait for it to publish or give up.
            let deadline = Instant::now() + config.init_timeout();
            loop {
                tokio::time::sleep(self.poll_interval).await;
                if let Some(adapter) = self.cache.get(name) {
                    return Ok(adapter);
                }
                if !self.cache.is_initializing(name) {
                    break;
                }
                if Instant::now() >= deadline {
                    return Err(AdapterError::InitTimeout {
                        name: name.to_string(),
                        timeout_ms: config.init_timeout_ms,
                    });
                }
            }
        }
    }

    /// Construct every enabled adapter in parallel, each under `timeout_per_adapter`.
    pub async fn preload_all(&self, timeout_per_adapter: Duration) -> Vec<PreloadOutcome> {
        let names = self.get_available_adapters();
        tracing::info!(count = names.len(), "Preloading adapters");

        let outcomes = join_all(names.into_iter().map(|name| async move {
            let started = Instant::now();
            let result = tokio::time::timeout(timeout_per_adapter, self.resolve(&name)).await;
            let error = match result {
                Ok(Ok(_)) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some(format!(
                    "preload timed out after {}ms",
                    timeout_per_adapter.as_millis()
                )),
            };
            PreloadOutcome {
                name,
                loaded: error.is_none(),
                error,
                elapsed_ms: started.elapsed().as_millis() as u64,
            }
        }))
        .await;

        let loaded = outcomes.iter().filter(|o| o.loaded).count();
        tracing::info!(loaded, failed = outcomes.len() - loaded, "Adapter preload finished");
        outcomes
    }

    /// Evict and close one cached adapter. The definition stays.
    pub async fn remove_adapter(&self, name: &str) -> bool {
        self.cache.remove(name).await
    }

    /// Evict and close every cached adapter.
    pub async fn clear(&self) -> usize {
        self.cache.clear().await
    }

    /// Swap in new definitions, closing cached instances whose definition changed or vanished.
    pub async fn reload(&self, configs: Vec<AdapterConfig>) -> ReloadSummary {
        let next = Definitions::from_configs(configs);
        let previous = self.definitions.load_full();

        let mut summary = ReloadSummary::default();
        for name in &next.order {
            match previous.by_name.get(name) {
                None => summary.added.push(name.clone()),
                Some(old) if Some(old) != next.by_name.get(name) => summary.changed.push(name.clone()),
                Some(_) => {}
            }
        }
        for name in &previous.order {
            if !next.by_name.contains_key(name) {
                summary.removed.push(name.clone());
            }
        }

        self.definitions.store(Arc::new(next));

        for name in summary.removed.iter().chain(summary.changed.iter()) {
            self.cache.remove(name).await;
        }

        tracing::info!(
            added = ?summary.added,
            removed = ?summary.removed,
            changed = ?summary.changed,
            "Adapter definitions reloaded"
        );
        summary
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl AdapterProvider for AdapterRegistry {
    fn get_available_adapters(&self) -> Vec<String> {
        self.definitions.load().order.clone()
    }

    async fn get_adapter(&self, name: &str) -> Result<Arc<dyn Adapter>, AdapterError> {
        self.resolve(name).await
    }

    fn get_cached_adapters(&self) -> Vec<String> {
        self.cache.get_cached_keys()
    }

    fn describe(&self) -> ProviderSummary {
        ProviderSummary {
            available_adapters: self.get_available_adapters(),
            cached_adapters: self.get_cached_adapters(),
            initializing_adapters: self.cache.initializing_keys(),
            disabled_adapters: self.definitions.load().disabled,
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let closed = self.cache.clear().await;
        tracing::info!(closed, "Adapter registry closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{ContextItem, RetrievalOptions};
    use crate::config::schema::StaticSourceConfig;
    use std::sync::atomic::AtomicUsize;

    struct CountingFactory {
        builds: AtomicUsize,
        delay: Duration,
    }

    struct Noop(String);

    impl Teardown for Noop {}

    #[async_trait]
    impl Adapter for Noop {
        fn name(&self) -> &str {
            &self.0
        }

        async fn retrieve(&self, _: &str, _: &RetrievalOptions) -> Result<Vec<ContextItem>, AdapterError> {
            Ok(vec![])
        }
    }

    #[async_trait]
    impl AdapterFactory for CountingFactory {
        async fn build(&self, config: &AdapterConfig) -> Result<Arc<dyn Adapter>, AdapterError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(Arc::new(Noop(config.name.clone())))
        }
    }

    fn def(name: &str) -> AdapterConfig {
        AdapterConfig {
            name: name.into(),
            enabled: true,
            source: AdapterSource::Static(StaticSourceConfig::default()),
            init_timeout_ms: 1_000,
            fault_tolerance: None,
        }
    }

    #[tokio::test]
    async fn test_concurrent_resolution_builds_once() {
        let factory = Arc::new(CountingFactory {
            builds: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
        });
        let registry = Arc::new(AdapterRegistry::with_factory(vec![def("a")], factory.clone()));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.resolve("a").await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
        assert_eq!(registry.get_cached_adapters(), vec!["a".to_string()]);
        assert!(!registry.cache().is_initializing("a"));
    }

    #[tokio::test]
    async fn test_cancelled_build_releases_claim() {
        let factory = Arc::new(CountingFactory {
            builds: AtomicUsize::new(0),
            delay: Duration::from_millis(500),
        });
        let registry = AdapterRegistry::with_factory(vec![def("a")], factory);

        let _ = tokio::time::timeout(Duration::from_millis(20), registry.resolve("a")).await;
        assert!(!registry.cache().is_initializing("a"));
        assert!(!registry.cache().contains("a"));
    }

    #[tokio::test]
    async fn test_disabled_and_unknown() {
        let mut disabled = def("off");
        disabled.enabled = false;
        let registry = AdapterRegistry::new(vec![def("on"), disabled]);

        assert_eq!(registry.get_available_adapters(), vec!["on".to_string()]);
        assert_eq!(registry.describe().disabled_adapters, 1);
        assert!(matches!(registry.resolve("off").await, Err(AdapterError::Unknown(_))));
    }

    #[tokio::test]
    async fn test_reload_evicts_changed_definitions() {
        let registry = AdapterRegistry::new(vec![def("a"), def("b")]);
        registry.resolve("a").await.unwrap();
        registry.resolve("b").await.unwrap();

        let mut changed = def("a");
        changed.init_timeout_ms = 2_000;
        let summary = registry.reload(vec![changed, def("c")]).await;

        assert_eq!(summary.changed, vec!["a".to_string()]);
        assert_eq!(summary.removed, vec!["b".to_string()]);
        assert_eq!(summary.added, vec!["c".to_string()]);
        assert!(registry.get_cached_adapters().is_empty());
    }

    #[tokio::test]
    async fn test_preload_and_close() {
        let registry = AdapterRegistry::new(vec![def("a"), def("b")]);
        let outcomes = registry.preload_all(Duration::from_secs(1)).await;
        assert!(outcomes.iter().all(|o| o.loaded));
        assert_eq!(registry.cache().get_cache_size(), 2);

        AdapterProvider::close(&registry).await;
        assert!(registry.is_closed());
        assert_eq!(registry.cache().get_cache_size(), 0);
        assert!(matches!(registry.resolve("a").await, Err(AdapterError::Closed)));
    }
}
