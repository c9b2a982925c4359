//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use retrieval_gateway::adapters::{
    Adapter, AdapterError, AdapterProvider, ContextItem, RetrievalOptions, Teardown,
};
use retrieval_gateway::config::schema::{
    CircuitBreakerConfig, ExecutionConfig, ExecutionStrategy, FaultToleranceConfig,
};
use retrieval_gateway::ParallelAdapterExecutor;

/// Adapter with a fixed delay, a switchable failure mode and a call counter.
pub struct MockAdapter {
    name: String,
    delay: Duration,
    failing: AtomicBool,
    calls: AtomicUsize,
    closed: AtomicBool,
}

impl MockAdapter {
    pub fn new(name: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            delay,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub fn failing(name: &str) -> Arc<Self> {
        let adapter = Self::new(name, Duration::ZERO);
        adapter.set_failing(true);
        adapter
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Calls that reached `retrieve`, including ones later cancelled.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Teardown for MockAdapter {
    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "mock"
    }

    async fn retrieve(
        &self,
        query: &str,
        _options: &RetrievalOptions,
    ) -> Result<Vec<ContextItem>, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(AdapterError::Backend(format!("{} is down", self.name)));
        }
        Ok(vec![ContextItem::new(format!("{}: {}", self.name, query))])
    }
}

/// Provider over a fixed set of mock adapters.
pub struct MockProvider {
    adapters: BTreeMap<String, Arc<MockAdapter>>,
    order: Vec<String>,
}

impl MockProvider {
    pub fn new(adapters: &[Arc<MockAdapter>]) -> Arc<Self> {
        Arc::new(Self {
            adapters: adapters
                .iter()
                .map(|a| (a.name.clone(), a.clone()))
                .collect(),
            order: adapters.iter().map(|a| a.name.clone()).collect(),
        })
    }
}

#[async_trait]
impl AdapterProvider for MockProvider {
    fn get_available_adapters(&self) -> Vec<String> {
        self.order.clone()
    }

    async fn get_adapter(&self, name: &str) -> Result<Arc<dyn Adapter>, AdapterError> {
        self.adapters
            .get(name)
            .map(|a| a.clone() as Arc<dyn Adapter>)
            .ok_or_else(|| AdapterError::Unknown(name.to_string()))
    }

    fn get_cached_adapters(&self) -> Vec<String> {
        self.order.clone()
    }

    async fn close(&self) {
        for adapter in self.adapters.values() {
            adapter.close().await;
        }
    }
}

/// Breaker settings without jitter so recovery timing is exact.
pub fn breaker(failure_threshold: u32, success_threshold: u32, recovery_ms: u64) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold,
        success_threshold,
        recovery_timeout_ms: recovery_ms,
        max_recovery_timeout_ms: recovery_ms.max(1) * 8,
        recovery_jitter: 0.0,
        ..CircuitBreakerConfig::default()
    }
}

pub fn execution(strategy: ExecutionStrategy, max_concurrent: usize, timeout_ms: u64) -> ExecutionConfig {
    ExecutionConfig {
        strategy,
        timeout_ms,
        max_concurrent_adapters: max_concurrent,
        ..ExecutionConfig::default()
    }
}

pub fn executor(
    provider: Arc<MockProvider>,
    breaker: CircuitBreakerConfig,
    execution: ExecutionConfig,
) -> ParallelAdapterExecutor {
    let config = FaultToleranceConfig {
        circuit_breaker: breaker,
        execution,
        ..FaultToleranceConfig::default()
    };
    ParallelAdapterExecutor::new(provider, &config, &[]).unwrap()
}

pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
