//! Concurrent fan-out of one query across many adapters.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Notify, Semaphore};

use crate::adapters::{AdapterProvider, ContextItem, RetrievalOptions};
use crate::config::schema::{
    AdapterConfig, BreakerOverrides, CircuitBreakerConfig, ExecutionConfig, ExecutionStrategy,
    FaultToleranceConfig,
};
use crate::config::validation::{validate_breaker, validate_execution};
use crate::executor::result::{AdapterFailure, AdapterResult, ExecutorError};
use crate::observability::metrics;
use crate::resilience::{
    BreakerHistory, BreakerSnapshot, CircuitBreaker, CircuitEventHandler, CircuitState,
    CompositeEventHandler,
};

/// Aggregate breaker health. "Healthy" means not open.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutorHealth {
    pub total_adapters: usize,
    pub healthy_adapters: usize,
    pub circuit_breakers: BTreeMap<String, BreakerSnapshot>,
    pub strategy: ExecutionStrategy,
    pub max_concurrent_adapters: usize,
    pub timeout_ms: u64,
    pub shutdown: ShutdownStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShutdownStatus {
    pub shutting_down: bool,
    pub in_flight_batches: usize,
}

/// Retained history sizes per breaker.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryUsage {
    pub circuit_breakers: usize,
    pub call_records: usize,
    pub transition_records: usize,
    pub per_adapter: BTreeMap<String, AdapterMemory>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AdapterMemory {
    pub call_history: usize,
    pub state_transitions: usize,
}

/// Removes a batch from the in-flight set when it finishes or is dropped.
struct BatchGuard<'a> {
    executor: &'a ParallelAdapterExecutor,
    id: u64,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.executor.in_flight.remove(&self.id);
        if self.executor.in_flight.is_empty() {
            self.executor.drained.notify_waiters();
        }
    }
}

enum BatchEnd {
    Completed,
    FirstSuccess,
    TimedOut,
}

/// Runs adapters concurrently behind per-adapter circuit breakers.
pub struct ParallelAdapterExecutor {
    provider: Arc<dyn AdapterProvider>,
    breaker_config: CircuitBreakerConfig,
    overrides: HashMap<String, BreakerOverrides>,
    execution: ExecutionConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    semaphore: Semaphore,
    events: Arc<dyn CircuitEventHandler>,
    shutting_down: AtomicBool,
    batch_seq: AtomicU64,
    in_flight: DashMap<u64, String>,
    drained: Notify,
}

impl ParallelAdapterExecutor {
    /// Build an executor. Fails when the breaker or execution settings are invalid.
    pub fn new(
        provider: Arc<dyn AdapterProvider>,
        config: &FaultToleranceConfig,
        adapters: &[AdapterConfig],
    ) -> Result<Self, ExecutorError> {
        let mut errors = Vec::new();
        validate_breaker("circuit_breaker", &config.circuit_breaker, &mut errors);
        validate_execution(&config.execution, &mut errors);

        let mut overrides = HashMap::new();
        for adapter in adapters {
            if let Some(o) = &adapter.fault_tolerance {
                let merged = config.circuit_breaker.with_overrides(o);
                validate_breaker(&format!("{}.fault_tolerance", adapter.name), &merged, &mut errors);
                overrides.insert(adapter.name.clone(), o.clone());
            }
        }

        if !errors.is_empty() {
            let message = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ExecutorError::InvalidConfig(message));
        }

        Ok(Self {
            provider,
            breaker_config: config.circuit_breaker.clone(),
            overrides,
            execution: config.execution.clone(),
            breakers: DashMap::new(),
            semaphore: Semaphore::new(config.execution.max_concurrent_adapters),
            events: Arc::new(CompositeEventHandler::standard()),
            shutting_down: AtomicBool::new(false),
            batch_seq: AtomicU64::new(0),
            in_flight: DashMap::new(),
            drained: Notify::new(),
        })
    }

    /// Replace the handler given to breakers created from now on.
    pub fn with_event_handler(mut self, events: Arc<dyn CircuitEventHandler>) -> Self {
        self.events = events;
        self
    }

    pub fn execution_config(&self) -> &ExecutionConfig {
        &self.execution
    }

    pub fn default_breaker_config(&self) -> &CircuitBreakerConfig {
        &self.breaker_config
    }

    /// Effective breaker settings for an adapter.
    pub fn breaker_config_for(&self, name: &str) -> CircuitBreakerConfig {
        match self.overrides.get(name) {
            Some(o) => self.breaker_config.with_overrides(o),
            None => self.breaker_config.clone(),
        }
    }

    fn breaker_for(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(name) {
            return Arc::clone(breaker.value());
        }
        let entry = self.breakers.entry(name.to_string()).or_insert_with(|| {
            tracing::debug!(adapter = %name, "Creating circuit breaker");
            Arc::new(CircuitBreaker::with_events(
                name,
                self.breaker_config_for(name),
                Arc::clone(&self.events),
            ))
        });
        Arc::clone(entry.value())
    }

    pub fn get_circuit_breaker(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| Arc::clone(b.value()))
    }

    /// Gate, resolve and call one adapter under its call timeout.
    ///
    /// Never fails: every outcome, including an open circuit, is an [`AdapterResult`].
    pub async fn execute_single_adapter(
        &self,
        name: &str,
        query: &str,
        options: &RetrievalOptions,
    ) -> AdapterResult {
        let started = Instant::now();
        let context = options.context.clone();

        if self.shutting_down.load(Ordering::Acquire) {
            return AdapterResult::failure(name, AdapterFailure::ShuttingDown, started.elapsed(), context);
        }

        let breaker = self.breaker_for(name);
        let _permit = match breaker.try_acquire() {
            Ok(permit) => permit,
            Err(state) => {
                let failure = if state == CircuitState::HalfOpen {
                    AdapterFailure::TrialsExhausted(name.to_string())
                } else {
                    AdapterFailure::CircuitOpen(name.to_string())
                };
                tracing::debug!(
                    "{} Skipping call to adapter '{}': {}",
                    context.log_prefix(),
                    name,
                    failure
                );
                let elapsed = started.elapsed();
                metrics::record_adapter_call(name, failure.kind(), elapsed);
                return AdapterResult::failure(name, failure, elapsed, context);
            }
        };

        let Ok(_slot) = self.semaphore.acquire().await else {
            return AdapterResult::failure(name, AdapterFailure::ShuttingDown, started.elapsed(), context);
        };

        let call_timeout = breaker.config().call_timeout();
        let call_started = Instant::now();
        let call = async {
            let adapter = self.provider.get_adapter(name).await?;
            adapter.retrieve(query, options).await
        };

        match tokio::time::timeout(call_timeout, call).await {
            Ok(Ok(items)) => {
                let latency = call_started.elapsed();
                breaker.record_success(latency);
                metrics::record_adapter_call(name, "success", latency);
                tracing::debug!(
                    "{} Adapter '{}' returned {} items in {:?}",
                    context.log_prefix(),
                    name,
                    items.len(),
                    latency
                );
                AdapterResult::success(name, items, started.elapsed(), context)
            }
            Ok(Err(e)) => {
                let latency = call_started.elapsed();
                breaker.record_failure(&e.to_string(), latency);
                metrics::record_adapter_call(name, "error", latency);
                tracing::warn!(
                    "{} Adapter '{}' failed: {}",
                    context.log_prefix(),
                    name,
                    e
                );
                AdapterResult::failure(name, AdapterFailure::Error(e), started.elapsed(), context)
            }
            Err(_) => {
                let latency = call_started.elapsed();
                breaker.record_timeout(latency);
                metrics::record_adapter_call(name, "timeout", latency);
                tracing::warn!(
                    "{} Adapter '{}' timed out after {}ms",
                    context.log_prefix(),
                    name,
                    call_timeout.as_millis()
                );
                AdapterResult::failure(
                    name,
                    AdapterFailure::Timeout(call_timeout.as_millis() as u64),
                    started.elapsed(),
                    context,
                )
            }
        }
    }

    /// Fan `query` out to `names` and apply the configured strategy.
    ///
    /// Only a batch-level timeout under `all` or `first_success` is an error.
    /// Under `best_effort` the deadline is authoritative: results that are
    /// ready when it fires are kept, calls still running are cancelled.
    pub async fn execute_adapters(
        &self,
        query: &str,
        names: &[String],
        options: &RetrievalOptions,
    ) -> Result<Vec<AdapterResult>, ExecutorError> {
        let context = &options.context;
        let strategy = self.execution.strategy;

        if names.is_empty() {
            return Ok(Vec::new());
        }
        if self.shutting_down.load(Ordering::Acquire) {
            tracing::warn!("{} Rejecting batch, executor is shutting down", context.log_prefix());
            return Ok(names
                .iter()
                .map(|name| {
                    AdapterResult::failure(
                        name.as_str(),
                        AdapterFailure::ShuttingDown,
                        Duration::ZERO,
                        context.clone(),
                    )
                })
                .collect());
        }

        let id = self.batch_seq.fetch_add(1, Ordering::Relaxed);
        self.in_flight.insert(id, context.request_id.clone());
        let _guard = BatchGuard { executor: self, id };

        let started = Instant::now();
        tracing::debug!(
            "{} Executing {} adapters with strategy '{}'",
            context.log_prefix(),
            names.len(),
            strategy
        );

        let mut pending: FuturesUnordered<_> = names
            .iter()
            .map(|name| self.execute_single_adapter(name, query, options))
            .collect();
        let deadline = tokio::time::sleep(self.execution.timeout());
        tokio::pin!(deadline);

        let mut results = Vec::with_capacity(names.len());
        let end = loop {
            tokio::select! {
                biased;
                next = pending.next() => match next {
                    Some(result) => {
                        let succeeded = result.is_success();
                        results.push(result);
                        if strategy == ExecutionStrategy::FirstSuccess && succeeded {
                            break BatchEnd::FirstSuccess;
                        }
                    }
                    None => break BatchEnd::Completed,
                },
                _ = &mut deadline => break BatchEnd::TimedOut,
            }
        };

        let cancelled = pending.len();
        // Dropping the remaining calls cancels them without touching their breakers.
        drop(pending);

        let elapsed = started.elapsed();
        let successes = results.iter().filter(|r| r.is_success()).count();

        match end {
            BatchEnd::TimedOut if strategy != ExecutionStrategy::BestEffort => {
                metrics::record_batch(strategy.as_str(), "timeout", elapsed);
                tracing::error!(
                    "{} Batch timed out after {}ms ({}/{} adapters finished)",
                    context.log_prefix(),
                    self.execution.timeout_ms,
                    results.len(),
                    names.len()
                );
                Err(ExecutorError::BatchTimeout {
                    strategy,
                    timeout_ms: self.execution.timeout_ms,
                    completed: results.len(),
                    requested: names.len(),
                })
            }
            end => {
                let outcome = match end {
                    BatchEnd::TimedOut => "partial",
                    BatchEnd::FirstSuccess => "first_success",
                    BatchEnd::Completed => "completed",
                };
                metrics::record_batch(strategy.as_str(), outcome, elapsed);
                tracing::info!(
                    "{} Batch finished: {}/{} succeeded, {} cancelled, {:?}",
                    context.log_prefix(),
                    successes,
                    names.len(),
                    cancelled,
                    elapsed
                );
                Ok(results)
            }
        }
    }

    /// Flatten successful results in `adapter_order`, annotating every item
    /// with its source adapter, that adapter's execution time and the request ids.
    pub fn combine_results(results: &[AdapterResult], adapter_order: &[String]) -> Vec<ContextItem> {
        let mut ordered: Vec<&AdapterResult> = Vec::with_capacity(results.len());
        let mut seen = std::collections::HashSet::new();
        for name in adapter_order {
            if seen.insert(name.as_str()) {
                ordered.extend(results.iter().filter(|r| &r.adapter_name == name));
            }
        }
        ordered.extend(
            results
                .iter()
                .filter(|r| !seen.contains(r.adapter_name.as_str())),
        );

        let mut combined = Vec::new();
        for result in ordered {
            let Some(items) = result.data() else {
                continue;
            };
            let execution_time_ms = result.execution_time.as_secs_f64() * 1000.0;
            for item in items {
                let mut item = item.clone();
                let meta = &mut item.metadata;
                meta.insert("source_adapter".into(), Value::from(result.adapter_name.clone()));
                meta.insert("execution_time_ms".into(), Value::from(execution_time_ms));
                let ctx = &result.context;
                meta.insert("request_id".into(), Value::from(ctx.request_id.clone()));
                for (key, value) in [
                    ("trace_id", &ctx.trace_id),
                    ("user_id", &ctx.user_id),
                    ("session_id", &ctx.session_id),
                    ("correlation_id", &ctx.correlation_id),
                ] {
                    if let Some(value) = value {
                        meta.insert(key.into(), Value::from(value.clone()));
                    }
                }
                combined.push(item);
            }
        }
        combined
    }

    pub fn get_circuit_breaker_states(&self) -> BTreeMap<String, BreakerSnapshot> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect()
    }

    pub fn get_health_status(&self) -> ExecutorHealth {
        let circuit_breakers = self.get_circuit_breaker_states();
        let healthy_adapters = circuit_breakers
            .values()
            .filter(|s| s.state != CircuitState::Open)
            .count();
        ExecutorHealth {
            total_adapters: circuit_breakers.len(),
            healthy_adapters,
            circuit_breakers,
            strategy: self.execution.strategy,
            max_concurrent_adapters: self.execution.max_concurrent_adapters,
            timeout_ms: self.execution.timeout_ms,
            shutdown: self.shutdown_status(),
        }
    }

    /// Reset a breaker to Closed. Returns false when no breaker exists for `name`.
    pub fn reset_circuit_breaker(&self, name: &str, clear_history: bool) -> bool {
        match self.get_circuit_breaker(name) {
            Some(breaker) => {
                if clear_history {
                    breaker.reset_and_clear_history();
                } else {
                    breaker.reset();
                }
                true
            }
            None => {
                tracing::warn!(adapter = %name, "Reset requested for unknown circuit breaker");
                false
            }
        }
    }

    /// `limit` is (calls, transitions); `None` returns everything retained.
    pub fn breaker_history(&self, name: &str, limit: Option<(usize, usize)>) -> Option<BreakerHistory> {
        self.get_circuit_breaker(name).map(|b| b.history(limit))
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        let mut usage = MemoryUsage::default();
        for entry in self.breakers.iter() {
            let (calls, transitions) = entry.value().history_sizes();
            usage.circuit_breakers += 1;
            usage.call_records += calls;
            usage.transition_records += transitions;
            usage.per_adapter.insert(
                entry.key().clone(),
                AdapterMemory {
                    call_history: calls,
                    state_transitions: transitions,
                },
            );
        }
        usage
    }

    pub fn shutdown_status(&self) -> ShutdownStatus {
        ShutdownStatus {
            shutting_down: self.shutting_down.load(Ordering::Acquire),
            in_flight_batches: self.in_flight.len(),
        }
    }

    /// Stop admitting batches, wait for in-flight ones to drain, reset breakers.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(in_flight = self.in_flight.len(), "Executor shutting down");

        let drain = async {
            loop {
                let notified = self.drained.notified();
                if self.in_flight.is_empty() {
                    break;
                }
                notified.await;
            }
        };

        let timeout = self.execution.shutdown_timeout();
        if tokio::time::timeout(timeout, drain).await.is_err() {
            let abandoned: Vec<String> = self.in_flight.iter().map(|e| e.value().clone()).collect();
            tracing::warn!(
                timeout_ms = self.execution.shutdown_timeout_ms,
                abandoned = ?abandoned,
                "Shutdown timeout reached with batches still in flight"
            );
        }

        for entry in self.breakers.iter() {
            entry.value().reset();
        }
        tracing::info!(breakers = self.breakers.len(), "Executor shut down");
    }
}
