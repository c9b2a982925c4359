//! Circuit breaker for adapter protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: adapter assumed down, calls fail fast
//! - Half-Open: testing if adapter recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= failure_threshold
//! Open → Half-Open: recovery timeout elapsed (checked on the next gate call)
//! Half-Open → Closed: consecutive_successes >= success_threshold
//! Half-Open → Open: any failure
//! ```
//!
//! # Design Decisions
//! - Per-adapter circuit breaker (not global)
//! - Fail fast in Open state (no waiting for timeout)
//! - Recovery timeout doubles on every re-open, capped, reset on close
//! - Bounded trial concurrency in Half-Open via RAII permits
//! - One mutex per breaker; never held across an await or an event callback

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::schema::CircuitBreakerConfig;
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::events::{CircuitEventHandler, LoggingEventHandler};
use crate::resilience::history::{unix_millis, CallOutcome, CallRecord, RingBuffer, StateTransition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }

    /// Gauge encoding: 0 closed, 1 half-open, 2 open.
    pub fn as_gauge(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for one breaker. Timestamps are Unix milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CircuitBreakerStats {
    pub total_calls: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub timeout_calls: u64,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_success_time: Option<u64>,
    pub last_failure_time: Option<u64>,
}

/// Point-in-time view of a breaker, safe to serialize.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub stats: CircuitBreakerStats,
    /// Fraction of recorded calls that succeeded; 1.0 before any call.
    pub success_rate: f64,
    /// Opens since the circuit last closed.
    pub open_count: u32,
    pub current_recovery_timeout_ms: u64,
    /// Time left before the next trial is allowed, while open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_in_ms: Option<u64>,
    pub half_open_in_flight: u32,
    pub call_history_len: usize,
    pub transition_history_len: usize,
    pub config: CircuitBreakerConfig,
}

/// Retained history, oldest first.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerHistory {
    pub calls: Vec<CallRecord>,
    pub transitions: Vec<StateTransition>,
}

enum Event {
    Opened(String),
    Closed,
    HalfOpened,
    Reset,
}

struct Inner {
    state: CircuitState,
    stats: CircuitBreakerStats,
    call_history: RingBuffer<CallRecord>,
    state_transitions: RingBuffer<StateTransition>,
    opened_at: Option<Instant>,
    open_count: u32,
    current_recovery_timeout: Duration,
    half_open_in_flight: u32,
    /// Bumped on every entry into Half-Open so stale permits can be ignored.
    half_open_generation: u64,
}

/// Per-adapter failure tracking state machine.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    events: Arc<dyn CircuitEventHandler>,
}

/// Admission ticket returned by [`CircuitBreaker::try_acquire`].
///
/// A permit taken in Half-Open holds one trial slot until it is dropped.
pub struct CallPermit {
    breaker: Arc<CircuitBreaker>,
    trial_generation: Option<u64>,
}

impl CallPermit {
    pub fn is_trial(&self) -> bool {
        self.trial_generation.is_some()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if let Some(generation) = self.trial_generation {
            let mut inner = self.breaker.lock();
            if inner.state == CircuitState::HalfOpen && inner.half_open_generation == generation {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
            }
        }
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_events(name, config, Arc::new(LoggingEventHandler))
    }

    pub fn with_events(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        events: Arc<dyn CircuitEventHandler>,
    ) -> Self {
        let inner = Inner {
            state: CircuitState::Closed,
            stats: CircuitBreakerStats::default(),
            call_history: RingBuffer::new(config.call_history_capacity),
            state_transitions: RingBuffer::new(config.transition_history_capacity),
            opened_at: None,
            open_count: 0,
            current_recovery_timeout: config.recovery_timeout(),
            half_open_in_flight: 0,
            half_open_generation: 0,
        };
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(inner),
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        self.lock().stats.clone()
    }

    pub fn current_recovery_timeout(&self) -> Duration {
        self.lock().current_recovery_timeout
    }

    /// Whether a call may go through now. Promotes Open to Half-Open once the
    /// recovery timeout has elapsed.
    pub fn can_execute(&self) -> bool {
        let (allowed, event) = {
            let mut inner = self.lock();
            let event = self.refresh(&mut inner);
            let allowed = match inner.state {
                CircuitState::Closed => true,
                CircuitState::Open => false,
                CircuitState::HalfOpen => inner.half_open_in_flight < self.config.half_open_max_calls,
            };
            (allowed, event.map(|e| (e, self.snapshot_locked(&inner))))
        };
        self.dispatch(event);
        allowed
    }

    /// Like [`can_execute`](Self::can_execute), but reserves a Half-Open trial
    /// slot for the caller. A refusal carries the state that refused it: `Open`,
    /// or `HalfOpen` when every trial slot is taken.
    pub fn try_acquire(self: &Arc<Self>) -> Result<CallPermit, CircuitState> {
        let (permit, event) = {
            let mut inner = self.lock();
            let event = self.refresh(&mut inner);
            let permit = match inner.state {
                CircuitState::Closed => Ok(CallPermit {
                    breaker: Arc::clone(self),
                    trial_generation: None,
                }),
                CircuitState::Open => Err(CircuitState::Open),
                CircuitState::HalfOpen => {
                    if inner.half_open_in_flight < self.config.half_open_max_calls {
                        inner.half_open_in_flight += 1;
                        Ok(CallPermit {
                            breaker: Arc::clone(self),
                            trial_generation: Some(inner.half_open_generation),
                        })
                    } else {
                        Err(CircuitState::HalfOpen)
                    }
                }
            };
            (permit, event.map(|e| (e, self.snapshot_locked(&inner))))
        };
        self.dispatch(event);
        permit
    }

    pub fn record_success(&self, latency: Duration) {
        let event = {
            let mut inner = self.lock();
            let now = unix_millis();
            inner.stats.total_calls += 1;
            inner.stats.total_successes += 1;
            inner.stats.consecutive_successes += 1;
            inner.stats.consecutive_failures = 0;
            inner.stats.last_success_time = Some(now);
            inner.call_history.push(CallRecord {
                timestamp_ms: now,
                outcome: CallOutcome::Success,
                latency_ms: latency.as_secs_f64() * 1000.0,
                error: None,
            });

            let event = if inner.state == CircuitState::HalfOpen
                && inner.stats.consecutive_successes >= self.config.success_threshold
            {
                let reason = format!(
                    "{} consecutive successes in half-open",
                    inner.stats.consecutive_successes
                );
                self.close(&mut inner, &reason);
                Some(Event::Closed)
            } else {
                None
            };
            event.map(|e| (e, self.snapshot_locked(&inner)))
        };
        self.dispatch(event);
    }

    pub fn record_failure(&self, error: &str, latency: Duration) {
        self.record_unsuccessful(CallOutcome::Failure, Some(error.to_string()), latency);
    }

    /// A failure that is also counted in `timeout_calls`.
    pub fn record_timeout(&self, latency: Duration) {
        self.record_unsuccessful(CallOutcome::Timeout, None, latency);
    }

    fn record_unsuccessful(&self, outcome: CallOutcome, error: Option<String>, latency: Duration) {
        let event = {
            let mut inner = self.lock();
            let now = unix_millis();
            inner.stats.total_calls += 1;
            inner.stats.total_failures += 1;
            if outcome == CallOutcome::Timeout {
                inner.stats.timeout_calls += 1;
            }
            inner.stats.consecutive_failures += 1;
            inner.stats.consecutive_successes = 0;
            inner.stats.last_failure_time = Some(now);
            inner.call_history.push(CallRecord {
                timestamp_ms: now,
                outcome,
                latency_ms: latency.as_secs_f64() * 1000.0,
                error,
            });

            let reason = match inner.state {
                CircuitState::Closed
                    if inner.stats.consecutive_failures >= self.config.failure_threshold =>
                {
                    Some(format!(
                        "failure threshold reached ({} consecutive failures)",
                        inner.stats.consecutive_failures
                    ))
                }
                CircuitState::HalfOpen => Some("trial call failed in half-open".to_string()),
                _ => None,
            };
            reason.map(|reason| {
                self.open(&mut inner, &reason);
                (Event::Opened(reason), self.snapshot_locked(&inner))
            })
        };
        self.dispatch(event);
    }

    /// Force Closed and zero counters and backoff. History is kept.
    pub fn reset(&self) {
        let event = {
            let mut inner = self.lock();
            self.reset_locked(&mut inner);
            Some((Event::Reset, self.snapshot_locked(&inner)))
        };
        self.dispatch(event);
    }

    /// [`reset`](Self::reset) and also empty both history buffers.
    pub fn reset_and_clear_history(&self) {
        let event = {
            let mut inner = self.lock();
            self.reset_locked(&mut inner);
            inner.call_history.clear();
            inner.state_transitions.clear();
            Some((Event::Reset, self.snapshot_locked(&inner)))
        };
        self.dispatch(event);
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        self.snapshot_locked(&inner)
    }

    /// The newest `limit` calls and transitions, or everything retained.
    pub fn history(&self, limit: Option<(usize, usize)>) -> BreakerHistory {
        let inner = self.lock();
        match limit {
            Some((calls, transitions)) => BreakerHistory {
                calls: inner.call_history.last(calls),
                transitions: inner.state_transitions.last(transitions),
            },
            None => BreakerHistory {
                calls: inner.call_history.to_vec(),
                transitions: inner.state_transitions.to_vec(),
            },
        }
    }

    /// Entries currently retained in (call history, transition history).
    pub fn history_sizes(&self) -> (usize, usize) {
        let inner = self.lock();
        (inner.call_history.len(), inner.state_transitions.len())
    }

    fn refresh(&self, inner: &mut Inner) -> Option<Event> {
        if inner.state != CircuitState::Open {
            return None;
        }
        let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or(Duration::MAX);
        if elapsed < inner.current_recovery_timeout {
            return None;
        }
        let reason = format!(
            "recovery timeout elapsed ({}ms)",
            inner.current_recovery_timeout.as_millis()
        );
        self.transition(inner, CircuitState::HalfOpen, reason);
        inner.stats.consecutive_successes = 0;
        inner.half_open_in_flight = 0;
        inner.half_open_generation += 1;
        Some(Event::HalfOpened)
    }

    fn open(&self, inner: &mut Inner, reason: &str) {
        inner.open_count = inner.open_count.saturating_add(1);
        let attempt = if self.config.enable_exponential_backoff {
            inner.open_count
        } else {
            1
        };
        inner.current_recovery_timeout = calculate_backoff(
            attempt,
            self.config.recovery_timeout(),
            self.config.max_recovery_timeout(),
            self.config.recovery_jitter,
        );
        inner.opened_at = Some(Instant::now());
        inner.stats.consecutive_successes = 0;
        inner.half_open_in_flight = 0;
        self.transition(inner, CircuitState::Open, reason.to_string());
    }

    fn close(&self, inner: &mut Inner, reason: &str) {
        inner.open_count = 0;
        inner.current_recovery_timeout = self.config.recovery_timeout();
        inner.opened_at = None;
        inner.stats.consecutive_failures = 0;
        inner.half_open_in_flight = 0;
        self.transition(inner, CircuitState::Closed, reason.to_string());
    }

    fn reset_locked(&self, inner: &mut Inner) {
        inner.stats = CircuitBreakerStats::default();
        self.close(inner, "manual_reset");
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState, reason: String) {
        let from = inner.state;
        inner.state = to;
        inner.state_transitions.push(StateTransition {
            from,
            to,
            timestamp_ms: unix_millis(),
            reason,
        });
    }

    fn snapshot_locked(&self, inner: &Inner) -> BreakerSnapshot {
        let stats = inner.stats.clone();
        let success_rate = if stats.total_calls == 0 {
            1.0
        } else {
            stats.total_successes as f64 / stats.total_calls as f64
        };
        let retry_in_ms = match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(opened_at)) => Some(
                inner
                    .current_recovery_timeout
                    .saturating_sub(opened_at.elapsed())
                    .as_millis() as u64,
            ),
            _ => None,
        };
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            stats,
            success_rate,
            open_count: inner.open_count,
            current_recovery_timeout_ms: inner.current_recovery_timeout.as_millis() as u64,
            retry_in_ms,
            half_open_in_flight: inner.half_open_in_flight,
            call_history_len: inner.call_history.len(),
            transition_history_len: inner.state_transitions.len(),
            config: self.config.clone(),
        }
    }

    fn dispatch(&self, event: Option<(Event, BreakerSnapshot)>) {
        let Some((event, snapshot)) = event else {
            return;
        };
        match event {
            Event::Opened(reason) => self.events.on_open(&snapshot, &reason),
            Event::Closed => self.events.on_close(&snapshot),
            Event::HalfOpened => self.events.on_half_open(&snapshot),
            Event::Reset => self.events.on_reset(&snapshot),
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}
