//! Per-adapter outcomes and executor-wide errors.

use std::time::Duration;

use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::adapters::{AdapterError, ContextItem};
use crate::config::schema::ExecutionStrategy;
use crate::executor::context::ExecutionContext;

/// Why a single adapter call produced no data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdapterFailure {
    #[error("circuit open for adapter '{0}', call not attempted")]
    CircuitOpen(String),

    #[error("circuit half-open for adapter '{0}', every trial slot is taken, call not attempted")]
    TrialsExhausted(String),

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error(transparent)]
    Error(#[from] AdapterError),

    #[error("executor is shutting down")]
    ShuttingDown,
}

impl AdapterFailure {
    /// Short label used in metrics and health output.
    pub fn kind(&self) -> &'static str {
        match self {
            AdapterFailure::CircuitOpen(_) => "circuit_open",
            AdapterFailure::TrialsExhausted(_) => "trials_exhausted",
            AdapterFailure::Timeout(_) => "timeout",
            AdapterFailure::Error(_) => "error",
            AdapterFailure::ShuttingDown => "shutting_down",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdapterOutcome {
    Success(Vec<ContextItem>),
    Failure(AdapterFailure),
}

/// Immutable record of one adapter call.
#[derive(Debug, Clone)]
pub struct AdapterResult {
    pub adapter_name: String,
    pub outcome: AdapterOutcome,
    pub execution_time: Duration,
    pub context: ExecutionContext,
}

impl AdapterResult {
    pub fn success(
        adapter_name: impl Into<String>,
        data: Vec<ContextItem>,
        execution_time: Duration,
        context: ExecutionContext,
    ) -> Self {
        Self {
            adapter_name: adapter_name.into(),
            outcome: AdapterOutcome::Success(data),
            execution_time,
            context,
        }
    }

    pub fn failure(
        adapter_name: impl Into<String>,
        error: AdapterFailure,
        execution_time: Duration,
        context: ExecutionContext,
    ) -> Self {
        Self {
            adapter_name: adapter_name.into(),
            outcome: AdapterOutcome::Failure(error),
            execution_time,
            context,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, AdapterOutcome::Success(_))
    }

    pub fn data(&self) -> Option<&[ContextItem]> {
        match &self.outcome {
            AdapterOutcome::Success(items) => Some(items),
            AdapterOutcome::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&AdapterFailure> {
        match &self.outcome {
            AdapterOutcome::Success(_) => None,
            AdapterOutcome::Failure(e) => Some(e),
        }
    }
}

impl Serialize for AdapterResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("AdapterResult", 6)?;
        s.serialize_field("adapter_name", &self.adapter_name)?;
        s.serialize_field("success", &self.is_success())?;
        s.serialize_field("data", &self.data())?;
        s.serialize_field("error", &self.error().map(ToString::to_string))?;
        s.serialize_field("execution_time_ms", &(self.execution_time.as_secs_f64() * 1000.0))?;
        s.serialize_field("request_id", &self.context.request_id)?;
        s.end()
    }
}

/// Failures of the executor as a whole. Per-adapter failures never end up here.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error(
        "batch timed out after {timeout_ms}ms under strategy '{strategy}' \
         ({completed}/{requested} adapters finished)"
    )]
    BatchTimeout {
        strategy: ExecutionStrategy,
        timeout_ms: u64,
        completed: usize,
        requested: usize,
    },

    #[error("invalid executor configuration: {0}")]
    InvalidConfig(String),
}
