use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::executor::MemoryUsage;
use crate::health::{HealthStatus, ManagerHealth, Readiness};
use crate::http::server::AppState;
use crate::manager::{HistoryLookup, ResetOutcome};
use crate::resilience::{CircuitBreakerStats, CircuitState};

/// Calls and transitions returned by the short history endpoint.
const HISTORY_CALLS: usize = 50;
const HISTORY_TRANSITIONS: usize = 20;

#[derive(Serialize)]
pub struct BasicStatus {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody { error: message.into() })).into_response()
}

#[derive(Serialize)]
pub struct CircuitSummary {
    pub state: CircuitState,
    pub success_rate: f64,
    pub stats: CircuitBreakerStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_in_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub version: &'static str,
    pub fault_tolerance_enabled: bool,
    pub total_adapters: usize,
    pub healthy_adapters: usize,
    pub circuits: BTreeMap<String, CircuitSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryUsage>,
}

#[derive(Deserialize)]
pub struct ReadyParams {
    pub threshold: Option<f64>,
}

#[derive(Deserialize)]
pub struct ResetParams {
    #[serde(default)]
    pub clear_history: bool,
}

#[derive(Serialize)]
pub struct ResetResponse {
    pub adapter: String,
    pub outcome: ResetOutcome,
    pub clear_history: bool,
    pub state: CircuitState,
}

pub async fn get_status() -> Json<BasicStatus> {
    Json(BasicStatus { status: "healthy" })
}

pub async fn get_adapters(State(state): State<AppState>) -> Json<ManagerHealth> {
    Json(state.manager.get_health_status())
}

pub async fn get_ready(
    State(state): State<AppState>,
    Query(params): Query<ReadyParams>,
) -> Response {
    if let Some(threshold) = params.threshold {
        if !(0.0..=1.0).contains(&threshold) {
            return error(
                StatusCode::BAD_REQUEST,
                format!("threshold must be within [0, 1], got {threshold}"),
            );
        }
    }

    let readiness = state.manager.readiness(params.threshold);
    let status = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(readiness)).into_response()
}

pub async fn get_system(State(state): State<AppState>) -> Json<SystemHealth> {
    let health = state.manager.get_health_status();
    let circuits = health
        .executor
        .as_ref()
        .map(|e| {
            e.circuit_breakers
                .iter()
                .map(|(name, s)| {
                    let summary = CircuitSummary {
                        state: s.state,
                        success_rate: s.success_rate,
                        stats: s.stats.clone(),
                        retry_in_ms: s.retry_in_ms,
                    };
                    (name.clone(), summary)
                })
                .collect()
        })
        .unwrap_or_default();

    Json(SystemHealth {
        status: health.status,
        version: env!("CARGO_PKG_VERSION"),
        fault_tolerance_enabled: health.fault_tolerance_enabled,
        total_adapters: health.total_adapters,
        healthy_adapters: health.healthy_adapters,
        circuits,
        memory: state.manager.executor().map(|e| e.memory_usage()),
    })
}

fn history_response(state: &AppState, name: &str, limit: Option<(usize, usize)>) -> Response {
    match state.manager.breaker_history(name, limit) {
        HistoryLookup::Found(history) => Json(serde_json::json!({
            "adapter": name,
            "call_history": history.calls,
            "state_transitions": history.transitions,
        }))
        .into_response(),
        HistoryLookup::UnknownAdapter => error(
            StatusCode::NOT_FOUND,
            format!("no circuit breaker for adapter '{name}'"),
        ),
        HistoryLookup::ExecutorUnavailable => error(
            StatusCode::SERVICE_UNAVAILABLE,
            "fault tolerance executor unavailable",
        ),
    }
}

pub async fn get_history(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    history_response(&state, &name, Some((HISTORY_CALLS, HISTORY_TRANSITIONS)))
}

pub async fn get_full_history(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    history_response(&state, &name, None)
}

pub async fn reset_adapter(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<ResetParams>,
) -> Response {
    match state.manager.reset_circuit_breaker(&name, params.clear_history) {
        ResetOutcome::Reset => {
            tracing::info!(adapter = %name, clear_history = params.clear_history, "Circuit reset via admin API");
            Json(ResetResponse {
                adapter: name,
                outcome: ResetOutcome::Reset,
                clear_history: params.clear_history,
                state: CircuitState::Closed,
            })
            .into_response()
        }
        ResetOutcome::UnknownAdapter => error(
            StatusCode::NOT_FOUND,
            format!("no circuit breaker for adapter '{name}'"),
        ),
        ResetOutcome::ExecutorUnavailable => error(
            StatusCode::SERVICE_UNAVAILABLE,
            "fault tolerance executor unavailable",
        ),
    }
}
