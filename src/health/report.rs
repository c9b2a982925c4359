//! Health and readiness report types.

use serde::Serialize;

use crate::adapters::ProviderSummary;
use crate::executor::ExecutorHealth;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Status from adapter counts. `degraded_mode` forces at best `Degraded`.
    pub fn from_counts(healthy: usize, total: usize, degraded_mode: bool) -> Self {
        if total > 0 && healthy == 0 {
            HealthStatus::Unhealthy
        } else if degraded_mode || healthy < total {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Manager-level health: provider availability merged with breaker state.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerHealth {
    pub status: HealthStatus,
    pub fault_tolerance_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
    pub total_adapters: usize,
    pub healthy_adapters: usize,
    pub open_circuits: Vec<String>,
    pub provider: ProviderSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor: Option<ExecutorHealth>,
}

/// Readiness verdict: ready when healthy/total is strictly above the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Readiness {
    pub ready: bool,
    pub healthy_adapters: usize,
    pub total_adapters: usize,
    pub ratio: f64,
    pub threshold: f64,
}

impl Readiness {
    pub fn evaluate(healthy: usize, total: usize, threshold: f64) -> Self {
        let ratio = if total == 0 {
            1.0
        } else {
            healthy as f64 / total as f64
        };
        Self {
            ready: total == 0 || ratio > threshold,
            healthy_adapters: healthy,
            total_adapters: total,
            ratio,
            threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_is_strictly_above_threshold() {
        assert!(Readiness::evaluate(3, 4, 0.5).ready);
        assert!(!Readiness::evaluate(2, 4, 0.5).ready);
        assert!(!Readiness::evaluate(0, 1, 0.5).ready);
    }

    #[test]
    fn test_no_adapters_is_ready() {
        let r = Readiness::evaluate(0, 0, 0.5);
        assert!(r.ready);
        assert!((r.ratio - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_status_from_counts() {
        assert_eq!(HealthStatus::from_counts(2, 2, false), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_counts(1, 2, false), HealthStatus::Degraded);
        assert_eq!(HealthStatus::from_counts(2, 2, true), HealthStatus::Degraded);
        assert_eq!(HealthStatus::from_counts(0, 2, false), HealthStatus::Unhealthy);
        assert_eq!(HealthStatus::from_counts(0, 0, false), HealthStatus::Healthy);
    }
}
