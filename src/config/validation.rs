//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds >= 1, timeouts > 0)
//! - Detect duplicate adapter names and malformed backend URLs
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use crate::config::schema::{
    AdapterSource, CircuitBreakerConfig, ExecutionConfig, GatewayConfig,
};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a full gateway configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_breaker(
        "fault_tolerance.circuit_breaker",
        &config.fault_tolerance.circuit_breaker,
        &mut errors,
    );
    validate_execution(&config.fault_tolerance.execution, &mut errors);

    let threshold = config.fault_tolerance.readiness_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        errors.push(ValidationError::new(
            "fault_tolerance.readiness_threshold",
            format!("must be within [0, 1], got {threshold}"),
        ));
    }

    let mut seen = HashSet::new();
    for (i, adapter) in config.adapters.iter().enumerate() {
        let field = format!("adapters[{i}]");
        if adapter.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("{field}.name"), "must not be empty"));
        } else if !seen.insert(adapter.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{field}.name"),
                format!("duplicate adapter name '{}'", adapter.name),
            ));
        }
        if adapter.init_timeout_ms == 0 {
            errors.push(ValidationError::new(format!("{field}.init_timeout_ms"), "must be > 0"));
        }
        if let AdapterSource::Http(http) = &adapter.source {
            match url::Url::parse(&http.url) {
                Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
                Ok(url) => errors.push(ValidationError::new(
                    format!("{field}.source.url"),
                    format!("unsupported scheme '{}'", url.scheme()),
                )),
                Err(e) => errors.push(ValidationError::new(
                    format!("{field}.source.url"),
                    format!("invalid URL '{}': {e}", http.url),
                )),
            }
        }
        if let Some(overrides) = &adapter.fault_tolerance {
            let merged = config.fault_tolerance.circuit_breaker.with_overrides(overrides);
            validate_breaker(&format!("{field}.fault_tolerance"), &merged, &mut errors);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate circuit breaker settings under the given field prefix.
pub fn validate_breaker(prefix: &str, cb: &CircuitBreakerConfig, errors: &mut Vec<ValidationError>) {
    if cb.failure_threshold == 0 {
        errors.push(ValidationError::new(format!("{prefix}.failure_threshold"), "must be >= 1"));
    }
    if cb.success_threshold == 0 {
        errors.push(ValidationError::new(format!("{prefix}.success_threshold"), "must be >= 1"));
    }
    if cb.half_open_max_calls == 0 {
        errors.push(ValidationError::new(format!("{prefix}.half_open_max_calls"), "must be >= 1"));
    }
    if cb.recovery_timeout_ms == 0 {
        errors.push(ValidationError::new(format!("{prefix}.recovery_timeout_ms"), "must be > 0"));
    }
    if cb.max_recovery_timeout_ms < cb.recovery_timeout_ms {
        errors.push(ValidationError::new(
            format!("{prefix}.max_recovery_timeout_ms"),
            "must be >= recovery_timeout_ms",
        ));
    }
    if cb.call_timeout_ms == 0 {
        errors.push(ValidationError::new(format!("{prefix}.call_timeout_ms"), "must be > 0"));
    }
    if !(0.0..=1.0).contains(&cb.recovery_jitter) {
        errors.push(ValidationError::new(
            format!("{prefix}.recovery_jitter"),
            "must be within [0, 1]",
        ));
    }
    if cb.call_history_capacity == 0 || cb.transition_history_capacity == 0 {
        errors.push(ValidationError::new(
            format!("{prefix}.history_capacity"),
            "history capacities must be >= 1",
        ));
    }
}

/// Validate fan-out execution settings.
pub fn validate_execution(exec: &ExecutionConfig, errors: &mut Vec<ValidationError>) {
    if exec.max_concurrent_adapters == 0 {
        errors.push(ValidationError::new(
            "fault_tolerance.execution.max_concurrent_adapters",
            "must be >= 1",
        ));
    }
    if exec.timeout_ms == 0 {
        errors.push(ValidationError::new("fault_tolerance.execution.timeout_ms", "must be > 0"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{AdapterConfig, HttpSourceConfig, StaticSourceConfig};

    fn static_adapter(name: &str) -> AdapterConfig {
        AdapterConfig {
            name: name.into(),
            enabled: true,
            source: AdapterSource::Static(StaticSourceConfig::default()),
            init_timeout_ms: 1000,
            fault_tolerance: None,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = GatewayConfig::default();
        config.fault_tolerance.circuit_breaker.failure_threshold = 0;
        config.fault_tolerance.circuit_breaker.max_recovery_timeout_ms = 10;
        config.fault_tolerance.execution.max_concurrent_adapters = 0;
        config.adapters.push(static_adapter("dup"));
        config.adapters.push(static_adapter("dup"));

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"fault_tolerance.circuit_breaker.failure_threshold"));
        assert!(fields.contains(&"fault_tolerance.circuit_breaker.max_recovery_timeout_ms"));
        assert!(fields.contains(&"fault_tolerance.execution.max_concurrent_adapters"));
        assert!(fields.contains(&"adapters[1].name"));
    }

    #[test]
    fn test_rejects_bad_http_url() {
        let mut config = GatewayConfig::default();
        let mut adapter = static_adapter("remote");
        adapter.source = AdapterSource::Http(HttpSourceConfig {
            url: "ftp://example.com/search".into(),
            bearer_token: None,
            top_k: None,
            headers: Default::default(),
        });
        config.adapters.push(adapter);

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("unsupported scheme"));
    }
}
