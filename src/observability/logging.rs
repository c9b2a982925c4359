//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Configure log level from config, overridable via `RUST_LOG`
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development

use tracing::Subscriber;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::schema::ObservabilityConfig;

/// Default filter when `RUST_LOG` is unset.
fn default_directives(level: &str) -> String {
    format!("retrieval_gateway={level},tower_http={level}")
}

/// Subscriber for `config`: env filter plus plain or JSON formatting.
pub fn build_subscriber(config: &ObservabilityConfig) -> Box<dyn Subscriber + Send + Sync> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.log_level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json_logs {
        Box::new(registry.with(tracing_subscriber::fmt::layer().json()))
    } else {
        Box::new(registry.with(tracing_subscriber::fmt::layer()))
    }
}

/// Install the global subscriber. Safe to call more than once.
pub fn init_logging(config: &ObservabilityConfig) {
    if build_subscriber(config).try_init().is_err() {
        tracing::debug!("Logging already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(
            default_directives("debug"),
            "retrieval_gateway=debug,tower_http=debug"
        );
    }

    #[test]
    fn test_subscriber_scoped_to_closure() {
        for json_logs in [false, true] {
            let config = ObservabilityConfig {
                json_logs,
                ..ObservabilityConfig::default()
            };
            tracing::subscriber::with_default(build_subscriber(&config), || {
                tracing::info!(json_logs, "scoped subscriber active");
            });
        }
        assert!(!tracing::dispatcher::has_been_set());
    }
}
