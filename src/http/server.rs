//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the health and admin handlers
//! - Wire up middleware (tracing, timeout, request ID)
//! - Bind server to listener and shut down gracefully

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderName;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::setup_health_router;
use crate::config::schema::{AdminConfig, ListenerConfig};
use crate::manager::FaultTolerantAdapterManager;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<FaultTolerantAdapterManager>,
    pub admin: Arc<AdminConfig>,
}

impl AppState {
    pub fn new(manager: Arc<FaultTolerantAdapterManager>, admin: AdminConfig) -> Self {
        Self {
            manager,
            admin: Arc::new(admin),
        }
    }
}

/// HTTP server for the health and admin API.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState, listener_config: &ListenerConfig) -> Self {
        let router = Self::build_router(state, listener_config);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState, config: &ListenerConfig) -> Router {
        let request_id = HeaderName::from_static(X_REQUEST_ID);
        setup_health_router(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(PropagateRequestIdLayer::new(request_id.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` resolves, then finish in-flight requests.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
