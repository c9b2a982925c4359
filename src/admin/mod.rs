//! Health and admin HTTP routes.
//!
//! ```text
//! GET  /health                           liveness
//! GET  /health/adapters                  manager health
//! GET  /health/ready                     200 ready / 503 not ready
//! GET  /health/system                    status + per-adapter circuits
//! GET  /health/adapters/{name}/history   recent calls and transitions
//! GET  /health/adapters/{name}/history/full
//! POST /health/adapters/{name}/reset     bearer-guarded when auth is enabled
//! ```

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_health_router(state: AppState) -> Router {
    let guarded = Router::new()
        .route("/health/adapters/{name}/reset", post(reset_adapter))
        .route_layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware));

    Router::new()
        .route("/health", get(get_status))
        .route("/health/", get(get_status))
        .route("/health/adapters", get(get_adapters))
        .route("/health/ready", get(get_ready))
        .route("/health/system", get(get_system))
        .route("/health/adapters/{name}/history", get(get_history))
        .route("/health/adapters/{name}/history/full", get(get_full_history))
        .merge(guarded)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
    };
    use tower::ServiceExt;

    use crate::adapters::AdapterRegistry;
    use crate::config::schema::{AdminConfig, GatewayConfig};
    use crate::manager::FaultTolerantAdapterManager;

    fn router(auth_enabled: bool) -> Router {
        let config = GatewayConfig::default();
        let registry = Arc::new(AdapterRegistry::new(Vec::new()));
        let manager = Arc::new(FaultTolerantAdapterManager::new(registry, &config));
        let admin = AdminConfig {
            auth_enabled,
            api_key: "secret".into(),
        };
        setup_health_router(AppState::new(manager, admin))
    }

    fn reset_request(auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/health/adapters/kb/reset");
        if let Some(token) = auth {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_liveness_with_and_without_trailing_slash() {
        for uri in ["/health", "/health/"] {
            let res = router(true)
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::OK);
            let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
            assert_eq!(&body[..], br#"{"status":"healthy"}"#);
        }
    }

    #[tokio::test]
    async fn test_reset_guard() {
        let res = router(true).oneshot(reset_request(None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = router(true).oneshot(reset_request(Some("secret"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = router(false).oneshot(reset_request(None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ready_threshold_bounds() {
        let res = router(true)
            .oneshot(Request::get("/health/ready?threshold=-1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = router(true)
            .oneshot(Request::get("/health/ready?threshold=1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_read_routes_are_open() {
        let res = router(true)
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
