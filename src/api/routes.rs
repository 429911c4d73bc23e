//! API Routes
//!
//! Configures the Axum router with the administrative endpoints.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    health_handler, invalidate_algorithm_handler, invalidate_pattern_handler,
    invalidate_symbol_handler, reset_stats_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Primary store health probe
/// - `GET /stats` - Cache statistics
/// - `POST /stats/reset` - Clear statistics counters
/// - `DELETE /cache/algorithms/:algorithm_id` - Invalidate one algorithm
/// - `DELETE /cache/symbols/:symbol` - Invalidate one symbol across concepts
/// - `POST /cache/invalidate` - Invalidate a raw pattern
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/stats/reset", post(reset_stats_handler))
        .route("/cache/algorithms/:algorithm_id", delete(invalidate_algorithm_handler))
        .route("/cache/symbols/:symbol", delete(invalidate_symbol_handler))
        .route("/cache/invalidate", post(invalidate_pattern_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheFacade, MemoryStore, TtlPolicy};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use tower::util::ServiceExt;

    fn create_test_app() -> Router {
        let facade = CacheFacade::new(
            Arc::new(MemoryStore::new(100)),
            Arc::new(MemoryStore::new(100)),
            TtlPolicy::default(),
            "test:",
        )
        .unwrap();
        create_router(AppState::new(facade))
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_test_app();

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let app = create_test_app();

        let response = app
            .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let app = create_test_app();

        let response = app
            .oneshot(Request::builder().uri("/get/key").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
