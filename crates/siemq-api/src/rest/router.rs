//! Axum router configuration

use crate::{rest::handlers, AppState};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::{sync::Arc, time::Duration};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    let api_v1 = Router::new()
        .route("/query", post(handlers::query))
        .route(
            "/context/:session_id",
            get(handlers::get_context).delete(handlers::clear_context),
        )
        .route("/context/:session_id/summary", get(handlers::session_summary))
        .route("/sessions", get(handlers::sessions));

    // Liveness stays outside the versioned prefix
    let health_routes = Router::new().route("/health", get(handlers::health_check));

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(health_routes)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Configure CORS layer
fn cors_layer() -> CorsLayer {
    let origin = std::env::var("CORS_ALLOWED_ORIGINS")
        .ok()
        .filter(|value| value != "*")
        .and_then(|value| value.parse::<HeaderValue>().ok())
        .map(AllowOrigin::exact)
        .unwrap_or_else(AllowOrigin::any);

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600))
}
