//! Route definitions for the REST API.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::AppState;

/// Full application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(api_routes())
        .merge(legacy_routes())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// API v1 routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/status", get(handlers::status))
        .route("/api/v1/tag", get(handlers::read_tag).post(handlers::write_tag))
        .route("/api/v1/reader/attach", post(handlers::attach_reader))
        .route("/api/v1/reader/detach", post(handlers::detach_reader))
        .route("/api/v1/card/present", post(handlers::card_present))
        .route("/api/v1/card/absent", post(handlers::card_absent))
}

/// Unversioned read/write routes
pub fn legacy_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/write", post(handlers::write_tag))
        .route("/read", get(handlers::read_tag))
}
