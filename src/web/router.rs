//! Router configuration for the HTTP API.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handlers::{get_stats, health_check, list_items, list_sources, trigger_refresh, AppState};
use super::middleware::create_cors_layer;

/// Create the API router.
pub fn create_router(app_state: Arc<AppState>, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/items", get(list_items))
        .route("/refresh", post(trigger_refresh))
        .route("/stats", get(get_stats))
        .route("/sources", get(list_sources))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(cors_origins)),
        )
        .with_state(app_state)
}
