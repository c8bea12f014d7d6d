//! Source listing handler.

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::web::dto::SourceResponse;
use crate::web::handlers::AppState;

/// GET /sources - Configured sources with their last refresh outcome.
pub async fn list_sources(State(state): State<Arc<AppState>>) -> Json<Vec<SourceResponse>> {
    let health = state.coordinator.health_snapshot();

    let sources = state
        .coordinator
        .registry()
        .all()
        .iter()
        .map(|source| SourceResponse::new(source, health.get(&source.url).cloned()))
        .collect();

    Json(sources)
}
