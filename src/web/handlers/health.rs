//! Health and statistics handlers.

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::feed::ArticleRepository;
use crate::web::dto::{HealthResponse, StatsResponse};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;

/// GET /health - Liveness including a storage round trip.
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, ApiError> {
    state.db.ping().await.map_err(|e| {
        tracing::error!("Health check failed: {}", e);
        ApiError::internal("Database unavailable")
    })?;

    Ok(Json(HealthResponse {
        status: "ok",
        database: "sqlite",
    }))
}

/// GET /stats - Storage statistics per source kind.
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatsResponse>, ApiError> {
    let stats = ArticleRepository::new(state.db.pool()).stats().await?;

    let mut refreshing: Vec<String> = state
        .coordinator
        .active_keys()
        .iter()
        .map(ToString::to_string)
        .collect();
    refreshing.sort();

    Ok(Json(StatsResponse {
        total: stats.total(),
        tweet_like: stats.tweet_like.into(),
        document: stats.document.into(),
        configured_sources: state.coordinator.registry().len(),
        refreshing,
    }))
}
