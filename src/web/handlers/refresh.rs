//! Refresh trigger handler.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::web::dto::{RefreshQuery, RefreshResponse, ValidatedQuery};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;

/// POST /refresh - Start a background refresh.
///
/// Always answers 202; a refresh already in flight for the key is reported
/// through `already_running` rather than started twice. Once the coordinator
/// is shutting down nothing starts and the trigger is only logged.
pub async fn trigger_refresh(
    State(state): State<Arc<AppState>>,
    ValidatedQuery(query): ValidatedQuery<RefreshQuery>,
) -> Result<(StatusCode, Json<RefreshResponse>), ApiError> {
    let key = query.refresh_key()?;

    let started = state.coordinator.trigger_refresh(key.clone()).is_some();
    let already_running = !started && state.coordinator.is_refreshing(&key);
    if already_running {
        tracing::debug!("Refresh for {} already running", key);
    } else if !started && state.coordinator.is_shut_down() {
        tracing::warn!("Ignoring refresh for {} during shutdown", key);
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(RefreshResponse {
            status: "started",
            key: key.to_string(),
            already_running,
        }),
    ))
}
