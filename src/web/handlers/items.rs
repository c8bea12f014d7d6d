//! Item handlers.

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::web::dto::{ItemsQuery, PageResponse, ValidatedQuery};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;

/// GET /items - One page of a column.
///
/// Never waits on upstream: a stale column is served from storage with
/// `refreshing: true` while a background refresh runs.
pub async fn list_items(
    State(state): State<Arc<AppState>>,
    ValidatedQuery(query): ValidatedQuery<ItemsQuery>,
) -> Result<Json<PageResponse>, ApiError> {
    let column = query.column()?;
    let limit = query.limit(&state.pagination_config)?;

    let page = state
        .pagination
        .get_page(&column, query.offset, limit)
        .await?;

    Ok(Json(PageResponse::new(page, query.offset)))
}
