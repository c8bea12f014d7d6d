//! Validating extractors for the HTTP API.

use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::web::error::ApiError;

/// A query-string extractor that validates the parsed value.
///
/// Malformed query strings (a negative offset, a non-numeric limit) are
/// rejected as bad requests; values that parse but fail validation come
/// back with field-level details.
///
/// # Example
///
/// ```ignore
/// async fn list(ValidatedQuery(query): ValidatedQuery<ItemsQuery>) -> ... {
///     // query is already validated
/// }
/// ```
pub struct ValidatedQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ValidatedQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid query: {}", e)))?;

        value.validate().map_err(ApiError::from)?;

        Ok(ValidatedQuery(value))
    }
}
