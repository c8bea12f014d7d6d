//! Request DTOs for the HTTP API.

use serde::Deserialize;
use validator::Validate;

use crate::config::PaginationConfig;
use crate::feed::{ColumnKind, ColumnSpec, RefreshKey};
use crate::web::error::ApiError;

/// Query string of `GET /items`.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ItemsQuery {
    /// Column kind: `tweet-like`, `document` or `mixed` (default).
    #[serde(default)]
    pub kind: Option<String>,
    /// Restrict to a single feed.
    #[serde(default)]
    #[validate(url(message = "feed_url must be a valid URL"))]
    pub feed_url: Option<String>,
    /// Restrict to one category.
    #[serde(default)]
    #[validate(length(min = 1, max = 100, message = "category must be 1-100 characters"))]
    pub category: Option<String>,
    /// Page size; defaults to the configured default limit.
    #[serde(default)]
    #[validate(range(min = 1, message = "limit must be at least 1"))]
    pub limit: Option<u32>,
    /// Number of items to skip.
    #[serde(default)]
    pub offset: u32,
}

impl ItemsQuery {
    /// Column described by this query.
    pub fn column(&self) -> Result<ColumnSpec, ApiError> {
        let kind = match self.kind.as_deref() {
            Some(kind) => kind.parse::<ColumnKind>()?,
            None => ColumnKind::Mixed,
        };

        let mut column = ColumnSpec::new(kind);
        if let Some(url) = &self.feed_url {
            column = column.with_feed_url(url.clone());
        }
        if let Some(category) = &self.category {
            column = column.with_category(category.clone());
        }
        Ok(column)
    }

    /// Effective page size under the configured bounds.
    pub fn limit(&self, config: &PaginationConfig) -> Result<u32, ApiError> {
        let limit = self.limit.unwrap_or(config.default_limit);
        if limit > config.max_limit {
            return Err(ApiError::field(
                "limit",
                format!("limit must be at most {}", config.max_limit),
            ));
        }
        Ok(limit)
    }
}

/// Query string of `POST /refresh`.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct RefreshQuery {
    /// `all`, a source kind, or a feed URL. Defaults to `all`.
    #[serde(default)]
    #[validate(length(min = 1, max = 2048, message = "key must be 1-2048 characters"))]
    pub key: Option<String>,
}

impl RefreshQuery {
    /// Refresh key described by this query.
    pub fn refresh_key(&self) -> Result<RefreshKey, ApiError> {
        match self.key.as_deref() {
            Some(key) => Ok(RefreshKey::parse(key)?),
            None => Ok(RefreshKey::All),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::error::ErrorCode;

    #[test]
    fn test_items_query_defaults() {
        let query = ItemsQuery::default();
        let column = query.column().unwrap();
        assert_eq!(column.kind, ColumnKind::Mixed);
        assert!(column.feed_url.is_none());
        assert_eq!(query.limit(&PaginationConfig::default()).unwrap(), 50);
    }

    #[test]
    fn test_items_query_column() {
        let query = ItemsQuery {
            kind: Some("document".to_string()),
            feed_url: Some("https://blog.example/feed".to_string()),
            category: Some("Tech".to_string()),
            ..Default::default()
        };
        let column = query.column().unwrap();
        assert_eq!(column.kind, ColumnKind::Document);
        assert_eq!(column.feed_url.as_deref(), Some("https://blog.example/feed"));
        assert_eq!(column.category.as_deref(), Some("Tech"));
    }

    #[test]
    fn test_items_query_bad_kind() {
        let query = ItemsQuery {
            kind: Some("podcast".to_string()),
            ..Default::default()
        };
        assert_eq!(query.column().unwrap_err().code(), ErrorCode::BadRequest);
    }

    #[test]
    fn test_items_query_limit_bounds() {
        let config = PaginationConfig::default();

        let query = ItemsQuery {
            limit: Some(config.max_limit + 1),
            ..Default::default()
        };
        assert_eq!(
            query.limit(&config).unwrap_err().code(),
            ErrorCode::ValidationError
        );

        let query = ItemsQuery {
            limit: Some(0),
            ..Default::default()
        };
        assert!(query.validate().is_err());
    }

    #[test]
    fn test_refresh_query_key() {
        assert_eq!(RefreshQuery::default().refresh_key().unwrap(), RefreshKey::All);

        let query = RefreshQuery {
            key: Some("tweet-like".to_string()),
        };
        assert!(matches!(query.refresh_key().unwrap(), RefreshKey::Kind(_)));

        let query = RefreshQuery {
            key: Some("https://blog.example/feed".to_string()),
        };
        assert_eq!(
            query.refresh_key().unwrap(),
            RefreshKey::Source("https://blog.example/feed".to_string())
        );

        let query = RefreshQuery {
            key: Some("nonsense".to_string()),
        };
        assert!(query.refresh_key().is_err());
    }
}
