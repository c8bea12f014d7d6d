//! Error types for feedmix.

use thiserror::Error;

/// Common error type for feedmix.
#[derive(Error, Debug)]
pub enum FeedmixError {
    /// Storage error.
    ///
    /// Errors from sqlx are automatically converted. During a refresh this
    /// aborts the affected item only.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Upstream could not be reached, answered non-2xx, or was rejected before fetching.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Upstream body could not be parsed as a feed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Upstream answered with an anti-bot page instead of content.
    #[error("blocked upstream: {0}")]
    Blocked(String),

    /// A source or a whole refresh wave ran past its wall-clock budget.
    #[error("timed out: {0}")]
    Timeout(String),
}

impl FeedmixError {
    /// Whether this error means the upstream is actively refusing us.
    pub fn is_blocked(&self) -> bool {
        matches!(self, FeedmixError::Blocked(_))
    }
}

// Conversion from sqlx errors
impl From<sqlx::Error> for FeedmixError {
    fn from(e: sqlx::Error) -> Self {
        FeedmixError::Database(e.to_string())
    }
}

/// Result type alias for feedmix operations.
pub type Result<T> = std::result::Result<T, FeedmixError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display() {
        let err = FeedmixError::Fetch("HTTP error: 502".to_string());
        assert_eq!(err.to_string(), "fetch error: HTTP error: 502");
    }

    #[test]
    fn test_blocked_error_display() {
        let err = FeedmixError::Blocked("https://x.com/a/rss".to_string());
        assert_eq!(err.to_string(), "blocked upstream: https://x.com/a/rss");
        assert!(err.is_blocked());
    }

    #[test]
    fn test_not_found_error_display() {
        let err = FeedmixError::NotFound("source".to_string());
        assert_eq!(err.to_string(), "source not found");
        assert!(!err.is_blocked());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: FeedmixError = io_err.into();
        assert!(matches!(err, FeedmixError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_sqlx_error_conversion() {
        let err: FeedmixError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, FeedmixError::Database(_)));
    }
}
