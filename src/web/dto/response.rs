//! Response DTOs for the HTTP API.

use serde::Serialize;

use crate::feed::{Article, KindStats, Page, SourceHealth, SourceMeta};

// ============================================================================
// Items
// ============================================================================

/// Article in API responses.
#[derive(Debug, Serialize)]
pub struct ArticleResponse {
    /// Stable article ID.
    pub id: String,
    /// Feed URL of the source.
    pub source_url: String,
    /// Source kind.
    pub source_kind: String,
    /// Source display name.
    pub source_name: String,
    /// Source category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
    /// Author avatar URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_avatar: Option<String>,
    /// Content (HTML as published).
    pub content: String,
    /// Link to the original.
    pub link: String,
    /// Lead image URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Publication timestamp (RFC 3339).
    pub published_at: String,
    /// Favorite count (tweet-like sources).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favorite_count: Option<i64>,
    /// Retweet count (tweet-like sources).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retweet_count: Option<i64>,
}

impl From<Article> for ArticleResponse {
    fn from(article: Article) -> Self {
        Self {
            id: article.id,
            source_url: article.source_url,
            source_kind: article.source_kind.to_string(),
            source_name: article.source_name,
            category: article.category,
            title: article.title,
            author: article.author,
            author_avatar: article.author_avatar,
            content: article.content,
            link: article.link,
            image_url: article.image_url,
            published_at: article.published_at.to_rfc3339(),
            favorite_count: article.favorite_count,
            retweet_count: article.retweet_count,
        }
    }
}

/// Response of `GET /items`.
#[derive(Debug, Serialize)]
pub struct PageResponse {
    /// Items in display order.
    pub items: Vec<ArticleResponse>,
    /// A background refresh covering this column is in flight.
    pub refreshing: bool,
    /// Every source of the column is refused upstream.
    pub blocked: bool,
    /// Offset to request next.
    pub next_offset: u32,
    /// Items stored for the column.
    pub total: i64,
}

impl PageResponse {
    /// Build a response for a page read at `offset`.
    pub fn new(page: Page, offset: u32) -> Self {
        let next_offset = offset.saturating_add(page.items.len() as u32);
        Self {
            items: page.items.into_iter().map(ArticleResponse::from).collect(),
            refreshing: page.refreshing,
            blocked: page.blocked,
            next_offset,
            total: page.total,
        }
    }
}

// ============================================================================
// Refresh
// ============================================================================

/// Response of `POST /refresh`.
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    /// Always `started`.
    pub status: &'static str,
    /// Key the refresh runs for.
    pub key: String,
    /// A wave for this key was already in flight.
    pub already_running: bool,
}

// ============================================================================
// Health / Stats / Sources
// ============================================================================

/// Response of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok` when storage answers.
    pub status: &'static str,
    /// Storage backend.
    pub database: &'static str,
}

/// Statistics of one source kind.
#[derive(Debug, Serialize)]
pub struct KindStatsResponse {
    /// Stored articles.
    pub count: i64,
    /// Distinct sources with articles.
    pub sources: i64,
    /// Oldest publication timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest: Option<String>,
    /// Newest publication timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest: Option<String>,
}

impl From<KindStats> for KindStatsResponse {
    fn from(stats: KindStats) -> Self {
        Self {
            count: stats.count,
            sources: stats.sources,
            oldest: stats.oldest.map(|dt| dt.to_rfc3339()),
            newest: stats.latest.map(|dt| dt.to_rfc3339()),
        }
    }
}

/// Response of `GET /stats`.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Total stored articles.
    pub total: i64,
    /// Tweet-like articles.
    pub tweet_like: KindStatsResponse,
    /// Document articles.
    pub document: KindStatsResponse,
    /// Configured sources.
    pub configured_sources: usize,
    /// Refresh keys in flight.
    pub refreshing: Vec<String>,
}

/// Last refresh outcome of a source.
#[derive(Debug, Serialize)]
pub struct SourceHealthResponse {
    /// Last attempt timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<String>,
    /// Last success timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<String>,
    /// Last error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Refused by an anti-bot wall.
    pub blocked: bool,
    /// Failures since the last success.
    pub consecutive_failures: u32,
}

impl From<SourceHealth> for SourceHealthResponse {
    fn from(health: SourceHealth) -> Self {
        Self {
            last_attempt_at: health.last_attempt_at.map(|dt| dt.to_rfc3339()),
            last_success_at: health.last_success_at.map(|dt| dt.to_rfc3339()),
            last_error: health.last_error,
            blocked: health.blocked,
            consecutive_failures: health.consecutive_failures,
        }
    }
}

/// Configured source in `GET /sources`.
#[derive(Debug, Serialize)]
pub struct SourceResponse {
    /// Feed URL.
    pub url: String,
    /// Display name.
    pub name: String,
    /// Source kind.
    pub kind: String,
    /// Category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Subcategory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    /// Last refresh outcome, absent before the first attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<SourceHealthResponse>,
}

impl SourceResponse {
    /// Build a response from a source and its health.
    pub fn new(source: &SourceMeta, health: Option<SourceHealth>) -> Self {
        Self {
            url: source.url.clone(),
            name: source.display_name().to_string(),
            kind: source.kind.to_string(),
            category: source.category.clone(),
            subcategory: source.subcategory.clone(),
            health: health.map(SourceHealthResponse::from),
        }
    }
}
