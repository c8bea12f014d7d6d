//! Feed types for feedmix.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{FeedmixError, Result};

/// Literal author used when every other author source is empty.
pub const UNKNOWN_AUTHOR: &str = "Unknown Feed";

/// Hosts whose feeds are timelines rather than documents.
const TWEET_LIKE_HOST_MARKERS: &[&str] = &["twitter.com", "x.com", "nitter"];

/// Kind of upstream source; decides which table an item lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// Social timeline (short posts, high publish frequency).
    TweetLike,
    /// Blog, news or paper feed.
    Document,
}

impl SourceKind {
    /// Every kind, in storage order.
    pub const ALL: [SourceKind; 2] = [SourceKind::TweetLike, SourceKind::Document];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::TweetLike => "tweet-like",
            SourceKind::Document => "document",
        }
    }

    /// Table holding articles of this kind.
    pub fn table_name(&self) -> &'static str {
        match self {
            SourceKind::TweetLike => "tweet_articles",
            SourceKind::Document => "document_articles",
        }
    }

    /// Guess the kind from a feed URL.
    pub fn infer_from_url(url: &str) -> Self {
        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()));

        let tweet_like = match host {
            Some(host) => TWEET_LIKE_HOST_MARKERS.iter().any(|marker| {
                if marker.contains('.') {
                    host == *marker || host.ends_with(&format!(".{marker}"))
                } else {
                    host.contains(marker)
                }
            }),
            None => false,
        };

        if tweet_like {
            SourceKind::TweetLike
        } else {
            SourceKind::Document
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = FeedmixError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tweet-like" | "tweet" | "tweets" => Ok(SourceKind::TweetLike),
            "document" | "rss" => Ok(SourceKind::Document),
            _ => Err(FeedmixError::Validation(format!("unknown source kind: {s}"))),
        }
    }
}

/// A canonical, stored feed item.
///
/// Articles are immutable once stored; a second insert with the same id is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Article {
    /// Stable identifier (upstream guid, link, or content hash).
    pub id: String,
    /// URL of the feed this item came from.
    pub source_url: String,
    /// Kind of the originating source.
    pub source_kind: SourceKind,
    /// Display name of the originating source.
    pub source_name: String,
    /// Category of the originating source.
    pub category: Option<String>,
    /// Item title.
    pub title: String,
    /// Author; never empty.
    pub author: String,
    /// Avatar of the author, when the upstream provides one.
    pub author_avatar: Option<String>,
    /// HTML fragment.
    pub content: String,
    /// Link to the original item.
    pub link: String,
    /// Best-effort preview image.
    pub image_url: Option<String>,
    /// Publication time.
    pub published_at: DateTime<Utc>,
    /// Like count (tweet-like sources only).
    pub favorite_count: Option<i64>,
    /// Repost count (tweet-like sources only).
    pub retweet_count: Option<i64>,
}

impl Article {
    /// Key used for exposure tracking and clustering.
    pub fn source_key(&self) -> &str {
        &self.source_url
    }
}

/// A feed entry as returned by a fetcher, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawItem {
    /// Upstream guid / entry id.
    pub id: Option<String>,
    /// Entry title.
    pub title: Option<String>,
    /// HTML content or summary.
    pub content: Option<String>,
    /// Entry link.
    pub link: Option<String>,
    /// Explicit author tag.
    pub author: Option<String>,
    /// Content creator field (`dc:creator`).
    pub creator: Option<String>,
    /// Author avatar URL.
    pub author_avatar: Option<String>,
    /// Publication (or last update) time.
    pub published_at: Option<DateTime<Utc>>,
    /// Enclosure / media URL.
    pub image: Option<String>,
    /// Like count.
    pub favorite_count: Option<i64>,
    /// Repost count.
    pub retweet_count: Option<i64>,
}

/// Result of a successful fetch+parse.
///
/// An empty `items` list means "nothing new", never "source down";
/// failures are reported as errors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedFeed {
    /// Feed-level title, if the upstream declares one.
    pub title: Option<String>,
    /// Parsed entries.
    pub items: Vec<RawItem>,
}

/// What the normalizer and fetchers know about a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMeta {
    /// Feed URL.
    pub url: String,
    /// Configured display name.
    pub name: Option<String>,
    /// Source kind.
    pub kind: SourceKind,
    /// Category.
    pub category: Option<String>,
    /// Subcategory within the category.
    pub subcategory: Option<String>,
}

impl SourceMeta {
    /// Create metadata for a source with no name or category.
    pub fn new(url: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            url: url.into(),
            name: None,
            kind,
            category: None,
            subcategory: None,
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Fill in the display name from the fetched feed title when none is configured.
    pub fn with_feed_title(mut self, title: Option<&str>) -> Self {
        let configured = self.name.as_deref().is_some_and(|n| !n.trim().is_empty());
        if !configured {
            self.name = title
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string);
        }
        self
    }

    /// Display name, falling back to the literal unknown-feed label.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(UNKNOWN_AUTHOR)
    }
}

/// Unit of single-flight refresh.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RefreshKey {
    /// Every configured source.
    All,
    /// Every configured source of one kind.
    Kind(SourceKind),
    /// One source, by feed URL.
    Source(String),
}

impl RefreshKey {
    /// Parse a key from its wire form: `all`, a kind name, or a feed URL.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(FeedmixError::Validation("refresh key is empty".to_string()));
        }
        if s.eq_ignore_ascii_case("all") || s.eq_ignore_ascii_case("mix") {
            return Ok(RefreshKey::All);
        }
        if s.contains("://") {
            return Ok(RefreshKey::Source(s.to_string()));
        }
        s.parse().map(RefreshKey::Kind)
    }
}

impl fmt::Display for RefreshKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshKey::All => f.write_str("all"),
            RefreshKey::Kind(kind) => write!(f, "{kind}"),
            RefreshKey::Source(url) => f.write_str(url),
        }
    }
}

/// Which items a column shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColumnKind {
    /// Tweet-like items only.
    TweetLike,
    /// Document items only.
    Document,
    /// Both kinds merged.
    Mixed,
}

impl ColumnKind {
    /// Source kinds read by this column.
    pub fn source_kinds(&self) -> &'static [SourceKind] {
        match self {
            ColumnKind::TweetLike => &[SourceKind::TweetLike],
            ColumnKind::Document => &[SourceKind::Document],
            ColumnKind::Mixed => &SourceKind::ALL,
        }
    }
}

impl From<SourceKind> for ColumnKind {
    fn from(kind: SourceKind) -> Self {
        match kind {
            SourceKind::TweetLike => ColumnKind::TweetLike,
            SourceKind::Document => ColumnKind::Document,
        }
    }
}

impl FromStr for ColumnKind {
    type Err = FeedmixError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mixed" | "mix" => Ok(ColumnKind::Mixed),
            other => other.parse::<SourceKind>().map(ColumnKind::from).map_err(|_| {
                FeedmixError::Validation(format!(
                    "unknown column kind: {s} (expected tweet-like, document or mixed)"
                ))
            }),
        }
    }
}

/// Source predicate of one UI column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column kind.
    pub kind: ColumnKind,
    /// Restrict to a single feed.
    pub feed_url: Option<String>,
    /// Restrict to one category.
    pub category: Option<String>,
}

impl ColumnSpec {
    /// A column over every source of the given kind.
    pub fn new(kind: ColumnKind) -> Self {
        Self {
            kind,
            feed_url: None,
            category: None,
        }
    }

    /// Restrict to a single feed.
    pub fn with_feed_url(mut self, url: impl Into<String>) -> Self {
        self.feed_url = Some(url.into());
        self
    }

    /// Restrict to one category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Whether pages of this column go through the diversity ranker.
    ///
    /// Single-feed columns stay chronological; there is nothing to diversify.
    pub fn is_ranked(&self) -> bool {
        if self.feed_url.is_some() {
            return false;
        }
        matches!(self.kind, ColumnKind::Mixed | ColumnKind::TweetLike)
    }

    /// Refresh key covering this column's sources.
    pub fn refresh_key(&self) -> RefreshKey {
        if let Some(url) = &self.feed_url {
            return RefreshKey::Source(url.clone());
        }
        match self.kind {
            ColumnKind::TweetLike => RefreshKey::Kind(SourceKind::TweetLike),
            ColumnKind::Document => RefreshKey::Kind(SourceKind::Document),
            ColumnKind::Mixed => RefreshKey::All,
        }
    }
}

/// One page of a column.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    /// Items, in display order.
    pub items: Vec<Article>,
    /// A background refresh covering this column is in flight.
    pub refreshing: bool,
    /// Every source of this column was refused by an anti-bot wall on its last refresh.
    pub blocked: bool,
    /// Items stored for the column, across all pages.
    pub total: i64,
}
