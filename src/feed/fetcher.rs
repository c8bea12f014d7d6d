//! Feed fetchers with security measures.
//!
//! A [`FeedFetcher`] turns a source into a [`FetchedFeed`] or fails loudly.
//! The HTTP fetcher handles RSS/Atom over the network with SSRF protection
//! and resource limits; the scraper fetcher runs an external program for
//! tweet-like sources that have no public feed.

use std::net::IpAddr;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_rs::parser;
use reqwest::Client;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use super::types::{FetchedFeed, RawItem, SourceKind, SourceMeta};
use crate::config::RefreshConfig;
use crate::error::{FeedmixError, Result};

/// Markers of anti-bot interstitials served instead of feed content.
const BLOCKED_MARKERS: &[&str] = &["whitelist", "Cloudflare", "Attention Required"];

/// Fetch + parse capability for one source.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Fetch and parse the source.
    ///
    /// Returns an error (never an empty feed) when the source is down,
    /// unparseable or blocked.
    async fn fetch(&self, source: &SourceMeta) -> Result<FetchedFeed>;
}

/// RSS/Atom fetcher over HTTP.
pub struct HttpFeedFetcher {
    client: Client,
    max_feed_size: u64,
    max_items: usize,
}

impl HttpFeedFetcher {
    /// Create a new fetcher from refresh settings.
    pub fn new(config: &RefreshConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .timeout(Duration::from_secs(config.source_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| FeedmixError::Fetch(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_feed_size: config.max_feed_size_bytes,
            max_items: config.max_items_per_source,
        })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, source: &SourceMeta) -> Result<FetchedFeed> {
        let url = source.url.as_str();
        validate_url(url)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FeedmixError::Timeout(format!("{url}: {e}"))
                } else {
                    FeedmixError::Fetch(format!("failed to fetch feed: {e}"))
                }
            })?;

        let status = response.status();

        // Check content length if available
        if let Some(content_length) = response.content_length() {
            if content_length > self.max_feed_size {
                return Err(FeedmixError::Fetch(format!(
                    "feed too large: {} bytes (max {} bytes)",
                    content_length, self.max_feed_size
                )));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FeedmixError::Fetch(format!("failed to read response: {e}")))?;

        // Check actual size
        if bytes.len() as u64 > self.max_feed_size {
            return Err(FeedmixError::Fetch(format!(
                "feed too large: {} bytes (max {} bytes)",
                bytes.len(),
                self.max_feed_size
            )));
        }

        let body = String::from_utf8_lossy(&bytes);
        if looks_blocked(&body) {
            return Err(FeedmixError::Blocked(url.to_string()));
        }
        if !status.is_success() {
            return Err(FeedmixError::Fetch(format!("HTTP error: {status}")));
        }

        parse_feed(&bytes, self.max_items)
    }
}

/// Fetcher that runs an external scraper and reads its stdout.
///
/// The scraper gets the source URL as its last argument and prints either
/// an RSS/Atom document or JSON (`[{...}]` or `{"title": ..., "items": [...]}`).
pub struct ScraperFetcher {
    command: Vec<String>,
    timeout: Duration,
    max_items: usize,
}

impl ScraperFetcher {
    /// Create a new scraper fetcher; `command` is argv without the URL.
    pub fn new(command: Vec<String>, timeout: Duration, max_items: usize) -> Result<Self> {
        if command.is_empty() {
            return Err(FeedmixError::Config(
                "scraper command must name a program".to_string(),
            ));
        }
        Ok(Self {
            command,
            timeout,
            max_items,
        })
    }
}

#[async_trait]
impl FeedFetcher for ScraperFetcher {
    async fn fetch(&self, source: &SourceMeta) -> Result<FetchedFeed> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| FeedmixError::Config("scraper command is empty".to_string()))?;

        debug!("Running scraper {} for {}", program, source.url);

        let child = Command::new(program)
            .args(args)
            .arg(&source.url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // On timeout the output future is dropped, which kills the child
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                FeedmixError::Timeout(format!("scraper for {} after {:?}", source.url, self.timeout))
            })??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if looks_blocked(&stdout) {
            return Err(FeedmixError::Blocked(source.url.clone()));
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FeedmixError::Fetch(format!(
                "scraper exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        parse_scraper_output(&stdout, self.max_items)
    }
}

/// Routes tweet-like sources to a dedicated fetcher when one is configured.
pub struct RoutingFetcher {
    default: Arc<dyn FeedFetcher>,
    tweet_like: Option<Arc<dyn FeedFetcher>>,
}

impl RoutingFetcher {
    /// Create a router; without a tweet-like fetcher every source uses `default`.
    pub fn new(default: Arc<dyn FeedFetcher>, tweet_like: Option<Arc<dyn FeedFetcher>>) -> Self {
        Self {
            default,
            tweet_like,
        }
    }

    /// Build the fetcher stack from refresh settings.
    pub fn from_config(config: &RefreshConfig) -> Result<Self> {
        let http: Arc<dyn FeedFetcher> = Arc::new(HttpFeedFetcher::new(config)?);
        let scraper = match &config.scraper_command {
            Some(command) => Some(Arc::new(ScraperFetcher::new(
                command.clone(),
                Duration::from_secs(config.source_timeout_secs),
                config.max_items_per_source,
            )?) as Arc<dyn FeedFetcher>),
            None => None,
        };
        Ok(Self::new(http, scraper))
    }
}

#[async_trait]
impl FeedFetcher for RoutingFetcher {
    async fn fetch(&self, source: &SourceMeta) -> Result<FetchedFeed> {
        match (&self.tweet_like, source.kind) {
            (Some(fetcher), SourceKind::TweetLike) => fetcher.fetch(source).await,
            _ => self.default.fetch(source).await,
        }
    }
}

/// Whether a response body is an anti-bot page rather than a feed.
pub fn looks_blocked(body: &str) -> bool {
    if looks_like_feed(body) {
        return false;
    }
    BLOCKED_MARKERS.iter().any(|marker| body.contains(marker))
}

fn looks_like_feed(body: &str) -> bool {
    let head: String = body.chars().take(1024).collect();
    head.contains("<rss") || head.contains("<feed") || head.contains("<rdf:RDF")
}

/// Validate a URL for SSRF protection.
///
/// This function checks that:
/// - The URL uses http or https scheme
/// - The host is not a private/loopback address
/// - The host is not a reserved hostname
pub fn validate_url(url: &str) -> Result<()> {
    let parsed =
        url::Url::parse(url).map_err(|e| FeedmixError::Fetch(format!("invalid URL: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(FeedmixError::Fetch(format!(
                "unsupported URL scheme: {scheme}"
            )));
        }
    }

    let host = parsed
        .host()
        .ok_or_else(|| FeedmixError::Fetch("URL has no host".to_string()))?;

    let ip = match host {
        url::Host::Domain(domain) => {
            if is_forbidden_hostname(domain) {
                return Err(FeedmixError::Fetch(format!("forbidden host: {domain}")));
            }
            return Ok(());
        }
        url::Host::Ipv4(ipv4) => IpAddr::V4(ipv4),
        url::Host::Ipv6(ipv6) => IpAddr::V6(ipv6),
    };

    if is_private_ip(&ip) {
        return Err(FeedmixError::Fetch(format!(
            "private IP address not allowed: {ip}"
        )));
    }
    Ok(())
}

/// Check if a hostname is forbidden.
fn is_forbidden_hostname(host: &str) -> bool {
    let host_lower = host.to_lowercase();
    if host_lower == "localhost" {
        return true;
    }

    const FORBIDDEN_SUFFIXES: &[&str] = &[
        ".local",
        ".localhost",
        ".internal",
        ".intranet",
        ".corp",
        ".home",
        ".lan",
    ];
    FORBIDDEN_SUFFIXES
        .iter()
        .any(|suffix| host_lower.ends_with(suffix))
}

/// Check if an IP address is private/reserved.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            let octets = ipv4.octets();
            ipv4.is_loopback()
                || ipv4.is_private()
                || ipv4.is_link_local()
                || ipv4.is_broadcast()
                || ipv4.is_unspecified()
                || ipv4.is_documentation()
                // Carrier-grade NAT: 100.64.0.0/10
                || (octets[0] == 100 && (64..=127).contains(&octets[1]))
        }
        IpAddr::V6(ipv6) => {
            let segments = ipv6.segments();
            if ipv6.is_loopback() || ipv6.is_unspecified() {
                return true;
            }
            // Unique local: fc00::/7
            if (segments[0] & 0xfe00) == 0xfc00 {
                return true;
            }
            // Link-local: fe80::/10
            if (segments[0] & 0xffc0) == 0xfe80 {
                return true;
            }
            // IPv4-mapped addresses inherit the v4 rules
            match ipv6.to_ipv4_mapped() {
                Some(v4) => is_private_ip(&IpAddr::V4(v4)),
                None => false,
            }
        }
    }
}

/// Parse RSS/Atom bytes into a [`FetchedFeed`], keeping at most `max_items` entries.
///
/// Entries without an id of their own keep an empty id here; the
/// normalizer derives a stable one from link or content.
pub fn parse_feed(bytes: &[u8], max_items: usize) -> Result<FetchedFeed> {
    let feed = parser::Builder::new()
        .id_generator(|_, _, _| String::new())
        .build()
        .parse(bytes)
        .map_err(|e| FeedmixError::Parse(format!("failed to parse feed: {e}")))?;

    let title = feed
        .title
        .map(|t| strip_html(&t.content))
        .filter(|t| !t.is_empty());

    let items = feed
        .entries
        .into_iter()
        .take(max_items)
        .map(|entry| {
            let image = entry_image(&entry);
            let author = entry
                .authors
                .first()
                .map(|a| a.name.trim().to_string())
                .filter(|n| !n.is_empty());
            let content = entry
                .content
                .and_then(|c| c.body)
                .or(entry.summary.map(|s| s.content));

            RawItem {
                id: Some(entry.id).filter(|id| !id.trim().is_empty()),
                title: entry.title.map(|t| strip_html(&t.content)),
                content,
                link: entry.links.first().map(|l| l.href.clone()),
                author,
                creator: None,
                author_avatar: None,
                published_at: entry.published.or(entry.updated),
                image,
                favorite_count: None,
                retweet_count: None,
            }
        })
        .collect();

    Ok(FetchedFeed { title, items })
}

/// Enclosure / media image of an entry.
fn entry_image(entry: &feed_rs::model::Entry) -> Option<String> {
    for media in &entry.media {
        for content in &media.content {
            let is_image = content
                .content_type
                .as_ref()
                .map(|m| m.to_string().starts_with("image/"))
                .unwrap_or(true);
            if let Some(url) = content.url.as_ref().filter(|_| is_image) {
                return Some(url.to_string());
            }
        }
        if let Some(thumbnail) = media.thumbnails.first() {
            return Some(thumbnail.image.uri.clone());
        }
    }

    entry
        .links
        .iter()
        .find(|link| {
            link.rel.as_deref() == Some("enclosure")
                && link
                    .media_type
                    .as_deref()
                    .is_some_and(|m| m.starts_with("image/"))
        })
        .map(|link| link.href.clone())
}

/// JSON record printed by a scraper.
#[derive(Debug, Deserialize)]
struct ScrapedItem {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default, alias = "authorAvatar")]
    author_avatar: Option<String>,
    #[serde(default, alias = "publishedAt")]
    published_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "imageUrl", alias = "image_url")]
    image: Option<String>,
    #[serde(default, alias = "favoriteCount")]
    favorite_count: Option<i64>,
    #[serde(default, alias = "retweetCount")]
    retweet_count: Option<i64>,
}

impl From<ScrapedItem> for RawItem {
    fn from(item: ScrapedItem) -> Self {
        RawItem {
            id: item.id,
            title: item.title,
            content: item.content,
            link: item.link,
            author: item.author,
            creator: None,
            author_avatar: item.author_avatar,
            published_at: item.published_at,
            image: item.image,
            favorite_count: item.favorite_count,
            retweet_count: item.retweet_count,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScraperOutput {
    Feed {
        #[serde(default)]
        title: Option<String>,
        items: Vec<ScrapedItem>,
    },
    Items(Vec<ScrapedItem>),
}

/// Parse scraper stdout: JSON when it starts with `[` or `{`, RSS/Atom otherwise.
pub fn parse_scraper_output(output: &str, max_items: usize) -> Result<FetchedFeed> {
    let trimmed = output.trim_start();
    if trimmed.is_empty() {
        return Err(FeedmixError::Parse("scraper produced no output".to_string()));
    }
    if !trimmed.starts_with('[') && !trimmed.starts_with('{') {
        return parse_feed(trimmed.as_bytes(), max_items);
    }

    let parsed: ScraperOutput = serde_json::from_str(trimmed)
        .map_err(|e| FeedmixError::Parse(format!("invalid scraper JSON: {e}")))?;
    let (title, items) = match parsed {
        ScraperOutput::Feed { title, items } => (title, items),
        ScraperOutput::Items(items) => (None, items),
    };

    Ok(FetchedFeed {
        title,
        items: items
            .into_iter()
            .take(max_items)
            .map(RawItem::from)
            .collect(),
    })
}

/// Strip HTML tags from text.
fn strip_html(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut in_entity = false;
    let mut entity = String::new();

    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            '&' if !in_tag => {
                in_entity = true;
                entity.clear();
            }
            ';' if in_entity => {
                in_entity = false;
                match entity.as_str() {
                    "amp" => result.push('&'),
                    "lt" => result.push('<'),
                    "gt" => result.push('>'),
                    "quot" => result.push('"'),
                    "apos" => result.push('\''),
                    "nbsp" => result.push(' '),
                    _ if entity.starts_with('#') => {
                        if let Some(c) = parse_numeric_entity(&entity).and_then(char::from_u32) {
                            result.push(c);
                        }
                    }
                    _ => {
                        // Unknown entity, keep as-is
                        result.push('&');
                        result.push_str(&entity);
                        result.push(';');
                    }
                }
            }
            _ if in_entity => {
                // A stray ampersand followed by text
                if ch.is_whitespace() || entity.len() > 10 {
                    in_entity = false;
                    result.push('&');
                    result.push_str(&entity);
                    result.push(ch);
                } else {
                    entity.push(ch);
                }
            }
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    if in_entity {
        result.push('&');
        result.push_str(&entity);
    }

    result.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Parse a numeric HTML entity (e.g., "#123" or "#x7B").
fn parse_numeric_entity(entity: &str) -> Option<u32> {
    if let Some(hex) = entity
        .strip_prefix("#x")
        .or_else(|| entity.strip_prefix("#X"))
    {
        u32::from_str_radix(hex, 16).ok()
    } else {
        entity.strip_prefix('#').and_then(|dec| dec.parse().ok())
    }
}
