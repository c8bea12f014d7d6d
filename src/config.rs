//! Configuration module for feedmix.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::feed::SourceKind;
use crate::{FeedmixError, Result};

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origins (empty = any origin).
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/feedmix.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/feedmix.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Background refresh configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    /// A source is stale when its newest stored item is older than this.
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
    /// Wall-clock budget for fetching and parsing one source.
    #[serde(default = "default_source_timeout")]
    pub source_timeout_secs: u64,
    /// Wall-clock budget for a whole refresh wave.
    #[serde(default = "default_batch_timeout")]
    pub batch_timeout_secs: u64,
    /// Number of refresh waves allowed to run at once (worker pool size).
    #[serde(default = "default_max_concurrent_refreshes")]
    pub max_concurrent_refreshes: usize,
    /// Number of sources fetched in parallel inside one wave.
    #[serde(default = "default_max_concurrent_sources")]
    pub max_concurrent_sources: usize,
    /// Maximum items taken from one source per refresh.
    #[serde(default = "default_max_items")]
    pub max_items_per_source: usize,
    /// Maximum feed size in bytes.
    #[serde(default = "default_max_feed_size")]
    pub max_feed_size_bytes: u64,
    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Read timeout in seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Maximum number of redirects.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// User agent sent upstream.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// External scraper used for tweet-like sources (argv, URL appended).
    #[serde(default)]
    pub scraper_command: Option<Vec<String>>,
}

fn default_stale_after() -> u64 {
    600 // 10 minutes
}

fn default_source_timeout() -> u64 {
    30
}

fn default_batch_timeout() -> u64 {
    300
}

fn default_max_concurrent_refreshes() -> usize {
    4
}

fn default_max_concurrent_sources() -> usize {
    3
}

fn default_max_items() -> usize {
    100
}

fn default_max_feed_size() -> u64 {
    5 * 1024 * 1024 // 5MB
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    20
}

fn default_max_redirects() -> usize {
    5
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36"
        .to_string()
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after(),
            source_timeout_secs: default_source_timeout(),
            batch_timeout_secs: default_batch_timeout(),
            max_concurrent_refreshes: default_max_concurrent_refreshes(),
            max_concurrent_sources: default_max_concurrent_sources(),
            max_items_per_source: default_max_items(),
            max_feed_size_bytes: default_max_feed_size(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
            scraper_command: None,
        }
    }
}

/// Diversity ranking configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RankingConfig {
    /// Hours added per repeated occurrence of a source in one window.
    #[serde(default = "default_cluster_penalty")]
    pub cluster_penalty_hours: f64,
    /// Weight of a source that has never been shown.
    #[serde(default = "default_unseen_weight")]
    pub unseen_weight: f64,
    /// Multiplier turning the historical weight into a boost in hours.
    #[serde(default = "default_boost_factor")]
    pub boost_factor: f64,
    /// Jitter is drawn uniformly from `[-jitter_hours, jitter_hours]`.
    #[serde(default = "default_jitter")]
    pub jitter_hours: f64,
    /// Freshness bonus for document items in a mixed column.
    #[serde(default = "default_mixed_document_boost")]
    pub mixed_document_boost_hours: f64,
    /// Exposure is recorded for this many leading items of each ranked window.
    #[serde(default = "default_exposure_top_n")]
    pub exposure_top_n: usize,
}

fn default_cluster_penalty() -> f64 {
    3.0
}

fn default_unseen_weight() -> f64 {
    10.0
}

fn default_boost_factor() -> f64 {
    2.5
}

fn default_jitter() -> f64 {
    1.5
}

fn default_mixed_document_boost() -> f64 {
    12.0
}

fn default_exposure_top_n() -> usize {
    12
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            cluster_penalty_hours: default_cluster_penalty(),
            unseen_weight: default_unseen_weight(),
            boost_factor: default_boost_factor(),
            jitter_hours: default_jitter(),
            mixed_document_boost_hours: default_mixed_document_boost(),
            exposure_top_n: default_exposure_top_n(),
        }
    }
}

/// Pagination configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    /// Page size when the client does not ask for one.
    #[serde(default = "default_page_limit")]
    pub default_limit: u32,
    /// Largest page size a client may ask for.
    #[serde(default = "default_max_page_limit")]
    pub max_limit: u32,
}

fn default_page_limit() -> u32 {
    50
}

fn default_max_page_limit() -> u32 {
    200
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: default_page_limit(),
            max_limit: default_max_page_limit(),
        }
    }
}

/// One configured upstream source.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Display name (falls back to the feed title when absent).
    #[serde(default)]
    pub name: Option<String>,
    /// Feed URL.
    pub url: String,
    /// Source kind (inferred from the URL when absent).
    #[serde(default)]
    pub kind: Option<SourceKind>,
    /// Category used by category columns.
    #[serde(default)]
    pub category: Option<String>,
    /// Subcategory within the category.
    #[serde(default)]
    pub subcategory: Option<String>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Refresh configuration.
    #[serde(default)]
    pub refresh: RefreshConfig,
    /// Ranking configuration.
    #[serde(default)]
    pub ranking: RankingConfig,
    /// Pagination configuration.
    #[serde(default)]
    pub pagination: PaginationConfig,
    /// Configured sources.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(FeedmixError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| FeedmixError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FEEDMIX_DATABASE_PATH`: Override the database path
    /// - `FEEDMIX_PORT`: Override the listen port
    /// - `FEEDMIX_LOG_LEVEL`: Override the log level
    pub fn apply_env_overrides(&mut self) {
        if let Some(path) = non_empty_env("FEEDMIX_DATABASE_PATH") {
            self.database.path = path;
        }
        if let Some(port) = non_empty_env("FEEDMIX_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!("Ignoring invalid FEEDMIX_PORT value: {}", port),
            }
        }
        if let Some(level) = non_empty_env("FEEDMIX_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.refresh.stale_after_secs == 0 {
            return Err(FeedmixError::Config(
                "refresh.stale_after_secs must be greater than zero".to_string(),
            ));
        }
        if self.refresh.source_timeout_secs == 0 || self.refresh.batch_timeout_secs == 0 {
            return Err(FeedmixError::Config(
                "refresh timeouts must be greater than zero".to_string(),
            ));
        }
        if self.refresh.max_concurrent_refreshes == 0 || self.refresh.max_concurrent_sources == 0 {
            return Err(FeedmixError::Config(
                "refresh concurrency limits must be greater than zero".to_string(),
            ));
        }
        if self.pagination.default_limit == 0
            || self.pagination.default_limit > self.pagination.max_limit
        {
            return Err(FeedmixError::Config(format!(
                "pagination.default_limit must be in 1..={}",
                self.pagination.max_limit
            )));
        }
        if let Some(command) = &self.refresh.scraper_command {
            if command.is_empty() {
                return Err(FeedmixError::Config(
                    "refresh.scraper_command must name a program".to_string(),
                ));
            }
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.url.trim().is_empty() {
                return Err(FeedmixError::Config("source url is empty".to_string()));
            }
            if !seen.insert(source.url.as_str()) {
                return Err(FeedmixError::Config(format!(
                    "duplicate source url: {}",
                    source.url
                )));
            }
        }
        Ok(())
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert!(config.server.cors_origins.is_empty());

        assert_eq!(config.database.path, "data/feedmix.db");

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.file, "logs/feedmix.log");

        assert_eq!(config.refresh.stale_after_secs, 600);
        assert_eq!(config.refresh.source_timeout_secs, 30);
        assert_eq!(config.refresh.batch_timeout_secs, 300);
        assert_eq!(config.refresh.max_concurrent_refreshes, 4);
        assert_eq!(config.refresh.max_concurrent_sources, 3);
        assert_eq!(config.refresh.max_items_per_source, 100);
        assert_eq!(config.refresh.max_feed_size_bytes, 5 * 1024 * 1024);
        assert!(config.refresh.scraper_command.is_none());

        assert_eq!(config.ranking.cluster_penalty_hours, 3.0);
        assert_eq!(config.ranking.unseen_weight, 10.0);
        assert_eq!(config.ranking.boost_factor, 2.5);
        assert_eq!(config.ranking.jitter_hours, 1.5);
        assert_eq!(config.ranking.mixed_document_boost_hours, 12.0);
        assert_eq!(config.ranking.exposure_top_n, 12);

        assert_eq!(config.pagination.default_limit, 50);
        assert_eq!(config.pagination.max_limit, 200);

        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 8080
cors_origins = ["http://localhost:5173"]

[database]
path = "custom/feeds.db"

[logging]
level = "debug"
file = "custom/logs/app.log"

[refresh]
stale_after_secs = 120
source_timeout_secs = 15
scraper_command = ["python3", "scrape.py"]

[ranking]
jitter_hours = 0.0
exposure_top_n = 5

[pagination]
default_limit = 20
max_limit = 100

[[sources]]
name = "Hacker News"
url = "https://news.ycombinator.com/rss"
category = "Tech"

[[sources]]
url = "https://nitter.net/rustlang/rss"
category = "Twitter Lists"
subcategory = "Rust"
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.cors_origins, vec!["http://localhost:5173"]);
        assert_eq!(config.database.path, "custom/feeds.db");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.refresh.stale_after_secs, 120);
        assert_eq!(config.refresh.source_timeout_secs, 15);
        assert_eq!(
            config.refresh.scraper_command,
            Some(vec!["python3".to_string(), "scrape.py".to_string()])
        );
        assert_eq!(config.ranking.jitter_hours, 0.0);
        assert_eq!(config.ranking.exposure_top_n, 5);
        assert_eq!(config.pagination.default_limit, 20);
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].name.as_deref(), Some("Hacker News"));
        assert!(config.sources[1].name.is_none());
        assert_eq!(config.sources[1].subcategory.as_deref(), Some("Rust"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_source_kind() {
        let toml = r#"
[[sources]]
url = "https://example.com/feed"
kind = "tweet-like"
"#;
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.sources[0].kind, Some(SourceKind::TweetLike));
    }

    #[test]
    fn test_parse_empty_config() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.path, "data/feedmix.db");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_invalid_config() {
        let result = Config::parse("this is not valid toml [[[");

        assert!(result.is_err());
        if let Err(FeedmixError::Config(msg)) = result {
            assert!(msg.contains("config parse error"));
        } else {
            panic!("Expected Config error");
        }
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load("nonexistent.toml");
        assert!(matches!(result, Err(FeedmixError::Io(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = 4000\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.port, 4000);
    }

    #[test]
    fn test_validate_duplicate_sources() {
        let toml = r#"
[[sources]]
url = "https://example.com/feed"

[[sources]]
url = "https://example.com/feed"
"#;
        let config = Config::parse(toml).unwrap();
        let result = config.validate();
        assert!(matches!(result, Err(FeedmixError::Config(msg)) if msg.contains("duplicate")));
    }

    #[test]
    fn test_validate_page_limits() {
        let mut config = Config::default();
        config.pagination.default_limit = 500;
        assert!(config.validate().is_err());

        config.pagination.default_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_timeouts() {
        let mut config = Config::default();
        config.refresh.source_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_scraper_command() {
        let mut config = Config::default();
        config.refresh.scraper_command = Some(Vec::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_apply_env_overrides() {
        let original = std::env::var("FEEDMIX_LOG_LEVEL").ok();

        std::env::set_var("FEEDMIX_LOG_LEVEL", "trace");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.logging.level, "trace");

        // Empty values do not override
        std::env::set_var("FEEDMIX_LOG_LEVEL", "");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.logging.level, "info");

        if let Some(val) = original {
            std::env::set_var("FEEDMIX_LOG_LEVEL", val);
        } else {
            std::env::remove_var("FEEDMIX_LOG_LEVEL");
        }
    }
}
