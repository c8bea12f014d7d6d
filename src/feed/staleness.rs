//! Staleness policy.

use chrono::{DateTime, Duration, Utc};

use super::repository::ArticleRepository;
use super::sources::SourceRegistry;
use super::types::{ColumnSpec, SourceKind};
use crate::db::DbPool;
use crate::Result;

/// Default staleness threshold in seconds (10 minutes).
pub const DEFAULT_STALE_AFTER_SECS: i64 = 600;

/// Decides whether stored data for a source is old enough to refresh.
#[derive(Debug, Clone, Copy)]
pub struct StalenessPolicy {
    threshold: Duration,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_STALE_AFTER_SECS))
    }
}

impl StalenessPolicy {
    /// Create a policy with the given threshold.
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    /// Create a policy from a threshold in seconds.
    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1000)))
    }

    /// The configured threshold.
    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Pure decision on the newest stored timestamp.
    ///
    /// No rows is stale; otherwise stale when `now - newest` exceeds the threshold.
    pub fn is_stale_at(&self, newest: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match newest {
            None => true,
            Some(newest) => now.signed_duration_since(newest) > self.threshold,
        }
    }

    /// Whether a kind (or one source of it) is stale right now.
    pub async fn is_stale(
        &self,
        pool: &DbPool,
        kind: SourceKind,
        source_url: Option<&str>,
    ) -> Result<bool> {
        self.check(pool, kind, source_url, Utc::now()).await
    }

    /// Whether a column is stale at `now`.
    ///
    /// A single-feed column only ever has rows in its feed's own kind, so
    /// only that table is consulted whatever the column kind. Otherwise
    /// the column is stale when any kind it reads is stale.
    pub async fn is_column_stale_at(
        &self,
        pool: &DbPool,
        column: &ColumnSpec,
        registry: &SourceRegistry,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if let Some(url) = column.feed_url.as_deref() {
            return self.check(pool, registry.kind_of(url), Some(url), now).await;
        }

        for kind in column.kind.source_kinds() {
            if self.check(pool, *kind, None, now).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn check(
        &self,
        pool: &DbPool,
        kind: SourceKind,
        source_url: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let newest = ArticleRepository::new(pool)
            .max_published_at(kind, source_url)
            .await?;
        Ok(self.is_stale_at(newest, now))
    }
}
