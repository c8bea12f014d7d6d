//! Exposure history: per-source last-shown time and show count.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite};
use tokio::sync::Mutex;

use crate::config::RankingConfig;
use crate::db::DbPool;
use crate::{FeedmixError, Result};

/// How often and how recently a source contributed to a ranked window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExposureRecord {
    /// Source key (feed URL).
    pub source_key: String,
    /// Last time the source was shown.
    pub last_shown_at: DateTime<Utc>,
    /// Number of times the source was shown.
    pub show_count: i64,
}

/// Historical weight of a source; higher means "show sooner".
///
/// Unseen sources get `unseen_weight`. Otherwise the weight grows by one
/// per day since the last showing (capped at five), loses a tenth per
/// showing, and never drops below one.
pub fn exposure_weight(
    record: Option<&ExposureRecord>,
    now: DateTime<Utc>,
    config: &RankingConfig,
) -> f64 {
    let Some(record) = record else {
        return config.unseen_weight;
    };

    let hours_since_shown =
        (now.signed_duration_since(record.last_shown_at).num_seconds() as f64 / 3600.0).max(0.0);
    let recency = (hours_since_shown / 24.0).min(5.0);
    let frequency_penalty = record.show_count as f64 / 10.0;

    (recency - frequency_penalty).max(1.0)
}

/// Storage backend for exposure records.
///
/// Implementations must make each per-key read-increment atomic.
#[async_trait]
pub trait ExposureStore: Send + Sync {
    /// Records for the given keys; unseen keys are absent from the map.
    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, ExposureRecord>>;

    /// Mark each key as shown at `now`; a key listed twice is counted twice.
    async fn record_shown(&self, keys: &[String], now: DateTime<Utc>) -> Result<()>;
}

/// Process-local exposure store.
#[derive(Debug, Default)]
pub struct MemoryExposureStore {
    records: Mutex<HashMap<String, ExposureRecord>>,
}

impl MemoryExposureStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or overwrite a record.
    pub async fn insert(&self, record: ExposureRecord) {
        self.records
            .lock()
            .await
            .insert(record.source_key.clone(), record);
    }
}

#[async_trait]
impl ExposureStore for MemoryExposureStore {
    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, ExposureRecord>> {
        let records = self.records.lock().await;
        Ok(keys
            .iter()
            .filter_map(|k| records.get(k).map(|r| (k.clone(), r.clone())))
            .collect())
    }

    async fn record_shown(&self, keys: &[String], now: DateTime<Utc>) -> Result<()> {
        let mut records = self.records.lock().await;
        for key in keys {
            let record = records.entry(key.clone()).or_insert_with(|| ExposureRecord {
                source_key: key.clone(),
                last_shown_at: now,
                show_count: 0,
            });
            record.last_shown_at = now;
            record.show_count += 1;
        }
        Ok(())
    }
}

/// Row type for an exposure record from database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ExposureRow {
    source_key: String,
    last_shown_at: i64,
    show_count: i64,
}

impl From<ExposureRow> for ExposureRecord {
    fn from(row: ExposureRow) -> Self {
        ExposureRecord {
            source_key: row.source_key,
            last_shown_at: DateTime::from_timestamp(row.last_shown_at, 0).unwrap_or_default(),
            show_count: row.show_count,
        }
    }
}

/// Exposure store persisted in the `source_exposure` table.
#[derive(Debug, Clone)]
pub struct SqliteExposureStore {
    pool: DbPool,
}

impl SqliteExposureStore {
    /// Create a store over the given pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExposureStore for SqliteExposureStore {
    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, ExposureRecord>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT source_key, last_shown_at, show_count FROM source_exposure WHERE source_key IN (",
        );
        let mut separated = query.separated(", ");
        for key in keys {
            separated.push_bind(key.as_str());
        }
        separated.push_unseparated(")");

        let rows: Vec<ExposureRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| FeedmixError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| (row.source_key.clone(), ExposureRecord::from(row)))
            .collect())
    }

    async fn record_shown(&self, keys: &[String], now: DateTime<Utc>) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for key in keys {
            sqlx::query(
                "INSERT INTO source_exposure (source_key, last_shown_at, show_count) \
                 VALUES (?, ?, 1) \
                 ON CONFLICT(source_key) DO UPDATE SET \
                 last_shown_at = excluded.last_shown_at, show_count = show_count + 1",
            )
            .bind(key)
            .bind(now.timestamp())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
