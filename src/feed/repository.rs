//! Article repository: idempotent upsert and column reads.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite};

use super::types::{Article, ColumnSpec, SourceKind};
use crate::db::DbPool;
use crate::{FeedmixError, Result};

/// Columns shared by both article tables, in row-struct order.
const ARTICLE_COLUMNS: &str = "id, source_url, source_name, category, title, author, \
     author_avatar, content, link, image_url, published_at, favorite_count, retweet_count";

/// Row type for an article from either table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ArticleRow {
    id: String,
    source_url: String,
    source_name: String,
    category: Option<String>,
    title: String,
    author: String,
    author_avatar: Option<String>,
    content: String,
    link: String,
    image_url: Option<String>,
    published_at: i64,
    favorite_count: Option<i64>,
    retweet_count: Option<i64>,
    source_kind: String,
}

impl From<ArticleRow> for Article {
    fn from(row: ArticleRow) -> Self {
        Article {
            id: row.id,
            source_kind: row.source_kind.parse().unwrap_or(SourceKind::Document),
            source_url: row.source_url,
            source_name: row.source_name,
            category: row.category,
            title: row.title,
            author: row.author,
            author_avatar: row.author_avatar,
            content: row.content,
            link: row.link,
            image_url: row.image_url,
            published_at: from_unix(row.published_at),
            favorite_count: row.favorite_count,
            retweet_count: row.retweet_count,
        }
    }
}

/// Per-kind storage statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KindStats {
    /// Number of stored articles.
    pub count: i64,
    /// Number of distinct sources with at least one article.
    pub sources: i64,
    /// Oldest publication time.
    pub oldest: Option<DateTime<Utc>>,
    /// Newest publication time.
    pub latest: Option<DateTime<Utc>>,
}

/// Storage statistics across both kinds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StorageStats {
    /// Tweet-like articles.
    pub tweet_like: KindStats,
    /// Document articles.
    pub document: KindStats,
}

impl StorageStats {
    /// Total number of stored articles.
    pub fn total(&self) -> i64 {
        self.tweet_like.count + self.document.count
    }
}

/// Repository for stored articles.
pub struct ArticleRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> ArticleRepository<'a> {
    /// Create a new ArticleRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert an article unless one with the same id already exists.
    ///
    /// Ids are unique across both kind tables: an id already stored under
    /// the other kind is ignored too, so mixed reads never return it twice.
    /// Returns `true` if a row was inserted; existing rows are never overwritten.
    pub async fn upsert(&self, article: &Article) -> Result<bool> {
        let other = match article.source_kind {
            SourceKind::TweetLike => SourceKind::Document,
            SourceKind::Document => SourceKind::TweetLike,
        };
        let sql = format!(
            "INSERT OR IGNORE INTO {} ({ARTICLE_COLUMNS}, fetched_at) \
             SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ? \
             WHERE NOT EXISTS (SELECT 1 FROM {} WHERE id = ?)",
            article.source_kind.table_name(),
            other.table_name()
        );

        let result = sqlx::query(&sql)
            .bind(&article.id)
            .bind(&article.source_url)
            .bind(&article.source_name)
            .bind(&article.category)
            .bind(&article.title)
            .bind(&article.author)
            .bind(&article.author_avatar)
            .bind(&article.content)
            .bind(&article.link)
            .bind(&article.image_url)
            .bind(article.published_at.timestamp())
            .bind(article.favorite_count)
            .bind(article.retweet_count)
            .bind(Utc::now().timestamp())
            .bind(&article.id)
            .execute(self.pool)
            .await
            .map_err(|e| FeedmixError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Newest publication time for a kind, optionally restricted to one source.
    pub async fn max_published_at(
        &self,
        kind: SourceKind,
        source_url: Option<&str>,
    ) -> Result<Option<DateTime<Utc>>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT MAX(published_at) FROM {}",
            kind.table_name()
        ));
        if let Some(url) = source_url {
            query.push(" WHERE source_url = ").push_bind(url);
        }

        let max: Option<i64> = query
            .build_query_scalar()
            .fetch_one(self.pool)
            .await
            .map_err(|e| FeedmixError::Database(e.to_string()))?;

        Ok(max.map(from_unix))
    }

    /// Read a chronological slice (`published_at` descending) of a column.
    pub async fn list(&self, column: &ColumnSpec, limit: u32, offset: u32) -> Result<Vec<Article>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM (");
        for (i, kind) in column.kind.source_kinds().iter().enumerate() {
            if i > 0 {
                query.push(" UNION ALL ");
            }
            query.push(format!(
                "SELECT {ARTICLE_COLUMNS}, '{}' AS source_kind FROM {}",
                kind.as_str(),
                kind.table_name()
            ));
            push_filters(&mut query, column);
        }
        query
            .push(") ORDER BY published_at DESC, id ASC LIMIT ")
            .push_bind(i64::from(limit))
            .push(" OFFSET ")
            .push_bind(i64::from(offset));

        let rows: Vec<ArticleRow> = query
            .build_query_as()
            .fetch_all(self.pool)
            .await
            .map_err(|e| FeedmixError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Article::from).collect())
    }

    /// Number of articles in a column.
    pub async fn count(&self, column: &ColumnSpec) -> Result<i64> {
        let mut total = 0;
        for kind in column.kind.source_kinds() {
            let mut query: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", kind.table_name()));
            push_filters(&mut query, column);

            let count: i64 = query
                .build_query_scalar()
                .fetch_one(self.pool)
                .await
                .map_err(|e| FeedmixError::Database(e.to_string()))?;
            total += count;
        }
        Ok(total)
    }

    /// Storage statistics for both kinds.
    pub async fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            tweet_like: self.kind_stats(SourceKind::TweetLike).await?,
            document: self.kind_stats(SourceKind::Document).await?,
        })
    }

    async fn kind_stats(&self, kind: SourceKind) -> Result<KindStats> {
        let sql = format!(
            "SELECT COUNT(*), COUNT(DISTINCT source_url), MIN(published_at), MAX(published_at) \
             FROM {}",
            kind.table_name()
        );
        let (count, sources, oldest, latest): (i64, i64, Option<i64>, Option<i64>) =
            sqlx::query_as(&sql)
                .fetch_one(self.pool)
                .await
                .map_err(|e| FeedmixError::Database(e.to_string()))?;

        Ok(KindStats {
            count,
            sources,
            oldest: oldest.map(from_unix),
            latest: latest.map(from_unix),
        })
    }
}

/// Append the column's source predicate to a single-table select.
fn push_filters<'q>(query: &mut QueryBuilder<'q, Sqlite>, column: &'q ColumnSpec) {
    let mut keyword = " WHERE ";
    if let Some(url) = &column.feed_url {
        query.push(keyword).push("source_url = ").push_bind(url.as_str());
        keyword = " AND ";
    }
    if let Some(category) = &column.category {
        query.push(keyword).push("category = ").push_bind(category.as_str());
    }
}

/// Convert stored unix seconds into a UTC timestamp.
fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
