//! Database schema and migrations for feedmix.
//!
//! Migrations are applied sequentially when the database is first opened
//! or upgraded.

/// Database migrations.
///
/// Each migration is a SQL script that will be executed in order.
/// The schema_version table tracks which migrations have been applied.
pub const MIGRATIONS: &[&str] = &[
    // v1: Article tables, one per source kind
    r#"
-- Items from tweet-like sources (social timelines, nitter mirrors)
CREATE TABLE tweet_articles (
    id              TEXT PRIMARY KEY,
    source_url      TEXT NOT NULL,
    source_name     TEXT NOT NULL,
    category        TEXT,
    title           TEXT NOT NULL,
    author          TEXT NOT NULL,
    author_avatar   TEXT,
    content         TEXT NOT NULL,
    link            TEXT NOT NULL,
    image_url       TEXT,
    published_at    INTEGER NOT NULL,       -- unix seconds
    favorite_count  INTEGER,
    retweet_count   INTEGER,
    fetched_at      INTEGER NOT NULL
);

CREATE INDEX idx_tweet_articles_source ON tweet_articles(source_url, published_at);
CREATE INDEX idx_tweet_articles_published ON tweet_articles(published_at);

-- Items from document sources (blogs, news, papers)
CREATE TABLE document_articles (
    id              TEXT PRIMARY KEY,
    source_url      TEXT NOT NULL,
    source_name     TEXT NOT NULL,
    category        TEXT,
    title           TEXT NOT NULL,
    author          TEXT NOT NULL,
    author_avatar   TEXT,
    content         TEXT NOT NULL,
    link            TEXT NOT NULL,
    image_url       TEXT,
    published_at    INTEGER NOT NULL,
    favorite_count  INTEGER,
    retweet_count   INTEGER,
    fetched_at      INTEGER NOT NULL
);

CREATE INDEX idx_document_articles_source ON document_articles(source_url, published_at);
CREATE INDEX idx_document_articles_published ON document_articles(published_at);
"#,
    // v2: Per-source exposure ledger for diversity ranking
    r#"
CREATE TABLE source_exposure (
    source_key      TEXT PRIMARY KEY,
    last_shown_at   INTEGER NOT NULL,       -- unix seconds
    show_count      INTEGER NOT NULL DEFAULT 0
);
"#,
    // v3: Category lookups for category columns
    r#"
CREATE INDEX idx_tweet_articles_category ON tweet_articles(category, published_at);
CREATE INDEX idx_document_articles_category ON document_articles(category, published_at);
"#,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_not_empty() {
        assert!(!MIGRATIONS.is_empty());
    }

    #[test]
    fn test_first_migration_contains_article_tables() {
        let first = MIGRATIONS[0];
        assert!(first.contains("CREATE TABLE tweet_articles"));
        assert!(first.contains("CREATE TABLE document_articles"));
        assert!(first.contains("id              TEXT PRIMARY KEY"));
        assert!(first.contains("published_at"));
    }

    #[test]
    fn test_migrations_are_valid_sql() {
        for migration in MIGRATIONS {
            assert!(!migration.trim().is_empty());
            assert!(migration.contains("CREATE TABLE") || migration.contains("CREATE INDEX"));
        }
    }

    #[test]
    fn test_exposure_migration_contains_exposure_table() {
        let exposure = MIGRATIONS[1];
        assert!(exposure.contains("CREATE TABLE source_exposure"));
        assert!(exposure.contains("last_shown_at"));
        assert!(exposure.contains("show_count"));
    }
}
