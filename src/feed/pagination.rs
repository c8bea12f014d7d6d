//! Pagination service: stale-while-revalidate column pages.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::coordinator::RefreshCoordinator;
use super::ranker::DiversityRanker;
use super::repository::ArticleRepository;
use super::staleness::StalenessPolicy;
use super::types::{ColumnSpec, Page};
use crate::db::DbPool;
use crate::Result;

/// Serves pages of a column straight from storage.
///
/// A stale column kicks a background refresh and is still served from
/// whatever storage holds; reads never wait on the network.
pub struct PaginationService {
    pool: DbPool,
    staleness: StalenessPolicy,
    coordinator: Arc<RefreshCoordinator>,
    ranker: DiversityRanker,
}

impl PaginationService {
    /// Create a new pagination service.
    pub fn new(
        pool: DbPool,
        staleness: StalenessPolicy,
        coordinator: Arc<RefreshCoordinator>,
        ranker: DiversityRanker,
    ) -> Self {
        Self {
            pool,
            staleness,
            coordinator,
            ranker,
        }
    }

    /// Get a page now.
    pub async fn get_page(&self, column: &ColumnSpec, offset: u32, limit: u32) -> Result<Page> {
        self.get_page_at(column, offset, limit, Utc::now()).await
    }

    /// Get `limit` items after `offset` as of `now`.
    ///
    /// Ranked columns reorder the chronological slice with the diversity
    /// ranker. An offset past the end yields an empty page, not an error.
    pub async fn get_page_at(
        &self,
        column: &ColumnSpec,
        offset: u32,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Page> {
        let key = column.refresh_key();

        let stale = self
            .staleness
            .is_column_stale_at(&self.pool, column, self.coordinator.registry(), now)
            .await?;
        if stale {
            debug!("Column {:?} is stale, refreshing {}", column.kind, key);
            // Fire and forget: the wave outlives the detached handle
            let _ = self.coordinator.trigger_refresh(key.clone());
        }
        let refreshing = stale || self.coordinator.is_refreshing(&key);

        let repo = ArticleRepository::new(&self.pool);
        let items = repo.list(column, limit, offset).await?;
        let total = repo.count(column).await?;
        let items = if column.is_ranked() {
            self.ranker.rank_at(items, column.kind, now).await
        } else {
            items
        };

        Ok(Page {
            items,
            refreshing,
            blocked: self.coordinator.is_blocked(&key),
            total,
        })
    }

    /// Coordinator used for background refreshes.
    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RankingConfig;
    use crate::db::Database;
    use crate::feed::coordinator::RefreshSettings;
    use crate::feed::exposure::MemoryExposureStore;
    use crate::feed::fetcher::FeedFetcher;
    use crate::feed::ranker::SequenceRandom;
    use crate::feed::sources::SourceRegistry;
    use crate::feed::types::{
        Article, ColumnKind, FetchedFeed, RawItem, RefreshKey, SourceKind, SourceMeta,
    };
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FiveItems {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FeedFetcher for FiveItems {
        async fn fetch(&self, _source: &SourceMeta) -> Result<FetchedFeed> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = Utc::now();
            let items = (0..5)
                .map(|i| RawItem {
                    id: Some(format!("item-{i}")),
                    title: Some(format!("Item {i}")),
                    published_at: Some(now - Duration::minutes(i)),
                    ..Default::default()
                })
                .collect();
            Ok(FetchedFeed {
                title: Some("Five".to_string()),
                items,
            })
        }
    }

    async fn service(fetcher: Arc<FiveItems>) -> (Database, PaginationService) {
        let db = Database::open_in_memory().await.unwrap();
        let registry = Arc::new(SourceRegistry::new([SourceMeta::new(
            "https://five.example/rss",
            SourceKind::Document,
        )]));
        let coordinator = RefreshCoordinator::new(
            db.pool().clone(),
            registry,
            fetcher,
            RefreshSettings {
                source_timeout: std::time::Duration::from_secs(5),
                batch_timeout: std::time::Duration::from_secs(10),
                max_concurrent_refreshes: 2,
                max_concurrent_sources: 2,
            },
        );
        let ranker = DiversityRanker::new(
            RankingConfig::default(),
            Arc::new(MemoryExposureStore::new()),
            Arc::new(SequenceRandom::constant(0.5)),
        );
        let service = PaginationService::new(
            db.pool().clone(),
            StalenessPolicy::default(),
            coordinator,
            ranker,
        );
        (db, service)
    }

    #[tokio::test]
    async fn test_empty_store_triggers_refresh_then_serves() {
        let fetcher = Arc::new(FiveItems {
            calls: AtomicUsize::new(0),
        });
        let (_db, service) = service(fetcher.clone()).await;
        let column = ColumnSpec::new(ColumnKind::Document);

        let first = service.get_page(&column, 0, 50).await.unwrap();
        assert!(first.items.is_empty());
        assert!(first.refreshing);
        assert!(!first.blocked);

        service.coordinator().wait_idle().await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        let second = service.get_page(&column, 0, 50).await.unwrap();
        assert!(!second.refreshing);
        let ids: Vec<_> = second.items.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["item-0", "item-1", "item-2", "item-3", "item-4"]);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_offset_past_end_is_empty() {
        let fetcher = Arc::new(FiveItems {
            calls: AtomicUsize::new(0),
        });
        let (db, service) = service(fetcher).await;
        let repo = ArticleRepository::new(db.pool());
        for i in 0..3 {
            repo.upsert(&Article {
                id: format!("a{i}"),
                source_url: "https://five.example/rss".to_string(),
                source_kind: SourceKind::Document,
                source_name: "Five".to_string(),
                category: None,
                title: "t".to_string(),
                author: "a".to_string(),
                author_avatar: None,
                content: String::new(),
                link: String::new(),
                image_url: None,
                published_at: Utc::now(),
                favorite_count: None,
                retweet_count: None,
            })
            .await
            .unwrap();
        }

        let page = service
            .get_page(&ColumnSpec::new(ColumnKind::Document), 10_000, 50)
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert!(!page.refreshing);
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn test_refreshing_reflects_in_flight_wave() {
        let fetcher = Arc::new(FiveItems {
            calls: AtomicUsize::new(0),
        });
        let (_db, service) = service(fetcher).await;

        let handle = service
            .coordinator()
            .trigger_refresh(RefreshKey::All)
            .unwrap();
        // A mixed page sees the in-flight "all" wave
        let page = service
            .get_page(&ColumnSpec::new(ColumnKind::Mixed), 0, 10)
            .await
            .unwrap();
        assert!(page.refreshing);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_mixed_column_serves_ranked_slice() {
        let fetcher = Arc::new(FiveItems {
            calls: AtomicUsize::new(0),
        });
        let (_db, service) = service(fetcher).await;
        service
            .coordinator()
            .trigger_refresh(RefreshKey::All)
            .unwrap()
            .await
            .unwrap();

        let page = service
            .get_page(&ColumnSpec::new(ColumnKind::Mixed), 0, 3)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 3);
        // The tweet-like half has no rows, so the mixed column is still stale
        assert!(page.refreshing);
        service.coordinator().wait_idle().await;
    }
}
