//! API handlers.

pub mod health;
pub mod items;
pub mod refresh;
pub mod sources;

pub use health::*;
pub use items::*;
pub use refresh::*;
pub use sources::*;

use std::sync::Arc;

use crate::config::{Config, PaginationConfig};
use crate::db::Database;
use crate::feed::{
    DiversityRanker, ExposureStore, FeedFetcher, PaginationService, RandomSource,
    RefreshCoordinator, RefreshSettings, SourceRegistry, SqliteExposureStore, StalenessPolicy,
    SystemRandom,
};

/// Shared application state.
pub struct AppState {
    /// Database handle.
    pub db: Database,
    /// Page reads.
    pub pagination: PaginationService,
    /// Background refreshes.
    pub coordinator: Arc<RefreshCoordinator>,
    /// Page size bounds.
    pub pagination_config: PaginationConfig,
}

impl AppState {
    /// Create application state.
    pub fn new(
        db: Database,
        pagination: PaginationService,
        pagination_config: PaginationConfig,
    ) -> Self {
        let coordinator = pagination.coordinator().clone();
        Self {
            db,
            pagination,
            coordinator,
            pagination_config,
        }
    }

    /// Wire the service graph from configuration.
    ///
    /// Exposure history is persisted in the database and ranking jitter
    /// comes from the OS-seeded generator.
    pub fn from_config(config: &Config, db: Database, fetcher: Arc<dyn FeedFetcher>) -> Self {
        let exposure = Arc::new(SqliteExposureStore::new(db.pool().clone()));
        Self::from_parts(config, db, fetcher, exposure, Arc::new(SystemRandom::new()))
    }

    /// Wire the service graph with explicit exposure and randomness sources.
    pub fn from_parts(
        config: &Config,
        db: Database,
        fetcher: Arc<dyn FeedFetcher>,
        exposure: Arc<dyn ExposureStore>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        let registry = Arc::new(SourceRegistry::from_config(&config.sources));
        let coordinator = RefreshCoordinator::new(
            db.pool().clone(),
            registry,
            fetcher,
            RefreshSettings::from(&config.refresh),
        );
        let ranker = DiversityRanker::new(config.ranking.clone(), exposure, random);
        let pagination = PaginationService::new(
            db.pool().clone(),
            StalenessPolicy::from_secs(config.refresh.stale_after_secs),
            coordinator,
            ranker,
        );

        Self::new(db, pagination, config.pagination.clone())
    }
}
