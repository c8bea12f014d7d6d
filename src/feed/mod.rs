//! Feed aggregation module for feedmix.
//!
//! This module keeps the article store warm with single-flight background
//! refreshes and serves diversity-ranked pages from it.

pub mod coordinator;
pub mod exposure;
pub mod fetcher;
pub mod normalizer;
pub mod pagination;
pub mod ranker;
pub mod repository;
pub mod sources;
pub mod staleness;
pub mod types;

pub use coordinator::{RefreshCoordinator, RefreshReport, RefreshSettings, SourceHealth};
pub use exposure::{
    exposure_weight, ExposureRecord, ExposureStore, MemoryExposureStore, SqliteExposureStore,
};
pub use fetcher::{
    looks_blocked, parse_feed, validate_url, FeedFetcher, HttpFeedFetcher, RoutingFetcher,
    ScraperFetcher,
};
pub use normalizer::normalize;
pub use pagination::PaginationService;
pub use ranker::{DiversityRanker, RandomSource, SequenceRandom, SystemRandom};
pub use repository::{ArticleRepository, KindStats, StorageStats};
pub use sources::SourceRegistry;
pub use staleness::{StalenessPolicy, DEFAULT_STALE_AFTER_SECS};
pub use types::{
    Article, ColumnKind, ColumnSpec, FetchedFeed, Page, RawItem, RefreshKey, SourceKind,
    SourceMeta, UNKNOWN_AUTHOR,
};
