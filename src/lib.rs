//! feedmix - feed aggregator with background refresh and diversity ranking
//!
//! Keeps a SQLite store of tweet-like and document articles warm with
//! single-flight background refreshes, and serves offset-paginated,
//! diversity-ranked pages of it over HTTP without ever blocking a read on
//! the network.

pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod logging;
pub mod web;

pub use config::Config;
pub use db::{Database, DbPool};
pub use error::{FeedmixError, Result};
pub use feed::{
    Article, ColumnKind, ColumnSpec, DiversityRanker, Page, PaginationService, RefreshCoordinator,
    RefreshKey, SourceKind,
};
