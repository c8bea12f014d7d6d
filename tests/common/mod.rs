//! Test helpers for HTTP API tests.
//!
//! Builds the full service graph over an in-memory database with a stub
//! fetcher, an in-memory exposure store and neutral ranking jitter.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum_test::TestServer;
use chrono::Utc;

use feedmix::feed::{
    FeedFetcher, FetchedFeed, MemoryExposureStore, RawItem, SequenceRandom, SourceMeta,
};
use feedmix::web::{create_router, AppState};
use feedmix::{Config, Database, FeedmixError, Result};

pub const DOC_FEED: &str = "https://blog.example/feed.xml";
pub const TWEET_FEED: &str = "https://x.com/rustlang";
pub const BLOCKED_FEED: &str = "https://blocked.example/rss";
pub const DOWN_FEED: &str = "https://down.example/rss";

/// Fetcher answering from memory.
///
/// URLs containing `blocked` hit an anti-bot wall and URLs containing
/// `down` fail; every other source returns `items` fresh entries.
pub struct StubFetcher {
    calls: AtomicUsize,
    delay: Duration,
    items: usize,
}

impl StubFetcher {
    pub fn new(items: usize) -> Arc<Self> {
        Self::with_delay(items, Duration::ZERO)
    }

    pub fn with_delay(items: usize, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            items,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedFetcher for StubFetcher {
    async fn fetch(&self, source: &SourceMeta) -> Result<FetchedFeed> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if source.url.contains("blocked") {
            return Err(FeedmixError::Blocked(format!(
                "{}: Attention Required",
                source.url
            )));
        }
        if source.url.contains("down") {
            return Err(FeedmixError::Fetch(format!("{}: HTTP 502", source.url)));
        }

        let now = Utc::now();
        let items = (0..self.items)
            .map(|i| RawItem {
                id: Some(format!("{}#{}", source.url, i)),
                title: Some(format!("Item {i}")),
                content: Some(format!("<p>Body {i}</p>")),
                link: Some(format!("{}/{}", source.url, i)),
                published_at: Some(now - chrono::Duration::minutes(i as i64)),
                ..Default::default()
            })
            .collect();

        Ok(FetchedFeed {
            title: Some(format!("Feed at {}", source.url)),
            items,
        })
    }
}

/// A running test application.
pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub fetcher: Arc<StubFetcher>,
    pub exposure: Arc<MemoryExposureStore>,
}

impl TestApp {
    /// Wait for every background refresh to finish.
    pub async fn wait_idle(&self) {
        self.state.coordinator.wait_idle().await;
    }
}

/// Create a test configuration for the given source URLs.
pub fn create_test_config(sources: &[&str]) -> Config {
    let mut toml = String::from("[pagination]\ndefault_limit = 20\nmax_limit = 50\n");
    for url in sources {
        toml.push_str(&format!("\n[[sources]]\nurl = \"{url}\"\ncategory = \"Tech\"\n"));
    }
    Config::parse(&toml).expect("Failed to parse test config")
}

/// Create a test app over an in-memory database.
pub async fn create_test_app(sources: &[&str], fetcher: Arc<StubFetcher>) -> TestApp {
    let config = create_test_config(sources);
    let db = Database::open_in_memory()
        .await
        .expect("Failed to create test database");

    let exposure = Arc::new(MemoryExposureStore::new());
    let state = Arc::new(AppState::from_parts(
        &config,
        db,
        fetcher.clone(),
        exposure.clone(),
        Arc::new(SequenceRandom::constant(0.5)),
    ));

    let router = create_router(state.clone(), &config.server.cors_origins);
    let server = TestServer::new(router).expect("Failed to create test server");

    TestApp {
        server,
        state,
        fetcher,
        exposure,
    }
}
