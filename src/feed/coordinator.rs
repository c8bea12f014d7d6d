//! Refresh coordinator.
//!
//! Runs background refresh waves with a single-flight guarantee per
//! [`RefreshKey`]: while a wave for a key is in flight, further triggers
//! for the same key are no-ops. Waves run on a bounded worker pool, fetch
//! their sources concurrently, and always release their key when they end,
//! whether they finished, failed, timed out, panicked or were cancelled.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::fetcher::FeedFetcher;
use super::normalizer::normalize;
use super::repository::ArticleRepository;
use super::sources::SourceRegistry;
use super::types::{RefreshKey, SourceMeta};
use crate::config::RefreshConfig;
use crate::db::DbPool;
use crate::FeedmixError;

/// Last known state of one source.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceHealth {
    /// Last refresh attempt.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Last successful fetch.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Last error message, cleared on success.
    pub last_error: Option<String>,
    /// The last attempt hit an anti-bot wall.
    pub blocked: bool,
    /// Failures since the last success.
    pub consecutive_failures: u32,
}

/// Summary of one refresh wave.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshReport {
    /// Key the wave ran for.
    pub key: String,
    /// Sources covered by the key.
    pub sources_total: usize,
    /// Sources fetched and parsed successfully.
    pub sources_succeeded: usize,
    /// Sources that failed (fetch, parse, timeout or blocked).
    pub sources_failed: usize,
    /// Sources refused by an anti-bot wall.
    pub blocked: Vec<String>,
    /// Items returned by upstream.
    pub items_fetched: usize,
    /// Items newly stored.
    pub items_inserted: usize,
    /// Items that could not be stored.
    pub items_failed: usize,
    /// The wave ran past its batch budget.
    pub timed_out: bool,
    /// The wave was cancelled by shutdown.
    pub cancelled: bool,
    /// Wall-clock time spent after acquiring a worker.
    pub duration_ms: u64,
}

impl RefreshReport {
    fn new(key: &RefreshKey) -> Self {
        Self {
            key: key.to_string(),
            sources_total: 0,
            sources_succeeded: 0,
            sources_failed: 0,
            blocked: Vec::new(),
            items_fetched: 0,
            items_inserted: 0,
            items_failed: 0,
            timed_out: false,
            cancelled: false,
            duration_ms: 0,
        }
    }

    fn absorb(&mut self, outcome: SourceOutcome) {
        match outcome.error {
            None => self.sources_succeeded += 1,
            Some(blocked) => {
                self.sources_failed += 1;
                if blocked {
                    self.blocked.push(outcome.url);
                }
            }
        }
        self.items_fetched += outcome.fetched;
        self.items_inserted += outcome.inserted;
        self.items_failed += outcome.failed;
    }
}

/// Result of refreshing one source. `error` is `Some(is_blocked)` on failure.
struct SourceOutcome {
    url: String,
    error: Option<bool>,
    fetched: usize,
    inserted: usize,
    failed: usize,
}

/// Timeouts and limits of a coordinator.
#[derive(Debug, Clone)]
pub struct RefreshSettings {
    /// Budget for fetching one source.
    pub source_timeout: Duration,
    /// Budget for one whole wave.
    pub batch_timeout: Duration,
    /// Waves allowed to run at once.
    pub max_concurrent_refreshes: usize,
    /// Sources fetched in parallel inside one wave.
    pub max_concurrent_sources: usize,
}

impl From<&RefreshConfig> for RefreshSettings {
    fn from(config: &RefreshConfig) -> Self {
        Self {
            source_timeout: Duration::from_secs(config.source_timeout_secs),
            batch_timeout: Duration::from_secs(config.batch_timeout_secs),
            max_concurrent_refreshes: config.max_concurrent_refreshes.max(1),
            max_concurrent_sources: config.max_concurrent_sources.max(1),
        }
    }
}

/// Single-flight background refresher.
pub struct RefreshCoordinator {
    pool: DbPool,
    registry: Arc<SourceRegistry>,
    fetcher: Arc<dyn FeedFetcher>,
    settings: RefreshSettings,
    active: Mutex<HashSet<RefreshKey>>,
    active_count: watch::Sender<usize>,
    workers: Arc<Semaphore>,
    shutdown: CancellationToken,
    health: Mutex<HashMap<String, SourceHealth>>,
}

/// Removes a key from the active set when dropped.
struct ActiveGuard {
    coordinator: Arc<RefreshCoordinator>,
    key: RefreshKey,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let mut active = lock(&self.coordinator.active);
        active.remove(&self.key);
        self.coordinator.active_count.send_replace(active.len());
        debug!("Released refresh key {}", self.key);
    }
}

impl RefreshCoordinator {
    /// Create a coordinator.
    pub fn new(
        pool: DbPool,
        registry: Arc<SourceRegistry>,
        fetcher: Arc<dyn FeedFetcher>,
        settings: RefreshSettings,
    ) -> Arc<Self> {
        let (active_count, _) = watch::channel(0);
        Arc::new(Self {
            pool,
            registry,
            fetcher,
            workers: Arc::new(Semaphore::new(settings.max_concurrent_refreshes.max(1))),
            settings,
            active: Mutex::new(HashSet::new()),
            active_count,
            shutdown: CancellationToken::new(),
            health: Mutex::new(HashMap::new()),
        })
    }

    /// Start a background refresh for `key` unless one is already running.
    ///
    /// Returns the wave's handle when a new wave was started, `None` when
    /// the key was already in flight or the coordinator is shut down.
    /// Dropping the handle does not cancel the wave.
    pub fn trigger_refresh(self: &Arc<Self>, key: RefreshKey) -> Option<JoinHandle<RefreshReport>> {
        if self.shutdown.is_cancelled() {
            debug!("Ignoring refresh for {} after shutdown", key);
            return None;
        }

        let guard = {
            let mut active = lock(&self.active);
            if !active.insert(key.clone()) {
                debug!("Refresh for {} already in flight", key);
                return None;
            }
            self.active_count.send_replace(active.len());
            ActiveGuard {
                coordinator: Arc::clone(self),
                key: key.clone(),
            }
        };

        info!("Starting background refresh for {}", key);
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            // Held until the wave ends, including on panic
            let _guard = guard;
            this.run_wave(key).await
        }))
    }

    async fn run_wave(&self, key: RefreshKey) -> RefreshReport {
        let mut report = RefreshReport::new(&key);

        let _permit = tokio::select! {
            permit = Arc::clone(&self.workers).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    report.cancelled = true;
                    return report;
                }
            },
            _ = self.shutdown.cancelled() => {
                report.cancelled = true;
                return report;
            }
        };

        let started = Instant::now();
        let sources = self.registry.resolve(&key);
        report.sources_total = sources.len();

        // None when cancelled, Some(timed_out) otherwise
        let finished = {
            let run = tokio::time::timeout(
                self.settings.batch_timeout,
                self.run_sources(sources, &mut report),
            );
            tokio::select! {
                result = run => Some(result.is_err()),
                _ = self.shutdown.cancelled() => None,
            }
        };

        match finished {
            Some(false) => {}
            Some(true) => {
                report.timed_out = true;
                warn!(
                    "Refresh for {} exceeded its {:?} budget",
                    key, self.settings.batch_timeout
                );
            }
            None => {
                report.cancelled = true;
                info!("Refresh for {} cancelled by shutdown", key);
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "Refresh for {} complete: {}/{} sources ok, {} new items in {}ms",
            key,
            report.sources_succeeded,
            report.sources_total,
            report.items_inserted,
            report.duration_ms
        );
        report
    }

    async fn run_sources(&self, sources: Vec<SourceMeta>, report: &mut RefreshReport) {
        let mut outcomes = stream::iter(sources)
            .map(|source| self.refresh_source(source))
            .buffer_unordered(self.settings.max_concurrent_sources);

        while let Some(outcome) = outcomes.next().await {
            report.absorb(outcome);
        }
    }

    /// Fetch, normalize and upsert one source. Failures are logged, never raised.
    async fn refresh_source(&self, source: SourceMeta) -> SourceOutcome {
        let started = Utc::now();
        let mut outcome = SourceOutcome {
            url: source.url.clone(),
            error: None,
            fetched: 0,
            inserted: 0,
            failed: 0,
        };

        let fetched = match tokio::time::timeout(
            self.settings.source_timeout,
            self.fetcher.fetch(&source),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(FeedmixError::Timeout(format!(
                "{} after {:?}",
                source.url, self.settings.source_timeout
            ))),
        };

        let feed = match fetched {
            Ok(feed) => feed,
            Err(e) => {
                if e.is_blocked() {
                    warn!("Source {} is blocked upstream", source.url);
                } else {
                    warn!("Failed to refresh {}: {}", source.url, e);
                }
                outcome.error = Some(e.is_blocked());
                self.record_failure(&source.url, started, &e);
                return outcome;
            }
        };

        if feed.items.is_empty() {
            debug!("Source {} returned no items", source.url);
        }

        let meta = source.with_feed_title(feed.title.as_deref());
        let repo = ArticleRepository::new(&self.pool);
        let fetched_at = Utc::now();
        outcome.fetched = feed.items.len();

        for (ordinal, raw) in feed.items.iter().enumerate() {
            let article = normalize(raw, &meta, ordinal, fetched_at);
            match repo.upsert(&article).await {
                Ok(true) => outcome.inserted += 1,
                Ok(false) => {}
                Err(e) => {
                    error!("Failed to store item {} from {}: {}", article.id, meta.url, e);
                    outcome.failed += 1;
                }
            }
        }

        debug!(
            "Source {}: {} items, {} new",
            meta.url, outcome.fetched, outcome.inserted
        );
        self.record_success(&meta.url, started);
        outcome
    }

    fn record_success(&self, url: &str, at: DateTime<Utc>) {
        let mut health = lock(&self.health);
        let entry = health.entry(url.to_string()).or_default();
        entry.last_attempt_at = Some(at);
        entry.last_success_at = Some(at);
        entry.last_error = None;
        entry.blocked = false;
        entry.consecutive_failures = 0;
    }

    fn record_failure(&self, url: &str, at: DateTime<Utc>, err: &FeedmixError) {
        let mut health = lock(&self.health);
        let entry = health.entry(url.to_string()).or_default();
        entry.last_attempt_at = Some(at);
        entry.last_error = Some(err.to_string());
        entry.blocked = err.is_blocked();
        entry.consecutive_failures += 1;
    }

    /// Whether a wave covering `key` is in flight.
    ///
    /// `all` covers every key, a kind covers its sources.
    pub fn is_refreshing(&self, key: &RefreshKey) -> bool {
        let active = lock(&self.active);
        active.iter().any(|running| self.covers(running, key))
    }

    fn covers(&self, running: &RefreshKey, key: &RefreshKey) -> bool {
        match (running, key) {
            (RefreshKey::All, _) => true,
            (RefreshKey::Kind(a), RefreshKey::Kind(b)) => a == b,
            (RefreshKey::Kind(kind), RefreshKey::Source(url)) => self.registry.kind_of(url) == *kind,
            (RefreshKey::Source(a), RefreshKey::Source(b)) => a == b,
            _ => false,
        }
    }

    /// Keys currently in flight.
    pub fn active_keys(&self) -> Vec<RefreshKey> {
        lock(&self.active).iter().cloned().collect()
    }

    /// Whether every source covered by `key` was blocked on its last attempt.
    pub fn is_blocked(&self, key: &RefreshKey) -> bool {
        let health = lock(&self.health);
        let sources = self.registry.resolve(key);
        !sources.is_empty()
            && sources
                .iter()
                .all(|s| health.get(&s.url).is_some_and(|h| h.blocked))
    }

    /// Health of one source.
    pub fn source_health(&self, url: &str) -> Option<SourceHealth> {
        lock(&self.health).get(url).cloned()
    }

    /// Health of every source attempted so far.
    pub fn health_snapshot(&self) -> HashMap<String, SourceHealth> {
        lock(&self.health).clone()
    }

    /// Source registry this coordinator refreshes.
    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Wait until no wave is in flight.
    pub async fn wait_idle(&self) {
        let mut rx = self.active_count.subscribe();
        // The sender lives in self, so the channel cannot close here
        let _ = rx.wait_for(|count| *count == 0).await;
    }

    /// Cancel running and queued waves; later triggers are ignored.
    pub fn shutdown(&self) {
        info!("Shutting down refresh coordinator");
        self.shutdown.cancel();
    }

    /// Whether shutdown has begun; triggers are ignored from then on.
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Lock a mutex, recovering the data if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
