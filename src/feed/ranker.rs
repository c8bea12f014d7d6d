//! Diversity ranker.
//!
//! Reorders a window of articles so no single source dominates it. Each
//! article gets a score in hours (lower is shown earlier):
//!
//! ```text
//! score = age + cluster_penalty - weight * boost_factor + jitter - column_boost
//! ```
//!
//! The leading items of every ranked window are recorded as exposure, which
//! pushes frequently shown sources back in later windows.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

use super::exposure::{exposure_weight, ExposureRecord, ExposureStore};
use super::types::{Article, ColumnKind, SourceKind};
use crate::config::RankingConfig;

/// Source of uniform random numbers in `[0, 1)`.
pub trait RandomSource: Send + Sync {
    /// Next sample.
    fn next_unit(&self) -> f64;
}

/// OS-seeded generator used in production.
pub struct SystemRandom {
    rng: Mutex<StdRng>,
}

impl SystemRandom {
    /// Generator seeded from the operating system.
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Reproducible generator.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for SystemRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for SystemRandom {
    fn next_unit(&self) -> f64 {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.random::<f64>()
    }
}

/// Replays a fixed sequence of samples, cycling when exhausted.
pub struct SequenceRandom {
    values: Vec<f64>,
    next: AtomicUsize,
}

impl SequenceRandom {
    /// Replay `values` in order. An empty sequence behaves like `constant(0.5)`.
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            next: AtomicUsize::new(0),
        }
    }

    /// Always return `value`; `0.5` means zero jitter.
    pub fn constant(value: f64) -> Self {
        Self::new(vec![value])
    }
}

impl RandomSource for SequenceRandom {
    fn next_unit(&self) -> f64 {
        if self.values.is_empty() {
            return 0.5;
        }
        let i = self.next.fetch_add(1, Ordering::Relaxed);
        self.values[i % self.values.len()]
    }
}

/// Scores and reorders candidate windows.
pub struct DiversityRanker {
    config: RankingConfig,
    exposure: Arc<dyn ExposureStore>,
    random: Arc<dyn RandomSource>,
}

impl DiversityRanker {
    /// Create a ranker.
    pub fn new(
        config: RankingConfig,
        exposure: Arc<dyn ExposureStore>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        Self {
            config,
            exposure,
            random,
        }
    }

    /// Rank a window now.
    pub async fn rank(&self, articles: Vec<Article>, mode: ColumnKind) -> Vec<Article> {
        self.rank_at(articles, mode, Utc::now()).await
    }

    /// Rank a window as of `now` and record exposure for its leading items.
    ///
    /// Exposure store failures degrade to "every source unseen" and are logged;
    /// ranking itself never fails.
    pub async fn rank_at(
        &self,
        articles: Vec<Article>,
        mode: ColumnKind,
        now: DateTime<Utc>,
    ) -> Vec<Article> {
        if articles.is_empty() {
            return articles;
        }

        let mut seen = HashSet::new();
        let keys: Vec<String> = articles
            .iter()
            .map(|a| a.source_key())
            .filter(|k| seen.insert(*k))
            .map(str::to_string)
            .collect();

        let history = match self.exposure.get_many(&keys).await {
            Ok(history) => history,
            Err(e) => {
                warn!("Failed to load exposure history: {}", e);
                HashMap::new()
            }
        };

        let ranked: Vec<Article> = self
            .score_window(articles, mode, &history, now)
            .into_iter()
            .map(|(article, _)| article)
            .collect();

        let shown: Vec<String> = ranked
            .iter()
            .take(self.config.exposure_top_n)
            .map(|a| a.source_key().to_string())
            .collect();
        if let Err(e) = self.exposure.record_shown(&shown, now).await {
            warn!("Failed to record exposure: {}", e);
        }

        ranked
    }

    /// Score a window without touching exposure; returns articles with their
    /// scores in display order.
    pub fn score_window(
        &self,
        articles: Vec<Article>,
        mode: ColumnKind,
        history: &HashMap<String, ExposureRecord>,
        now: DateTime<Utc>,
    ) -> Vec<(Article, f64)> {
        let mut aged: Vec<(f64, Article)> = articles
            .into_iter()
            .map(|article| {
                let age_hours =
                    now.signed_duration_since(article.published_at).num_seconds() as f64 / 3600.0;
                (age_hours, article)
            })
            .collect();

        // Chronological pass; stable so equal ages keep input order
        aged.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut occurrences: HashMap<String, u32> = HashMap::new();
        let mut scored: Vec<(Article, f64)> = aged
            .into_iter()
            .map(|(age_hours, article)| {
                let occurrence = occurrences
                    .entry(article.source_key().to_string())
                    .or_insert(0);
                *occurrence += 1;
                let cluster_penalty = f64::from(*occurrence - 1) * self.config.cluster_penalty_hours;

                let weight = exposure_weight(history.get(article.source_key()), now, &self.config);
                let diversity_boost = weight * self.config.boost_factor;
                let jitter = (self.random.next_unit() * 2.0 - 1.0) * self.config.jitter_hours;
                let column_boost =
                    if mode == ColumnKind::Mixed && article.source_kind != SourceKind::TweetLike {
                        self.config.mixed_document_boost_hours
                    } else {
                        0.0
                    };

                let score = age_hours + cluster_penalty - diversity_boost + jitter - column_boost;
                (article, score)
            })
            .collect();

        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored
    }
}
