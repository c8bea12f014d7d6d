//! Configured source registry.

use std::collections::HashMap;

use super::types::{RefreshKey, SourceKind, SourceMeta};
use crate::config::SourceConfig;

/// Static list of upstream sources, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<SourceMeta>,
    by_url: HashMap<String, usize>,
}

impl SourceRegistry {
    /// Build a registry from source metadata. Later duplicates of a URL are ignored.
    pub fn new(sources: impl IntoIterator<Item = SourceMeta>) -> Self {
        let mut registry = Self::default();
        for source in sources {
            if registry.by_url.contains_key(&source.url) {
                continue;
            }
            registry
                .by_url
                .insert(source.url.clone(), registry.sources.len());
            registry.sources.push(source);
        }
        registry
    }

    /// Build a registry from the `[[sources]]` configuration tables.
    pub fn from_config(sources: &[SourceConfig]) -> Self {
        Self::new(sources.iter().map(|s| SourceMeta {
            url: s.url.trim().to_string(),
            name: s.name.clone().filter(|n| !n.trim().is_empty()),
            kind: s
                .kind
                .unwrap_or_else(|| SourceKind::infer_from_url(&s.url)),
            category: s.category.clone(),
            subcategory: s.subcategory.clone(),
        }))
    }

    /// Every source.
    pub fn all(&self) -> &[SourceMeta] {
        &self.sources
    }

    /// Number of sources.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether no sources are configured.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Look up a source by feed URL.
    pub fn get(&self, url: &str) -> Option<&SourceMeta> {
        self.by_url.get(url).map(|&i| &self.sources[i])
    }

    /// Sources covered by a refresh key.
    ///
    /// An unconfigured URL still resolves to a single ad-hoc source so
    /// single-feed columns work for feeds added at runtime.
    pub fn resolve(&self, key: &RefreshKey) -> Vec<SourceMeta> {
        match key {
            RefreshKey::All => self.sources.clone(),
            RefreshKey::Kind(kind) => self
                .sources
                .iter()
                .filter(|s| s.kind == *kind)
                .cloned()
                .collect(),
            RefreshKey::Source(url) => match self.get(url) {
                Some(source) => vec![source.clone()],
                None => vec![SourceMeta::new(url.clone(), SourceKind::infer_from_url(url))],
            },
        }
    }

    /// Kind of a feed URL, configured or inferred.
    pub fn kind_of(&self, url: &str) -> SourceKind {
        self.get(url)
            .map(|s| s.kind)
            .unwrap_or_else(|| SourceKind::infer_from_url(url))
    }
}
