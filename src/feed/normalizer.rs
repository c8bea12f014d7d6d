//! Item normalizer: raw feed entries to canonical articles.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use super::types::{Article, RawItem, SourceMeta};

/// Title used when an entry has none.
pub const DEFAULT_TITLE: &str = "Untitled";

/// Image classes marking quoted / reposted avatars rather than content images.
const AVATAR_CLASSES: &[&str] = &["rt-avatar", "qt-avatar"];

/// Convert a raw entry into an [`Article`].
///
/// `ordinal` is the entry's position in the fetched feed and only matters
/// when the entry carries no guid, link, title or content. `fetched_at`
/// stands in for a missing publication time.
pub fn normalize(
    raw: &RawItem,
    meta: &SourceMeta,
    ordinal: usize,
    fetched_at: DateTime<Utc>,
) -> Article {
    let title = non_empty(raw.title.as_deref())
        .map(|t| t.to_string())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let content = raw.content.clone().unwrap_or_default();
    let link = non_empty(raw.link.as_deref()).unwrap_or_default().to_string();

    Article {
        id: derive_id(raw, meta, ordinal),
        source_url: meta.url.clone(),
        source_kind: meta.kind,
        source_name: meta.display_name().to_string(),
        category: meta.category.clone(),
        title,
        author: resolve_author(raw, meta),
        author_avatar: non_empty(raw.author_avatar.as_deref()).map(str::to_string),
        image_url: extract_image(raw),
        content,
        link,
        published_at: raw.published_at.unwrap_or(fetched_at),
        favorite_count: raw.favorite_count,
        retweet_count: raw.retweet_count,
    }
}

/// Stable id: upstream guid, then link, then a content hash, then URL + ordinal.
pub fn derive_id(raw: &RawItem, meta: &SourceMeta, ordinal: usize) -> String {
    if let Some(guid) = non_empty(raw.id.as_deref()) {
        return guid.to_string();
    }
    if let Some(link) = non_empty(raw.link.as_deref()) {
        return link.to_string();
    }

    let title = non_empty(raw.title.as_deref());
    let content = non_empty(raw.content.as_deref());
    if title.is_some() || content.is_some() {
        let mut hasher = Sha256::new();
        hasher.update(meta.url.as_bytes());
        hasher.update([0]);
        hasher.update(title.unwrap_or_default().as_bytes());
        hasher.update([0]);
        hasher.update(content.unwrap_or_default().as_bytes());
        let digest = hasher.finalize();
        let hex: String = digest.iter().take(16).map(|b| format!("{b:02x}")).collect();
        return format!("sha256:{hex}");
    }

    format!("{}-{}", meta.url, ordinal)
}

/// Author fallback chain: author tag, creator, feed display name, "Unknown Feed".
pub fn resolve_author(raw: &RawItem, meta: &SourceMeta) -> String {
    non_empty(raw.author.as_deref())
        .or_else(|| non_empty(raw.creator.as_deref()))
        .unwrap_or_else(|| meta.display_name())
        .to_string()
}

/// Best-effort image: explicit enclosure/media, else the first non-avatar `<img>` in the content.
pub fn extract_image(raw: &RawItem) -> Option<String> {
    if let Some(image) = non_empty(raw.image.as_deref()) {
        return Some(image.to_string());
    }
    raw.content.as_deref().and_then(first_content_image)
}

/// Find the `src` of the first `<img>` tag not flagged as an avatar.
fn first_content_image(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let mut pos = 0;

    while let Some(start) = lower[pos..].find("<img") {
        let start = pos + start;
        let end = match lower[start..].find('>') {
            Some(end) => start + end,
            None => break,
        };
        let tag = &html[start..end];
        pos = end;

        if is_avatar(tag) {
            continue;
        }
        if let Some(src) = attribute(tag, "src") {
            if !src.is_empty() {
                return Some(src.to_string());
            }
        }
    }
    None
}

fn is_avatar(tag: &str) -> bool {
    match attribute(tag, "class") {
        Some(class) => class
            .split_whitespace()
            .any(|c| AVATAR_CLASSES.contains(&c)),
        None => false,
    }
}

/// Value of a quoted attribute inside a single tag.
fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let lower = tag.to_ascii_lowercase();
    let mut pos = 0;

    while let Some(found) = lower[pos..].find(name) {
        let at = pos + found;
        pos = at + name.len();

        // Must be a whole attribute name
        let preceded_ok = at == 0
            || lower[..at]
                .chars()
                .last()
                .is_some_and(|c| c.is_whitespace());
        let rest = tag[pos..].trim_start();
        if !preceded_ok || !rest.starts_with('=') {
            continue;
        }

        let value = rest[1..].trim_start();
        let quote = value.chars().next()?;
        if quote != '"' && quote != '\'' {
            return value.split_whitespace().next();
        }
        let inner = &value[1..];
        return inner.find(quote).map(|close| &inner[..close]);
    }
    None
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
