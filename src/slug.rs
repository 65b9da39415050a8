use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// Filesystem-safe identity of a chapter: only `[A-Za-z0-9_-]`, never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChapterSlug(String);

impl ChapterSlug {
    /// Sanitizes `raw`; `None` when nothing is left afterwards.
    pub fn new(raw: &str) -> Option<Self> {
        let slug = sanitize(raw);
        if slug.is_empty() {
            None
        } else {
            Some(Self(slug))
        }
    }

    /// Derives the slug from the last non-empty path segment of a chapter URL.
    pub fn from_url(url: &Url) -> Option<Self> {
        let last_segment = url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last());
        match last_segment {
            Some(segment) => Self::new(segment),
            None => Self::new(url.host_str().unwrap_or_default()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChapterSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChapterSlug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Replaces every character outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
