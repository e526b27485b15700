//! Publish metadata and published video identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest title accepted by the upload target.
pub const MAX_TITLE_CHARS: usize = 95;

/// Longest description accepted by the upload target.
pub const MAX_DESCRIPTION_CHARS: usize = 4500;

/// Identifier returned by a publisher once a video is live.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublishedVideoId(pub String);

impl PublishedVideoId {
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublishedVideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Title, description and tags attached to a published video.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishMetadata {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl PublishMetadata {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Clamp fields to the upload limits.
    ///
    /// Truncation counts characters, so multi-byte text is never split
    /// mid code point. Tags are trimmed, empties dropped and duplicates
    /// removed keeping first occurrence.
    pub fn normalized(&self) -> Self {
        let mut tags: Vec<String> = Vec::with_capacity(self.tags.len());
        for tag in &self.tags {
            let tag = tag.trim();
            if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }

        Self {
            title: truncate_chars(self.title.trim(), MAX_TITLE_CHARS),
            description: truncate_chars(self.description.trim(), MAX_DESCRIPTION_CHARS),
            tags,
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
