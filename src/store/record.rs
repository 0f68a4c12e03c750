//! Record model for the capsule store.

use serde::{Deserialize, Serialize};

/// How a record's content is meant to be consumed.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum RecordType {
    /// Consume directly
    Summary,
    /// Structured sidecar data
    Meta,
    /// Browse children
    Collection,
    /// Pointer to an external artifact
    Source,
    /// Redirect to another namespace
    Alias,
}

/// The unit of persistence in the capsule store.
///
/// Identity is `(namespace, title)`; saving the same key again upserts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRecord {
    pub namespace: String,
    pub title: String,
    pub summary: String,
    pub record_type: RecordType,
    pub content: serde_json::Value,
    pub tags: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
    pub hit_count: i64,
}

impl ContextRecord {
    /// Create a record with empty summary/content/tags. Timestamps are
    /// assigned by the store on save.
    pub fn new(namespace: &str, title: &str, record_type: RecordType) -> Self {
        Self {
            namespace: normalize_namespace(namespace),
            title: title.to_string(),
            summary: String::new(),
            record_type,
            content: serde_json::Value::Null,
            tags: Vec::new(),
            created_at: String::new(),
            updated_at: String::new(),
            hit_count: 0,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_content(mut self, content: serde_json::Value) -> Self {
        self.content = content;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Normalize a namespace path: lowercase ASCII segments, empty segments
/// dropped, no leading or trailing `/`.
pub fn normalize_namespace(namespace: &str) -> String {
    namespace
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("/")
}

/// A normalized namespace is valid when it has at least one segment.
pub fn is_valid_namespace(namespace: &str) -> bool {
    !namespace.is_empty()
}
