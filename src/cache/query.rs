//! Query predicates and statistics for the shadow cache.

use serde::{Deserialize, Serialize};

/// A set of predicates; every present predicate must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentQuery {
    /// Only paths starting with this prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Documents carrying all of these tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Documents whose outbound links contain this path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links_to: Option<String>,

    /// Documents linked from this path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_from: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_parse_error: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl DocumentQuery {
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(prefix.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Counts reported by `ShadowCache::stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub file_count: usize,
    /// Distinct tags across the vault.
    pub tag_count: usize,
    /// Total outbound link edges.
    pub link_count: usize,
    pub parse_error_count: usize,
    /// Edges whose target is not indexed.
    pub dangling_link_count: usize,
}
