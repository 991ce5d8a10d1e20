//! Workflow definitions: trigger set, path filter, handler.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::error::WorkflowError;
use super::handler::WorkflowHandler;
use crate::types::{EventKind, VaultEvent};

/// Glob matcher over vault-relative paths.
///
/// `*` does not cross `/`; use `**` for any depth.
#[derive(Clone)]
pub struct PathFilter {
    pattern: glob::Pattern,
}

const MATCH_OPTIONS: glob::MatchOptions = glob::MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

impl PathFilter {
    pub fn new(pattern: &str) -> Result<Self, WorkflowError> {
        glob::Pattern::new(pattern)
            .map(|pattern| Self { pattern })
            .map_err(|e| WorkflowError::InvalidFilter {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn matches(&self, rel_path: &str) -> bool {
        self.pattern.matches_with(rel_path, MATCH_OPTIONS)
    }

    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }
}

impl fmt::Debug for PathFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PathFilter({})", self.pattern.as_str())
    }
}

/// A registered (trigger types, path filter, handler) tuple.
#[derive(Clone)]
pub struct WorkflowDefinition {
    id: String,
    triggers: BTreeSet<EventKind>,
    path_filter: Option<PathFilter>,
    handler: Arc<dyn WorkflowHandler>,
    pub enabled: bool,
    pub description: Option<String>,
}

impl WorkflowDefinition {
    /// A definition reacting to every event kind on every path.
    pub fn new(id: impl Into<String>, handler: Arc<dyn WorkflowHandler>) -> Self {
        Self {
            id: id.into(),
            triggers: EventKind::ALL.into_iter().collect(),
            path_filter: None,
            handler,
            enabled: true,
            description: None,
        }
    }

    pub fn on(mut self, kinds: impl IntoIterator<Item = EventKind>) -> Self {
        self.triggers = kinds.into_iter().collect();
        self
    }

    pub fn with_filter(mut self, pattern: &str) -> Result<Self, WorkflowError> {
        self.path_filter = Some(PathFilter::new(pattern)?);
        Ok(self)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn triggers(&self) -> &BTreeSet<EventKind> {
        &self.triggers
    }

    pub fn path_filter(&self) -> Option<&PathFilter> {
        self.path_filter.as_ref()
    }

    pub(crate) fn handler(&self) -> Arc<dyn WorkflowHandler> {
        Arc::clone(&self.handler)
    }

    /// Enabled, trigger kind listed, and path filter (if any) matches.
    pub fn matches(&self, event: &VaultEvent) -> bool {
        self.enabled
            && self.triggers.contains(&event.kind)
            && self
                .path_filter
                .as_ref()
                .is_none_or(|f| f.matches(&event.path))
    }

    pub fn summary(&self) -> WorkflowSummary {
        WorkflowSummary {
            id: self.id.clone(),
            triggers: self.triggers.iter().copied().collect(),
            path_filter: self.path_filter.as_ref().map(|f| f.as_str().to_string()),
            enabled: self.enabled,
            description: self.description.clone(),
        }
    }
}

impl fmt::Debug for WorkflowDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowDefinition")
            .field("id", &self.id)
            .field("triggers", &self.triggers)
            .field("path_filter", &self.path_filter)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Serializable view of a definition, as returned by `list_workflows`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowSummary {
    pub id: String,
    pub triggers: Vec<EventKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_filter: Option<String>,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::handler::FnHandler;

    fn noop() -> Arc<dyn WorkflowHandler> {
        Arc::new(FnHandler::new(|_ctx| async { Ok(None) }))
    }

    #[test]
    fn test_path_filter_separators() {
        let filter = PathFilter::new("notes/*.md").unwrap();
        assert!(filter.matches("notes/a.md"));
        assert!(!filter.matches("notes/sub/a.md"));

        let deep = PathFilter::new("notes/**/*.md").unwrap();
        assert!(deep.matches("notes/sub/a.md"));
        assert!(!deep.matches("other/a.md"));
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let err = PathFilter::new("[oops").unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidFilter { .. }));
    }

    #[test]
    fn test_definition_matching() {
        let def = WorkflowDefinition::new("w", noop())
            .on([EventKind::Created])
            .with_filter("projects/**")
            .unwrap();

        assert!(def.matches(&VaultEvent::created("projects/x.md")));
        assert!(!def.matches(&VaultEvent::modified("projects/x.md")));
        assert!(!def.matches(&VaultEvent::created("notes/x.md")));
        assert!(!def.clone().disabled().matches(&VaultEvent::created("projects/x.md")));

        let any = WorkflowDefinition::new("any", noop());
        assert!(any.matches(&VaultEvent::removed("deep/nested/file.md")));
    }
}
