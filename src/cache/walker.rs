//! File system walker for discovering vault documents to index
//!
//! This module provides directory traversal with support for:
//! - .gitignore rules
//! - Custom ignore patterns from configuration
//! - Extension filtering
//! - Hidden file handling
//!
//! The same rules decide whether a live change event is relevant, so a
//! cold-start scan and the event stream always agree on what is indexed.

use ignore::WalkBuilder;
use ignore::overrides::{Override, OverrideBuilder};
use std::path::{Path, PathBuf};

use crate::config::CacheConfig;
use crate::types::relative_to_root;

/// Walks the vault to find documents to index
#[derive(Debug, Clone)]
pub struct VaultWalker {
    root: PathBuf,
    extensions: Vec<String>,
    overrides: Option<Override>,
}

impl VaultWalker {
    /// Create a new walker for `root` with the cache settings
    pub fn new(root: impl Into<PathBuf>, config: &CacheConfig) -> Self {
        let root = root.into();

        // Exclusion patterns go in as `!pattern` overrides
        let mut override_builder = OverrideBuilder::new(&root);
        for pattern in &config.ignore_patterns {
            if let Err(e) = override_builder.add(&format!("!{pattern}")) {
                tracing::warn!("[walker] invalid ignore pattern '{pattern}': {e}");
            }
        }
        let overrides = match override_builder.build() {
            Ok(o) => Some(o),
            Err(e) => {
                tracing::warn!("[walker] failed to build ignore overrides: {e}");
                None
            }
        };

        Self {
            root,
            extensions: config
                .include_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            overrides,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the vault and return vault-relative document paths, sorted.
    pub fn walk(&self) -> Vec<String> {
        self.collect(&self.root)
    }

    /// Walk one vault-relative directory with the same rules as [`walk`].
    ///
    /// Used when a directory appears with files already inside it.
    ///
    /// [`walk`]: VaultWalker::walk
    pub fn walk_dir(&self, rel_dir: &str) -> Vec<String> {
        if rel_dir.is_empty() {
            return self.walk();
        }
        if rel_dir.split('/').any(|part| part.starts_with('.')) {
            return Vec::new();
        }
        self.collect(&self.root.join(rel_dir))
    }

    fn collect(&self, start: &Path) -> Vec<String> {
        let mut builder = WalkBuilder::new(start);
        builder
            .hidden(true) // Skip dot-directories such as .git and .obsidian
            .git_ignore(true)
            .git_global(false)
            .git_exclude(true)
            .follow_links(false)
            .require_git(false);

        if let Some(overrides) = &self.overrides {
            builder.overrides(overrides.clone());
        }

        let mut paths: Vec<String> = builder
            .build()
            .filter_map(Result::ok) // Skip entries we can't access
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .filter_map(|entry| relative_to_root(&self.root, entry.path()))
            .filter(|rel| self.is_document(rel))
            .collect();

        paths.sort();
        paths
    }

    /// Check whether a vault-relative path is a document the cache tracks.
    pub fn is_document(&self, rel_path: &str) -> bool {
        if rel_path.is_empty() || !self.has_document_extension(rel_path) {
            return false;
        }
        if rel_path.split('/').any(|part| part.starts_with('.')) {
            return false;
        }
        match &self.overrides {
            Some(overrides) => !overrides
                .matched(self.root.join(rel_path), false)
                .is_ignore(),
            None => true,
        }
    }

    fn has_document_extension(&self, rel_path: &str) -> bool {
        Path::new(rel_path)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
    }
}
