//! The shadow cache: an incrementally maintained index of the vault.
//!
//! Writes are serialized by a writer gate, and the index lock is held for
//! writing only while rows are swapped in. File reads, hashing, and parsing
//! happen before that, so readers stay responsive during indexing.

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use super::document::IndexedDocument;
use super::error::{IndexError, IndexResult};
use super::index::ShadowIndex;
use super::parser::{calculate_hash, parse_document};
use super::persistence::CachePersistence;
use super::query::{CacheStats, DocumentQuery};
use super::walker::VaultWalker;
use crate::config::{CacheConfig, Settings};
use crate::types::{EventKind, VaultEvent};

/// What `apply` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// Row created or replaced.
    Indexed,
    /// Content hash unchanged; nothing written.
    Unchanged,
    /// Row deleted.
    Removed,
    /// Removal for a path that was never indexed.
    NotIndexed,
    /// Directory removal; every row beneath it was deleted.
    RemovedTree(usize),
    /// Path is not a tracked document.
    Skipped,
}

/// How `reindex` treats the existing rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReindexMode {
    /// Keep rows, apply changed files, drop rows whose files are gone.
    Reconcile,
    /// Start from an empty index.
    Full,
}

/// Statistics from a reindex pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReindexStats {
    pub scanned: usize,
    pub indexed: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub failed: usize,
}

pub struct ShadowCache {
    walker: VaultWalker,
    index: RwLock<ShadowIndex>,
    /// Single-writer discipline for apply/reindex.
    write_gate: Mutex<()>,
    persistence: Option<CachePersistence>,
    dirty: AtomicBool,
}

impl std::fmt::Debug for ShadowCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowCache")
            .field("root", &self.walker.root())
            .field("documents", &self.index.read().len())
            .field("persistent", &self.persistence.is_some())
            .field("dirty", &self.dirty.load(Ordering::Relaxed))
            .finish()
    }
}

impl ShadowCache {
    /// Create an empty cache with no on-disk snapshot.
    pub fn in_memory(root: impl Into<PathBuf>, config: &CacheConfig) -> Self {
        Self {
            walker: VaultWalker::new(root, config),
            index: RwLock::new(ShadowIndex::new()),
            write_gate: Mutex::new(()),
            persistence: None,
            dirty: AtomicBool::new(false),
        }
    }

    /// Open the persisted cache for the configured vault.
    ///
    /// A missing, unreadable, or version-mismatched snapshot triggers a full
    /// reindex of the vault instead of failing. A usable snapshot is
    /// reconciled against the files on disk.
    pub fn open(settings: &Settings) -> IndexResult<(Self, ReindexStats)> {
        let root = settings.vault_root();
        let persistence = CachePersistence::new(settings.resolved_index_path());

        let (loaded, mode) = match persistence.load() {
            Ok(Some(index)) => {
                crate::log_event!("cache", "loaded snapshot", "{} documents", index.len());
                (index, ReindexMode::Reconcile)
            }
            Ok(None) => {
                crate::log_event!("cache", "no snapshot, building index");
                (ShadowIndex::new(), ReindexMode::Full)
            }
            Err(e) => {
                tracing::warn!("[cache] snapshot unusable, rebuilding from vault scan: {e}");
                (ShadowIndex::new(), ReindexMode::Full)
            }
        };

        let cache = Self {
            walker: VaultWalker::new(root, &settings.cache),
            index: RwLock::new(loaded),
            write_gate: Mutex::new(()),
            persistence: Some(persistence),
            dirty: AtomicBool::new(mode == ReindexMode::Full),
        };

        let stats = cache.reindex(mode)?;
        if let Err(e) = cache.persist() {
            tracing::warn!("[cache] failed to persist index after startup: {e}");
        }
        Ok((cache, stats))
    }

    pub fn root(&self) -> &Path {
        self.walker.root()
    }

    pub fn walker(&self) -> &VaultWalker {
        &self.walker
    }

    /// Apply one change event to the index.
    pub fn apply(&self, event: &VaultEvent) -> IndexResult<ApplyOutcome> {
        let _gate = self.write_gate.lock();
        self.apply_locked(event)
    }

    fn apply_locked(&self, event: &VaultEvent) -> IndexResult<ApplyOutcome> {
        if !self.walker.is_document(&event.path) {
            if event.kind == EventKind::Removed {
                return Ok(self.remove_tree(&event.path));
            }
            crate::debug_event!("cache", "skipped", "{}", event.path);
            return Ok(ApplyOutcome::Skipped);
        }

        match event.kind {
            EventKind::Created | EventKind::Modified => self.index_path(&event.path),
            EventKind::Removed => Ok(self.remove_path(&event.path)),
        }
    }

    fn index_path(&self, rel_path: &str) -> IndexResult<ApplyOutcome> {
        let abs = self.walker.root().join(rel_path);
        let bytes = match std::fs::read(&abs) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Late notification for a file that is already gone
                crate::debug_event!("cache", "vanished before indexing", "{rel_path}");
                return Ok(self.remove_path(rel_path));
            }
            Err(e) => return Err(IndexError::io(abs, e)),
        };

        let hash = calculate_hash(&bytes);
        if self.index.read().content_hash(rel_path) == Some(hash.as_str()) {
            crate::debug_event!("cache", "unchanged (hash match)", "{rel_path}");
            return Ok(ApplyOutcome::Unchanged);
        }

        let content = String::from_utf8_lossy(&bytes);
        let parsed = parse_document(rel_path, &content);
        if let Some(reason) = &parsed.parse_error {
            tracing::warn!("[cache] {rel_path}: {reason}; indexed without frontmatter");
        }

        let doc = IndexedDocument {
            path: rel_path.to_string(),
            content_hash: hash,
            frontmatter: parsed.frontmatter,
            tags: parsed.tags,
            outbound_links: parsed.outbound_links,
            inbound_links: BTreeSet::new(),
            doc_type: parsed.doc_type,
            status: parsed.status,
            title: parsed.title,
            parse_error: parsed.parse_error,
            size_bytes: bytes.len() as u64,
            indexed_at: Utc::now(),
        };

        self.index.write().upsert(doc);
        self.dirty.store(true, Ordering::Release);
        crate::debug_event!("cache", "indexed", "{rel_path}");
        Ok(ApplyOutcome::Indexed)
    }

    fn remove_path(&self, rel_path: &str) -> ApplyOutcome {
        match self.index.write().remove(rel_path) {
            Some(_) => {
                self.dirty.store(true, Ordering::Release);
                crate::debug_event!("cache", "removed", "{rel_path}");
                ApplyOutcome::Removed
            }
            None => {
                crate::debug_event!("cache", "remove ignored, not indexed", "{rel_path}");
                ApplyOutcome::NotIndexed
            }
        }
    }

    fn remove_tree(&self, rel_dir: &str) -> ApplyOutcome {
        if rel_dir.is_empty() {
            return ApplyOutcome::Skipped;
        }
        let prefix = format!("{rel_dir}/");
        let mut index = self.index.write();
        let doomed: Vec<String> = index.paths_with_prefix(&prefix).cloned().collect();
        if doomed.is_empty() {
            return ApplyOutcome::Skipped;
        }
        for path in &doomed {
            index.remove(path);
        }
        self.dirty.store(true, Ordering::Release);
        crate::log_event!("cache", "removed directory", "{rel_dir} ({} documents)", doomed.len());
        ApplyOutcome::RemovedTree(doomed.len())
    }

    /// Rebuild the index from a directory scan.
    pub fn reindex(&self, mode: ReindexMode) -> IndexResult<ReindexStats> {
        let _gate = self.write_gate.lock();
        let mut stats = ReindexStats::default();

        if mode == ReindexMode::Full {
            self.index.write().clear();
            self.dirty.store(true, Ordering::Release);
        }

        let on_disk = self.walker.walk();
        stats.scanned = on_disk.len();

        for path in &on_disk {
            match self.index_path(path) {
                Ok(ApplyOutcome::Indexed) => stats.indexed += 1,
                Ok(ApplyOutcome::Unchanged) => stats.unchanged += 1,
                Ok(_) => {}
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!("[cache] reindex failed for {path}: {e}");
                }
            }
        }

        let present: HashSet<&str> = on_disk.iter().map(String::as_str).collect();
        let stale: Vec<String> = self
            .index
            .read()
            .paths()
            .filter(|p| !present.contains(p.as_str()))
            .cloned()
            .collect();
        for path in &stale {
            if self.remove_path(path) == ApplyOutcome::Removed {
                stats.removed += 1;
            }
        }

        crate::log_event!(
            "cache",
            "reindexed",
            "{} scanned, {} indexed, {} unchanged, {} removed, {} failed",
            stats.scanned,
            stats.indexed,
            stats.unchanged,
            stats.removed,
            stats.failed
        );
        Ok(stats)
    }

    /// Write the snapshot if anything changed since the last write.
    ///
    /// Returns whether a snapshot was written.
    pub fn persist(&self) -> IndexResult<bool> {
        let Some(persistence) = &self.persistence else {
            return Ok(false);
        };
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }

        let result = persistence.save(&self.index.read());
        if result.is_err() {
            self.dirty.store(true, Ordering::Release);
        }
        result.map(|_| true)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn get(&self, path: &str) -> Option<IndexedDocument> {
        self.index.read().get(&crate::types::normalize_rel_path(path))
    }

    pub fn query(&self, query: &DocumentQuery) -> Vec<IndexedDocument> {
        self.index.read().query(query)
    }

    /// Documents linking to `path` (indexed or not).
    pub fn backlinks(&self, path: &str) -> BTreeSet<String> {
        self.index
            .read()
            .inbound_of(&crate::types::normalize_rel_path(path))
    }

    pub fn stats(&self) -> CacheStats {
        self.index.read().stats()
    }

    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }
}
