//! Snapshot persistence for the shadow cache.
//!
//! The index is written as one versioned JSON document. Writes go to a
//! temporary file that is renamed into place, so a crash mid-write leaves the
//! previous snapshot intact. An unreadable or version-mismatched snapshot is
//! reported as `IndexError::Snapshot`; callers recover with a full reindex.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::document::IndexedDocument;
use super::error::{IndexError, IndexResult};
use super::index::ShadowIndex;
use crate::types::get_utc_timestamp;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

const SNAPSHOT_FILE: &str = "cache.json";

#[derive(Debug, Serialize, Deserialize)]
struct CacheSnapshot {
    version: u32,
    saved_at: u64,
    file_count: usize,
    documents: Vec<IndexedDocument>,
}

/// Manages the on-disk snapshot of the index
#[derive(Debug, Clone)]
pub struct CachePersistence {
    base_path: PathBuf,
}

impl CachePersistence {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.base_path.join(SNAPSHOT_FILE)
    }

    /// Write the index to disk.
    #[must_use = "Save errors should be handled to ensure data is persisted"]
    pub fn save(&self, index: &ShadowIndex) -> IndexResult<()> {
        fs::create_dir_all(&self.base_path)
            .map_err(|e| IndexError::io(self.base_path.clone(), e))?;

        let snapshot = CacheSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: get_utc_timestamp(),
            file_count: index.len(),
            documents: index.raw_documents().cloned().collect(),
        };

        let json = serde_json::to_vec(&snapshot)
            .map_err(|e| IndexError::Snapshot(format!("failed to serialize: {e}")))?;

        let final_path = self.snapshot_path();
        let tmp_path = final_path.with_extension("json.tmp");
        write_then_rename(&tmp_path, &final_path, &json).map_err(|source| {
            IndexError::SnapshotWrite {
                path: final_path.clone(),
                source,
            }
        })?;

        crate::debug_event!("cache", "snapshot saved", "{} documents", snapshot.file_count);
        Ok(())
    }

    /// Load the persisted rows. `Ok(None)` when no snapshot exists.
    #[must_use = "Load errors should be handled appropriately"]
    pub fn load(&self) -> IndexResult<Option<ShadowIndex>> {
        let path = self.snapshot_path();
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&path).map_err(|e| IndexError::io(path.clone(), e))?;
        let snapshot: CacheSnapshot = serde_json::from_slice(&bytes)
            .map_err(|e| IndexError::Snapshot(format!("{}: {e}", path.display())))?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(IndexError::Snapshot(format!(
                "snapshot version {} does not match expected {SNAPSHOT_VERSION}",
                snapshot.version
            )));
        }
        if snapshot.file_count != snapshot.documents.len() {
            return Err(IndexError::Snapshot(format!(
                "snapshot header lists {} documents but contains {}",
                snapshot.file_count,
                snapshot.documents.len()
            )));
        }

        Ok(Some(ShadowIndex::from_documents(snapshot.documents)))
    }

}

fn write_then_rename(tmp: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    fs::write(tmp, bytes)?;
    fs::rename(tmp, target)
}
