//! Pending batch state and its on-disk form across restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::time::Instant;

use super::error::CommitResult;
use crate::types::EventKind;

/// Changed paths waiting for the debounce deadline.
#[derive(Debug, Clone)]
pub struct PendingBatch {
    /// Latest event kind per path.
    pub changed: BTreeMap<String, EventKind>,
    pub deadline: Instant,
    pub opened_at: DateTime<Utc>,
}

impl PendingBatch {
    pub fn new(deadline: Instant) -> Self {
        Self {
            changed: BTreeMap::new(),
            deadline,
            opened_at: Utc::now(),
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

pub const PENDING_STATE_FILE: &str = "pending_commit.json";

const PENDING_STATE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PendingState {
    version: u32,
    saved_at: DateTime<Utc>,
    changes: BTreeMap<String, EventKind>,
}

/// Paths that were pending or preserved at shutdown.
#[derive(Debug, Clone)]
pub struct PendingStore {
    path: PathBuf,
}

impl PendingStore {
    pub fn new(index_dir: impl AsRef<Path>) -> Self {
        Self {
            path: index_dir.as_ref().join(PENDING_STATE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, changes: &BTreeMap<String, EventKind>) -> CommitResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let state = PendingState {
            version: PENDING_STATE_VERSION,
            saved_at: Utc::now(),
            changes: changes.clone(),
        };
        let json = serde_json::to_vec_pretty(&state).map_err(std::io::Error::other)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Load and delete the saved state. Unreadable files are logged and dropped.
    pub fn take(&self) -> CommitResult<BTreeMap<String, EventKind>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let bytes = std::fs::read(&self.path)?;
        let changes = match serde_json::from_slice::<PendingState>(&bytes) {
            Ok(state) if state.version == PENDING_STATE_VERSION => state.changes,
            Ok(state) => {
                tracing::warn!(
                    "[commit] ignoring pending state version {} in {}",
                    state.version,
                    self.path.display()
                );
                BTreeMap::new()
            }
            Err(e) => {
                tracing::warn!("[commit] unreadable pending state {}: {e}", self.path.display());
                BTreeMap::new()
            }
        };
        std::fs::remove_file(&self.path)?;
        Ok(changes)
    }
}
