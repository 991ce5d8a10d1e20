//! Per-path debouncing of file change events.
//!
//! Editors often write a file several times in quick succession (auto-save,
//! formatting, atomic replace). Changes are held until the path has been
//! quiet for the configured duration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::types::EventKind;

/// Debounces file change events by path.
///
/// Records change timestamps and returns paths that have been stable
/// for the configured duration.
#[derive(Debug)]
pub struct Debouncer {
    /// Pending changes: path -> (last change, kind to report).
    pending: HashMap<PathBuf, (Instant, EventKind)>,
    /// How long a file must be stable before processing.
    duration: Duration,
}

impl Debouncer {
    /// Create a new debouncer with the given duration in milliseconds.
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            pending: HashMap::new(),
            duration: Duration::from_millis(debounce_ms),
        }
    }

    /// Record a change and reset the timer for this path.
    ///
    /// A pending `Created` is kept when later modifications arrive.
    pub fn record(&mut self, path: PathBuf, kind: EventKind) {
        let now = Instant::now();
        self.pending
            .entry(path)
            .and_modify(|(at, existing)| {
                *at = now;
                if *existing != EventKind::Created {
                    *existing = kind;
                }
            })
            .or_insert((now, kind));
    }

    /// Remove a path from pending (e.g., when file is deleted).
    pub fn remove(&mut self, path: &Path) {
        self.pending.remove(path);
    }

    /// Take all paths that have been stable for the debounce duration.
    pub fn take_ready(&mut self) -> Vec<(PathBuf, EventKind)> {
        let now = Instant::now();
        let mut ready = Vec::new();

        self.pending.retain(|path, (last_change, kind)| {
            if now.duration_since(*last_change) >= self.duration {
                ready.push((path.clone(), *kind));
                false
            } else {
                true
            }
        });

        ready.sort();
        ready
    }

    /// Take every pending path regardless of age.
    pub fn drain_all(&mut self) -> Vec<(PathBuf, EventKind)> {
        let mut all: Vec<_> = self
            .pending
            .drain()
            .map(|(path, (_, kind))| (path, kind))
            .collect();
        all.sort();
        all
    }

    /// Check if there are any pending changes.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
