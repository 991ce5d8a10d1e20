//! Core event types shared by the cache, workflow engine, and commit service.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};

/// Kind of change reported by the event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Modified,
    Removed,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [EventKind::Created, EventKind::Modified, EventKind::Removed];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Modified => "modified",
            EventKind::Removed => "removed",
        }
    }

    /// Parse the lowercase wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" | "create" | "add" => Some(EventKind::Created),
            "modified" | "modify" | "change" => Some(EventKind::Modified),
            "removed" | "remove" | "delete" | "unlink" => Some(EventKind::Removed),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single file-change notification, path relative to the vault root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VaultEvent {
    pub kind: EventKind,
    pub path: String,
}

impl VaultEvent {
    pub fn new(kind: EventKind, path: impl AsRef<str>) -> Self {
        Self {
            kind,
            path: normalize_rel_path(path.as_ref()),
        }
    }

    pub fn created(path: impl AsRef<str>) -> Self {
        Self::new(EventKind::Created, path)
    }

    pub fn modified(path: impl AsRef<str>) -> Self {
        Self::new(EventKind::Modified, path)
    }

    pub fn removed(path: impl AsRef<str>) -> Self {
        Self::new(EventKind::Removed, path)
    }
}

impl fmt::Display for VaultEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.path)
    }
}

/// Normalize a vault-relative path: forward slashes, no `./`, `..` folded.
///
/// Leading `/` is dropped so `"/notes/a.md"` and `"notes/a.md"` are the same key.
pub fn normalize_rel_path(raw: &str) -> String {
    let unified = raw.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Convert an absolute filesystem path into a vault-relative key.
///
/// Returns `None` when `path` lies outside `root`.
pub fn relative_to_root(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(s) => parts.push(s.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Current UTC timestamp in seconds.
pub fn get_utc_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
