//! Error types for the shadow cache.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from cache operations.
///
/// A malformed frontmatter header is not an error: the document is indexed
/// with empty fields and `parse_error` set.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write index snapshot {path}: {source}")]
    SnapshotWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Index snapshot is unusable: {0}")]
    Snapshot(String),

    #[error("Vault scan failed: {0}")]
    Walk(String),
}

impl IndexError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IndexError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type IndexResult<T> = Result<T, IndexError>;
