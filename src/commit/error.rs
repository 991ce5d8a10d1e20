//! Error types for the auto-commit service.

use thiserror::Error;

/// Errors from summarization and version-control writes.
///
/// Summarization errors are always recovered with a fallback message.
/// `Vcs` errors are retried with backoff before the batch is preserved.
#[derive(Error, Debug)]
pub enum CommitError {
    #[error("Summarization failed: {0}")]
    Summarize(String),

    #[error("Summarization timed out after {0}s")]
    SummarizeTimeout(u64),

    #[error("Version control '{op}' failed: {reason}")]
    Vcs { op: &'static str, reason: String },

    /// Staged paths produced no change; treated as a clean flush.
    #[error("Nothing to commit")]
    NothingToCommit,

    #[error("Failed to persist pending commit state: {0}")]
    Persist(#[from] std::io::Error),

    #[error("Auto-commit service is shut down")]
    ShutDown,

    #[error("Auto-commit is disabled")]
    Disabled,
}

impl CommitError {
    pub fn vcs(op: &'static str, reason: impl Into<String>) -> Self {
        CommitError::Vcs {
            op,
            reason: reason.into(),
        }
    }
}

pub type CommitResult<T> = Result<T, CommitError>;
