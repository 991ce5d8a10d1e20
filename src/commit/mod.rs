//! Auto-commit service: coalesces vault changes into version-control commits.
//!
//! ```text
//! record(event) ──► PendingBatch { changed, deadline = now + window }
//!                        │ quiet for `debounce_secs`, or force_flush
//!                        ▼
//!                   summarize (timeout) ──fails──► fallback_message
//!                        ▼
//!                   stage(paths) + commit(message), retried with backoff
//!                        ▼
//!                   FlushReport; failed paths preserved for next flush
//! ```

mod batch;
mod error;
pub mod message;
mod service;
pub mod summarizer;
mod vcs;
mod workflow;

pub use batch::{PENDING_STATE_FILE, PendingBatch, PendingStore};
pub use error::{CommitError, CommitResult};
pub use service::{AutoCommitService, CommitState, CommitStatus, FlushOutcome, FlushReport};
pub use summarizer::{DisabledSummarizer, HttpSummarizer, Summarizer};
pub use vcs::{GitCli, RevisionId, RevisionSummary, VersionControl};
pub use workflow::{AUTO_COMMIT_WORKFLOW_ID, AutoCommitWorkflow};
