pub mod cache;
pub mod cli;
pub mod commit;
pub mod config;
pub mod logging;
pub mod mcp;
pub mod pipeline;
pub mod types;
pub mod vault;
pub mod watcher;
pub mod workflow;

pub use cache::{CacheStats, DocumentQuery, IndexedDocument, ShadowCache};
pub use commit::{AutoCommitService, CommitError, FlushReport, VersionControl};
pub use config::Settings;
pub use pipeline::{EventSender, Pipeline, PipelineStats};
pub use types::{EventKind, VaultEvent};
pub use vault::{RunningCore, VaultCore};
pub use workflow::{WorkflowDefinition, WorkflowEngine, WorkflowError, WorkflowHandler};
