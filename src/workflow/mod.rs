//! Workflow engine: matches vault events against registered workflows.
//!
//! ```text
//! VaultEvent ──► WorkflowEngine::dispatch
//!                  filter: enabled && trigger kind && path glob
//!                  spawn one task per match ──► handler.run(ctx)
//!                  record WorkflowExecution (history ring + JSONL log)
//! ```

mod definition;
mod engine;
mod error;
mod execution;
mod handler;

pub use definition::{PathFilter, WorkflowDefinition, WorkflowSummary};
pub use engine::WorkflowEngine;
pub use error::WorkflowError;
pub use execution::{ExecutionHistory, ExecutionLog, ExecutionStatus, WorkflowExecution};
pub use handler::{FnHandler, HandlerResult, Trigger, WorkflowContext, WorkflowHandler};
