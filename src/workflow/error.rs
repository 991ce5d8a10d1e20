//! Error types for the workflow engine.

use thiserror::Error;

/// Errors from workflow registration, dispatch, and handlers.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Workflow '{0}' is already registered")]
    DuplicateWorkflow(String),

    #[error("Unknown workflow: '{0}'")]
    UnknownWorkflow(String),

    #[error("Invalid path filter '{pattern}': {reason}")]
    InvalidFilter { pattern: String, reason: String },

    /// Failure reported by a handler; recorded on the execution.
    #[error("{0}")]
    Handler(String),

    #[error("Handler panicked: {0}")]
    Panicked(String),

    #[error("Failed to write execution log: {0}")]
    Log(#[from] std::io::Error),
}

impl WorkflowError {
    pub fn handler(message: impl Into<String>) -> Self {
        WorkflowError::Handler(message.into())
    }
}

impl From<anyhow::Error> for WorkflowError {
    fn from(e: anyhow::Error) -> Self {
        WorkflowError::Handler(format!("{e:#}"))
    }
}
