//! The auto-commit service as a workflow consumer.

use async_trait::async_trait;
use std::sync::Arc;

use super::service::AutoCommitService;
use crate::workflow::{
    HandlerResult, Trigger, WorkflowContext, WorkflowDefinition, WorkflowError, WorkflowHandler,
};

pub const AUTO_COMMIT_WORKFLOW_ID: &str = "auto-commit";

/// Records every matched event; a forced run flushes immediately.
pub struct AutoCommitWorkflow {
    service: AutoCommitService,
}

impl AutoCommitWorkflow {
    pub fn new(service: AutoCommitService) -> Self {
        Self { service }
    }

    /// Definition reacting to all event kinds, optionally limited by a glob.
    pub fn definition(
        service: AutoCommitService,
        path_filter: Option<&str>,
    ) -> Result<WorkflowDefinition, WorkflowError> {
        let definition = WorkflowDefinition::new(AUTO_COMMIT_WORKFLOW_ID, Arc::new(Self::new(service)))
            .with_description("Batch vault changes and commit them after a quiet period");
        match path_filter {
            Some(pattern) => definition.with_filter(pattern),
            None => Ok(definition),
        }
    }
}

#[async_trait]
impl WorkflowHandler for AutoCommitWorkflow {
    async fn run(&self, ctx: WorkflowContext) -> HandlerResult {
        match &ctx.trigger {
            Trigger::Event(event) => {
                let pending = self
                    .service
                    .record(event)
                    .map_err(|e| WorkflowError::handler(e.to_string()))?;
                Ok(Some(serde_json::json!({ "pending": pending })))
            }
            Trigger::Manual { .. } => {
                let report = self
                    .service
                    .force_flush()
                    .await
                    .map_err(|e| WorkflowError::handler(e.to_string()))?;
                if let crate::commit::FlushOutcome::Failed { error } = &report.outcome {
                    return Err(WorkflowError::handler(error.clone()));
                }
                serde_json::to_value(&report)
                    .map(Some)
                    .map_err(|e| WorkflowError::handler(e.to_string()))
            }
        }
    }
}
