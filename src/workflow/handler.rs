//! Handler trait and execution context.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use super::error::WorkflowError;
use crate::cache::ShadowCache;
use crate::types::VaultEvent;

/// What started an execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Trigger {
    Event(VaultEvent),
    /// `force_trigger` with caller-supplied input.
    Manual { input: Value },
}

impl Trigger {
    pub fn event(&self) -> Option<&VaultEvent> {
        match self {
            Trigger::Event(event) => Some(event),
            Trigger::Manual { .. } => None,
        }
    }

    pub fn path(&self) -> Option<&str> {
        self.event().map(|e| e.path.as_str())
    }
}

/// Handed to a handler for one invocation.
#[derive(Clone)]
pub struct WorkflowContext {
    pub execution_id: Uuid,
    pub workflow_id: String,
    pub trigger: Trigger,
    /// Read access to the index, already updated for this event.
    pub cache: Arc<ShadowCache>,
}

pub type HandlerResult = Result<Option<Value>, WorkflowError>;

/// A workflow body.
///
/// The engine only observes the returned result; anything the handler does
/// to shared external state is its own concern to serialize.
#[async_trait]
pub trait WorkflowHandler: Send + Sync {
    async fn run(&self, ctx: WorkflowContext) -> HandlerResult;
}

/// Adapts an async closure into a handler.
pub struct FnHandler<F> {
    f: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(WorkflowContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> WorkflowHandler for FnHandler<F>
where
    F: Fn(WorkflowContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn run(&self, ctx: WorkflowContext) -> HandlerResult {
        (self.f)(ctx).await
    }
}
