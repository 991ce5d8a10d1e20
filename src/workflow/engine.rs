//! Workflow registry and dispatcher.
//!
//! Every matched handler runs in its own tokio task. A nested task boundary
//! turns a handler panic into a failed execution, so one broken workflow never
//! takes down its siblings or the dispatcher.

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::definition::{WorkflowDefinition, WorkflowSummary};
use super::error::WorkflowError;
use super::execution::{ExecutionHistory, ExecutionLog, WorkflowExecution};
use super::handler::{HandlerResult, Trigger, WorkflowContext, WorkflowHandler};
use crate::cache::ShadowCache;
use crate::config::Settings;
use crate::types::VaultEvent;

/// Shared sink for execution records.
#[derive(Clone)]
struct Recorder {
    history: Arc<Mutex<ExecutionHistory>>,
    log: Option<Arc<Mutex<ExecutionLog>>>,
}

impl Recorder {
    fn record(&self, execution: &WorkflowExecution) {
        self.history.lock().upsert(execution.clone());

        if !execution.status.is_finished() {
            return;
        }
        if let Some(log) = &self.log {
            if let Err(e) = log.lock().append(execution) {
                tracing::warn!("[workflow] {e}");
            }
        }
    }
}

pub struct WorkflowEngine {
    workflows: RwLock<IndexMap<String, WorkflowDefinition>>,
    recorder: Recorder,
    cache: Arc<ShadowCache>,
}

impl WorkflowEngine {
    pub fn new(cache: Arc<ShadowCache>, history_capacity: usize) -> Self {
        Self {
            workflows: RwLock::new(IndexMap::new()),
            recorder: Recorder {
                history: Arc::new(Mutex::new(ExecutionHistory::new(history_capacity))),
                log: None,
            },
            cache,
        }
    }

    /// Engine configured from `[workflows]`, with the JSONL log if one is set.
    pub fn from_settings(cache: Arc<ShadowCache>, settings: &Settings) -> Result<Self, WorkflowError> {
        let engine = Self::new(cache, settings.workflows.history_capacity);
        match settings.resolved_execution_log() {
            Some(path) => engine.with_execution_log(path),
            None => Ok(engine),
        }
    }

    pub fn with_execution_log(mut self, path: impl Into<PathBuf>) -> Result<Self, WorkflowError> {
        let log = ExecutionLog::open(path)?;
        crate::debug_event!("workflow", "execution log", "{}", log.path().display());
        self.recorder.log = Some(Arc::new(Mutex::new(log)));
        Ok(self)
    }

    pub fn cache(&self) -> &Arc<ShadowCache> {
        &self.cache
    }

    pub fn register(&self, definition: WorkflowDefinition) -> Result<(), WorkflowError> {
        let mut workflows = self.workflows.write();
        if workflows.contains_key(definition.id()) {
            return Err(WorkflowError::DuplicateWorkflow(definition.id().to_string()));
        }
        crate::log_event!(
            "workflow",
            "registered",
            "{} (triggers: {:?}, filter: {})",
            definition.id(),
            definition.triggers(),
            definition.path_filter().map_or("*", |f| f.as_str())
        );
        workflows.insert(definition.id().to_string(), definition);
        Ok(())
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), WorkflowError> {
        let mut workflows = self.workflows.write();
        let definition = workflows
            .get_mut(id)
            .ok_or_else(|| WorkflowError::UnknownWorkflow(id.to_string()))?;
        definition.enabled = enabled;
        Ok(())
    }

    /// Registered workflows in registration order.
    pub fn list_workflows(&self) -> Vec<WorkflowSummary> {
        self.workflows
            .read()
            .values()
            .map(WorkflowDefinition::summary)
            .collect()
    }

    pub fn get_execution(&self, id: &Uuid) -> Option<WorkflowExecution> {
        self.recorder.history.lock().get(id).cloned()
    }

    /// Newest first.
    pub fn recent_executions(&self, limit: usize) -> Vec<WorkflowExecution> {
        self.recorder.history.lock().recent(limit)
    }

    /// Run every enabled workflow matching `event` and wait for all of them.
    ///
    /// Handlers run concurrently with no ordering between them. Returned
    /// records are in registration order and all finished.
    pub async fn dispatch(&self, event: &VaultEvent) -> Vec<WorkflowExecution> {
        let matched: Vec<(String, Arc<dyn WorkflowHandler>)> = self
            .workflows
            .read()
            .values()
            .filter(|def| def.matches(event))
            .map(|def| (def.id().to_string(), def.handler()))
            .collect();

        if matched.is_empty() {
            crate::debug_event!("workflow", "no match", "{event}");
            return Vec::new();
        }

        let running: Vec<(WorkflowExecution, JoinHandle<WorkflowExecution>)> = matched
            .into_iter()
            .map(|(id, handler)| {
                let execution = WorkflowExecution::start(&id, Some(event.path.clone()));
                let handle = self.spawn_execution(
                    handler,
                    execution.clone(),
                    Trigger::Event(event.clone()),
                );
                (execution, handle)
            })
            .collect();

        let mut finished = Vec::with_capacity(running.len());
        for (mut execution, handle) in running {
            match handle.await {
                Ok(done) => finished.push(done),
                Err(e) => {
                    // Outer task cancelled by runtime shutdown
                    execution.fail(format!("execution aborted: {e}"));
                    self.recorder.record(&execution);
                    finished.push(execution);
                }
            }
        }
        finished
    }

    /// Start a named workflow directly, bypassing event matching.
    ///
    /// Returns immediately with an id to poll through `get_execution`.
    /// Disabled workflows can still be forced.
    pub async fn force_trigger(&self, id: &str, input: Value) -> Result<Uuid, WorkflowError> {
        let (execution, _handle) = self.start_manual(id, input)?;
        Ok(execution.execution_id)
    }

    /// Like `force_trigger` but waits for the execution to finish.
    pub async fn run_workflow(&self, id: &str, input: Value) -> Result<WorkflowExecution, WorkflowError> {
        let (mut execution, handle) = self.start_manual(id, input)?;
        match handle.await {
            Ok(done) => Ok(done),
            Err(e) => {
                execution.fail(format!("execution aborted: {e}"));
                self.recorder.record(&execution);
                Ok(execution)
            }
        }
    }

    fn start_manual(
        &self,
        id: &str,
        input: Value,
    ) -> Result<(WorkflowExecution, JoinHandle<WorkflowExecution>), WorkflowError> {
        let handler = self
            .workflows
            .read()
            .get(id)
            .map(WorkflowDefinition::handler)
            .ok_or_else(|| WorkflowError::UnknownWorkflow(id.to_string()))?;

        let path = input
            .get("path")
            .and_then(Value::as_str)
            .map(crate::types::normalize_rel_path);
        let execution = WorkflowExecution::start(id, path);
        crate::log_event!("workflow", "forced", "{id} ({})", execution.execution_id);

        let handle = self.spawn_execution(handler, execution.clone(), Trigger::Manual { input });
        Ok((execution, handle))
    }

    fn spawn_execution(
        &self,
        handler: Arc<dyn WorkflowHandler>,
        execution: WorkflowExecution,
        trigger: Trigger,
    ) -> JoinHandle<WorkflowExecution> {
        self.recorder.record(&execution);

        let ctx = WorkflowContext {
            execution_id: execution.execution_id,
            workflow_id: execution.workflow_id.clone(),
            trigger,
            cache: Arc::clone(&self.cache),
        };
        let recorder = self.recorder.clone();

        tokio::spawn(async move {
            let inner = tokio::spawn(async move { handler.run(ctx).await });
            finish(execution, inner.await, &recorder)
        })
    }
}

fn finish(
    mut execution: WorkflowExecution,
    result: Result<HandlerResult, tokio::task::JoinError>,
    recorder: &Recorder,
) -> WorkflowExecution {
    match result {
        Ok(Ok(output)) => execution.succeed(output),
        Ok(Err(e)) => execution.fail(e),
        Err(join_err) if join_err.is_panic() => {
            execution.fail(WorkflowError::Panicked(panic_message(join_err.into_panic())))
        }
        Err(join_err) => execution.fail(format!("execution aborted: {join_err}")),
    }

    match &execution.error {
        None => crate::log_event!(
            "workflow",
            "succeeded",
            "{} {} in {}ms",
            execution.workflow_id,
            execution.triggering_path.as_deref().unwrap_or("-"),
            execution.duration_ms().unwrap_or_default()
        ),
        Some(error) => tracing::warn!(
            "[workflow] {} failed for {}: {error}",
            execution.workflow_id,
            execution.triggering_path.as_deref().unwrap_or("-")
        ),
    }

    recorder.record(&execution);
    execution
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::types::EventKind;
    use crate::workflow::execution::ExecutionStatus;
    use crate::workflow::handler::FnHandler;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn engine(root: &std::path::Path) -> WorkflowEngine {
        let cache = Arc::new(ShadowCache::in_memory(root, &CacheConfig::default()));
        WorkflowEngine::new(cache, 16)
    }

    fn explode() -> HandlerResult {
        panic!("handler exploded")
    }

    fn counting(counter: &Arc<AtomicUsize>) -> Arc<dyn WorkflowHandler> {
        let counter = Arc::clone(counter);
        Arc::new(FnHandler::new(move |_ctx| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        }))
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(temp_dir.path());
        let counter = Arc::new(AtomicUsize::new(0));

        engine
            .register(WorkflowDefinition::new("w", counting(&counter)))
            .unwrap();
        let err = engine
            .register(WorkflowDefinition::new("w", counting(&counter)))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::DuplicateWorkflow(id) if id == "w"));
    }

    #[tokio::test]
    async fn test_dispatch_only_runs_matching() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(temp_dir.path());
        let created = Arc::new(AtomicUsize::new(0));
        let notes = Arc::new(AtomicUsize::new(0));

        engine
            .register(WorkflowDefinition::new("on-create", counting(&created)).on([EventKind::Created]))
            .unwrap();
        engine
            .register(
                WorkflowDefinition::new("notes", counting(&notes))
                    .with_filter("notes/**")
                    .unwrap(),
            )
            .unwrap();

        let runs = engine.dispatch(&VaultEvent::modified("notes/a.md")).await;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].workflow_id, "notes");
        assert_eq!(runs[0].triggering_path.as_deref(), Some("notes/a.md"));

        let runs = engine.dispatch(&VaultEvent::created("other.md")).await;
        assert_eq!(runs.len(), 1);
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(notes.load(Ordering::SeqCst), 1);

        engine.set_enabled("notes", false).unwrap();
        assert!(engine.dispatch(&VaultEvent::modified("notes/a.md")).await.is_empty());
        assert!(engine.set_enabled("missing", true).is_err());
    }

    #[tokio::test]
    async fn test_panicking_handler_is_recorded_as_failed() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(temp_dir.path());
        let counter = Arc::new(AtomicUsize::new(0));

        engine
            .register(WorkflowDefinition::new(
                "panics",
                Arc::new(FnHandler::new(|_ctx| async { explode() })),
            ))
            .unwrap();
        engine
            .register(WorkflowDefinition::new("ok", counting(&counter)))
            .unwrap();

        let runs = engine.dispatch(&VaultEvent::modified("a.md")).await;
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].status, ExecutionStatus::Failed);
        assert!(runs[0].error.as_deref().unwrap().contains("handler exploded"));
        assert_eq!(runs[1].status, ExecutionStatus::Succeeded);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let stored = engine.get_execution(&runs[0].execution_id).unwrap();
        assert_eq!(stored.status, ExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn test_force_trigger_bypasses_matching() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(temp_dir.path());

        engine
            .register(
                WorkflowDefinition::new(
                    "echo",
                    Arc::new(FnHandler::new(|ctx: WorkflowContext| async move {
                        match ctx.trigger {
                            Trigger::Manual { input } => Ok(Some(input)),
                            Trigger::Event(_) => Err(WorkflowError::handler("expected manual")),
                        }
                    })),
                )
                .on([EventKind::Removed])
                .with_filter("never/**")
                .unwrap(),
            )
            .unwrap();

        let done = engine
            .run_workflow("echo", serde_json::json!({ "path": "x.md", "n": 1 }))
            .await
            .unwrap();
        assert_eq!(done.status, ExecutionStatus::Succeeded);
        assert_eq!(done.triggering_path.as_deref(), Some("x.md"));
        assert_eq!(done.output.unwrap()["n"], 1);

        let id = engine
            .force_trigger("echo", serde_json::json!({}))
            .await
            .unwrap();
        assert!(engine.get_execution(&id).is_some());

        assert!(matches!(
            engine.force_trigger("nope", Value::Null).await,
            Err(WorkflowError::UnknownWorkflow(_))
        ));
    }

    #[tokio::test]
    async fn test_execution_log_written() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("executions.jsonl");
        let counter = Arc::new(AtomicUsize::new(0));
        let engine = engine(temp_dir.path()).with_execution_log(&log_path).unwrap();
        engine
            .register(WorkflowDefinition::new("w", counting(&counter)))
            .unwrap();

        engine.dispatch(&VaultEvent::created("a.md")).await;
        engine.dispatch(&VaultEvent::created("b.md")).await;

        let tail = ExecutionLog::read_tail(&log_path, 10).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].triggering_path.as_deref(), Some("b.md"));
        assert_eq!(engine.recent_executions(1)[0].triggering_path.as_deref(), Some("b.md"));
    }
}
