//! `VaultCore`: composes the cache, workflow engine, and auto-commit service.
//!
//! The facade owns every long-lived component and exposes the operations the
//! tool layer and CLI call. Nothing here is global; each component receives
//! its collaborators at construction.

use anyhow::Context;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cache::{CacheStats, DocumentQuery, IndexedDocument, ReindexStats, ShadowCache};
use crate::commit::{
    AutoCommitService, AutoCommitWorkflow, CommitError, CommitStatus, FlushReport, GitCli,
    summarizer,
};
use crate::config::Settings;
use crate::pipeline::{EventSender, Pipeline, PipelineStats};
use crate::watcher::VaultWatcher;
use crate::workflow::{WorkflowEngine, WorkflowError, WorkflowExecution, WorkflowSummary};

pub struct VaultCore {
    settings: Settings,
    cache: Arc<ShadowCache>,
    engine: Arc<WorkflowEngine>,
    commits: Option<AutoCommitService>,
    startup: ReindexStats,
}

impl VaultCore {
    /// Open the vault described by `settings`.
    ///
    /// Loads (or rebuilds) the cache, creates the engine, and registers the
    /// auto-commit workflow when enabled and the vault is a git repository.
    pub fn open(settings: Settings) -> anyhow::Result<Self> {
        let (cache, startup) =
            ShadowCache::open(&settings).context("failed to open shadow cache")?;
        let cache = Arc::new(cache);
        let engine = Arc::new(
            WorkflowEngine::from_settings(Arc::clone(&cache), &settings)
                .context("failed to create workflow engine")?,
        );

        let root = settings.vault_root();
        let commits = if !settings.auto_commit.enabled {
            None
        } else if !root.join(".git").exists() {
            tracing::warn!(
                "[vault] {} is not a git repository; auto-commit disabled",
                root.display()
            );
            None
        } else {
            let vcs = Arc::new(GitCli::new(&root, &settings.auto_commit));
            let summarizer = summarizer::from_config(&settings.summarizer);
            Some(
                AutoCommitService::new(&settings.auto_commit, vcs, summarizer)
                    .with_state_dir(settings.resolved_index_path()),
            )
        };

        let core = Self::from_parts(settings, cache, engine, commits)?;
        Ok(Self { startup, ..core })
    }

    /// Assemble from pre-built components; registers auto-commit if given.
    pub fn from_parts(
        settings: Settings,
        cache: Arc<ShadowCache>,
        engine: Arc<WorkflowEngine>,
        commits: Option<AutoCommitService>,
    ) -> anyhow::Result<Self> {
        if let Some(service) = &commits {
            let definition = AutoCommitWorkflow::definition(
                service.clone(),
                settings.auto_commit.path_filter.as_deref(),
            )?;
            engine.register(definition)?;
        }
        Ok(Self {
            settings,
            cache,
            engine,
            commits,
            startup: ReindexStats::default(),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<ShadowCache> {
        &self.cache
    }

    pub fn engine(&self) -> &Arc<WorkflowEngine> {
        &self.engine
    }

    pub fn commits(&self) -> Option<&AutoCommitService> {
        self.commits.as_ref()
    }

    /// Reindex counts from `open`.
    pub fn startup_stats(&self) -> &ReindexStats {
        &self.startup
    }

    pub fn query(&self, query: &DocumentQuery) -> Vec<IndexedDocument> {
        self.cache.query(query)
    }

    pub fn get(&self, path: &str) -> Option<IndexedDocument> {
        self.cache.get(path)
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn list_workflows(&self) -> Vec<WorkflowSummary> {
        self.engine.list_workflows()
    }

    pub fn get_execution(&self, id: &Uuid) -> Option<WorkflowExecution> {
        self.engine.get_execution(id)
    }

    pub async fn force_trigger(&self, workflow_id: &str, input: Value) -> Result<Uuid, WorkflowError> {
        self.engine.force_trigger(workflow_id, input).await
    }

    pub async fn force_flush_commit(&self) -> Result<FlushReport, CommitError> {
        match &self.commits {
            Some(service) => service.force_flush().await,
            None => Err(CommitError::Disabled),
        }
    }

    pub fn commit_status(&self) -> Option<CommitStatus> {
        self.commits.as_ref().map(AutoCommitService::status)
    }

    /// Start the pipeline, the commit driver, and optionally the watcher.
    pub fn start(&self, watch: bool) -> anyhow::Result<RunningCore> {
        if let Some(service) = &self.commits {
            service.start().context("failed to start auto-commit service")?;
        }

        let pipeline = Pipeline::spawn(
            Arc::clone(&self.cache),
            Arc::clone(&self.engine),
            self.settings.watcher.queue_capacity,
            Duration::from_secs(self.settings.cache.persist_interval_secs),
        );

        let cancel = CancellationToken::new();
        let watcher = if watch && self.settings.watcher.enabled {
            let watcher = VaultWatcher::new(
                self.cache.walker().clone(),
                self.settings.watcher.debounce_ms,
                pipeline.sender(),
            )
            .context("failed to start file watcher")?;
            let token = cancel.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = watcher.watch(token).await {
                    tracing::error!("[watcher] stopped with error: {e}");
                }
            }))
        } else {
            None
        };

        crate::log_event!(
            "vault",
            "started",
            "{} documents, watcher {}, auto-commit {}",
            self.cache.len(),
            if watcher.is_some() { "on" } else { "off" },
            if self.commits.is_some() { "on" } else { "off" }
        );

        Ok(RunningCore {
            pipeline,
            watcher,
            cancel,
        })
    }
}

/// Background tasks started by `VaultCore::start`.
pub struct RunningCore {
    pipeline: Pipeline,
    watcher: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl RunningCore {
    pub fn sender(&self) -> EventSender {
        self.pipeline.sender()
    }

    /// Stop in dependency order: watcher, pipeline (drains and persists),
    /// then the commit service (finishes or saves its batch).
    pub async fn shutdown(self, core: &VaultCore) -> PipelineStats {
        self.cancel.cancel();
        if let Some(handle) = self.watcher {
            let _ = handle.await;
        }

        let stats = self.pipeline.shutdown().await;

        if let Some(service) = &core.commits {
            if let Err(e) = service.shutdown().await {
                tracing::error!("[vault] auto-commit shutdown failed: {e}");
            }
        }
        stats
    }
}
