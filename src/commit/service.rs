//! Debounced auto-commit service.
//!
//! State machine per batch: `Idle -> Accumulating -> Flushing -> Idle`.
//!
//! The debounce deadline lives in one field behind one mutex. `record` moves
//! it forward; the driver task sleeps until it and then takes the batch only
//! if the deadline is still in the past under that same lock. A reset that
//! races the timer either lands first (the batch is not due, the driver
//! sleeps again) or lands after the take (it opens a fresh batch). Either
//! way there is exactly one flush.
//!
//! `flush_lock` serializes flushes. Producers never wait on it: a new batch
//! opens while the previous one is still being committed.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tokio_util::sync::CancellationToken;

use super::batch::{PendingBatch, PendingStore};
use super::error::{CommitError, CommitResult};
use super::message::{fallback_message, normalize_summary};
use super::summarizer::Summarizer;
use super::vcs::{RevisionId, VersionControl};
use crate::config::AutoCommitConfig;
use crate::types::{EventKind, VaultEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    Idle,
    Accumulating,
    Flushing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushOutcome {
    Committed,
    /// Staged paths carried no change.
    NothingToCommit,
    /// No paths were pending.
    Empty,
    /// Retries exhausted; paths preserved for the next flush.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<RevisionId>,
    pub message: String,
    pub paths: Vec<String>,
    pub used_fallback: bool,
    /// Stage+commit attempts made.
    pub attempts: u32,
    pub outcome: FlushOutcome,
    pub finished_at: DateTime<Utc>,
}

impl FlushReport {
    fn empty() -> Self {
        Self {
            revision: None,
            message: String::new(),
            paths: Vec::new(),
            used_fallback: false,
            attempts: 0,
            outcome: FlushOutcome::Empty,
            finished_at: Utc::now(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, FlushOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitStatus {
    pub state: CommitState,
    pub pending_paths: Vec<String>,
    /// Time left until the pending batch flushes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flush_in_ms: Option<u64>,
    /// When the first path of the pending batch was recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_since: Option<DateTime<Utc>>,
    pub preserved_paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_flush: Option<FlushReport>,
}

#[derive(Debug, Clone)]
struct Timing {
    debounce: Duration,
    summarize_timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
}

#[derive(Debug, Default)]
struct State {
    pending: Option<PendingBatch>,
    /// Paths from terminally failed flushes.
    preserved: BTreeMap<String, EventKind>,
    flushing: bool,
    shut_down: bool,
    last_report: Option<FlushReport>,
}

struct Inner {
    timing: Timing,
    vcs: Arc<dyn VersionControl>,
    summarizer: Arc<dyn Summarizer>,
    store: Option<PendingStore>,
    state: Mutex<State>,
    flush_lock: tokio::sync::Mutex<()>,
    wake: Notify,
    cancel: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

/// Cheap to clone; clones share one service.
#[derive(Clone)]
pub struct AutoCommitService {
    inner: Arc<Inner>,
}

impl AutoCommitService {
    pub fn new(
        config: &AutoCommitConfig,
        vcs: Arc<dyn VersionControl>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                timing: Timing {
                    debounce: config.debounce_window(),
                    summarize_timeout: config.summarize_timeout(),
                    max_retries: config.max_retries,
                    retry_backoff: config.retry_backoff(),
                },
                vcs,
                summarizer,
                store: None,
                state: Mutex::new(State::default()),
                flush_lock: tokio::sync::Mutex::new(()),
                wake: Notify::new(),
                cancel: CancellationToken::new(),
                driver: Mutex::new(None),
            }),
        }
    }

    /// Persist unflushed paths to `pending_commit.json` under `index_dir`.
    ///
    /// Must be called before the service is cloned or started.
    pub fn with_state_dir(mut self, index_dir: impl AsRef<std::path::Path>) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.store = Some(PendingStore::new(index_dir));
        } else {
            tracing::warn!("[commit] state dir set on a shared service; ignored");
        }
        self
    }

    /// Reload paths saved at the last shutdown and start the debounce driver.
    pub fn start(&self) -> CommitResult<()> {
        if let Some(store) = &self.inner.store {
            let restored = store.take()?;
            if !restored.is_empty() {
                crate::log_event!(
                    "commit",
                    "restored pending paths",
                    "{} from {}",
                    restored.len(),
                    store.path().display()
                );
                let mut state = self.inner.state.lock();
                let deadline = Instant::now() + self.inner.timing.debounce;
                let batch = state.pending.get_or_insert_with(|| PendingBatch::new(deadline));
                for (path, kind) in restored {
                    batch.changed.entry(path).or_insert(kind);
                }
                batch.deadline = deadline;
            }
        }

        let mut driver = self.inner.driver.lock();
        if driver.is_none() {
            let inner = Arc::clone(&self.inner);
            *driver = Some(tokio::spawn(run_driver(inner)));
            crate::debug_event!("commit", "driver started");
        }
        Ok(())
    }

    /// Add a changed path to the pending batch and push the deadline out.
    pub fn record(&self, event: &VaultEvent) -> CommitResult<usize> {
        let pending = {
            let mut state = self.inner.state.lock();
            if state.shut_down {
                return Err(CommitError::ShutDown);
            }
            let deadline = Instant::now() + self.inner.timing.debounce;
            let batch = state.pending.get_or_insert_with(|| {
                crate::debug_event!("commit", "batch opened");
                PendingBatch::new(deadline)
            });
            batch.changed.insert(event.path.clone(), event.kind);
            batch.deadline = deadline;
            batch.changed.len()
        };
        self.inner.wake.notify_one();
        crate::debug_event!("commit", "recorded", "{event} ({pending} pending)");
        Ok(pending)
    }

    /// Flush now, bypassing the debounce window.
    ///
    /// Waits for an in-flight flush to finish first.
    pub async fn force_flush(&self) -> CommitResult<FlushReport> {
        if self.inner.state.lock().shut_down {
            return Err(CommitError::ShutDown);
        }
        let _flush = self.inner.flush_lock.lock().await;
        let changes = self.inner.take_all();
        let report = self.inner.flush(changes, "manual").await;
        self.inner.wake.notify_one();
        Ok(report)
    }

    pub fn status(&self) -> CommitStatus {
        let state = self.inner.state.lock();
        let now = Instant::now();
        let phase = if state.flushing {
            CommitState::Flushing
        } else if state.pending.is_some() {
            CommitState::Accumulating
        } else {
            CommitState::Idle
        };
        CommitStatus {
            state: phase,
            pending_paths: state
                .pending
                .as_ref()
                .map(|b| b.changed.keys().cloned().collect())
                .unwrap_or_default(),
            flush_in_ms: state
                .pending
                .as_ref()
                .map(|b| b.deadline.saturating_duration_since(now).as_millis() as u64),
            pending_since: state.pending.as_ref().map(|b| b.opened_at),
            preserved_paths: state.preserved.keys().cloned().collect(),
            last_flush: state.last_report.clone(),
        }
    }

    pub async fn log(&self, limit: usize) -> CommitResult<Vec<super::vcs::RevisionSummary>> {
        self.inner.vcs.log(limit).await
    }

    /// Stop the driver, let an in-flight flush finish, then persist whatever
    /// is still pending or preserved.
    pub async fn shutdown(&self) -> CommitResult<()> {
        {
            let mut state = self.inner.state.lock();
            if state.shut_down {
                return Ok(());
            }
            state.shut_down = true;
        }
        self.inner.cancel.cancel();

        let driver = self.inner.driver.lock().take();
        if let Some(handle) = driver {
            if let Err(e) = handle.await {
                tracing::warn!("[commit] driver task ended abnormally: {e}");
            }
        }

        let _flush = self.inner.flush_lock.lock().await;
        let leftover = self.inner.take_all();
        self.inner.state.lock().flushing = false;
        if leftover.is_empty() {
            return Ok(());
        }

        match &self.inner.store {
            Some(store) => {
                store.save(&leftover)?;
                tracing::warn!(
                    "[commit] {} uncommitted paths saved to {} for the next start",
                    leftover.len(),
                    store.path().display()
                );
            }
            None => tracing::warn!(
                "[commit] discarding {} uncommitted paths at shutdown: {}",
                leftover.len(),
                leftover.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
        }
        Ok(())
    }
}

async fn run_driver(inner: Arc<Inner>) {
    loop {
        let deadline = inner.state.lock().pending.as_ref().map(|b| b.deadline);
        match deadline {
            None => {
                tokio::select! {
                    _ = inner.cancel.cancelled() => break,
                    _ = inner.wake.notified() => {}
                }
            }
            Some(deadline) => {
                tokio::select! {
                    _ = inner.cancel.cancelled() => break,
                    _ = inner.wake.notified() => {}
                    _ = sleep_until(deadline) => {
                        let _flush = inner.flush_lock.lock().await;
                        if let Some(changes) = inner.take_due() {
                            inner.flush(changes, "debounce").await;
                        }
                    }
                }
            }
        }
    }
    crate::debug_event!("commit", "driver stopped");
}

impl Inner {
    /// Take the pending batch if its deadline has passed, merged with
    /// preserved paths.
    fn take_due(&self) -> Option<BTreeMap<String, EventKind>> {
        let mut state = self.state.lock();
        if !state.pending.as_ref()?.is_due(Instant::now()) {
            return None;
        }
        let batch = state.pending.take()?;
        let mut changes = std::mem::take(&mut state.preserved);
        changes.extend(batch.changed);
        state.flushing = true;
        Some(changes)
    }

    fn take_all(&self) -> BTreeMap<String, EventKind> {
        let mut state = self.state.lock();
        let mut changes = std::mem::take(&mut state.preserved);
        if let Some(batch) = state.pending.take() {
            changes.extend(batch.changed);
        }
        state.flushing = !changes.is_empty();
        changes
    }

    /// Commit one snapshot. Callers hold `flush_lock`.
    async fn flush(&self, changes: BTreeMap<String, EventKind>, reason: &str) -> FlushReport {
        if changes.is_empty() {
            let report = FlushReport::empty();
            self.finish(report.clone());
            return report;
        }

        let paths: Vec<String> = changes.keys().cloned().collect();
        crate::log_event!("commit", "flushing", "{} paths ({reason})", paths.len());

        let (message, used_fallback) = self.resolve_message(&changes, &paths).await;

        let mut attempts = 0;
        let outcome = loop {
            attempts += 1;
            match self.stage_and_commit(&paths, &message).await {
                Ok(revision) => break Ok(Some(revision)),
                Err(CommitError::NothingToCommit) => break Ok(None),
                Err(e) if attempts <= self.timing.max_retries => {
                    let backoff = self.timing.retry_backoff * 2u32.saturating_pow(attempts - 1);
                    tracing::warn!(
                        "[commit] attempt {attempts} failed: {e}; retrying in {}ms",
                        backoff.as_millis()
                    );
                    sleep(backoff).await;
                }
                Err(e) => break Err(e),
            }
        };

        let report = match outcome {
            Ok(Some(revision)) => {
                crate::log_event!("commit", "committed", "{revision} \"{message}\"");
                FlushReport {
                    revision: Some(revision),
                    message,
                    paths,
                    used_fallback,
                    attempts,
                    outcome: FlushOutcome::Committed,
                    finished_at: Utc::now(),
                }
            }
            Ok(None) => {
                crate::log_event!("commit", "nothing to commit", "{} paths", paths.len());
                FlushReport {
                    revision: None,
                    message,
                    paths,
                    used_fallback,
                    attempts,
                    outcome: FlushOutcome::NothingToCommit,
                    finished_at: Utc::now(),
                }
            }
            Err(e) => {
                tracing::error!(
                    "[commit] giving up after {attempts} attempts: {e}; {} paths preserved",
                    paths.len()
                );
                self.preserve(changes);
                FlushReport {
                    revision: None,
                    message,
                    paths,
                    used_fallback,
                    attempts,
                    outcome: FlushOutcome::Failed {
                        error: e.to_string(),
                    },
                    finished_at: Utc::now(),
                }
            }
        };

        self.finish(report.clone());
        report
    }

    async fn resolve_message(
        &self,
        changes: &BTreeMap<String, EventKind>,
        paths: &[String],
    ) -> (String, bool) {
        let result = match timeout(self.timing.summarize_timeout, self.summarizer.summarize(paths)).await {
            Ok(Ok(raw)) => normalize_summary(&raw)
                .ok_or_else(|| CommitError::Summarize("empty summary".to_string())),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CommitError::SummarizeTimeout(
                self.timing.summarize_timeout.as_secs(),
            )),
        };

        match result {
            Ok(summary) => (summary, false),
            Err(e) => {
                let message = fallback_message(changes);
                tracing::warn!("[commit] {e}; using fallback message \"{message}\"");
                (message, true)
            }
        }
    }

    async fn stage_and_commit(&self, paths: &[String], message: &str) -> CommitResult<RevisionId> {
        self.vcs.stage(paths).await?;
        self.vcs.commit(message, paths).await
    }

    /// Keep failed paths for the next flush without clobbering newer kinds.
    fn preserve(&self, changes: BTreeMap<String, EventKind>) {
        let mut state = self.state.lock();
        for (path, kind) in changes {
            state.preserved.entry(path).or_insert(kind);
        }
    }

    fn finish(&self, report: FlushReport) {
        let mut state = self.state.lock();
        state.flushing = false;
        if report.outcome != FlushOutcome::Empty {
            state.last_report = Some(report);
        }
    }
}
