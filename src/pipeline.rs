//! Ordered event pipeline: cache apply, then workflow dispatch.
//!
//! A single consumer drains one bounded queue, so events are applied in
//! arrival order and dispatch for an event starts only after its cache update
//! has completed.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::{ApplyOutcome, ShadowCache};
use crate::types::VaultEvent;
use crate::workflow::WorkflowEngine;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Event pipeline is closed")]
    Closed,
}

enum Message {
    Event(VaultEvent),
    /// Answered once every earlier message has been processed.
    Barrier(oneshot::Sender<()>),
}

/// Counters reported when the pipeline stops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub events: usize,
    pub indexed: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub executions: usize,
    pub snapshots: usize,
}

/// Producer side of the queue.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Message>,
}

impl EventSender {
    /// Queue an event; waits while the queue is full.
    pub async fn send(&self, event: VaultEvent) -> Result<(), PipelineError> {
        self.tx
            .send(Message::Event(event))
            .await
            .map_err(|_| PipelineError::Closed)
    }

    /// Wait until everything queued before this call has been processed.
    pub async fn barrier(&self) -> Result<(), PipelineError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Message::Barrier(tx))
            .await
            .map_err(|_| PipelineError::Closed)?;
        rx.await.map_err(|_| PipelineError::Closed)
    }
}

pub struct Pipeline {
    sender: EventSender,
    worker: JoinHandle<PipelineStats>,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn spawn(
        cache: Arc<ShadowCache>,
        engine: Arc<WorkflowEngine>,
        capacity: usize,
        persist_interval: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let cancel = CancellationToken::new();
        let worker = tokio::spawn(run(cache, engine, rx, persist_interval, cancel.clone()));
        Self {
            sender: EventSender { tx },
            worker,
            cancel,
        }
    }

    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    /// Stop accepting events, process what is already queued, persist.
    pub async fn shutdown(self) -> PipelineStats {
        self.cancel.cancel();
        drop(self.sender);
        match self.worker.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!("[pipeline] worker failed: {e}");
                PipelineStats::default()
            }
        }
    }
}

async fn run(
    cache: Arc<ShadowCache>,
    engine: Arc<WorkflowEngine>,
    mut rx: mpsc::Receiver<Message>,
    persist_interval: Duration,
    cancel: CancellationToken,
) -> PipelineStats {
    let mut stats = PipelineStats::default();
    let mut ticker = tokio::time::interval(persist_interval.max(Duration::from_secs(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    crate::debug_event!("pipeline", "started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled(), if !rx.is_closed() => {
                // Refuse new sends but drain what is queued
                rx.close();
            }
            message = rx.recv() => match message {
                Some(Message::Event(event)) => process(&cache, &engine, event, &mut stats).await,
                Some(Message::Barrier(done)) => {
                    let _ = done.send(());
                }
                None => break,
            },
            _ = ticker.tick() => persist(&cache, &mut stats).await,
        }
    }

    persist(&cache, &mut stats).await;
    crate::log_event!(
        "pipeline",
        "stopped",
        "{} events, {} indexed, {} removed, {} failed, {} executions",
        stats.events,
        stats.indexed,
        stats.removed,
        stats.failed,
        stats.executions
    );
    stats
}

async fn process(
    cache: &Arc<ShadowCache>,
    engine: &WorkflowEngine,
    event: VaultEvent,
    stats: &mut PipelineStats,
) {
    stats.events += 1;

    let applied = {
        let cache = Arc::clone(cache);
        let event = event.clone();
        tokio::task::spawn_blocking(move || cache.apply(&event)).await
    };

    match applied {
        Ok(Ok(ApplyOutcome::Unchanged)) => {
            // Duplicate notification; nothing changed for handlers to see
            stats.unchanged += 1;
            return;
        }
        Ok(Ok(ApplyOutcome::Indexed)) => stats.indexed += 1,
        Ok(Ok(ApplyOutcome::Removed | ApplyOutcome::RemovedTree(_))) => stats.removed += 1,
        Ok(Ok(ApplyOutcome::NotIndexed | ApplyOutcome::Skipped)) => stats.skipped += 1,
        Ok(Err(e)) => {
            stats.failed += 1;
            tracing::warn!("[pipeline] {event}: {e}; row left stale until the next event");
        }
        Err(e) => {
            stats.failed += 1;
            tracing::error!("[pipeline] cache task failed for {event}: {e}");
        }
    }

    let executions = engine.dispatch(&event).await;
    stats.executions += executions.len();
}

async fn persist(cache: &Arc<ShadowCache>, stats: &mut PipelineStats) {
    if !cache.is_dirty() {
        return;
    }
    let cache = Arc::clone(cache);
    match tokio::task::spawn_blocking(move || cache.persist()).await {
        Ok(Ok(true)) => stats.snapshots += 1,
        Ok(Ok(false)) => {}
        Ok(Err(e)) => tracing::warn!("[pipeline] failed to persist cache: {e}"),
        Err(e) => tracing::error!("[pipeline] persist task failed: {e}"),
    }
}
