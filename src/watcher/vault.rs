//! File system event source for the vault.

use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind as NotifyKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;

use super::debouncer::Debouncer;
use super::error::WatchError;
use crate::cache::VaultWalker;
use crate::pipeline::EventSender;
use crate::types::{EventKind, VaultEvent, relative_to_root};

/// Turns notify events under the vault root into ordered `VaultEvent`s.
///
/// Creations and modifications are debounced per path; removals are sent
/// immediately. A debounced path that no longer exists is reported as
/// removed, which covers rename-as-modify on some platforms. A new directory
/// is scanned once it settles.
pub struct VaultWatcher {
    walker: VaultWalker,
    /// Canonical form of the root, as notify reports it.
    canonical_root: PathBuf,
    debouncer: Debouncer,
    event_rx: mpsc::Receiver<notify::Result<Event>>,
    _watcher: notify::RecommendedWatcher,
    sink: EventSender,
}

impl VaultWatcher {
    pub fn new(walker: VaultWalker, debounce_ms: u64, sink: EventSender) -> Result<Self, WatchError> {
        let (tx, rx) = mpsc::channel(256);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.blocking_send(res);
        })?;

        let root = walker.root().to_path_buf();
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| WatchError::PathWatchFailed {
                path: root.clone(),
                reason: e.to_string(),
            })?;

        let canonical_root = root.canonicalize().unwrap_or_else(|_| root.clone());

        Ok(Self {
            walker,
            canonical_root,
            debouncer: Debouncer::new(debounce_ms),
            event_rx: rx,
            _watcher: watcher,
            sink,
        })
    }

    /// Run until cancelled or the pipeline closes.
    pub async fn watch(mut self, cancel: CancellationToken) -> Result<(), WatchError> {
        crate::log_event!("watcher", "started", "{}", self.walker.root().display());

        loop {
            // Periodic check for debounced events
            let timeout = sleep(Duration::from_millis(100));
            tokio::pin!(timeout);

            tokio::select! {
                _ = cancel.cancelled() => break,

                res = self.event_rx.recv() => match res {
                    Some(Ok(event)) => self.handle_event(event).await?,
                    Some(Err(e)) => tracing::error!("[watcher] file watch error: {e}"),
                    None => return Err(WatchError::ChannelClosed),
                },

                _ = &mut timeout => {
                    for (path, kind) in self.debouncer.take_ready() {
                        self.process_settled(&path, kind).await?;
                    }
                }
            }
        }

        // Forward unsettled changes too so nothing is lost on stop
        for (path, kind) in self.debouncer.drain_all() {
            self.process_settled(&path, kind).await?;
        }

        crate::log_event!("watcher", "stopped");
        Ok(())
    }

    async fn handle_event(&mut self, event: Event) -> Result<(), WatchError> {
        match event.kind {
            NotifyKind::Create(_) => {
                for path in event.paths {
                    self.debouncer.record(path, EventKind::Created);
                }
            }
            NotifyKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                for path in &event.paths {
                    self.debouncer.remove(path);
                    self.send_removed(path).await?;
                }
            }
            NotifyKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                for path in event.paths {
                    self.debouncer.record(path, EventKind::Created);
                }
            }
            NotifyKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
                self.debouncer.remove(&event.paths[0]);
                self.send_removed(&event.paths[0]).await?;
                self.debouncer.record(event.paths[1].clone(), EventKind::Created);
            }
            NotifyKind::Modify(ModifyKind::Metadata(_)) => {}
            NotifyKind::Modify(_) => {
                for path in event.paths {
                    self.debouncer.record(path, EventKind::Modified);
                }
            }
            NotifyKind::Remove(_) => {
                for path in &event.paths {
                    self.debouncer.remove(path);
                    self.send_removed(path).await?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// A debounced change. Vanished files become removals.
    async fn process_settled(&self, path: &Path, kind: EventKind) -> Result<(), WatchError> {
        if !path.exists() {
            return self.send_removed(path).await;
        }
        let Some(rel) = self.relative(path) else {
            return Ok(());
        };
        if path.is_dir() {
            if kind == EventKind::Created {
                self.scan_new_dir(&rel).await?;
            }
            return Ok(());
        }
        if !self.walker.is_document(&rel) {
            crate::debug_event!("watcher", "unmatched", "{rel}");
            return Ok(());
        }
        self.forward(VaultEvent::new(kind, rel)).await
    }

    /// Files written before the recursive watch reached a new directory
    /// produce no events of their own.
    async fn scan_new_dir(&self, rel_dir: &str) -> Result<(), WatchError> {
        let found = self.walker.walk_dir(rel_dir);
        if !found.is_empty() {
            crate::debug_event!("watcher", "new directory", "{rel_dir} ({} documents)", found.len());
        }
        for rel in found {
            self.forward(VaultEvent::created(rel)).await?;
        }
        Ok(())
    }

    async fn send_removed(&self, path: &Path) -> Result<(), WatchError> {
        let Some(rel) = self.relative(path) else {
            return Ok(());
        };
        // Directory removals have no extension; the cache drops the subtree
        let looks_like_dir = Path::new(&rel).extension().is_none()
            && !rel.split('/').any(|part| part.starts_with('.'));
        if !self.walker.is_document(&rel) && !looks_like_dir {
            return Ok(());
        }
        self.forward(VaultEvent::removed(rel)).await
    }

    fn relative(&self, path: &Path) -> Option<String> {
        relative_to_root(self.walker.root(), path)
            .or_else(|| relative_to_root(&self.canonical_root, path))
    }

    async fn forward(&self, event: VaultEvent) -> Result<(), WatchError> {
        crate::debug_event!("watcher", "event", "{event}");
        self.sink
            .send(event)
            .await
            .map_err(|_| WatchError::ChannelClosed)
    }
}
