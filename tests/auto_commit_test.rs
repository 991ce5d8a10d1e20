//! Auto-commit debounce, summarization fallback, and git round trip.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;
use weave::commit::{
    AutoCommitService, CommitError, CommitResult, DisabledSummarizer, FlushOutcome, GitCli,
    RevisionId, RevisionSummary, Summarizer, VersionControl,
};
use weave::config::AutoCommitConfig;
use weave::types::VaultEvent;

#[derive(Default)]
struct RecordingVcs {
    commits: Mutex<Vec<(Vec<String>, String)>>,
    staged: Mutex<Vec<String>>,
}

#[async_trait]
impl VersionControl for RecordingVcs {
    async fn stage(&self, paths: &[String]) -> CommitResult<()> {
        *self.staged.lock() = paths.to_vec();
        Ok(())
    }

    async fn commit(&self, message: &str, paths: &[String]) -> CommitResult<RevisionId> {
        let staged = std::mem::take(&mut *self.staged.lock());
        assert_eq!(staged, paths, "commit must name exactly the staged batch");
        let paths = paths.to_vec();
        let mut commits = self.commits.lock();
        commits.push((paths, message.to_string()));
        Ok(format!("{:07x}", commits.len()))
    }

    async fn log(&self, limit: usize) -> CommitResult<Vec<RevisionSummary>> {
        Ok(self
            .commits
            .lock()
            .iter()
            .enumerate()
            .rev()
            .take(limit)
            .map(|(i, (_, message))| RevisionSummary {
                revision: format!("{:07x}", i + 1),
                message: message.clone(),
                timestamp: String::new(),
            })
            .collect())
    }
}

/// Stage takes `delay`; tracks how many stage-to-commit spans overlap.
struct SlowVcs {
    delay: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
    commits: Mutex<Vec<Vec<String>>>,
}

impl SlowVcs {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            commits: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VersionControl for SlowVcs {
    async fn stage(&self, _paths: &[String]) -> CommitResult<()> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        sleep(self.delay).await;
        Ok(())
    }

    async fn commit(&self, _message: &str, paths: &[String]) -> CommitResult<RevisionId> {
        let mut commits = self.commits.lock();
        commits.push(paths.to_vec());
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(commits.len().to_string())
    }

    async fn log(&self, _limit: usize) -> CommitResult<Vec<RevisionSummary>> {
        Ok(Vec::new())
    }
}

struct SlowSummarizer(Duration);

#[async_trait]
impl Summarizer for SlowSummarizer {
    async fn summarize(&self, _paths: &[String]) -> CommitResult<String> {
        sleep(self.0).await;
        Ok("Never used".to_string())
    }
}

struct FixedSummarizer(&'static str);

#[async_trait]
impl Summarizer for FixedSummarizer {
    async fn summarize(&self, _paths: &[String]) -> CommitResult<String> {
        Ok(self.0.to_string())
    }
}

fn config(debounce_secs: u64) -> AutoCommitConfig {
    AutoCommitConfig {
        debounce_secs,
        ..AutoCommitConfig::default()
    }
}

fn started(vcs: &Arc<RecordingVcs>, debounce_secs: u64) -> AutoCommitService {
    let svc = AutoCommitService::new(
        &config(debounce_secs),
        vcs.clone(),
        Arc::new(DisabledSummarizer),
    );
    svc.start().unwrap();
    svc
}

#[tokio::test(start_paused = true)]
async fn test_changes_within_window_coalesce_into_one_commit() {
    let vcs = Arc::new(RecordingVcs::default());
    let svc = started(&vcs, 10);

    svc.record(&VaultEvent::modified("notes/a.md")).unwrap();
    svc.record(&VaultEvent::created("notes/b.md")).unwrap();
    sleep(Duration::from_secs(3)).await;
    svc.record(&VaultEvent::modified("journal/c.md")).unwrap();

    // Window restarted by c; nothing yet at 3 + 9 seconds
    sleep(Duration::from_secs(9)).await;
    assert!(vcs.commits.lock().is_empty());

    sleep(Duration::from_secs(2)).await;
    let commits = vcs.commits.lock().clone();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].0, vec!["journal/c.md", "notes/a.md", "notes/b.md"]);
    assert_eq!(commits[0].1, "Update 3 files in notes, journal");

    svc.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_changes_spaced_beyond_window_commit_separately() {
    let vcs = Arc::new(RecordingVcs::default());
    let svc = started(&vcs, 10);

    svc.record(&VaultEvent::created("a.md")).unwrap();
    sleep(Duration::from_secs(11)).await;
    svc.record(&VaultEvent::removed("b.md")).unwrap();
    sleep(Duration::from_secs(11)).await;

    let messages: Vec<String> = vcs.commits.lock().iter().map(|(_, m)| m.clone()).collect();
    assert_eq!(messages, vec!["Add a.md", "Remove b.md"]);

    let log = svc.log(10).await.unwrap();
    assert_eq!(log[0].message, "Remove b.md");
    svc.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_rapid_saves_of_one_file_flush_once() {
    let vcs = Arc::new(RecordingVcs::default());
    let svc = started(&vcs, 5);

    for _ in 0..10 {
        svc.record(&VaultEvent::modified("draft.md")).unwrap();
        sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(svc.status().pending_paths, vec!["draft.md"]);
    sleep(Duration::from_secs(6)).await;

    let commits = vcs.commits.lock().clone();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].0, vec!["draft.md"]);
    assert!(svc.status().pending_paths.is_empty());
    svc.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_summarizer_timeout_falls_back() {
    let vcs = Arc::new(RecordingVcs::default());
    let svc = AutoCommitService::new(
        &config(60),
        vcs.clone(),
        Arc::new(SlowSummarizer(Duration::from_secs(120))),
    );

    svc.record(&VaultEvent::modified("projects/plan.md")).unwrap();
    let started_at = tokio::time::Instant::now();
    let report = svc.force_flush().await.unwrap();

    assert!(report.used_fallback);
    assert_eq!(report.outcome, FlushOutcome::Committed);
    assert_eq!(report.message, "Update projects/plan.md");
    // Bounded by the 5s summarize timeout, not the summarizer's 120s
    assert!(started_at.elapsed() < Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_summary_is_normalized() {
    let vcs = Arc::new(RecordingVcs::default());
    let svc = AutoCommitService::new(
        &config(60),
        vcs.clone(),
        Arc::new(FixedSummarizer("\n\"Refine project roadmap\"\nMore detail here\n")),
    );

    svc.record(&VaultEvent::modified("projects/plan.md")).unwrap();
    let report = svc.force_flush().await.unwrap();
    assert!(!report.used_fallback);
    assert_eq!(report.message, "Refine project roadmap");
    assert_eq!(report.revision.as_deref(), Some("0000001"));
}

#[tokio::test(start_paused = true)]
async fn test_force_flush_after_shutdown_is_rejected() {
    let vcs = Arc::new(RecordingVcs::default());
    let svc = started(&vcs, 10);
    svc.shutdown().await.unwrap();
    assert!(matches!(svc.force_flush().await, Err(CommitError::ShutDown)));
}

#[tokio::test(start_paused = true)]
async fn test_timer_flush_and_force_flush_never_overlap() {
    let vcs = Arc::new(SlowVcs::new(Duration::from_secs(5)));
    let svc = AutoCommitService::new(&config(10), vcs.clone(), Arc::new(DisabledSummarizer));
    svc.start().unwrap();

    svc.record(&VaultEvent::modified("a.md")).unwrap();
    // Timer flush of a.md is now inside its slow stage
    sleep(Duration::from_millis(10_500)).await;
    assert_eq!(vcs.active.load(Ordering::SeqCst), 1);

    svc.record(&VaultEvent::modified("b.md")).unwrap();
    let report = svc.force_flush().await.unwrap();
    assert_eq!(report.outcome, FlushOutcome::Committed);
    assert_eq!(report.paths, vec!["b.md"]);

    assert_eq!(vcs.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(
        vcs.commits.lock().clone(),
        vec![vec!["a.md".to_string()], vec!["b.md".to_string()]]
    );
    svc.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_in_flight_flush() {
    let temp_dir = TempDir::new().unwrap();
    let vcs = Arc::new(SlowVcs::new(Duration::from_secs(5)));
    let svc = AutoCommitService::new(&config(10), vcs.clone(), Arc::new(DisabledSummarizer))
        .with_state_dir(temp_dir.path());
    svc.start().unwrap();

    svc.record(&VaultEvent::modified("a.md")).unwrap();
    sleep(Duration::from_millis(10_500)).await;
    assert_eq!(vcs.active.load(Ordering::SeqCst), 1);

    // Arrives while a.md is being committed
    svc.record(&VaultEvent::created("c.md")).unwrap();
    svc.shutdown().await.unwrap();

    // The in-flight commit landed; the newer path was kept for the next start
    assert_eq!(vcs.commits.lock().clone(), vec![vec!["a.md".to_string()]]);
    assert_eq!(vcs.active.load(Ordering::SeqCst), 0);
    let last = svc.status().last_flush.unwrap();
    assert_eq!(last.outcome, FlushOutcome::Committed);

    let restarted = AutoCommitService::new(&config(10), vcs.clone(), Arc::new(DisabledSummarizer))
        .with_state_dir(temp_dir.path());
    restarted.start().unwrap();
    assert_eq!(restarted.status().pending_paths, vec!["c.md"]);
    restarted.shutdown().await.unwrap();
}

async fn git(dir: &std::path::Path, args: &[&str]) -> bool {
    tokio::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[tokio::test]
async fn test_git_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    if !git(root, &["init", "-q"]).await {
        eprintln!("git not available; skipping");
        return;
    }

    let vcs = Arc::new(GitCli::new(root, &AutoCommitConfig::default()));
    let svc = AutoCommitService::new(&config(60), vcs, Arc::new(DisabledSummarizer));

    fs::create_dir_all(root.join("notes")).unwrap();
    fs::write(root.join("notes/idea.md"), "# Idea").unwrap();
    svc.record(&VaultEvent::created("notes/idea.md")).unwrap();
    let report = svc.force_flush().await.unwrap();
    assert_eq!(report.outcome, FlushOutcome::Committed);
    assert_eq!(report.message, "Add notes/idea.md");

    // Same content again: staged diff is empty
    svc.record(&VaultEvent::modified("notes/idea.md")).unwrap();
    let report = svc.force_flush().await.unwrap();
    assert_eq!(report.outcome, FlushOutcome::NothingToCommit);

    fs::remove_file(root.join("notes/idea.md")).unwrap();
    svc.record(&VaultEvent::removed("notes/idea.md")).unwrap();
    let report = svc.force_flush().await.unwrap();
    assert_eq!(report.outcome, FlushOutcome::Committed);

    let log = svc.log(5).await.unwrap();
    let messages: Vec<_> = log.iter().map(|r| r.message.as_str()).collect();
    assert_eq!(messages, vec!["Remove notes/idea.md", "Add notes/idea.md"]);

    // Created and deleted inside one batch never reaches the repository
    svc.record(&VaultEvent::created("scratch.md")).unwrap();
    svc.record(&VaultEvent::removed("scratch.md")).unwrap();
    let report = svc.force_flush().await.unwrap();
    assert_eq!(report.outcome, FlushOutcome::NothingToCommit);
    assert!(svc.status().preserved_paths.is_empty());
}
