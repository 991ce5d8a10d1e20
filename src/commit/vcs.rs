//! Version-control primitive consumed by the auto-commit service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::process::Command;

use super::error::{CommitError, CommitResult};
use crate::config::AutoCommitConfig;

/// Identifier of a created revision (a commit hash for git).
pub type RevisionId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionSummary {
    pub revision: RevisionId,
    pub message: String,
    pub timestamp: String,
}

/// Stage-then-commit contract.
///
/// `stage` receives vault-relative paths, including removed ones, and must
/// record deletions as well as modifications.
#[async_trait]
pub trait VersionControl: Send + Sync {
    async fn stage(&self, paths: &[String]) -> CommitResult<()>;

    /// Create one revision containing only `paths`, as staged.
    ///
    /// Other staged changes stay staged and out of the revision. Returns
    /// `CommitError::NothingToCommit` when none of `paths` has changes.
    async fn commit(&self, message: &str, paths: &[String]) -> CommitResult<RevisionId>;

    async fn log(&self, limit: usize) -> CommitResult<Vec<RevisionSummary>>;
}

/// `git` subprocess implementation.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_root: PathBuf,
    author_name: String,
    author_email: String,
}

const LOG_SEPARATOR: char = '\u{1f}';

impl GitCli {
    pub fn new(repo_root: impl Into<PathBuf>, config: &AutoCommitConfig) -> Self {
        Self {
            repo_root: repo_root.into(),
            author_name: config.author_name.clone(),
            author_email: config.author_email.clone(),
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    fn git(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.repo_root)
            .env("GIT_AUTHOR_NAME", &self.author_name)
            .env("GIT_AUTHOR_EMAIL", &self.author_email)
            .env("GIT_COMMITTER_NAME", &self.author_name)
            .env("GIT_COMMITTER_EMAIL", &self.author_email)
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, op: &'static str, args: &[&str]) -> CommitResult<std::process::Output> {
        let output = self
            .git()
            .args(args)
            .output()
            .await
            .map_err(|e| CommitError::vcs(op, e.to_string()))?;
        Ok(output)
    }
}

fn combined_output(output: &std::process::Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(stdout.trim());
    }
    text
}

#[async_trait]
impl VersionControl for GitCli {
    async fn stage(&self, paths: &[String]) -> CommitResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        // `git add` rejects pathspecs matching nothing, which is what a file
        // created and deleted inside one batch looks like
        let (present, missing): (Vec<&str>, Vec<&str>) = paths
            .iter()
            .map(String::as_str)
            .partition(|p| self.repo_root.join(p).exists());

        if !present.is_empty() {
            let mut args = vec!["add", "--all", "--"];
            args.extend(&present);
            let output = self.run("add", &args).await?;
            if !output.status.success() {
                return Err(CommitError::vcs("add", combined_output(&output)));
            }
        }
        if !missing.is_empty() {
            let mut args = vec!["rm", "--cached", "--ignore-unmatch", "-q", "--"];
            args.extend(&missing);
            let output = self.run("rm", &args).await?;
            if !output.status.success() {
                return Err(CommitError::vcs("rm", combined_output(&output)));
            }
        }
        crate::debug_event!("commit", "staged", "{} paths", paths.len());
        Ok(())
    }

    async fn commit(&self, message: &str, paths: &[String]) -> CommitResult<RevisionId> {
        if paths.is_empty() {
            return Err(CommitError::NothingToCommit);
        }
        // Only paths with a staged difference can be named to `--only`; a file
        // created and deleted inside one batch is unknown to git
        let mut args = vec!["diff", "--cached", "--name-only", "--no-renames", "-z", "--"];
        args.extend(paths.iter().map(String::as_str));
        let staged = self.run("diff", &args).await?;
        if !staged.status.success() {
            return Err(CommitError::vcs("diff", combined_output(&staged)));
        }
        let changed: Vec<String> = String::from_utf8_lossy(&staged.stdout)
            .split('\0')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        if changed.is_empty() {
            return Err(CommitError::NothingToCommit);
        }

        let mut args = vec!["commit", "--no-verify", "--only", "-m", message, "--"];
        args.extend(changed.iter().map(String::as_str));
        let output = self.run("commit", &args).await?;
        if !output.status.success() {
            let text = combined_output(&output);
            if text.contains("nothing to commit") || text.contains("no changes added") {
                return Err(CommitError::NothingToCommit);
            }
            return Err(CommitError::vcs("commit", text));
        }

        let head = self.run("rev-parse", &["rev-parse", "HEAD"]).await?;
        if !head.status.success() {
            return Err(CommitError::vcs("rev-parse", combined_output(&head)));
        }
        Ok(String::from_utf8_lossy(&head.stdout).trim().to_string())
    }

    async fn log(&self, limit: usize) -> CommitResult<Vec<RevisionSummary>> {
        let count = format!("-n{limit}");
        let format = format!("--format=%H{LOG_SEPARATOR}%cI{LOG_SEPARATOR}%s");
        let output = self.run("log", &["log", &count, &format]).await?;
        if !output.status.success() {
            let text = combined_output(&output);
            // Fresh repository without commits
            if text.contains("does not have any commits") {
                return Ok(Vec::new());
            }
            return Err(CommitError::vcs("log", text));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| {
                let mut parts = line.splitn(3, LOG_SEPARATOR);
                Some(RevisionSummary {
                    revision: parts.next()?.to_string(),
                    timestamp: parts.next()?.to_string(),
                    message: parts.next().unwrap_or_default().to_string(),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .await
            .is_ok_and(|o| o.status.success())
    }

    #[tokio::test]
    async fn test_git_cli_stage_commit_log() {
        if !git_available().await {
            eprintln!("git not installed, skipping");
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let init = Command::new("git")
            .args(["init", "-q"])
            .current_dir(root)
            .status()
            .await
            .unwrap();
        assert!(init.success());

        let git = GitCli::new(root, &AutoCommitConfig::default());
        assert!(git.log(5).await.unwrap().is_empty());

        std::fs::write(root.join("a.md"), "hello").unwrap();
        std::fs::write(root.join("b.md"), "untouched").unwrap();
        git.stage(&["a.md".to_string()]).await.unwrap();
        let rev = git.commit("Add a", &["a.md".to_string()]).await.unwrap();
        assert_eq!(rev.len(), 40);

        // b.md was never staged
        let log = git.log(5).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].message, "Add a");

        assert!(matches!(
            git.commit("empty", &["a.md".to_string()]).await,
            Err(CommitError::NothingToCommit)
        ));

        std::fs::remove_file(root.join("a.md")).unwrap();
        git.stage(&["a.md".to_string()]).await.unwrap();
        git.commit("Remove a", &["a.md".to_string()]).await.unwrap();
        assert_eq!(git.log(5).await.unwrap().len(), 2);
    }

    async fn git_in(root: &Path, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(root)
            .output()
            .await
            .unwrap();
        assert!(output.status.success(), "git {args:?} failed");
        String::from_utf8_lossy(&output.stdout).to_string()
    }

    #[tokio::test]
    async fn test_commit_leaves_unrelated_staged_files_alone() {
        if !git_available().await {
            eprintln!("git not installed, skipping");
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        git_in(root, &["init", "-q"]).await;
        let git = GitCli::new(root, &AutoCommitConfig::default());

        // The user staged something by hand before the batch flushed
        std::fs::write(root.join("unrelated.md"), "work in progress").unwrap();
        git_in(root, &["add", "unrelated.md"]).await;

        std::fs::write(root.join("a.md"), "hello").unwrap();
        let batch = vec!["a.md".to_string()];
        git.stage(&batch).await.unwrap();
        git.commit("Update a.md", &batch).await.unwrap();

        let files = git_in(root, &["show", "--name-only", "--format=", "HEAD"]).await;
        let files: Vec<&str> = files.lines().filter(|l| !l.is_empty()).collect();
        assert_eq!(files, vec!["a.md"]);

        // Still staged for the user's own commit
        let staged = git_in(root, &["diff", "--cached", "--name-only"]).await;
        assert_eq!(staged.trim(), "unrelated.md");

        // A staged unrelated file does not make an unchanged batch committable
        assert!(matches!(
            git.commit("again", &batch).await,
            Err(CommitError::NothingToCommit)
        ));

        // Created and deleted before the flush: nothing known to git
        let ghost = vec!["ghost.md".to_string()];
        git.stage(&ghost).await.unwrap();
        assert!(matches!(
            git.commit("ghost", &ghost).await,
            Err(CommitError::NothingToCommit)
        ));
    }
}
