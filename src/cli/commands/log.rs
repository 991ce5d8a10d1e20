//! Log command: recent auto-commits or workflow executions.

use super::table;
use crate::commit::{GitCli, VersionControl};
use crate::config::Settings;
use crate::workflow::ExecutionLog;

pub async fn run_log(settings: &Settings, limit: usize, executions: bool) -> anyhow::Result<()> {
    if executions {
        return show_executions(settings, limit);
    }

    let root = settings.vault_root();
    if !root.join(".git").exists() {
        anyhow::bail!("{} is not a git repository", root.display());
    }

    let revisions = GitCli::new(&root, &settings.auto_commit).log(limit).await?;
    if revisions.is_empty() {
        println!("No commits yet");
        return Ok(());
    }

    let mut out = table(&["Revision", "Date", "Message"]);
    for rev in revisions {
        out.add_row(vec![
            rev.revision.chars().take(10).collect::<String>(),
            rev.timestamp,
            rev.message,
        ]);
    }
    println!("{out}");
    Ok(())
}

fn show_executions(settings: &Settings, limit: usize) -> anyhow::Result<()> {
    let Some(path) = settings.resolved_execution_log() else {
        anyhow::bail!("workflows.execution_log is not configured");
    };

    let entries = ExecutionLog::read_tail(&path, limit)?;
    if entries.is_empty() {
        println!("No executions logged at {}", path.display());
        return Ok(());
    }

    let mut out = table(&["Started", "Workflow", "Path", "Status", "Duration", "Error"]);
    for entry in entries {
        out.add_row(vec![
            entry.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            entry.workflow_id.clone(),
            entry.triggering_path.clone().unwrap_or_else(|| "(manual)".to_string()),
            format!("{:?}", entry.status).to_lowercase(),
            entry
                .duration_ms()
                .map(|ms| format!("{ms}ms"))
                .unwrap_or_default(),
            entry.error.clone().unwrap_or_default(),
        ]);
    }
    println!("{out}");
    Ok(())
}
