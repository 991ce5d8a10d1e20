//! Workflows command.

use super::table;
use crate::config::Settings;
use crate::types::EventKind;
use crate::vault::VaultCore;

/// List registered workflows.
///
/// Handlers are registered in-process, so only the built-in ones appear here.
pub fn run_workflows(settings: Settings) -> anyhow::Result<()> {
    let core = VaultCore::open(settings)?;
    let workflows = core.list_workflows();

    if workflows.is_empty() {
        println!("No workflows registered");
        return Ok(());
    }

    let mut out = table(&["Id", "Triggers", "Path filter", "Enabled", "Description"]);
    for wf in workflows {
        out.add_row(vec![
            wf.id,
            wf.triggers
                .iter()
                .map(EventKind::as_str)
                .collect::<Vec<_>>()
                .join(", "),
            wf.path_filter.unwrap_or_else(|| "*".to_string()),
            if wf.enabled { "yes" } else { "no" }.to_string(),
            wf.description.unwrap_or_default(),
        ]);
    }
    println!("{out}");
    Ok(())
}
