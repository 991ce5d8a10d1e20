//! Serve command: MCP stdio server with the event pipeline running.

use std::sync::Arc;

use crate::config::Settings;
use crate::vault::VaultCore;

pub async fn run_serve(settings: Settings, no_watch: bool) -> anyhow::Result<()> {
    let core = Arc::new(VaultCore::open(settings)?);
    let startup = core.startup_stats();
    eprintln!(
        "Vault ready: {} documents ({} indexed, {} removed since last run)",
        core.cache().len(),
        startup.indexed,
        startup.removed
    );

    let running = core.start(!no_watch)?;
    eprintln!("Starting MCP server on stdio transport");

    let result = tokio::select! {
        result = crate::mcp::serve_stdio(Arc::clone(&core)) => result,
        _ = tokio::signal::ctrl_c() => {
            crate::log_event!("serve", "interrupted");
            Ok(())
        }
    };

    let stats = running.shutdown(&core).await;
    crate::log_event!(
        "serve",
        "stopped",
        "{} events, {} executions, {} snapshots",
        stats.events,
        stats.executions,
        stats.snapshots
    );
    result
}
