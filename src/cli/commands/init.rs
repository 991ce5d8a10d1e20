//! Init command.

use anyhow::Context;

use crate::config::Settings;

/// Create `.weave/settings.toml` in the current directory.
pub fn run_init(force: bool) -> anyhow::Result<()> {
    let vault_root = std::env::current_dir().context("cannot read current directory")?;

    let path = Settings::init_config_file(&vault_root, force)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("Created configuration file at: {}", path.display());
    println!("Edit this file to customize your settings.");
    Ok(())
}
