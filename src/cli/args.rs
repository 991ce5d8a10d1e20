//! CLI argument parsing using clap.
//!
//! Contains the Cli struct and Commands enum.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Reactive index and automation core for a markdown vault
#[derive(Parser)]
#[command(
    name = "weave",
    version = env!("CARGO_PKG_VERSION"),
    about = "Index a markdown vault, run workflows on changes, and auto-commit edits",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Quick Start:\n  $ weave init                 # Create .weave/settings.toml\n  $ weave index                # Build or refresh the shadow cache\n  $ weave query --tag project  # Find notes\n  $ weave serve                # MCP server with watcher and auto-commit"
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Create .weave/settings.toml in the current directory
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Reconcile the cache with the vault, or rebuild it
    Index {
        /// Discard the persisted index and rescan every file
        #[arg(long)]
        full: bool,
    },

    /// Query indexed documents
    #[command(after_help = "Examples:\n  weave query --tag rust --status draft\n  weave query --links-to projects/alpha.md\n  weave query --prefix journal/ --limit 5 --json")]
    Query {
        /// Required tag (repeatable; all must match)
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// Frontmatter type
        #[arg(long = "type")]
        doc_type: Option<String>,

        /// Frontmatter status
        #[arg(long)]
        status: Option<String>,

        /// Path prefix, e.g. "projects/"
        #[arg(long)]
        prefix: Option<String>,

        /// Documents linking to this path
        #[arg(long)]
        links_to: Option<String>,

        /// Documents linked from this path
        #[arg(long)]
        linked_from: Option<String>,

        /// Only documents whose frontmatter failed to parse
        #[arg(long)]
        parse_errors: bool,

        /// Maximum number of results
        #[arg(short, long, default_value = "50")]
        limit: usize,

        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one indexed document
    Get {
        /// Vault-relative path
        path: String,

        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Show cache statistics
    Stats {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// List registered workflows and recent executions from the log
    Workflows,

    /// Show recent auto-commits
    Log {
        /// Number of entries
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Show workflow executions from the execution log instead
        #[arg(long)]
        executions: bool,
    },

    /// Start the MCP server (stdio) with the pipeline and auto-commit
    Serve {
        /// Do not start the file watcher
        #[arg(long)]
        no_watch: bool,
    },
}
