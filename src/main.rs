use clap::Parser;
use std::path::Path;

use weave::Settings;
use weave::cache::DocumentQuery;
use weave::cli::commands::{index, init, log, query, serve, workflows};
use weave::cli::{Cli, Commands};

/// Load settings from `--config` or by searching upwards for `.weave`.
fn load_settings(config: Option<&Path>) -> Settings {
    let loaded = match config {
        Some(path) => Settings::load_from(path).map(|mut settings| {
            // <vault>/.weave/settings.toml
            if settings.vault_root.is_none() {
                settings.vault_root = path
                    .parent()
                    .and_then(Path::parent)
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf);
            }
            settings
        }),
        None => Settings::load(),
    };

    let settings = loaded.unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        std::process::exit(1);
    });

    if let Err(e) = settings.validate() {
        eprintln!("Configuration error: {e}");
        std::process::exit(1);
    }
    settings
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Commands::Init { force } = cli.command {
        weave::logging::init();
        if let Err(e) = init::run_init(force) {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
        return;
    }

    let settings = load_settings(cli.config.as_deref());
    weave::logging::init_with_config(&settings.logging);

    if Settings::detect_vault_root().is_none() && settings.vault_root.is_none() {
        eprintln!("Warning: no .weave directory found; using the current directory as vault root");
        eprintln!("Run 'weave init' to create a configuration.");
    }

    let result = match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),
        Commands::Index { full } => index::run_index(&settings, full),
        Commands::Query {
            tags,
            doc_type,
            status,
            prefix,
            links_to,
            linked_from,
            parse_errors,
            limit,
            json,
        } => {
            let filter = DocumentQuery {
                path_prefix: prefix,
                doc_type,
                status,
                tags,
                links_to,
                linked_from,
                has_parse_error: parse_errors.then_some(true),
                limit: Some(limit),
            };
            query::run_query(&settings, filter, json)
        }
        Commands::Get { path, json } => query::run_get(&settings, &path, json),
        Commands::Stats { json } => query::run_stats(&settings, json),
        Commands::Workflows => workflows::run_workflows(settings),
        Commands::Log { limit, executions } => log::run_log(&settings, limit, executions).await,
        Commands::Serve { no_watch } => serve::run_serve(settings, no_watch).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
