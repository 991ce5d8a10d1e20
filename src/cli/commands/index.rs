//! Index command: reconcile or rebuild the shadow cache.

use anyhow::Context;
use std::time::Instant;

use crate::cache::{ReindexMode, ReindexStats, ShadowCache};
use crate::config::Settings;

pub fn run_index(settings: &Settings, full: bool) -> anyhow::Result<()> {
    let started = Instant::now();
    let (cache, mut stats) = ShadowCache::open(settings).context("failed to open shadow cache")?;

    if full {
        stats = cache
            .reindex(ReindexMode::Full)
            .context("full reindex failed")?;
    }
    cache.persist().context("failed to persist index")?;

    print_stats(&stats);
    println!(
        "{} documents indexed at {} ({:.2}s)",
        cache.len(),
        settings.resolved_index_path().display(),
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

fn print_stats(stats: &ReindexStats) {
    println!("Scanned:   {}", stats.scanned);
    println!("Indexed:   {}", stats.indexed);
    println!("Unchanged: {}", stats.unchanged);
    println!("Removed:   {}", stats.removed);
    if stats.failed > 0 {
        println!("Failed:    {} (see logs)", stats.failed);
    }
}
