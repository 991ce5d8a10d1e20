//! Query, get, and stats commands over the shadow cache.

use anyhow::Context;

use super::table;
use crate::cache::{DocumentQuery, IndexedDocument, ShadowCache};
use crate::config::Settings;

fn open_cache(settings: &Settings) -> anyhow::Result<ShadowCache> {
    let (cache, _) = ShadowCache::open(settings).context("failed to open shadow cache")?;
    Ok(cache)
}

pub fn run_query(settings: &Settings, query: DocumentQuery, json: bool) -> anyhow::Result<()> {
    let docs = open_cache(settings)?.query(&query);

    if json {
        println!("{}", serde_json::to_string_pretty(&docs)?);
        return Ok(());
    }
    if docs.is_empty() {
        println!("No documents found");
        return Ok(());
    }

    let mut out = table(&["Path", "Type", "Status", "Tags", "Links"]);
    for doc in &docs {
        out.add_row(vec![
            doc.path.clone(),
            doc.doc_type.clone().unwrap_or_default(),
            doc.status.clone().unwrap_or_default(),
            doc.tags.iter().cloned().collect::<Vec<_>>().join(", "),
            format!("{} out / {} in", doc.outbound_links.len(), doc.inbound_links.len()),
        ]);
    }
    println!("{out}");
    println!("{} document(s)", docs.len());
    Ok(())
}

pub fn run_get(settings: &Settings, path: &str, json: bool) -> anyhow::Result<()> {
    let cache = open_cache(settings)?;
    let Some(doc) = cache.get(path) else {
        anyhow::bail!("Document not indexed: {path}");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        print_document(&doc);
    }
    Ok(())
}

fn print_document(doc: &IndexedDocument) {
    println!("{}", doc.path);
    println!("{}", "=".repeat(doc.path.len().min(80)));
    if let Some(title) = &doc.title {
        println!("Title:    {title}");
    }
    if let Some(doc_type) = &doc.doc_type {
        println!("Type:     {doc_type}");
    }
    if let Some(status) = &doc.status {
        println!("Status:   {status}");
    }
    println!("Hash:     {}", doc.content_hash);
    println!("Size:     {} bytes", doc.size_bytes);
    println!("Indexed:  {}", doc.indexed_at.to_rfc3339());
    if let Some(error) = &doc.parse_error {
        println!("Frontmatter error: {error}");
    }

    let list = |items: &std::collections::BTreeSet<String>| {
        if items.is_empty() {
            "-".to_string()
        } else {
            items.iter().cloned().collect::<Vec<_>>().join(", ")
        }
    };
    println!("Tags:     {}", list(&doc.tags));
    println!("Links to: {}", list(&doc.outbound_links));
    println!("Linked from: {}", list(&doc.inbound_links));
}

pub fn run_stats(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let stats = open_cache(settings)?.stats();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let mut out = table(&["Metric", "Count"]);
    out.add_row(vec!["Documents".to_string(), stats.file_count.to_string()]);
    out.add_row(vec!["Distinct tags".to_string(), stats.tag_count.to_string()]);
    out.add_row(vec!["Links".to_string(), stats.link_count.to_string()]);
    out.add_row(vec!["Dangling links".to_string(), stats.dangling_link_count.to_string()]);
    out.add_row(vec!["Parse errors".to_string(), stats.parse_error_count.to_string()]);
    println!("{out}");
    Ok(())
}
