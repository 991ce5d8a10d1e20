//! Shadow cache behaviour over a real vault directory.

use std::fs;
use std::path::Path;
use tempfile::TempDir;
use weave::cache::{ApplyOutcome, CachePersistence, DocumentQuery, ReindexMode, ShadowCache};
use weave::config::{CacheConfig, Settings};
use weave::types::VaultEvent;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn settings_for(root: &Path) -> Settings {
    Settings {
        vault_root: Some(root.to_path_buf()),
        ..Settings::default()
    }
}

/// Every outbound edge has a matching inbound entry and vice versa.
fn assert_links_consistent(cache: &ShadowCache) {
    for doc in cache.query(&DocumentQuery::default()) {
        for target in &doc.outbound_links {
            assert!(
                cache.backlinks(target).contains(&doc.path),
                "{} -> {target} missing from inbound",
                doc.path
            );
        }
        for source in &doc.inbound_links {
            let source_doc = cache.get(source).expect("inbound source must be indexed");
            assert!(
                source_doc.outbound_links.contains(&doc.path),
                "{source} listed as inbound of {} without outbound edge",
                doc.path
            );
        }
    }
}

#[test]
fn test_delete_middle_of_link_chain() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write(root, "A.md", "Start at [[B]]");
    write(root, "B.md", "Then go to [[C]]");
    write(root, "C.md", "The end");

    let cache = ShadowCache::in_memory(root, &CacheConfig::default());
    cache.reindex(ReindexMode::Full).unwrap();

    assert_eq!(cache.get("C.md").unwrap().inbound_links.len(), 1);
    assert!(cache.get("B.md").unwrap().inbound_links.contains("A.md"));

    fs::remove_file(root.join("B.md")).unwrap();
    let outcome = cache.apply(&VaultEvent::removed("B.md")).unwrap();
    assert_eq!(outcome, ApplyOutcome::Removed);

    // C lost its only inbound edge; A keeps a dangling outbound link
    assert!(cache.get("C.md").unwrap().inbound_links.is_empty());
    assert!(cache.get("A.md").unwrap().outbound_links.contains("B.md"));
    assert!(cache.get("B.md").is_none());
    assert_eq!(cache.stats().dangling_link_count, 1);

    write(root, "B.md", "Back again, see [[C]]");
    cache.apply(&VaultEvent::created("B.md")).unwrap();
    assert!(cache.get("B.md").unwrap().inbound_links.contains("A.md"));
    assert!(cache.get("C.md").unwrap().inbound_links.contains("B.md"));
    assert_eq!(cache.stats().dangling_link_count, 0);
    assert_links_consistent(&cache);
}

#[test]
fn test_edits_keep_inbound_transpose_of_outbound() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write(root, "hub.md", "[[one]] [[two]] [[three]]");
    write(root, "one.md", "[[two]]");
    write(root, "two.md", "[[hub]]");
    write(root, "three.md", "nothing");

    let cache = ShadowCache::in_memory(root, &CacheConfig::default());
    cache.reindex(ReindexMode::Full).unwrap();
    assert_links_consistent(&cache);

    write(root, "hub.md", "only [[three]] now");
    cache.apply(&VaultEvent::modified("hub.md")).unwrap();
    write(root, "one.md", "[[three]] and [[missing]]");
    cache.apply(&VaultEvent::modified("one.md")).unwrap();
    assert_links_consistent(&cache);

    assert_eq!(
        cache.backlinks("three.md").into_iter().collect::<Vec<_>>(),
        vec!["hub.md", "one.md"]
    );
    assert!(cache.backlinks("two.md").is_empty());
    assert_eq!(cache.stats().link_count, 4);
}

#[test]
fn test_repeated_modify_with_same_content_is_unchanged() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write(root, "note.md", "---\ntags: [x]\n---\nbody");

    let cache = ShadowCache::in_memory(root, &CacheConfig::default());
    assert_eq!(
        cache.apply(&VaultEvent::created("note.md")).unwrap(),
        ApplyOutcome::Indexed
    );
    for _ in 0..3 {
        assert_eq!(
            cache.apply(&VaultEvent::modified("note.md")).unwrap(),
            ApplyOutcome::Unchanged
        );
    }
}

#[test]
fn test_query_by_frontmatter_and_tags() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write(
        root,
        "projects/alpha.md",
        "---\ntype: project\nstatus: active\ntags: [work]\n---\n#urgent",
    );
    write(
        root,
        "projects/beta.md",
        "---\ntype: project\nstatus: done\ntags: [work]\n---\n",
    );
    write(root, "journal/today.md", "#work thoughts on [[projects/alpha]]");
    write(root, "broken.md", "---\ntitle: [oops\n---\ntext");

    let cache = ShadowCache::in_memory(root, &CacheConfig::default());
    cache.reindex(ReindexMode::Full).unwrap();

    let active = cache.query(
        &DocumentQuery::default()
            .with_type("project")
            .with_status("active"),
    );
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].path, "projects/alpha.md");
    assert!(active[0].inbound_links.contains("journal/today.md"));

    let work: Vec<_> = cache
        .query(&DocumentQuery::default().with_tag("work"))
        .into_iter()
        .map(|d| d.path)
        .collect();
    assert_eq!(
        work,
        vec!["journal/today.md", "projects/alpha.md", "projects/beta.md"]
    );

    let in_projects =
        cache.query(&DocumentQuery::default().with_prefix("projects/").with_limit(1));
    assert_eq!(in_projects.len(), 1);

    let broken = cache.query(&DocumentQuery {
        has_parse_error: Some(true),
        ..DocumentQuery::default()
    });
    assert_eq!(broken.len(), 1);
    assert_eq!(broken[0].path, "broken.md");
    assert_eq!(cache.stats().parse_error_count, 1);
}

#[test]
fn test_snapshot_reconciles_offline_changes() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write(root, "keep.md", "stays");
    write(root, "edit.md", "before");
    write(root, "gone.md", "deleted while offline");

    let settings = settings_for(root);
    {
        let (cache, stats) = ShadowCache::open(&settings).unwrap();
        assert_eq!(stats.indexed, 3);
        assert_eq!(cache.len(), 3);
    }

    fs::remove_file(root.join("gone.md")).unwrap();
    write(root, "edit.md", "after [[keep]]");
    write(root, "new.md", "fresh");

    let (cache, stats) = ShadowCache::open(&settings).unwrap();
    assert_eq!(stats.scanned, 3);
    assert_eq!(stats.indexed, 2);
    assert_eq!(stats.unchanged, 1);
    assert_eq!(stats.removed, 1);
    assert!(cache.get("gone.md").is_none());
    assert!(cache.get("keep.md").unwrap().inbound_links.contains("edit.md"));
}

#[test]
fn test_corrupt_snapshot_triggers_full_rebuild() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write(root, "a.md", "a");
    let settings = settings_for(root);

    ShadowCache::open(&settings).unwrap();
    let snapshot = CachePersistence::new(settings.resolved_index_path()).snapshot_path();
    assert!(snapshot.exists());
    fs::write(&snapshot, "{ not json").unwrap();

    let (cache, stats) = ShadowCache::open(&settings).unwrap();
    assert_eq!(stats.indexed, 1);
    assert!(cache.get("a.md").is_some());
}
