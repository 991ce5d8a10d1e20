//! In-memory index with secondary lookups.
//!
//! Rows are keyed by path in a `BTreeMap` so prefix queries are range scans.
//! Secondary maps cover `doc_type`, `status`, tags, and the inbound-link
//! transpose. Inbound links are keyed by target path and kept even when the
//! target is not indexed, so a document created later immediately sees the
//! links that already point at it.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::document::IndexedDocument;
use super::query::{CacheStats, DocumentQuery};

#[derive(Debug, Default)]
pub struct ShadowIndex {
    documents: BTreeMap<String, IndexedDocument>,
    by_type: HashMap<String, BTreeSet<String>>,
    by_status: HashMap<String, BTreeSet<String>>,
    by_tag: HashMap<String, BTreeSet<String>>,
    inbound: HashMap<String, BTreeSet<String>>,
    parse_errors: BTreeSet<String>,
    link_count: usize,
}

fn add_to(map: &mut HashMap<String, BTreeSet<String>>, key: &str, path: &str) {
    map.entry(key.to_string())
        .or_default()
        .insert(path.to_string());
}

fn remove_from(map: &mut HashMap<String, BTreeSet<String>>, key: &str, path: &str) {
    if let Some(set) = map.get_mut(key) {
        set.remove(path);
        if set.is_empty() {
            map.remove(key);
        }
    }
}

impl ShadowIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from stored rows (inbound sets are recomputed).
    pub fn from_documents(documents: impl IntoIterator<Item = IndexedDocument>) -> Self {
        let mut index = Self::new();
        for doc in documents {
            index.upsert(doc);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.documents.contains_key(path)
    }

    /// Stored hash for a path, used for the unchanged-content short circuit.
    pub fn content_hash(&self, path: &str) -> Option<&str> {
        self.documents.get(path).map(|d| d.content_hash.as_str())
    }

    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.documents.keys()
    }

    /// Paths starting with `prefix`, read from the ordered key range.
    pub fn paths_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a String> {
        self.documents
            .range(prefix.to_string()..)
            .map(|(path, _)| path)
            .take_while(move |path| path.starts_with(prefix))
    }

    /// Insert or replace a row, keeping every secondary map in step.
    pub fn upsert(&mut self, mut doc: IndexedDocument) {
        let path = doc.path.clone();
        if let Some(old) = self.documents.remove(&path) {
            self.unlink_secondary(&old);
        }

        doc.inbound_links.clear();
        if let Some(t) = &doc.doc_type {
            add_to(&mut self.by_type, t, &path);
        }
        if let Some(s) = &doc.status {
            add_to(&mut self.by_status, s, &path);
        }
        for tag in &doc.tags {
            add_to(&mut self.by_tag, tag, &path);
        }
        for target in &doc.outbound_links {
            add_to(&mut self.inbound, target, &path);
        }
        if doc.parse_error.is_some() {
            self.parse_errors.insert(path.clone());
        }
        self.link_count += doc.outbound_links.len();

        self.documents.insert(path, doc);
    }

    /// Delete a row and prune it from every inbound set. Returns the removed row.
    pub fn remove(&mut self, path: &str) -> Option<IndexedDocument> {
        let old = self.documents.remove(path)?;
        self.unlink_secondary(&old);
        Some(old)
    }

    fn unlink_secondary(&mut self, old: &IndexedDocument) {
        let path = old.path.as_str();
        if let Some(t) = &old.doc_type {
            remove_from(&mut self.by_type, t, path);
        }
        if let Some(s) = &old.status {
            remove_from(&mut self.by_status, s, path);
        }
        for tag in &old.tags {
            remove_from(&mut self.by_tag, tag, path);
        }
        for target in &old.outbound_links {
            remove_from(&mut self.inbound, target, path);
        }
        self.parse_errors.remove(path);
        self.link_count -= old.outbound_links.len();
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Documents linking to `path`, whether or not `path` is indexed.
    pub fn inbound_of(&self, path: &str) -> BTreeSet<String> {
        self.inbound.get(path).cloned().unwrap_or_default()
    }

    /// Row with its inbound set materialized.
    pub fn get(&self, path: &str) -> Option<IndexedDocument> {
        self.documents.get(path).map(|doc| self.materialize(doc))
    }

    fn materialize(&self, doc: &IndexedDocument) -> IndexedDocument {
        let mut out = doc.clone();
        out.inbound_links = self.inbound_of(&doc.path);
        out
    }

    /// Stored rows without inbound sets, for persistence.
    pub fn raw_documents(&self) -> impl Iterator<Item = &IndexedDocument> {
        self.documents.values()
    }

    pub fn stats(&self) -> CacheStats {
        let dangling_link_count = self
            .inbound
            .iter()
            .filter(|(target, _)| !self.documents.contains_key(*target))
            .map(|(_, sources)| sources.len())
            .sum();

        CacheStats {
            file_count: self.documents.len(),
            tag_count: self.by_tag.len(),
            link_count: self.link_count,
            parse_error_count: self.parse_errors.len(),
            dangling_link_count,
        }
    }

    /// Evaluate a query by intersecting indexed candidate sets.
    ///
    /// Only when no indexed predicate is present does evaluation fall back to
    /// walking rows, and then only over the `path_prefix` range.
    pub fn query(&self, query: &DocumentQuery) -> Vec<IndexedDocument> {
        let mut candidates: Option<BTreeSet<String>> = None;

        let mut narrow = |set: Option<&BTreeSet<String>>| {
            let empty = BTreeSet::new();
            let set = set.unwrap_or(&empty);
            candidates = Some(match candidates.take() {
                None => set.clone(),
                Some(current) => current.intersection(set).cloned().collect(),
            });
        };

        if let Some(t) = &query.doc_type {
            narrow(self.by_type.get(t));
        }
        if let Some(s) = &query.status {
            narrow(self.by_status.get(s));
        }
        for tag in &query.tags {
            narrow(self.by_tag.get(tag));
        }
        if let Some(target) = &query.links_to {
            narrow(self.inbound.get(target));
        }
        if let Some(source) = &query.linked_from {
            narrow(self.documents.get(source).map(|d| &d.outbound_links));
        }
        if query.has_parse_error == Some(true) {
            narrow(Some(&self.parse_errors));
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        let prefix = query.path_prefix.as_deref().unwrap_or("");

        let accept = |doc: &&IndexedDocument| {
            doc.path.starts_with(prefix)
                && match query.has_parse_error {
                    Some(false) => doc.parse_error.is_none(),
                    _ => true,
                }
        };

        match candidates {
            Some(paths) => paths
                .iter()
                .filter_map(|p| self.documents.get(p))
                .filter(accept)
                .take(limit)
                .map(|doc| self.materialize(doc))
                .collect(),
            None => self
                .documents
                .range(prefix.to_string()..)
                .map(|(_, doc)| doc)
                .take_while(|doc| doc.path.starts_with(prefix))
                .filter(accept)
                .take(limit)
                .map(|doc| self.materialize(doc))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn doc(path: &str, links: &[&str], tags: &[&str], doc_type: Option<&str>) -> IndexedDocument {
        IndexedDocument {
            path: path.to_string(),
            content_hash: format!("hash-{path}"),
            frontmatter: Default::default(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            outbound_links: links.iter().map(|s| s.to_string()).collect(),
            inbound_links: BTreeSet::new(),
            doc_type: doc_type.map(str::to_string),
            status: None,
            title: None,
            parse_error: None,
            size_bytes: 0,
            indexed_at: Utc::now(),
        }
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_inbound_is_transpose_of_outbound() {
        let mut index = ShadowIndex::new();
        index.upsert(doc("a.md", &["b.md", "c.md"], &[], None));
        index.upsert(doc("b.md", &["c.md"], &[], None));
        index.upsert(doc("c.md", &[], &[], None));

        assert_eq!(index.get("c.md").unwrap().inbound_links, set(&["a.md", "b.md"]));
        assert_eq!(index.get("b.md").unwrap().inbound_links, set(&["a.md"]));
        assert!(index.get("a.md").unwrap().inbound_links.is_empty());
        assert_eq!(index.stats().link_count, 3);
    }

    #[test]
    fn test_upsert_replaces_edges() {
        let mut index = ShadowIndex::new();
        index.upsert(doc("a.md", &["b.md"], &["x"], Some("note")));
        index.upsert(doc("b.md", &[], &[], None));
        index.upsert(doc("a.md", &["c.md"], &["y"], Some("project")));

        assert!(index.get("b.md").unwrap().inbound_links.is_empty());
        assert_eq!(index.inbound_of("c.md"), set(&["a.md"]));
        assert!(index.query(&DocumentQuery::default().with_tag("x")).is_empty());
        assert_eq!(
            index.query(&DocumentQuery::default().with_type("project")).len(),
            1
        );
        assert_eq!(index.stats().tag_count, 1);
    }

    #[test]
    fn test_remove_prunes_inbound() {
        let mut index = ShadowIndex::new();
        index.upsert(doc("a.md", &["b.md"], &[], None));
        index.upsert(doc("b.md", &["c.md"], &[], None));
        index.upsert(doc("c.md", &[], &[], None));

        let removed = index.remove("b.md").unwrap();
        assert_eq!(removed.path, "b.md");
        assert!(index.get("c.md").unwrap().inbound_links.is_empty());
        // a.md still records its link to the now-missing b.md
        assert!(index.get("a.md").unwrap().outbound_links.contains("b.md"));
        assert_eq!(index.stats().dangling_link_count, 1);
        assert!(index.remove("b.md").is_none());
    }

    #[test]
    fn test_paths_with_prefix_stops_at_range_end() {
        let mut index = ShadowIndex::new();
        for path in ["notes.md", "notes/a.md", "notes/deep/b.md", "notes-old/c.md", "z.md"] {
            index.upsert(doc(path, &[], &[], None));
        }

        let under: Vec<_> = index.paths_with_prefix("notes/").cloned().collect();
        assert_eq!(under, vec!["notes/a.md", "notes/deep/b.md"]);
        assert_eq!(index.paths_with_prefix("missing/").count(), 0);
    }

    #[test]
    fn test_query_intersects_predicates() {
        let mut index = ShadowIndex::new();
        index.upsert(doc("notes/a.md", &["hub.md"], &["rust", "idea"], Some("note")));
        index.upsert(doc("notes/b.md", &["hub.md"], &["rust"], Some("note")));
        index.upsert(doc("projects/c.md", &["hub.md"], &["rust"], Some("project")));
        index.upsert(doc("hub.md", &[], &[], None));

        let q = DocumentQuery::default().with_tag("rust").with_type("note");
        let paths: Vec<_> = index.query(&q).into_iter().map(|d| d.path).collect();
        assert_eq!(paths, vec!["notes/a.md", "notes/b.md"]);

        let q = DocumentQuery {
            links_to: Some("hub.md".into()),
            path_prefix: Some("projects/".into()),
            ..Default::default()
        };
        let paths: Vec<_> = index.query(&q).into_iter().map(|d| d.path).collect();
        assert_eq!(paths, vec!["projects/c.md"]);

        let q = DocumentQuery {
            path_prefix: Some("notes/".into()),
            limit: Some(1),
            ..Default::default()
        };
        assert_eq!(index.query(&q).len(), 1);

        let q = DocumentQuery::default().with_tag("missing");
        assert!(index.query(&q).is_empty());
    }

    #[test]
    fn test_linked_from_query() {
        let mut index = ShadowIndex::new();
        index.upsert(doc("a.md", &["b.md", "c.md"], &[], None));
        index.upsert(doc("b.md", &[], &[], None));

        let q = DocumentQuery {
            linked_from: Some("a.md".into()),
            ..Default::default()
        };
        // c.md is a link target but not indexed
        let paths: Vec<_> = index.query(&q).into_iter().map(|d| d.path).collect();
        assert_eq!(paths, vec!["b.md"]);
    }
}
