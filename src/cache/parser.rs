//! Markdown document parsing: frontmatter, tags, and links.
//!
//! Parsing never fails. A malformed frontmatter header yields empty fields
//! and a recorded `parse_error`; tags and links are still taken from the body.

use indexmap::IndexMap;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::LazyLock;

use super::document::FieldValue;
use crate::types::normalize_rel_path;

static WIKILINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!?\[\[([^\[\]\|#\^]*)(?:[#\^][^\[\]\|]*)?(?:\|[^\[\]]*)?\]\]")
        .expect("wikilink regex is valid")
});

static MARKDOWN_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[[^\]]*\]\(\s*<?([^)\s>]+)>?(?:\s+"[^"]*")?\s*\)"#)
        .expect("markdown link regex is valid")
});

static INLINE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[\s(\[,;])#([\p{L}\p{N}_][\p{L}\p{N}_/-]*)").expect("tag regex is valid")
});

static INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`[^`\n]*`").expect("inline code regex is valid"));

/// Everything extracted from one document's content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDocument {
    pub frontmatter: IndexMap<String, FieldValue>,
    pub tags: BTreeSet<String>,
    pub outbound_links: BTreeSet<String>,
    pub doc_type: Option<String>,
    pub status: Option<String>,
    pub title: Option<String>,
    pub parse_error: Option<String>,
}

/// Calculate the SHA256 hex digest of file content.
pub fn calculate_hash(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Parse a document located at `rel_path` (vault-relative).
pub fn parse_document(rel_path: &str, content: &str) -> ParsedDocument {
    let mut parsed = ParsedDocument::default();

    let (header, body) = split_frontmatter(content);
    if let Some(header) = header {
        match header {
            Ok(raw) => match parse_frontmatter(raw) {
                Ok(fields) => parsed.frontmatter = fields,
                Err(reason) => parsed.parse_error = Some(reason),
            },
            Err(reason) => parsed.parse_error = Some(reason),
        }
    }

    let text = strip_code(body);

    parsed.tags = frontmatter_tags(&parsed.frontmatter);
    parsed.tags.extend(inline_tags(&text));
    parsed.outbound_links = extract_links(rel_path, &text);
    parsed.outbound_links.remove(rel_path);

    parsed.doc_type = field_text(&parsed.frontmatter, &["type", "doc_type"]);
    parsed.status = field_text(&parsed.frontmatter, &["status"]);
    parsed.title = field_text(&parsed.frontmatter, &["title"]).or_else(|| first_heading(&text));

    parsed
}

/// Split content into an optional frontmatter header and the body.
///
/// The header result is `Err` when an opening fence has no closing fence.
fn split_frontmatter(content: &str) -> (Option<Result<&str, String>>, &str) {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let Some(first_line_end) = content.find('\n') else {
        return (None, content);
    };
    if content[..first_line_end].trim_end() != "---" {
        return (None, content);
    }

    let rest = &content[first_line_end + 1..];
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            let header = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (Some(Ok(header)), body);
        }
        offset += line.len();
    }

    (
        Some(Err("unterminated frontmatter block".to_string())),
        rest,
    )
}

fn parse_frontmatter(raw: &str) -> Result<IndexMap<String, FieldValue>, String> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(raw).map_err(|e| format!("invalid frontmatter: {e}"))?;

    match value {
        serde_yaml::Value::Null => Ok(IndexMap::new()),
        serde_yaml::Value::Mapping(map) => {
            let mut fields = IndexMap::with_capacity(map.len());
            for (key, value) in &map {
                let key = match key {
                    serde_yaml::Value::String(s) => s.clone(),
                    serde_yaml::Value::Number(n) => n.to_string(),
                    serde_yaml::Value::Bool(b) => b.to_string(),
                    _ => continue,
                };
                fields.insert(key, FieldValue::from_yaml(value));
            }
            Ok(fields)
        }
        _ => Err("frontmatter is not a key/value mapping".to_string()),
    }
}

fn field_text(fields: &IndexMap<String, FieldValue>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| fields.get(*k))
        .filter_map(FieldValue::as_text)
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}

fn normalize_tag(raw: &str) -> Option<String> {
    let tag = raw.trim().trim_start_matches('#').trim();
    if tag.is_empty() || tag.chars().all(|c| c.is_ascii_digit()) {
        None
    } else {
        Some(tag.to_string())
    }
}

fn frontmatter_tags(fields: &IndexMap<String, FieldValue>) -> BTreeSet<String> {
    ["tags", "tag"]
        .iter()
        .filter_map(|k| fields.get(*k))
        .flat_map(|value| match value {
            // `tags: a, b` or `tags: a b`
            FieldValue::Text(s) => s
                .split(|c: char| c == ',' || c.is_whitespace())
                .map(str::to_string)
                .collect(),
            other => other.as_string_list(),
        })
        .filter_map(|t| normalize_tag(&t))
        .collect()
}

fn inline_tags(text: &str) -> BTreeSet<String> {
    INLINE_TAG
        .captures_iter(text)
        .filter_map(|cap| cap.get(1))
        .filter_map(|m| normalize_tag(m.as_str().trim_end_matches('/')))
        .collect()
}

/// Remove fenced code blocks and inline code spans.
fn strip_code(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut fence: Option<&str> = None;

    for line in body.lines() {
        let trimmed = line.trim_start();
        match fence {
            Some(marker) => {
                if trimmed.starts_with(marker) {
                    fence = None;
                }
            }
            None => {
                if trimmed.starts_with("```") {
                    fence = Some("```");
                } else if trimmed.starts_with("~~~") {
                    fence = Some("~~~");
                } else {
                    out.push_str(&INLINE_CODE.replace_all(line, ""));
                    out.push('\n');
                }
            }
        }
    }

    out
}

fn first_heading(text: &str) -> Option<String> {
    text.lines()
        .filter_map(|line| line.strip_prefix("# "))
        .map(|t| t.trim().to_string())
        .find(|t| !t.is_empty())
}

fn extract_links(rel_path: &str, text: &str) -> BTreeSet<String> {
    let mut links = BTreeSet::new();

    for cap in WIKILINK.captures_iter(text) {
        if let Some(target) = cap.get(1).map(|m| m.as_str().trim()) {
            if target.is_empty() {
                continue;
            }
            if let Some(resolved) = with_default_extension(&normalize_rel_path(target)) {
                links.insert(resolved);
            }
        }
    }

    for cap in MARKDOWN_LINK.captures_iter(text) {
        let Some(raw) = cap.get(1).map(|m| m.as_str()) else {
            continue;
        };
        if raw.contains("://") || raw.starts_with("mailto:") || raw.starts_with('#') {
            continue;
        }
        let target = raw.split('#').next().unwrap_or_default().replace("%20", " ");
        if target.is_empty() {
            continue;
        }
        if let Some(resolved) = with_default_extension(&resolve_relative(rel_path, &target)) {
            links.insert(resolved);
        }
    }

    links
}

/// Resolve a markdown link target against the linking document's directory.
fn resolve_relative(rel_path: &str, target: &str) -> String {
    if target.starts_with('/') {
        return normalize_rel_path(target);
    }
    match rel_path.rsplit_once('/') {
        Some((dir, _)) => normalize_rel_path(&format!("{dir}/{target}")),
        None => normalize_rel_path(target),
    }
}

fn with_default_extension(path: &str) -> Option<String> {
    if path.is_empty() {
        return None;
    }
    let file_name = path.rsplit('/').next().unwrap_or(path);
    if file_name.contains('.') {
        Some(path.to_string())
    } else {
        Some(format!("{path}.md"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_hex() {
        let h1 = calculate_hash(b"hello");
        let h2 = calculate_hash(b"hello");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, calculate_hash(b"hello!"));
    }

    #[test]
    fn test_parse_frontmatter_fields() {
        let content = "---\ntitle: Project Plan\ntype: project\nstatus: active\npriority: 2\ntags: [planning, q3]\n---\n# Heading\nBody text\n";
        let parsed = parse_document("projects/plan.md", content);

        assert!(parsed.parse_error.is_none());
        let keys: Vec<_> = parsed.frontmatter.keys().cloned().collect();
        assert_eq!(keys, vec!["title", "type", "status", "priority", "tags"]);
        assert_eq!(parsed.doc_type.as_deref(), Some("project"));
        assert_eq!(parsed.status.as_deref(), Some("active"));
        assert_eq!(parsed.title.as_deref(), Some("Project Plan"));
        assert_eq!(parsed.frontmatter["priority"], FieldValue::Integer(2));
        assert!(parsed.tags.contains("planning"));
        assert!(parsed.tags.contains("q3"));
    }

    #[test]
    fn test_malformed_frontmatter_is_recorded_not_fatal() {
        let content = "---\ntitle: [unclosed\n---\nSee [[other]] and #idea\n";
        let parsed = parse_document("a.md", content);

        assert!(parsed.parse_error.is_some());
        assert!(parsed.frontmatter.is_empty());
        assert!(parsed.outbound_links.contains("other.md"));
        assert!(parsed.tags.contains("idea"));
    }

    #[test]
    fn test_unterminated_frontmatter() {
        let parsed = parse_document("a.md", "---\ntitle: x\nno closing fence [[b]]\n");
        assert_eq!(
            parsed.parse_error.as_deref(),
            Some("unterminated frontmatter block")
        );
        assert!(parsed.outbound_links.contains("b.md"));
    }

    #[test]
    fn test_no_frontmatter() {
        let parsed = parse_document("a.md", "# Title Only\n\ntext");
        assert!(parsed.parse_error.is_none());
        assert!(parsed.frontmatter.is_empty());
        assert_eq!(parsed.title.as_deref(), Some("Title Only"));
    }

    #[test]
    fn test_wikilinks_with_alias_and_heading() {
        let content = "Links: [[B]], [[folder/C|see C]], [[D#Section]], [[E.png]], [[#local]]";
        let parsed = parse_document("a.md", content);
        let links: Vec<_> = parsed.outbound_links.iter().cloned().collect();
        assert_eq!(links, vec!["B.md", "D.md", "E.png", "folder/C.md"]);
    }

    #[test]
    fn test_markdown_links_resolve_relative() {
        let content = "[up](../shared/x.md) [same](y.md) [web](https://example.com) [frag](#top) [root](/z.md)";
        let parsed = parse_document("notes/daily/today.md", content);
        let links: Vec<_> = parsed.outbound_links.iter().cloned().collect();
        assert_eq!(links, vec!["notes/daily/y.md", "notes/shared/x.md", "z.md"]);
    }

    #[test]
    fn test_self_link_ignored() {
        let parsed = parse_document("a.md", "[[a]]");
        assert!(parsed.outbound_links.is_empty());
    }

    #[test]
    fn test_inline_tags_skip_code_and_headings() {
        let content = "# Heading\n#real tag and #nested/tag here, #123 not a tag\n```\n#fenced\n[[fenced-link]]\n```\n`#inline` code\n";
        let parsed = parse_document("a.md", content);
        let tags: Vec<_> = parsed.tags.iter().cloned().collect();
        assert_eq!(tags, vec!["nested/tag", "real"]);
        assert!(parsed.outbound_links.is_empty());
    }

    #[test]
    fn test_frontmatter_tag_string_forms() {
        let parsed = parse_document("a.md", "---\ntags: \"#one, two three\"\n---\n");
        let tags: Vec<_> = parsed.tags.iter().cloned().collect();
        assert_eq!(tags, vec!["one", "three", "two"]);
    }
}
