//! Commit message helpers: summary normalization and the fallback message.

use std::collections::{BTreeMap, HashMap};

use crate::types::EventKind;

/// Subject lines are capped at this many characters.
pub const MAX_SUBJECT_CHARS: usize = 72;

const MAX_DIRS_NAMED: usize = 3;

/// Clean up summarizer output into a single subject line.
///
/// Takes the first non-empty line, strips wrapping quotes and backticks, and
/// caps the length. `None` when nothing usable remains.
pub fn normalize_summary(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line
        .trim_matches(|c| matches!(c, '"' | '\'' | '`'))
        .trim();
    if line.is_empty() {
        return None;
    }
    Some(truncate_chars(line, MAX_SUBJECT_CHARS))
}

/// Deterministic message derived only from the changed paths.
///
/// One path names the path itself; more paths give a count and the busiest
/// top-level directories.
pub fn fallback_message(changes: &BTreeMap<String, EventKind>) -> String {
    let mut entries = changes.iter();
    let message = match (changes.len(), entries.next()) {
        (_, None) => "Update vault".to_string(),
        (1, Some((path, kind))) => format!("{} {path}", verb(*kind)),
        (n, Some(_)) => {
            let removed = changes.values().filter(|k| **k == EventKind::Removed).count();
            let mut message = format!("Update {n} files");
            let dirs = busiest_dirs(changes.keys().map(String::as_str));
            if !dirs.is_empty() {
                message.push_str(" in ");
                message.push_str(&dirs);
            }
            if removed > 0 {
                message.push_str(&format!(" ({removed} removed)"));
            }
            message
        }
    };
    truncate_chars(&message, MAX_SUBJECT_CHARS)
}

fn verb(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Created => "Add",
        EventKind::Modified => "Update",
        EventKind::Removed => "Remove",
    }
}

fn busiest_dirs<'a>(paths: impl Iterator<Item = &'a str>) -> String {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for path in paths {
        let dir = match path.split_once('/') {
            Some((top, _)) => top,
            None => "/",
        };
        *counts.entry(dir).or_default() += 1;
    }

    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let extra = ranked.len().saturating_sub(MAX_DIRS_NAMED);
    let mut named: Vec<&str> = ranked.iter().take(MAX_DIRS_NAMED).map(|(d, _)| *d).collect();
    let more = format!("+{extra} more");
    if extra > 0 {
        named.push(&more);
    }
    named.join(", ")
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}
