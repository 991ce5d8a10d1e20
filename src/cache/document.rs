//! Indexed document record and frontmatter scalar values.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A frontmatter value: a scalar or a flat list of scalars.
///
/// Nested mappings are flattened to their JSON text so every field stays
/// queryable as a plain value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// Convert a parsed YAML value.
    pub fn from_yaml(value: &serde_yaml::Value) -> Self {
        use serde_yaml::Value;
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Integer(i)
                } else {
                    FieldValue::Float(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => FieldValue::Text(s.clone()),
            Value::Sequence(items) => FieldValue::List(
                items
                    .iter()
                    .map(|item| match item {
                        Value::Sequence(_) | Value::Mapping(_) => {
                            FieldValue::Text(yaml_to_json_text(item))
                        }
                        scalar => FieldValue::from_yaml(scalar),
                    })
                    .collect(),
            ),
            Value::Mapping(_) => FieldValue::Text(yaml_to_json_text(value)),
            Value::Tagged(tagged) => FieldValue::from_yaml(&tagged.value),
        }
    }

    /// Text form used for equality filters (`status`, `type`).
    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Integer(i) => Some(i.to_string()),
            FieldValue::Float(f) => Some(f.to_string()),
            FieldValue::Bool(b) => Some(b.to_string()),
            FieldValue::Null | FieldValue::List(_) => None,
        }
    }

    /// Flatten to a list of strings (a scalar yields one element).
    pub fn as_string_list(&self) -> Vec<String> {
        match self {
            FieldValue::List(items) => items.iter().filter_map(FieldValue::as_text).collect(),
            other => other.as_text().into_iter().collect(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Integer(i) => write!(f, "{i}"),
            FieldValue::Float(x) => write!(f, "{x}"),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

fn yaml_to_json_text(value: &serde_yaml::Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// One row per vault file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    /// Path relative to the vault root (unique key).
    pub path: String,

    /// SHA256 hex digest of the raw file content.
    pub content_hash: String,

    /// Parsed frontmatter in declaration order.
    #[serde(default)]
    pub frontmatter: IndexMap<String, FieldValue>,

    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Resolved link targets (vault-relative paths).
    #[serde(default)]
    pub outbound_links: BTreeSet<String>,

    /// Documents linking here. Derived from every row's `outbound_links`;
    /// filled in when the record is read out of the index.
    #[serde(default)]
    pub inbound_links: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Set when the frontmatter header could not be parsed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,

    /// Size of the indexed content in bytes.
    #[serde(default)]
    pub size_bytes: u64,

    /// Time of the last successful (content-changing) index.
    pub indexed_at: DateTime<Utc>,
}

impl IndexedDocument {
    pub fn has_parse_error(&self) -> bool {
        self.parse_error.is_some()
    }

    /// Check if the content changed based on its hash.
    pub fn has_changed(&self, new_hash: &str) -> bool {
        self.content_hash != new_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_from_yaml() {
        let yaml: serde_yaml::Value =
            serde_yaml::from_str("a: 1\nb: 2.5\nc: true\nd: text\ne: [x, 2]\nf: {k: v}\ng:")
                .unwrap();
        let map = yaml.as_mapping().unwrap();
        let get = |k: &str| FieldValue::from_yaml(map.get(k).unwrap());

        assert_eq!(get("a"), FieldValue::Integer(1));
        assert_eq!(get("b"), FieldValue::Float(2.5));
        assert_eq!(get("c"), FieldValue::Bool(true));
        assert_eq!(get("d"), FieldValue::Text("text".into()));
        assert_eq!(
            get("e"),
            FieldValue::List(vec![FieldValue::Text("x".into()), FieldValue::Integer(2)])
        );
        assert_eq!(get("f"), FieldValue::Text(r#"{"k":"v"}"#.into()));
        assert_eq!(get("g"), FieldValue::Null);
    }

    #[test]
    fn test_field_value_string_list() {
        let list = FieldValue::List(vec![FieldValue::Text("a".into()), FieldValue::Integer(3)]);
        assert_eq!(list.as_string_list(), vec!["a", "3"]);
        assert_eq!(FieldValue::Text("solo".into()).as_string_list(), vec!["solo"]);
        assert!(FieldValue::Null.as_string_list().is_empty());
    }
}
