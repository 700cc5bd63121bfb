//! Dot-addressed field paths
//!
//! Reads descend through objects by key and through arrays by numeric index.
//! A missing node anywhere along the way (or a JSON `null` at the end) reads
//! as absent. Writes create intermediate objects as needed.

use serde_json::{Map, Value};
use std::fmt;

/// A parsed, non-empty dot path such as `engagement_metrics.likes`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

impl FieldPath {
    /// Parses a dot path. Returns `None` for an empty path or an empty segment.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return None;
        }

        Some(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// True when `other` lives strictly below this path
    pub fn is_prefix_of(&self, other: &FieldPath) -> bool {
        other.segments.len() > self.segments.len() && other.segments.starts_with(&self.segments)
    }

    /// Resolves this path against any JSON value
    pub fn resolve<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        descend(root, self.segments.iter().map(String::as_str))
    }

    /// Writes `value` at this path, creating intermediate objects
    pub fn write(&self, target: &mut Map<String, Value>, value: Value) {
        let Some((last, parents)) = self.segments.split_last() else {
            return;
        };

        let mut current = target;
        for segment in parents {
            let entry = current
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            current = match entry {
                Value::Object(map) => map,
                _ => return,
            };
        }

        current.insert(last.clone(), value);
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Resolves a literal dot path against a JSON value
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    descend(root, path.split('.'))
}

/// Resolves a literal dot path against an object map
pub fn lookup_in<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = map.get(segments.next()?)?;
    descend(first, segments)
}

/// First path in `paths` that resolves to a non-empty scalar, as a string
pub fn first_string(root: &Value, paths: &[&str]) -> Option<String> {
    paths
        .iter()
        .filter_map(|path| lookup(root, path))
        .find_map(scalar_to_string)
}

/// Renders a scalar as a string. Empty strings, arrays and objects yield `None`.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn descend<'a, 's>(start: &'a Value, segments: impl Iterator<Item = &'s str>) -> Option<&'a Value> {
    let mut current = start;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_rejects_empty_segments() {
        assert!(FieldPath::parse("").is_none());
        assert!(FieldPath::parse("a..b").is_none());
        assert!(FieldPath::parse(".a").is_none());
        assert_eq!(FieldPath::parse(" a.b ").unwrap().segments().len(), 2);
    }

    #[test]
    fn test_resolve_nested_objects_and_arrays() {
        let raw = json!({
            "authorMeta": { "name": "nutifood" },
            "hashtags": [{ "name": "growplus" }, { "name": "milk" }],
            "empty": null
        });

        let name = FieldPath::parse("authorMeta.name").unwrap();
        assert_eq!(name.resolve(&raw), Some(&json!("nutifood")));
        assert_eq!(lookup(&raw, "hashtags.1.name"), Some(&json!("milk")));
        assert_eq!(lookup(&raw, "hashtags.9.name"), None);
        assert_eq!(lookup(&raw, "authorMeta.name.first"), None);
        assert_eq!(lookup(&raw, "empty"), None);
        assert_eq!(lookup(&raw, "missing.deeper"), None);
    }

    #[test]
    fn test_write_creates_intermediate_objects() {
        let mut out = Map::new();
        FieldPath::parse("engagement_metrics.likes").unwrap().write(&mut out, json!(10));
        FieldPath::parse("engagement_metrics.comments").unwrap().write(&mut out, json!(2));
        FieldPath::parse("title").unwrap().write(&mut out, json!("hello"));

        assert_eq!(
            Value::Object(out),
            json!({ "engagement_metrics": { "likes": 10, "comments": 2 }, "title": "hello" })
        );
    }

    #[test]
    fn test_prefix_detection() {
        let parent = FieldPath::parse("video_metadata").unwrap();
        let child = FieldPath::parse("video_metadata.width").unwrap();
        let sibling = FieldPath::parse("video_metadata_extra").unwrap();

        assert!(parent.is_prefix_of(&child));
        assert!(!child.is_prefix_of(&parent));
        assert!(!parent.is_prefix_of(&sibling));
        assert!(!parent.is_prefix_of(&parent));
    }

    #[test]
    fn test_first_string_skips_empty_candidates() {
        let raw = json!({ "post_id": "  ", "id": 12345 });
        assert_eq!(first_string(&raw, &["post_id", "id"]), Some("12345".to_string()));
        assert_eq!(first_string(&raw, &["nope"]), None);
    }
}
