//! Named preprocessing functions
//!
//! Every entry takes a present (non-null) value and always produces a value.
//! When the input cannot be converted the function returns
//! [`Preprocessed::Fallback`] with a neutral value instead of failing, and the
//! mapping engine records a coercion fallback for the field.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// Result of a preprocessing step
#[derive(Debug, Clone, PartialEq)]
pub enum Preprocessed {
    Converted(Value),
    Fallback(Value),
}

impl Preprocessed {
    pub fn into_value(self) -> Value {
        match self {
            Preprocessed::Converted(v) | Preprocessed::Fallback(v) => v,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Preprocessed::Fallback(_))
    }
}

pub type PreprocessFn = fn(&Value) -> Preprocessed;

static CATALOG: Lazy<HashMap<&'static str, PreprocessFn>> = Lazy::new(|| {
    let mut catalog: HashMap<&'static str, PreprocessFn> = HashMap::new();
    catalog.insert("clean_text", clean_text);
    catalog.insert("remove_extra_whitespace", remove_extra_whitespace);
    catalog.insert("clean_username", clean_username);
    catalog.insert("normalize_hashtags", normalize_hashtags);
    catalog.insert("extract_hashtag_names", extract_hashtag_names);
    catalog.insert("extract_hashtags", extract_hashtags);
    catalog.insert("extract_mentions", extract_mentions);
    catalog.insert("parse_iso_timestamp", parse_iso_timestamp);
    catalog.insert("extract_date_only", extract_date_only);
    catalog.insert("safe_int", safe_int);
    catalog.insert("safe_float", safe_float);
    catalog.insert("parse_reaction_types", parse_reaction_types);
    catalog.insert("parse_attachments", parse_attachments);
    catalog.insert("extract_address_from_about", extract_address_from_about);
    catalog.insert("to_json_string", to_json_string);
    catalog
});

static DISALLOWED_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[^\w\s.!?,;:\-()\[\]{}"'@#]"#).expect("valid text cleanup pattern")
});

static HASHTAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"#(\w+)").expect("valid hashtag pattern"));

static MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@([\w.]+)").expect("valid mention pattern"));

/// Looks up a preprocessing function by name
pub fn lookup(name: &str) -> Option<PreprocessFn> {
    CATALOG.get(name).copied()
}

/// All registered names, sorted
pub fn names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = CATALOG.keys().copied().collect();
    names.sort_unstable();
    names
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Strips characters outside the word/punctuation set and collapses whitespace
pub fn clean_text(value: &Value) -> Preprocessed {
    match scalar_text(value) {
        Some(text) => {
            let stripped = DISALLOWED_CHARS.replace_all(&text, "");
            Preprocessed::Converted(Value::String(collapse_whitespace(&stripped)))
        }
        None => Preprocessed::Fallback(Value::String(String::new())),
    }
}

pub fn remove_extra_whitespace(value: &Value) -> Preprocessed {
    match scalar_text(value) {
        Some(text) => Preprocessed::Converted(Value::String(collapse_whitespace(&text))),
        None => Preprocessed::Fallback(Value::String(String::new())),
    }
}

/// Trims and drops a leading `@`
pub fn clean_username(value: &Value) -> Preprocessed {
    match scalar_text(value) {
        Some(text) => {
            let name = collapse_whitespace(&text);
            Preprocessed::Converted(Value::String(name.trim_start_matches('@').to_string()))
        }
        None => Preprocessed::Fallback(Value::String(String::new())),
    }
}

fn normalize_tag(tag: &str) -> Option<String> {
    let tag = tag.trim().trim_start_matches('#').trim().to_lowercase();
    if tag.is_empty() {
        None
    } else {
        Some(tag)
    }
}

/// Lowercases tags and drops the leading `#`
pub fn normalize_hashtags(value: &Value) -> Preprocessed {
    match value {
        Value::Array(items) => {
            let tags: Vec<Value> = items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => normalize_tag(s),
                    Value::Object(obj) => obj.get("name").and_then(Value::as_str).and_then(normalize_tag),
                    _ => None,
                })
                .map(Value::String)
                .collect();
            Preprocessed::Converted(Value::Array(tags))
        }
        Value::String(s) => {
            let tags: Vec<Value> = s
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter_map(normalize_tag)
                .map(Value::String)
                .collect();
            Preprocessed::Converted(Value::Array(tags))
        }
        _ => Preprocessed::Fallback(json!([])),
    }
}

/// Pulls `name` out of hashtag objects such as `[{"name": "milk"}]`
pub fn extract_hashtag_names(value: &Value) -> Preprocessed {
    match value {
        Value::Array(items) => {
            let names: Vec<Value> = items
                .iter()
                .filter_map(|item| match item {
                    Value::Object(obj) => obj.get("name").and_then(Value::as_str),
                    Value::String(s) => Some(s.as_str()),
                    _ => None,
                })
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(|name| Value::String(name.to_string()))
                .collect();
            Preprocessed::Converted(Value::Array(names))
        }
        _ => Preprocessed::Fallback(json!([])),
    }
}

fn unique_matches(pattern: &Regex, text: &str, trim: &[char]) -> Vec<Value> {
    let mut seen = Vec::new();
    for capture in pattern.captures_iter(text) {
        let tag = capture[1].trim_end_matches(trim).to_lowercase();
        if !tag.is_empty() && !seen.contains(&tag) {
            seen.push(tag);
        }
    }
    seen.into_iter().map(Value::String).collect()
}

/// Finds `#tags` inside free text
pub fn extract_hashtags(value: &Value) -> Preprocessed {
    match value {
        Value::String(text) => Preprocessed::Converted(Value::Array(unique_matches(&HASHTAG, text, &[]))),
        Value::Array(_) => normalize_hashtags(value),
        _ => Preprocessed::Fallback(json!([])),
    }
}

/// Finds `@handles` inside free text or a list of handles
pub fn extract_mentions(value: &Value) -> Preprocessed {
    match value {
        Value::String(text) => {
            Preprocessed::Converted(Value::Array(unique_matches(&MENTION, text, &['.'])))
        }
        Value::Array(items) => {
            let handles: Vec<Value> = items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.as_str()),
                    Value::Object(obj) => obj
                        .get("username")
                        .or_else(|| obj.get("name"))
                        .and_then(Value::as_str),
                    _ => None,
                })
                .map(|s| s.trim().trim_start_matches('@').to_lowercase())
                .filter(|s| !s.is_empty())
                .map(Value::String)
                .collect();
            Preprocessed::Converted(Value::Array(handles))
        }
        _ => Preprocessed::Fallback(json!([])),
    }
}

fn epoch_to_utc(raw: f64) -> Option<DateTime<Utc>> {
    if !raw.is_finite() || raw < 0.0 {
        return None;
    }
    // Values this large are milliseconds
    let seconds = if raw > 1e11 { raw / 1000.0 } else { raw };
    DateTime::<Utc>::from_timestamp(seconds.trunc() as i64, 0)
}

fn normalize_timestamp_text(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if text.contains('T') {
        let normalized = match text.strip_suffix('Z') {
            Some(head) => format!("{head}+00:00"),
            None => text.to_string(),
        };
        let valid = DateTime::parse_from_rfc3339(&normalized).is_ok()
            || NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f").is_ok();
        return valid.then_some(normalized);
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(format!("{date}T00:00:00+00:00"));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc().to_rfc3339_opts(SecondsFormat::Secs, false));
    }

    text.parse::<f64>()
        .ok()
        .and_then(epoch_to_utc)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, false))
}

/// Normalizes ISO-8601 text (trailing `Z` becomes `+00:00`) and epoch numbers
pub fn parse_iso_timestamp(value: &Value) -> Preprocessed {
    let normalized = match value {
        Value::String(text) => normalize_timestamp_text(text),
        Value::Number(n) => n
            .as_f64()
            .and_then(epoch_to_utc)
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, false)),
        _ => None,
    };

    match normalized {
        Some(ts) => Preprocessed::Converted(Value::String(ts)),
        None => Preprocessed::Fallback(Value::String(String::new())),
    }
}

/// Keeps only the `YYYY-MM-DD` part of a timestamp
pub fn extract_date_only(value: &Value) -> Preprocessed {
    let date = match value {
        Value::String(text) => {
            let head: String = text.trim().split('T').next().unwrap_or_default().chars().take(10).collect();
            NaiveDate::parse_from_str(&head, "%Y-%m-%d").ok()
        }
        Value::Number(n) => n.as_f64().and_then(epoch_to_utc).map(|dt| dt.date_naive()),
        _ => None,
    };

    match date {
        Some(d) => Preprocessed::Converted(Value::String(d.format("%Y-%m-%d").to_string())),
        None => Preprocessed::Fallback(Value::String(String::new())),
    }
}

pub(crate) fn lenient_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(float_to_int)),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::String(s) => {
            let s = s.trim().replace(',', "");
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(float_to_int))
        }
        _ => None,
    }
}

pub(crate) fn lenient_float(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

fn float_to_int(f: f64) -> Option<i64> {
    if f.is_finite() && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f.trunc() as i64)
    } else {
        None
    }
}

pub fn safe_int(value: &Value) -> Preprocessed {
    match lenient_int(value) {
        Some(n) => Preprocessed::Converted(json!(n)),
        None => Preprocessed::Fallback(json!(0)),
    }
}

pub fn safe_float(value: &Value) -> Preprocessed {
    match lenient_float(value) {
        Some(f) => Preprocessed::Converted(json!(f)),
        None => Preprocessed::Fallback(json!(0.0)),
    }
}

/// `[{"type": "LIKE", "reaction_count": "12"}]` to `[{"type": "LIKE", "count": 12}]`
pub fn parse_reaction_types(value: &Value) -> Preprocessed {
    let Value::Array(items) = value else {
        return Preprocessed::Fallback(json!([]));
    };

    let reactions = items
        .iter()
        .filter_map(Value::as_object)
        .map(|reaction| {
            let kind = reaction.get("type").and_then(Value::as_str).unwrap_or_default();
            let count = reaction
                .get("reaction_count")
                .or_else(|| reaction.get("count"))
                .and_then(lenient_int)
                .unwrap_or(0);
            json!({ "type": kind, "count": count })
        })
        .collect();

    Preprocessed::Converted(Value::Array(reactions))
}

fn string_field(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .and_then(crate::mapping::path::scalar_to_string)
        .unwrap_or_default()
}

/// Reduces attachment objects to `id`, `type`, `url` and `attachment_url`
pub fn parse_attachments(value: &Value) -> Preprocessed {
    let Value::Array(items) = value else {
        return Preprocessed::Fallback(json!([]));
    };

    let attachments = items
        .iter()
        .filter_map(Value::as_object)
        .map(|a| {
            json!({
                "id": string_field(a, "id"),
                "type": string_field(a, "type"),
                "url": string_field(a, "url"),
                "attachment_url": string_field(a, "attachment_url"),
            })
        })
        .collect();

    Preprocessed::Converted(Value::Array(attachments))
}

/// Picks the `ADDRESS` entry from a page's about section
pub fn extract_address_from_about(value: &Value) -> Preprocessed {
    let Value::Array(items) = value else {
        return Preprocessed::Fallback(Value::String(String::new()));
    };

    let address = items
        .iter()
        .filter_map(Value::as_object)
        .find(|entry| {
            entry
                .get("type")
                .and_then(Value::as_str)
                .is_some_and(|t| t.eq_ignore_ascii_case("address"))
        })
        .map(|entry| string_field(entry, "value"))
        .unwrap_or_default();

    Preprocessed::Converted(Value::String(address))
}

pub fn to_json_string(value: &Value) -> Preprocessed {
    match value {
        Value::String(s) => Preprocessed::Converted(Value::String(s.clone())),
        other => Preprocessed::Converted(Value::String(other.to_string())),
    }
}
