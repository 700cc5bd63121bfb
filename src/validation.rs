//! Record validation and data-quality scoring
//!
//! The quality score is a fixed rubric over well-known output fields, in
//! points out of ten:
//!
//! | signal                         | points |
//! |--------------------------------|--------|
//! | non-empty text content         | 4      |
//! | any engagement counter above 0 | 2      |
//! | media present                  | 2      |
//! | author / page identity         | 1      |
//! | parseable post date            | 1      |
//!
//! The score is always in `[0, 1]` and never depends on the validation rules,
//! so two schemas that produce the same record produce the same score.

use crate::error::{NormalizerError, Result};
use crate::mapping::path::lookup_in;
use crate::mapping::NormalizedRecord;
use crate::schema::ValidationSpec;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const CONTENT_FIELDS: &[&str] = &["post_content", "description", "title", "content", "text"];

pub const ENGAGEMENT_FIELD: &str = "engagement_metrics";

pub const MEDIA_FIELDS: &[&str] = &[
    "media_metadata.media_count",
    "media_metadata.attachment_count",
    "video_url",
    "video_metadata.duration_seconds",
    "thumbnail_url",
];

pub const IDENTITY_FIELDS: &[&str] = &[
    "page_name",
    "user_name",
    "channel_name",
    "author_metadata.username",
    "author_metadata.name",
    "channel_metadata.name",
];

pub const DATE_FIELDS: &[&str] = &["date_posted", "published_at"];

const CONTENT_POINTS: u32 = 4;
const ENGAGEMENT_POINTS: u32 = 2;
const MEDIA_POINTS: u32 = 2;
const IDENTITY_POINTS: u32 = 1;
const DATE_POINTS: u32 = 1;
const TOTAL_POINTS: f64 = 10.0;

/// Outcome of validating one record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationResult {
    pub passed: bool,
    pub missing_required: Vec<String>,
    pub score: f64,
    pub threshold: f64,
    /// Informational only; they do not affect `passed`
    pub format_violations: Vec<String>,
}

impl ValidationResult {
    pub fn ensure_passed(&self) -> Result<()> {
        if self.passed {
            Ok(())
        } else {
            Err(NormalizerError::ValidationFailed {
                missing: self.missing_required.clone(),
                score: self.score,
                threshold: self.threshold,
            })
        }
    }
}

fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f > 0.0),
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn has_engagement(record: &Map<String, Value>) -> bool {
    let Some(Value::Object(metrics)) = record.get(ENGAGEMENT_FIELD) else {
        return false;
    };
    metrics.values().any(|v| match v {
        Value::Number(n) => n.as_f64().is_some_and(|f| f > 0.0),
        Value::String(s) => s.trim().parse::<f64>().is_ok_and(|f| f > 0.0),
        _ => false,
    })
}

fn any_present(record: &Map<String, Value>, fields: &[&str]) -> bool {
    fields.iter().any(|f| is_present(lookup_in(record, f)))
}

fn any_truthy(record: &Map<String, Value>, fields: &[&str]) -> bool {
    fields
        .iter()
        .filter_map(|f| lookup_in(record, f))
        .any(is_truthy)
}

/// Whether `text` parses as an RFC 3339 timestamp, a naive ISO timestamp or a date
pub fn is_timestamp(text: &str) -> bool {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text).is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").is_ok()
        || NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
}

/// Absolute http(s) URL with a host
pub fn is_url(text: &str) -> bool {
    match url::Url::parse(text.trim()) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some(),
        Err(_) => false,
    }
}

pub fn is_email(text: &str) -> bool {
    match text.trim().split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

fn has_date(record: &Map<String, Value>) -> bool {
    DATE_FIELDS
        .iter()
        .filter_map(|f| lookup_in(record, f).and_then(Value::as_str))
        .any(is_timestamp)
}

/// Rubric score of an output record, in `[0, 1]`
pub fn quality_score(record: &Map<String, Value>) -> f64 {
    let mut points = 0;
    if any_present(record, CONTENT_FIELDS) {
        points += CONTENT_POINTS;
    }
    if has_engagement(record) {
        points += ENGAGEMENT_POINTS;
    }
    if any_truthy(record, MEDIA_FIELDS) {
        points += MEDIA_POINTS;
    }
    if any_present(record, IDENTITY_FIELDS) {
        points += IDENTITY_POINTS;
    }
    if has_date(record) {
        points += DATE_POINTS;
    }
    f64::from(points) / TOTAL_POINTS
}

fn format_violations(record: &Map<String, Value>, spec: &ValidationSpec) -> Vec<String> {
    let mut violations = Vec::new();
    let formats = &spec.format_validators;

    for field in &formats.url {
        if let Some(value) = lookup_in(record, field) {
            if !value.as_str().is_some_and(is_url) {
                violations.push(format!("{field}: expected url"));
            }
        }
    }
    for field in &formats.timestamp {
        if let Some(value) = lookup_in(record, field) {
            if !value.as_str().is_some_and(is_timestamp) {
                violations.push(format!("{field}: expected timestamp"));
            }
        }
    }
    for field in &formats.integer {
        if let Some(value) = lookup_in(record, field) {
            let ok = value.is_i64()
                || value.is_u64()
                || value.as_str().is_some_and(|s| s.trim().parse::<i64>().is_ok());
            if !ok {
                violations.push(format!("{field}: expected integer"));
            }
        }
    }
    for field in &formats.boolean {
        if let Some(value) = lookup_in(record, field) {
            let ok = value.is_boolean()
                || value
                    .as_str()
                    .is_some_and(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "false"));
            if !ok {
                violations.push(format!("{field}: expected boolean"));
            }
        }
    }

    violations
}

/// Checks required presence and the score threshold
pub fn validate(record: &NormalizedRecord, spec: &ValidationSpec) -> ValidationResult {
    let fields = record.as_map();

    let missing_required: Vec<String> = spec
        .required_fields
        .iter()
        .filter(|field| !is_present(lookup_in(fields, field)))
        .cloned()
        .collect();

    let score = quality_score(fields);
    let passed = missing_required.is_empty() && score >= spec.minimum_score;

    ValidationResult {
        passed,
        missing_required,
        score,
        threshold: spec.minimum_score,
        format_violations: format_violations(fields, spec),
    }
}
