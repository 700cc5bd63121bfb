//! Media classifier
//!
//! Pure function of `(record, table)`. Assets are emitted in table order
//! (collections first, then fixed rules), a URL already seen in the same post
//! is skipped, and `processing_order` is assigned last so it is always
//! `1..=n` without gaps.

use super::table::{CollectionRule, ExtractionTable, MediaRule};
use super::{MediaItem, MediaType};
use crate::dedup::media_url_key;
use crate::mapping::computed::parse_duration;
use crate::mapping::path::{first_string, lookup, scalar_to_string};
use serde_json::{Map, Value};
use std::collections::HashSet;

const BYTES_PER_MB: f64 = 1_048_576.0;
const UNKNOWN: &str = "unknown";

struct Draft {
    url: String,
    media_type: MediaType,
    media_id: String,
    metadata: Map<String, Value>,
}

/// Every media asset discoverable in `record`
///
/// Each [`ExtractionTable`] belongs to exactly one platform, so the table
/// stands in for the platform. Callers holding a platform name get its table
/// from [`table::for_platform`](super::table::for_platform).
pub fn classify(record: &Value, table: &ExtractionTable) -> Vec<MediaItem> {
    let post_id = first_string(record, table.post_id_paths).unwrap_or_else(|| UNKNOWN.to_string());
    let post_url = first_string(record, table.post_url_paths).unwrap_or_default();
    let date_posted = first_string(record, table.date_paths).unwrap_or_default();

    let mut drafts = Vec::new();
    for collection in table.collections {
        collect_entries(record, collection, &mut drafts);
    }
    for rule in table.rules {
        if let Some(draft) = apply_rule(record, rule) {
            drafts.push(draft);
        }
    }

    let mut seen = HashSet::new();
    drafts
        .into_iter()
        .filter(|draft| seen.insert(media_url_key(&draft.url)))
        .enumerate()
        .map(|(index, draft)| MediaItem {
            estimated_size_mb: estimate_size_mb(draft.media_type, &draft.metadata, table),
            priority: draft.media_type.priority(),
            url: draft.url,
            media_type: draft.media_type,
            media_id: draft.media_id,
            post_id: post_id.clone(),
            post_url: post_url.clone(),
            date_posted: date_posted.clone(),
            metadata: draft.metadata,
            processing_order: index + 1,
        })
        .collect()
}

fn non_empty_url(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
}

fn copy_metadata(source: &Value, pairs: &[(&str, &str)]) -> Map<String, Value> {
    pairs
        .iter()
        .filter_map(|(key, path)| lookup(source, path).map(|v| (key.to_string(), v.clone())))
        .collect()
}

fn collect_entries(record: &Value, rule: &CollectionRule, drafts: &mut Vec<Draft>) {
    let Some(Value::Array(entries)) = lookup(record, rule.path) else {
        return;
    };

    for (index, entry) in entries.iter().enumerate() {
        if !entry.is_object() {
            continue;
        }
        let media_id = entry
            .get(rule.id_field)
            .and_then(scalar_to_string)
            .unwrap_or_else(|| format!("{}{}", rule.id_fallback_prefix, index));

        if let Some(url) = non_empty_url(entry.get(rule.video_url_field)) {
            drafts.push(Draft {
                url,
                media_type: MediaType::Video,
                media_id,
                metadata: copy_metadata(entry, rule.video_metadata),
            });
            continue;
        }

        let kind = entry
            .get(rule.type_field)
            .and_then(Value::as_str)
            .map(str::to_lowercase)
            .unwrap_or_default();
        if rule.image_types.contains(&kind.as_str()) {
            if let Some(url) = non_empty_url(entry.get(rule.image_url_field)) {
                drafts.push(Draft {
                    url,
                    media_type: MediaType::Image,
                    media_id,
                    metadata: copy_metadata(entry, rule.image_metadata),
                });
            }
        }
    }
}

fn apply_rule(record: &Value, rule: &MediaRule) -> Option<Draft> {
    let url = rule
        .url_paths
        .iter()
        .find_map(|path| non_empty_url(lookup(record, path)))?;

    Some(Draft {
        url,
        media_type: rule.media_type,
        media_id: render_id(record, rule.id_template),
        metadata: copy_metadata(record, rule.metadata),
    })
}

/// Renders `{a|b}_suffix` style templates against the record
fn render_id(record: &Value, template: &str) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        rendered.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            rendered.push_str(&rest[start..]);
            return rendered;
        };
        let alternatives: Vec<&str> = after[..end].split('|').collect();
        let value = first_string(record, &alternatives).unwrap_or_else(|| UNKNOWN.to_string());
        rendered.push_str(&value);
        rest = &after[end + 1..];
    }

    rendered.push_str(rest);
    rendered
}

fn estimate_size_mb(media_type: MediaType, metadata: &Map<String, Value>, table: &ExtractionTable) -> f64 {
    match media_type {
        MediaType::Video => {
            let seconds = metadata.get("duration").and_then(parse_duration).unwrap_or(0);
            let mb = seconds as f64 * table.video_bytes_per_second as f64 / BYTES_PER_MB;
            let mb = mb.max(table.min_video_size_mb);
            (mb * 1000.0).round() / 1000.0
        }
        _ => table.image_size_mb,
    }
}
