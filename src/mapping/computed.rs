//! Named computation functions
//!
//! A computation reads the partially built output record (base fields plus
//! every mapped field and every computed field declared before it) and
//! returns a value, or `None` when its inputs are not there.

use crate::mapping::path::lookup_in;
use crate::mapping::preprocess::lenient_int;
use crate::validation::CONTENT_FIELDS;
use once_cell::sync::Lazy;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

pub type ComputedFn = fn(&Map<String, Value>) -> Option<Value>;

static CATALOG: Lazy<HashMap<&'static str, ComputedFn>> = Lazy::new(|| {
    let mut catalog: HashMap<&'static str, ComputedFn> = HashMap::new();
    catalog.insert("sum_reactions_by_type", sum_reactions_by_type);
    catalog.insert("count_attachments", count_attachments);
    catalog.insert("check_video_attachments", check_video_attachments);
    catalog.insert("check_image_attachments", check_image_attachments);
    catalog.insert("calculate_text_length", calculate_text_length);
    catalog.insert("calculate_title_length", calculate_title_length);
    catalog.insert("count_hashtags", count_hashtags);
    catalog.insert("sum_engagement", sum_engagement);
    catalog.insert("calculate_engagement_rate", calculate_engagement_rate);
    catalog.insert("calculate_aspect_ratio", calculate_aspect_ratio);
    catalog.insert("parse_duration_seconds", parse_duration_seconds);
    catalog.insert("check_is_short", check_is_short);
    catalog.insert("detect_language", detect_language);
    catalog.insert("calculate_sentiment", calculate_sentiment);
    catalog
});

/// Counters summed into `total_engagement`
pub const ENGAGEMENT_COUNTERS: &[&str] = &[
    "likes",
    "like_count",
    "digg_count",
    "reactions",
    "comments",
    "comment_count",
    "num_comments",
    "shares",
    "share_count",
];

const VIEW_COUNTERS: &[&str] = &["view_count", "play_count", "views"];

const SHORT_VIDEO_MAX_SECONDS: u64 = 60;

/// Looks up a computation by name
pub fn lookup(name: &str) -> Option<ComputedFn> {
    CATALOG.get(name).copied()
}

/// All registered names, sorted
pub fn names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = CATALOG.keys().copied().collect();
    names.sort_unstable();
    names
}

/// Arrays may arrive either as JSON arrays or as JSON-encoded strings
fn as_list(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn content_text(record: &Map<String, Value>) -> Option<&str> {
    CONTENT_FIELDS
        .iter()
        .filter_map(|field| lookup_in(record, field).and_then(Value::as_str))
        .find(|text| !text.trim().is_empty())
}

fn attachment_types(record: &Map<String, Value>) -> Vec<String> {
    as_list(lookup_in(record, "media_metadata.attachments"))
        .iter()
        .filter_map(|a| a.get("type").and_then(Value::as_str))
        .map(str::to_lowercase)
        .collect()
}

pub fn sum_reactions_by_type(record: &Map<String, Value>) -> Option<Value> {
    let total: i64 = as_list(lookup_in(record, "engagement_metrics.reactions_by_type"))
        .iter()
        .filter_map(|r| r.get("count").and_then(lenient_int))
        .fold(0, i64::saturating_add);
    Some(json!(total))
}

pub fn count_attachments(record: &Map<String, Value>) -> Option<Value> {
    Some(json!(as_list(lookup_in(record, "media_metadata.attachments")).len()))
}

pub fn check_video_attachments(record: &Map<String, Value>) -> Option<Value> {
    Some(json!(attachment_types(record).iter().any(|t| t == "video")))
}

pub fn check_image_attachments(record: &Map<String, Value>) -> Option<Value> {
    Some(json!(attachment_types(record)
        .iter()
        .any(|t| t == "photo" || t == "image")))
}

pub fn calculate_text_length(record: &Map<String, Value>) -> Option<Value> {
    Some(json!(content_text(record).map(|t| t.chars().count()).unwrap_or(0)))
}

pub fn calculate_title_length(record: &Map<String, Value>) -> Option<Value> {
    let length = lookup_in(record, "title")
        .and_then(Value::as_str)
        .map(|t| t.chars().count())
        .unwrap_or(0);
    Some(json!(length))
}

pub fn count_hashtags(record: &Map<String, Value>) -> Option<Value> {
    Some(json!(as_list(lookup_in(record, "content_analysis.hashtags")).len()))
}

pub fn sum_engagement(record: &Map<String, Value>) -> Option<Value> {
    let metrics = lookup_in(record, "engagement_metrics")?.as_object()?;
    let total: i64 = ENGAGEMENT_COUNTERS
        .iter()
        .filter_map(|counter| metrics.get(*counter).and_then(lenient_int))
        .fold(0, i64::saturating_add);
    Some(json!(total))
}

/// `total_engagement / views`, rounded to four decimals. Needs `total_engagement`
/// to be computed first.
pub fn calculate_engagement_rate(record: &Map<String, Value>) -> Option<Value> {
    let total = lookup_in(record, "engagement_metrics.total_engagement").and_then(lenient_int)?;
    let views = VIEW_COUNTERS
        .iter()
        .find_map(|counter| lookup_in(record, &format!("engagement_metrics.{counter}")).and_then(lenient_int))
        .unwrap_or(0);

    if views <= 0 {
        return Some(json!(0.0));
    }
    let rate = total as f64 / views as f64;
    Some(json!((rate * 10_000.0).round() / 10_000.0))
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

pub fn calculate_aspect_ratio(record: &Map<String, Value>) -> Option<Value> {
    let width = lookup_in(record, "video_metadata.width").and_then(lenient_int)?;
    let height = lookup_in(record, "video_metadata.height").and_then(lenient_int)?;
    if width <= 0 || height <= 0 {
        return None;
    }
    let (w, h) = (width as u64, height as u64);
    let divisor = gcd(w, h);
    Some(json!(format!("{}:{}", w / divisor, h / divisor)))
}

/// Duration in whole seconds from a number, `PT#H#M#S` or `[h:]m:s`
pub fn parse_duration(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64),
        Value::String(text) => parse_duration_text(text.trim()),
        _ => None,
    }
}

fn parse_duration_text(text: &str) -> Option<u64> {
    if text.is_empty() {
        return None;
    }

    if let Some(iso) = text.strip_prefix('P') {
        let mut total = 0.0_f64;
        let mut number = String::new();
        let mut in_time = false;
        for c in iso.chars() {
            match c {
                'T' => in_time = true,
                '0'..='9' | '.' => number.push(c),
                unit => {
                    let amount: f64 = number.parse().ok()?;
                    number.clear();
                    total += amount
                        * match (unit, in_time) {
                            ('D', false) => 86_400.0,
                            ('W', false) => 604_800.0,
                            ('H', true) => 3_600.0,
                            ('M', true) => 60.0,
                            ('S', true) => 1.0,
                            _ => return None,
                        };
                }
            }
        }
        return (number.is_empty() && total.is_finite() && total < u64::MAX as f64).then_some(total as u64);
    }

    if text.contains(':') {
        let parts: Vec<u64> = text
            .split(':')
            .map(|p| p.trim().parse::<u64>().ok())
            .collect::<Option<_>>()?;
        if parts.len() > 3 {
            return None;
        }
        return parts
            .iter()
            .try_fold(0_u64, |acc, p| acc.checked_mul(60)?.checked_add(*p));
    }

    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite() && *f >= 0.0)
        .map(|f| f as u64)
}

fn duration_seconds(record: &Map<String, Value>) -> Option<u64> {
    lookup_in(record, "video_metadata.duration_seconds")
        .and_then(parse_duration)
        .or_else(|| lookup_in(record, "video_metadata.duration").and_then(parse_duration))
}

pub fn parse_duration_seconds(record: &Map<String, Value>) -> Option<Value> {
    lookup_in(record, "video_metadata.duration")
        .and_then(parse_duration)
        .map(|secs| json!(secs))
}

pub fn check_is_short(record: &Map<String, Value>) -> Option<Value> {
    let secs = duration_seconds(record)?;
    Some(json!(secs > 0 && secs <= SHORT_VIDEO_MAX_SECONDS))
}

const ENGLISH_MARKERS: &[&str] = &[
    "the", "and", "is", "are", "to", "of", "for", "with", "this", "that", "you", "new",
];

const VIETNAMESE_MARKERS: &[char] = &[
    'ă', 'đ', 'ơ', 'ư', 'ạ', 'ả', 'ấ', 'ầ', 'ẩ', 'ậ', 'ắ', 'ằ', 'ặ', 'ẹ', 'ẻ', 'ẽ', 'ế', 'ề', 'ể', 'ệ',
    'ỉ', 'ị', 'ọ', 'ỏ', 'ố', 'ồ', 'ổ', 'ộ', 'ớ', 'ờ', 'ở', 'ợ', 'ụ', 'ủ', 'ứ', 'ừ', 'ử', 'ự', 'ỳ', 'ỵ',
];

pub fn detect_language(record: &Map<String, Value>) -> Option<Value> {
    let Some(text) = content_text(record) else {
        return Some(json!("unknown"));
    };

    let lower = text.to_lowercase();
    if lower.chars().any(|c| VIETNAMESE_MARKERS.contains(&c)) {
        return Some(json!("vi"));
    }

    let english_hits = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| ENGLISH_MARKERS.contains(word))
        .count();
    if english_hits >= 2 {
        Some(json!("en"))
    } else {
        Some(json!("unknown"))
    }
}

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "excellent", "love", "amazing", "best", "happy", "awesome", "nice", "recommend",
    "tuyệt", "ngon", "thích",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "terrible", "awful", "hate", "worst", "poor", "disappointed", "broken", "sad", "angry",
    "tệ", "dở", "ghét",
];

/// Lexicon score in `[-1, 1]`; `0.0` when no content or no sentiment words
pub fn calculate_sentiment(record: &Map<String, Value>) -> Option<Value> {
    let Some(text) = content_text(record) else {
        return Some(json!(0.0));
    };

    let lower = text.to_lowercase();
    let words: Vec<&str> = lower.split(|c: char| !c.is_alphanumeric()).collect();
    let positive = words.iter().filter(|w| POSITIVE_WORDS.contains(*w)).count() as f64;
    let negative = words.iter().filter(|w| NEGATIVE_WORDS.contains(*w)).count() as f64;

    if positive + negative == 0.0 {
        return Some(json!(0.0));
    }
    let score = ((positive - negative) / (positive + negative)).clamp(-1.0, 1.0);
    Some(json!((score * 100.0).round() / 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_sum_engagement_and_rate() {
        let mut rec = record(json!({
            "engagement_metrics": { "likes": 100, "comments": "20", "shares": 5, "view_count": 1000 }
        }));
        let total = sum_engagement(&rec).unwrap();
        assert_eq!(total, json!(125));

        rec.get_mut("engagement_metrics")
            .and_then(Value::as_object_mut)
            .unwrap()
            .insert("total_engagement".into(), total);
        assert_eq!(calculate_engagement_rate(&rec), Some(json!(0.125)));
    }

    #[test]
    fn test_engagement_rate_requires_total_and_views() {
        let no_total = record(json!({ "engagement_metrics": { "view_count": 1000 } }));
        assert_eq!(calculate_engagement_rate(&no_total), None);

        let no_views = record(json!({ "engagement_metrics": { "total_engagement": 120 } }));
        assert_eq!(calculate_engagement_rate(&no_views), Some(json!(0.0)));

        let plays = record(json!({ "engagement_metrics": { "total_engagement": 120, "play_count": 1000 } }));
        assert_eq!(calculate_engagement_rate(&plays), Some(json!(0.12)));
    }

    #[test]
    fn test_aspect_ratio() {
        let rec = record(json!({ "video_metadata": { "width": 576, "height": 1024 } }));
        assert_eq!(calculate_aspect_ratio(&rec), Some(json!("9:16")));
        let wide = record(json!({ "video_metadata": { "width": 1920, "height": 1080 } }));
        assert_eq!(calculate_aspect_ratio(&wide), Some(json!("16:9")));
        assert_eq!(calculate_aspect_ratio(&record(json!({}))), None);
    }

    #[test]
    fn test_duration_parsing() {
        assert_eq!(parse_duration(&json!("PT4M13S")), Some(253));
        assert_eq!(parse_duration(&json!("PT1M30S")), Some(90));
        assert_eq!(parse_duration(&json!("PT45S")), Some(45));
        assert_eq!(parse_duration(&json!("PT1H")), Some(3600));
        assert_eq!(parse_duration(&json!("4:13")), Some(253));
        assert_eq!(parse_duration(&json!("1:30")), Some(90));
        assert_eq!(parse_duration(&json!("1:23:45")), Some(5025));
        assert_eq!(parse_duration(&json!(77)), Some(77));
        assert_eq!(parse_duration(&json!("soon")), None);
    }

    #[test]
    fn test_is_short() {
        let short = record(json!({ "video_metadata": { "duration": "PT45S" } }));
        assert_eq!(check_is_short(&short), Some(json!(true)));
        let long = record(json!({ "video_metadata": { "duration_seconds": 253 } }));
        assert_eq!(check_is_short(&long), Some(json!(false)));
        assert_eq!(check_is_short(&record(json!({}))), None);
    }

    #[test]
    fn test_attachment_checks_accept_encoded_lists() {
        let rec = record(json!({
            "media_metadata": {
                "attachments": "[{\"type\":\"Video\"},{\"type\":\"photo\"}]"
            }
        }));
        assert_eq!(count_attachments(&rec), Some(json!(2)));
        assert_eq!(check_video_attachments(&rec), Some(json!(true)));
        assert_eq!(check_image_attachments(&rec), Some(json!(true)));
    }

    #[test]
    fn test_reactions_sum() {
        let rec = record(json!({
            "engagement_metrics": {
                "reactions_by_type": [{ "type": "LIKE", "count": 100 }, { "type": "LOVE", "count": 20 }]
            }
        }));
        assert_eq!(sum_reactions_by_type(&rec), Some(json!(120)));
    }

    #[test]
    fn test_counter_sums_saturate() {
        let rec = record(json!({
            "engagement_metrics": {
                "likes": i64::MAX,
                "comments": 1,
                "reactions_by_type": [{ "count": i64::MAX }, { "count": 5 }]
            }
        }));
        assert_eq!(sum_engagement(&rec), Some(json!(i64::MAX)));
        assert_eq!(sum_reactions_by_type(&rec), Some(json!(i64::MAX)));
    }

    #[test]
    fn test_duration_out_of_range_is_none() {
        assert_eq!(parse_duration(&json!("999999999999999999:0:0")), None);
        assert_eq!(parse_duration(&json!(format!("PT{}H", "9".repeat(400)))), None);
        let rec = record(json!({ "video_metadata": { "duration": "999999999999999999:0:0" } }));
        assert_eq!(parse_duration_seconds(&rec), None);
        assert_eq!(check_is_short(&rec), None);
    }

    #[test]
    fn test_language_and_sentiment() {
        let en = record(json!({ "post_content": "This is the best milk for the kids" }));
        assert_eq!(detect_language(&en), Some(json!("en")));
        let sentiment = calculate_sentiment(&en).and_then(|v| v.as_f64()).unwrap();
        assert!(sentiment > 0.0 && sentiment <= 1.0);

        let vi = record(json!({ "post_content": "Sữa này rất ngon cho bé" }));
        assert_eq!(detect_language(&vi), Some(json!("vi")));

        let empty = record(json!({}));
        assert_eq!(detect_language(&empty), Some(json!("unknown")));
        assert_eq!(calculate_sentiment(&empty), Some(json!(0.0)));
    }
}
