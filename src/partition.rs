//! Upload-date partitioning
//!
//! Normalized records are written under Hive-style prefixes so the analytics
//! store can prune by platform, competitor, brand, category and upload day.

use crate::mapping::{CrawlMetadata, NormalizedRecord};
use crate::validation::DATE_FIELDS;
use chrono::{DateTime, Datelike, NaiveDate};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

pub const UNKNOWN_DATE: &str = "unknown";

/// `YYYY-MM-DD` of a date-ish value, or `unknown`
pub fn upload_date(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .and_then(parse_day)
        .map(|day| day.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| UNKNOWN_DATE.to_string())
}

fn parse_day(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.date_naive());
    }
    text.get(..10)
        .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
}

/// Upload date of a normalized record, from the first date field that parses
pub fn record_upload_date(record: &NormalizedRecord) -> String {
    DATE_FIELDS
        .iter()
        .map(|field| upload_date(record.get(field)))
        .find(|day| day != UNKNOWN_DATE)
        .unwrap_or_else(|| UNKNOWN_DATE.to_string())
}

/// Groups records by upload date, keeping input order inside each group
pub fn group_by_upload_date(records: &[NormalizedRecord]) -> BTreeMap<String, Vec<&NormalizedRecord>> {
    let mut groups: BTreeMap<String, Vec<&NormalizedRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record_upload_date(record)).or_default().push(record);
    }
    groups
}

fn label(value: &str) -> &str {
    let value = value.trim();
    if value.is_empty() {
        UNKNOWN_DATE
    } else {
        value
    }
}

/// Storage prefix for the records of one upload date
pub fn storage_prefix(platform: &str, metadata: &CrawlMetadata, upload_date: &str) -> String {
    let mut prefix = format!(
        "platform={}/competitor={}/brand={}/category={}/",
        label(platform),
        label(&metadata.competitor),
        label(&metadata.brand),
        label(&metadata.category)
    );

    match NaiveDate::parse_from_str(upload_date, "%Y-%m-%d") {
        Ok(day) => prefix.push_str(&format!(
            "year={}/month={:02}/day={:02}/",
            day.year(),
            day.month(),
            day.day()
        )),
        Err(_) => prefix.push_str("date=unknown/"),
    }
    prefix
}

/// Base path the media downloader stores one batch under
pub fn media_base_path(platform: &str, metadata: &CrawlMetadata, day: NaiveDate) -> String {
    format!(
        "batch_media/{}/competitor={}/brand={}/category={}/year={}/month={:02}/day={:02}/",
        label(platform),
        label(&metadata.competitor),
        label(&metadata.brand),
        label(&metadata.category),
        day.year(),
        day.month(),
        day.day()
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateGroupSummary {
    pub upload_date: String,
    pub prefix: String,
    pub records: usize,
}

/// One summary line per upload-date group
pub fn summarize(platform: &str, metadata: &CrawlMetadata, records: &[NormalizedRecord]) -> Vec<DateGroupSummary> {
    group_by_upload_date(records)
        .into_iter()
        .map(|(upload_date, group)| DateGroupSummary {
            prefix: storage_prefix(platform, metadata, &upload_date),
            upload_date,
            records: group.len(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> NormalizedRecord {
        NormalizedRecord::from_value(value)
    }

    #[test]
    fn test_upload_date() {
        assert_eq!(upload_date(Some(&json!("2024-01-15T10:30:00+07:00"))), "2024-01-15");
        assert_eq!(upload_date(Some(&json!("2024-01-15T23:30:00.000Z"))), "2024-01-15");
        assert_eq!(upload_date(Some(&json!("2024-02-03"))), "2024-02-03");
        assert_eq!(upload_date(Some(&json!(""))), "unknown");
        assert_eq!(upload_date(Some(&json!("last tuesday"))), "unknown");
        assert_eq!(upload_date(Some(&json!(1705314600))), "unknown");
        assert_eq!(upload_date(None), "unknown");
    }

    #[test]
    fn test_grouping_falls_back_across_date_fields() {
        let records = vec![
            record(json!({ "id": "a", "date_posted": "2024-01-15T10:30:00+00:00" })),
            record(json!({ "id": "b", "published_at": "2024-01-16T00:00:00+00:00" })),
            record(json!({ "id": "c" })),
            record(json!({ "id": "d", "date_posted": "2024-01-15T22:00:00+00:00" })),
        ];
        let groups = group_by_upload_date(&records);
        let keys: Vec<_> = groups.keys().cloned().collect();
        assert_eq!(keys, vec!["2024-01-15", "2024-01-16", "unknown"]);
        let ids: Vec<_> = groups["2024-01-15"].iter().map(|r| r.get_str("id").unwrap()).collect();
        assert_eq!(ids, vec!["a", "d"]);
    }

    #[test]
    fn test_storage_prefix() {
        let metadata = CrawlMetadata {
            competitor: "nutifood".into(),
            brand: "growplus".into(),
            ..Default::default()
        };
        assert_eq!(
            storage_prefix("tiktok", &metadata, "2024-01-05"),
            "platform=tiktok/competitor=nutifood/brand=growplus/category=unknown/year=2024/month=01/day=05/"
        );
        assert_eq!(
            storage_prefix("tiktok", &metadata, "unknown"),
            "platform=tiktok/competitor=nutifood/brand=growplus/category=unknown/date=unknown/"
        );
    }

    #[test]
    fn test_summarize() {
        let records = vec![
            record(json!({ "date_posted": "2024-01-15T10:30:00+00:00" })),
            record(json!({ "date_posted": "2024-01-15T11:30:00+00:00" })),
        ];
        let summary = summarize("facebook", &CrawlMetadata::default(), &records);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].records, 2);
        assert!(summary[0].prefix.ends_with("year=2024/month=01/day=15/"));
    }
}
