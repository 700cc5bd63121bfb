//! Newline-delimited JSON sinks
//!
//! Both sinks only ever append. Records land in
//! `<base>/<storage prefix>/records.jsonl`, media events in
//! `<base>/<topic>.jsonl` wrapped in a small message envelope.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::{AnalyticsSink, MediaEventPublisher, PublishReceipt};
use crate::error::{NormalizerError, Result};
use crate::mapping::{CrawlMetadata, NormalizedRecord};
use crate::media::MediaBatchEvent;
use crate::metrics;
use crate::partition;

const RECORDS_FILE: &str = "records.jsonl";

async fn append_lines(path: &Path, lines: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| NormalizerError::Sink(format!("Failed to create dir {}: {}", parent.display(), e)))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| NormalizerError::Sink(format!("Failed to open {}: {}", path.display(), e)))?;

    let mut buffer = String::new();
    for line in lines {
        buffer.push_str(line);
        buffer.push('\n');
    }

    file.write_all(buffer.as_bytes())
        .await
        .map_err(|e| NormalizerError::Sink(format!("Failed to write {}: {}", path.display(), e)))?;
    file.flush()
        .await
        .map_err(|e| NormalizerError::Sink(format!("Failed to flush {}: {}", path.display(), e)))?;

    Ok(())
}

/// Writes normalized records partitioned by upload date
pub struct NdjsonAnalyticsSink {
    base_path: PathBuf,
}

impl NdjsonAnalyticsSink {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// File the records of one upload date are appended to
    pub fn file_for(&self, platform: &str, metadata: &CrawlMetadata, upload_date: &str) -> PathBuf {
        self.base_path
            .join(partition::storage_prefix(platform, metadata, upload_date))
            .join(RECORDS_FILE)
    }
}

#[async_trait]
impl AnalyticsSink for NdjsonAnalyticsSink {
    async fn insert(
        &self,
        platform: &str,
        metadata: &CrawlMetadata,
        records: &[NormalizedRecord],
    ) -> Result<usize> {
        let mut written = 0;

        for (upload_date, group) in partition::group_by_upload_date(records) {
            let path = self.file_for(platform, metadata, &upload_date);
            let lines = group
                .iter()
                .map(|record| serde_json::to_string(record))
                .collect::<std::result::Result<Vec<_>, _>>()?;

            if let Err(e) = append_lines(&path, &lines).await {
                metrics::record_publish_failure(self.name());
                return Err(e);
            }
            metrics::record_publish_success(self.name());

            debug!(
                platform = %platform,
                upload_date = %upload_date,
                records = lines.len(),
                path = %path.display(),
                "Appended records"
            );
            written += lines.len();
        }

        info!(platform = %platform, written, "Records written to analytics sink");
        Ok(written)
    }

    fn name(&self) -> &str {
        "ndjson_records"
    }
}

/// Envelope written around each published event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub message_id: String,
    pub topic: String,
    pub attributes: BTreeMap<String, String>,
    pub payload: Value,
}

/// Appends media batch events to a topic file
pub struct NdjsonMediaPublisher {
    base_path: PathBuf,
    topic: String,
}

impl NdjsonMediaPublisher {
    pub fn new(base_path: impl Into<PathBuf>, topic: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            topic: topic.into(),
        }
    }

    pub fn topic_file(&self) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", self.topic))
    }
}

#[async_trait]
impl MediaEventPublisher for NdjsonMediaPublisher {
    async fn publish(&self, event: &MediaBatchEvent) -> Result<PublishReceipt> {
        let message_id = uuid::Uuid::new_v4().to_string();
        let summary = &event.data.batch_summary;

        let attributes = BTreeMap::from([
            ("event_type".to_string(), event.event_type.clone()),
            ("platform".to_string(), summary.platform.clone()),
            ("media_count".to_string(), summary.total_media_items.to_string()),
            ("crawl_id".to_string(), event.data.crawl_metadata.crawl_id.clone()),
        ]);

        let envelope = Envelope {
            message_id: message_id.clone(),
            topic: self.topic.clone(),
            attributes,
            payload: serde_json::to_value(event)?,
        };

        let path = self.topic_file();
        if let Err(e) = append_lines(&path, &[serde_json::to_string(&envelope)?]).await {
            metrics::record_publish_failure(self.name());
            return Err(e);
        }
        metrics::record_publish_success(self.name());

        info!(
            event_id = %event.event_id,
            message_id = %message_id,
            topic = %self.topic,
            media_items = summary.total_media_items,
            "Published media batch event"
        );

        Ok(PublishReceipt {
            message_id,
            event_id: event.event_id.clone(),
            topic: self.topic.clone(),
        })
    }

    fn name(&self) -> &str {
        "ndjson_media"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{group, MediaBatchEvent};
    use crate::sink::publish_if_any;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tempfile::tempdir;

    fn metadata() -> CrawlMetadata {
        CrawlMetadata {
            crawl_id: "crawl-1".into(),
            snapshot_id: "snap-1".into(),
            competitor: "nutifood".into(),
            brand: "growplus".into(),
            category: "milk".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_records_are_partitioned_by_upload_date() {
        let dir = tempdir().unwrap();
        let sink = NdjsonAnalyticsSink::new(dir.path());
        let records = vec![
            NormalizedRecord::from_value(json!({ "id": "a", "date_posted": "2024-01-15T10:00:00+00:00" })),
            NormalizedRecord::from_value(json!({ "id": "b", "date_posted": "2024-01-16T10:00:00+00:00" })),
            NormalizedRecord::from_value(json!({ "id": "c", "date_posted": "2024-01-15T12:00:00+00:00" })),
        ];

        let written = sink.insert("tiktok", &metadata(), &records).await.unwrap();
        assert_eq!(written, 3);

        let day_one = sink.file_for("tiktok", &metadata(), "2024-01-15");
        let content = std::fs::read_to_string(&day_one).unwrap();
        let ids: Vec<String> = content
            .lines()
            .map(|l| serde_json::from_str::<Value>(l).unwrap()["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!(day_one.to_string_lossy().contains("platform=tiktok/competitor=nutifood"));

        // A second insert appends rather than truncating
        sink.insert("tiktok", &metadata(), &records[..1]).await.unwrap();
        let content = std::fs::read_to_string(&day_one).unwrap();
        assert_eq!(content.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_publish_writes_envelope() {
        let dir = tempdir().unwrap();
        let publisher = NdjsonMediaPublisher::new(dir.path(), "media-events");
        let record = json!({
            "id": "7301",
            "webVideoUrl": "https://www.tiktok.com/@nutifood/video/7301",
            "videoMeta": { "duration": 77 }
        });
        let items = crate::media::classify(&record, &crate::media::table::TIKTOK);
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 16, 0, 0, 0).unwrap();
        let event = MediaBatchEvent::new(group(items, "tiktok", 1), &metadata(), timestamp, 10);

        let receipt = publish_if_any(&publisher, &event).await.unwrap().unwrap();
        assert_eq!(receipt.event_id, "crawl-1_snap-1_batch_media");

        let content = std::fs::read_to_string(publisher.topic_file()).unwrap();
        let envelope: Envelope = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(envelope.message_id, receipt.message_id);
        assert_eq!(envelope.attributes["media_count"], "1");
        assert_eq!(envelope.payload["data"]["batch_summary"]["media_counts"]["videos"], 1);
    }

    #[tokio::test]
    async fn test_empty_batch_is_not_published() {
        let dir = tempdir().unwrap();
        let publisher = NdjsonMediaPublisher::new(dir.path(), "media-events");
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 16, 0, 0, 0).unwrap();
        let event = MediaBatchEvent::new(group(Vec::new(), "tiktok", 2), &metadata(), timestamp, 10);

        assert!(publish_if_any(&publisher, &event).await.unwrap().is_none());
        assert!(!publisher.topic_file().exists());
    }
}
