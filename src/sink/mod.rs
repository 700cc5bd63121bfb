//! Output collaborators
//!
//! The core hands normalized records to an [`AnalyticsSink`] and the media
//! batch event to a [`MediaEventPublisher`]. Transport lives behind these
//! traits; the NDJSON implementations write local files.

pub mod ndjson;

pub use ndjson::{NdjsonAnalyticsSink, NdjsonMediaPublisher};

use crate::error::Result;
use crate::mapping::{CrawlMetadata, NormalizedRecord};
use crate::media::MediaBatchEvent;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Row-oriented store for normalized records
#[async_trait::async_trait]
pub trait AnalyticsSink: Send + Sync {
    /// Inserts records and returns how many were written
    async fn insert(
        &self,
        platform: &str,
        metadata: &CrawlMetadata,
        records: &[NormalizedRecord],
    ) -> Result<usize>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub message_id: String,
    pub event_id: String,
    pub topic: String,
}

/// Hands media batch events to the download pipeline
#[async_trait::async_trait]
pub trait MediaEventPublisher: Send + Sync {
    async fn publish(&self, event: &MediaBatchEvent) -> Result<PublishReceipt>;

    fn name(&self) -> &str;
}

/// Publishes `event` unless it carries no media
pub async fn publish_if_any(
    publisher: &dyn MediaEventPublisher,
    event: &MediaBatchEvent,
) -> Result<Option<PublishReceipt>> {
    if event.total_media_items() == 0 {
        debug!(event_id = %event.event_id, "No media in batch, nothing to publish");
        return Ok(None);
    }
    publisher.publish(event).await.map(Some)
}
