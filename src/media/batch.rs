//! Batch grouper and the outbound media event
//!
//! `group` is a pure fold: the same item list always gives the same batch.
//! The event wraps a batch with crawl context and download hints; its
//! timestamp is passed in so building it never reads the clock either.

use super::{MediaItem, MediaPartition, MediaType};
use crate::mapping::CrawlMetadata;
use crate::partition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const EVENT_TYPE: &str = "batch-media-download-requested";
pub const EVENT_VERSION: &str = "2.0";

const MAX_RETRIES: u32 = 3;
const BASE_TIMEOUT_SECS: u64 = 60;
const PER_ITEM_TIMEOUT_SECS: u64 = 30;
const PER_MB_TIMEOUT_SECS: f64 = 2.0;
const MAX_TIMEOUT_SECS: u64 = 1800;
const LARGE_BATCH_ITEMS: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaCounts {
    pub videos: usize,
    pub images: usize,
    pub profile_images: usize,
    pub banners: usize,
}

impl MediaCounts {
    pub fn total(&self) -> usize {
        self.videos + self.images + self.profile_images + self.banners
    }
}

/// Items split by partition, each list in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaByType {
    pub videos: Vec<MediaItem>,
    pub images: Vec<MediaItem>,
    pub profile_images: Vec<MediaItem>,
    pub banners: Vec<MediaItem>,
}

impl MediaByType {
    fn slot(&mut self, partition: MediaPartition) -> &mut Vec<MediaItem> {
        match partition {
            MediaPartition::Videos => &mut self.videos,
            MediaPartition::Images => &mut self.images,
            MediaPartition::ProfileImages => &mut self.profile_images,
            MediaPartition::Banners => &mut self.banners,
        }
    }

    pub fn get(&self, partition: MediaPartition) -> &[MediaItem] {
        match partition {
            MediaPartition::Videos => &self.videos,
            MediaPartition::Images => &self.images,
            MediaPartition::ProfileImages => &self.profile_images,
            MediaPartition::Banners => &self.banners,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaBatch {
    pub platform: String,
    pub total_posts: usize,
    pub posts_with_media: usize,
    pub counts: MediaCounts,
    pub media_by_type: MediaByType,
}

impl MediaBatch {
    pub fn total_media_items(&self) -> usize {
        self.counts.total()
    }

    pub fn is_empty(&self) -> bool {
        self.total_media_items() == 0
    }

    pub fn total_estimated_mb(&self) -> f64 {
        self.items().map(|item| item.estimated_size_mb).sum()
    }

    /// All items, partition by partition
    pub fn items(&self) -> impl Iterator<Item = &MediaItem> {
        MediaPartition::ALL
            .into_iter()
            .flat_map(move |partition| self.media_by_type.get(partition).iter())
    }

    pub fn partition(&self, partition: MediaPartition) -> &[MediaItem] {
        self.media_by_type.get(partition)
    }

    pub fn count_of(&self, media_type: MediaType) -> usize {
        self.items().filter(|item| item.media_type == media_type).count()
    }
}

/// Partitions `items` by type, keeping their relative order
pub fn group(items: Vec<MediaItem>, platform: &str, post_count: usize) -> MediaBatch {
    let posts_with_media = items
        .iter()
        .map(|item| item.post_id.as_str())
        .collect::<HashSet<_>>()
        .len();

    let mut media_by_type = MediaByType::default();
    for item in items {
        media_by_type.slot(item.media_type.partition()).push(item);
    }

    let counts = MediaCounts {
        videos: media_by_type.videos.len(),
        images: media_by_type.images.len(),
        profile_images: media_by_type.profile_images.len(),
        banners: media_by_type.banners.len(),
    };

    MediaBatch {
        platform: platform.to_string(),
        total_posts: post_count,
        posts_with_media,
        counts,
        media_by_type,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchPriority {
    High,
    Normal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub platform: String,
    pub total_posts: usize,
    pub posts_with_media: usize,
    pub total_media_items: usize,
    pub total_estimated_mb: f64,
    pub media_counts: MediaCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub priority: BatchPriority,
    pub max_retries: u32,
    pub timeout_seconds: u64,
    pub parallel_downloads: usize,
}

impl ProcessingConfig {
    /// Download hints derived from item counts and sizes only
    pub fn for_batch(batch: &MediaBatch, max_parallel: usize) -> Self {
        let items = batch.total_media_items();
        let video_heavy = batch.counts.videos * 2 > items;
        let priority = if video_heavy || items > LARGE_BATCH_ITEMS {
            BatchPriority::High
        } else {
            BatchPriority::Normal
        };

        let size_secs = (batch.total_estimated_mb() * PER_MB_TIMEOUT_SECS).ceil().max(0.0) as u64;
        let timeout_seconds = (BASE_TIMEOUT_SECS + PER_ITEM_TIMEOUT_SECS * items as u64 + size_secs)
            .min(MAX_TIMEOUT_SECS);

        Self {
            priority,
            max_retries: MAX_RETRIES,
            timeout_seconds,
            parallel_downloads: max_parallel.min(items).max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub base_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaBatchData {
    pub batch_summary: BatchSummary,
    pub media_by_type: MediaByType,
    pub crawl_metadata: CrawlMetadata,
    pub processing_config: ProcessingConfig,
    pub storage_config: StorageConfig,
}

/// The single event handed to the media download pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaBatchEvent {
    pub event_type: String,
    pub event_id: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub data: MediaBatchData,
}

impl MediaBatchEvent {
    pub fn new(batch: MediaBatch, metadata: &CrawlMetadata, timestamp: DateTime<Utc>, max_parallel: usize) -> Self {
        let batch_summary = BatchSummary {
            platform: batch.platform.clone(),
            total_posts: batch.total_posts,
            posts_with_media: batch.posts_with_media,
            total_media_items: batch.total_media_items(),
            total_estimated_mb: (batch.total_estimated_mb() * 1000.0).round() / 1000.0,
            media_counts: batch.counts,
        };
        let processing_config = ProcessingConfig::for_batch(&batch, max_parallel);
        let base_path = partition::media_base_path(&batch.platform, metadata, timestamp.date_naive());

        Self {
            event_type: EVENT_TYPE.to_string(),
            event_id: format!("{}_{}_batch_media", metadata.crawl_id, metadata.snapshot_id),
            version: EVENT_VERSION.to_string(),
            timestamp,
            data: MediaBatchData {
                batch_summary,
                media_by_type: batch.media_by_type,
                crawl_metadata: metadata.clone(),
                processing_config,
                storage_config: StorageConfig { base_path },
            },
        }
    }

    pub fn total_media_items(&self) -> usize {
        self.data.batch_summary.total_media_items
    }
}
