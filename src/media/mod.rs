//! Media discovery and batching
//!
//! The classifier walks a platform's [`ExtractionTable`] over a raw record and
//! emits one [`MediaItem`] per discoverable asset. The batch module groups the
//! items of a whole crawl and prepares the single event that hands them to the
//! downloader.

pub mod batch;
pub mod classifier;
pub mod table;

pub use batch::{group, MediaBatch, MediaBatchEvent};
pub use classifier::classify;
pub use table::ExtractionTable;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Video,
    Image,
    Thumbnail,
    ProfileImage,
    Banner,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Video => "video",
            MediaType::Image => "image",
            MediaType::Thumbnail => "thumbnail",
            MediaType::ProfileImage => "profile_image",
            MediaType::Banner => "banner",
        }
    }

    /// Batch partition this type lands in. Thumbnails travel with images.
    pub fn partition(&self) -> MediaPartition {
        match self {
            MediaType::Video => MediaPartition::Videos,
            MediaType::Image | MediaType::Thumbnail => MediaPartition::Images,
            MediaType::ProfileImage => MediaPartition::ProfileImages,
            MediaType::Banner => MediaPartition::Banners,
        }
    }

    pub fn priority(&self) -> Priority {
        match self {
            MediaType::Video => Priority::High,
            _ => Priority::Normal,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaPartition {
    Videos,
    Images,
    ProfileImages,
    Banners,
}

impl MediaPartition {
    pub const ALL: [MediaPartition; 4] = [
        MediaPartition::Videos,
        MediaPartition::Images,
        MediaPartition::ProfileImages,
        MediaPartition::Banners,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaPartition::Videos => "videos",
            MediaPartition::Images => "images",
            MediaPartition::ProfileImages => "profile_images",
            MediaPartition::Banners => "banners",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Normal,
}

/// One downloadable asset discovered in a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub url: String,
    pub media_type: MediaType,
    pub media_id: String,
    pub post_id: String,
    pub post_url: String,
    pub date_posted: String,
    pub metadata: Map<String, Value>,
    pub priority: Priority,
    pub estimated_size_mb: f64,
    /// 1-based position among the items of the same post
    pub processing_order: usize,
}
