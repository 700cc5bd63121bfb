//! Per-platform extraction tables
//!
//! Tables are plain data. Adding a platform means adding a table here, not
//! writing a new extractor.

use super::MediaType;

/// One asset found at a fixed location in the record
#[derive(Debug, Clone)]
pub struct MediaRule {
    pub media_type: MediaType,
    /// Candidate URL paths; the first non-empty one wins
    pub url_paths: &'static [&'static str],
    /// Media id template. `{a|b}` renders the first of `a`, `b` that resolves.
    pub id_template: &'static str,
    /// `(metadata key, source path)` pairs copied when present
    pub metadata: &'static [(&'static str, &'static str)],
}

/// Assets found in an array of attachment objects
#[derive(Debug, Clone)]
pub struct CollectionRule {
    pub path: &'static str,
    pub id_field: &'static str,
    /// Used as `{prefix}{index}` when an entry has no id
    pub id_fallback_prefix: &'static str,
    pub type_field: &'static str,
    /// Entries with a URL here are videos
    pub video_url_field: &'static str,
    /// Entries whose type is in `image_types` use this URL
    pub image_url_field: &'static str,
    pub image_types: &'static [&'static str],
    pub video_metadata: &'static [(&'static str, &'static str)],
    pub image_metadata: &'static [(&'static str, &'static str)],
}

#[derive(Debug, Clone)]
pub struct ExtractionTable {
    pub platform: &'static str,
    pub post_id_paths: &'static [&'static str],
    pub post_url_paths: &'static [&'static str],
    pub date_paths: &'static [&'static str],
    /// Walked before `rules`
    pub collections: &'static [CollectionRule],
    pub rules: &'static [MediaRule],
    /// Bytes per second of video used for size estimates
    pub video_bytes_per_second: u64,
    pub image_size_mb: f64,
    pub min_video_size_mb: f64,
}

impl ExtractionTable {
    /// Copy with a different video bitrate assumption
    pub fn with_video_bytes_per_second(&self, bytes_per_second: u64) -> Self {
        Self {
            video_bytes_per_second: bytes_per_second,
            ..self.clone()
        }
    }
}

const ONE_MB_PER_SECOND: u64 = 1_048_576;

pub static FACEBOOK: ExtractionTable = ExtractionTable {
    platform: "facebook",
    post_id_paths: &["post_id", "id"],
    post_url_paths: &["post_url", "url"],
    date_paths: &["date_posted"],
    collections: &[CollectionRule {
        path: "attachments",
        id_field: "id",
        id_fallback_prefix: "fb_attach_",
        type_field: "type",
        video_url_field: "video_url",
        image_url_field: "url",
        image_types: &["photo", "image"],
        video_metadata: &[
            ("duration", "video_length"),
            ("media_type", "type"),
            ("thumbnail_url", "url"),
        ],
        image_metadata: &[("media_type", "type")],
    }],
    rules: &[
        MediaRule {
            media_type: MediaType::ProfileImage,
            url_paths: &["page_logo"],
            id_template: "{page_id|user_username_raw}_page_logo",
            metadata: &[("page_name", "page_name")],
        },
        MediaRule {
            media_type: MediaType::Image,
            url_paths: &["post_image"],
            id_template: "{post_id|id}_post_featured_image",
            metadata: &[],
        },
    ],
    video_bytes_per_second: ONE_MB_PER_SECOND,
    image_size_mb: 0.5,
    min_video_size_mb: 0.1,
};

pub static TIKTOK: ExtractionTable = ExtractionTable {
    platform: "tiktok",
    post_id_paths: &["id", "post_id"],
    post_url_paths: &["webVideoUrl", "url"],
    date_paths: &["createTimeISO", "date_posted"],
    collections: &[],
    rules: &[
        MediaRule {
            media_type: MediaType::Video,
            url_paths: &["webVideoUrl", "video_url"],
            id_template: "{id|post_id}",
            metadata: &[
                ("duration", "videoMeta.duration"),
                ("height", "videoMeta.height"),
                ("width", "videoMeta.width"),
                ("format", "videoMeta.format"),
            ],
        },
        MediaRule {
            media_type: MediaType::Thumbnail,
            url_paths: &["videoMeta.coverUrl", "videoMeta.cover", "cover"],
            id_template: "{id|post_id}_cover",
            metadata: &[],
        },
        MediaRule {
            media_type: MediaType::ProfileImage,
            url_paths: &["authorMeta.avatar"],
            id_template: "{authorMeta.id|authorMeta.name}_avatar",
            metadata: &[("author_name", "authorMeta.name")],
        },
    ],
    video_bytes_per_second: ONE_MB_PER_SECOND,
    image_size_mb: 0.5,
    min_video_size_mb: 0.1,
};

pub static YOUTUBE: ExtractionTable = ExtractionTable {
    platform: "youtube",
    post_id_paths: &["id", "video_id"],
    post_url_paths: &["url", "video_url"],
    date_paths: &["date", "publishedAt", "date_posted"],
    collections: &[],
    rules: &[
        MediaRule {
            media_type: MediaType::Video,
            url_paths: &["url", "video_url"],
            id_template: "{id|video_id}",
            metadata: &[
                ("duration", "duration"),
                ("view_count", "viewCount"),
                ("title", "title"),
            ],
        },
        MediaRule {
            media_type: MediaType::Thumbnail,
            url_paths: &["thumbnailUrl", "thumbnail"],
            id_template: "{id|video_id}_thumbnail",
            metadata: &[],
        },
        MediaRule {
            media_type: MediaType::ProfileImage,
            url_paths: &["channel_metadata.avatar_url"],
            id_template: "{channel_id|channelId}_avatar",
            metadata: &[("channel_name", "channelName")],
        },
        MediaRule {
            media_type: MediaType::Banner,
            url_paths: &["channel_metadata.banner_url"],
            id_template: "{channel_id|channelId}_banner",
            metadata: &[],
        },
    ],
    video_bytes_per_second: ONE_MB_PER_SECOND,
    image_size_mb: 0.5,
    min_video_size_mb: 0.1,
};

static TABLES: [&ExtractionTable; 3] = [&FACEBOOK, &TIKTOK, &YOUTUBE];

/// Built-in table for a platform, case-insensitive
pub fn for_platform(platform: &str) -> Option<&'static ExtractionTable> {
    TABLES
        .iter()
        .copied()
        .find(|t| t.platform.eq_ignore_ascii_case(platform.trim()))
}

pub fn platforms() -> Vec<&'static str> {
    TABLES.iter().map(|t| t.platform).collect()
}
