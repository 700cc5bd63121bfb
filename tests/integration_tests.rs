//! Integration tests for the normalizer
//!
//! Runs the bundled platform schemas end to end: load, map, score, classify,
//! group and deliver to the NDJSON sinks.
//! Run with: cargo test --test integration_tests

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::{json, Map, Value};

use social_normalizer::media::table::{FACEBOOK, TIKTOK, YOUTUBE};
use social_normalizer::media::{classify, group, MediaType, Priority};
use social_normalizer::partition;
use social_normalizer::pipeline::{BatchProcessor, BatchRequest, Outputs, PipelineConfig, ValidationPolicy};
use social_normalizer::schema::{SchemaDefinition, SchemaRegistry};
use social_normalizer::sink::{NdjsonAnalyticsSink, NdjsonMediaPublisher};
use social_normalizer::{map, map_with_metadata, CrawlMetadata, FieldErrorKind, NormalizedRecord};

fn schema_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("schemas")
}

fn registry() -> SchemaRegistry {
    SchemaRegistry::from_dir(schema_dir())
}

fn schema(platform: &str) -> Arc<SchemaDefinition> {
    registry().latest(platform).unwrap()
}

fn metadata() -> CrawlMetadata {
    CrawlMetadata {
        crawl_id: "crawl-42".into(),
        snapshot_id: "snap-7".into(),
        competitor: "nutifood".into(),
        brand: "growplus".into(),
        category: "dairy".into(),
        crawl_date: "2024-01-16T08:00:00+00:00".into(),
        processed_date: "2024-01-16T08:05:00+00:00".into(),
    }
}

fn tiktok_post() -> Value {
    json!({
        "id": "7301",
        "text": "The new milk is great for the family #milk @nutifood",
        "webVideoUrl": "https://www.tiktok.com/@nutifood/video/7301",
        "createTimeISO": "2024-01-15T10:30:00.000Z",
        "authorMeta": {
            "id": "991",
            "name": "nutifood",
            "nickName": "NutiFood",
            "verified": true,
            "fans": "12,000",
            "avatar": "https://p16.tiktokcdn.com/avatar.jpg"
        },
        "playCount": 1000,
        "diggCount": 100,
        "commentCount": 10,
        "shareCount": 5,
        "collectCount": 3,
        "videoMeta": {
            "duration": 77,
            "width": 576,
            "height": 1024,
            "coverUrl": "https://p16.tiktokcdn.com/cover.jpg"
        },
        "hashtags": [{ "name": "milk" }, { "name": "family" }]
    })
}

fn facebook_post() -> Value {
    json!({
        "post_id": "fb1",
        "url": "https://www.facebook.com/nutifood/posts/fb1",
        "content": "Great news for the whole family #NutiFood",
        "date_posted": "2024-01-15T10:30:00.000Z",
        "page_name": "NutiFood",
        "user_username_raw": "nutifood",
        "likes": 120,
        "num_comments": "15",
        "num_shares": 3,
        "count_reactions_type": [
            { "type": "LIKE", "reaction_count": 100 },
            { "type": "LOVE", "reaction_count": "20" }
        ],
        "attachments": [
            { "id": "a1", "type": "Video", "video_url": "https://video.xx.fbcdn.net/v.mp4",
              "url": "https://scontent.fbcdn.net/t.jpg", "video_length": 30 },
            { "type": "Photo", "url": "https://scontent.fbcdn.net/p.jpg" }
        ],
        "hashtags": ["#NutiFood"],
        "page_logo": "https://scontent.fbcdn.net/logo.jpg"
    })
}

fn youtube_video() -> Value {
    json!({
        "id": "dQw4",
        "title": "The best new product review",
        "text": "Watch this and subscribe",
        "url": "https://www.youtube.com/watch?v=dQw4",
        "date": "2024-01-15",
        "channelName": "NutiFood",
        "channelId": "UC1",
        "viewCount": "2,000",
        "likes": 150,
        "commentsCount": 50,
        "duration": "PT4M13S",
        "thumbnailUrl": "https://i.ytimg.com/vi/dQw4/hq.jpg",
        "hashtags": ["#review"]
    })
}

// ============================================
// SCHEMA REGISTRY
// ============================================

#[test]
fn test_bundled_schemas_load() {
    let registry = registry();
    let loaded = registry.preload().unwrap();

    let mut platforms: Vec<_> = loaded.iter().map(|s| s.platform.clone()).collect();
    platforms.sort();
    assert_eq!(platforms, vec!["facebook", "tiktok", "youtube"]);
    assert_eq!(registry.cached_count(), 3);

    for schema in &loaded {
        assert_eq!(schema.version, "1.0.0");
        assert!(!schema.field_mappings.is_empty());
        assert!(schema.validation.required_fields.contains(&"id".to_string()));
    }
}

#[test]
fn test_unknown_platform_is_not_found() {
    let err = registry().latest("instagram").unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn test_registry_returns_the_cached_schema() {
    let registry = registry();
    let first = registry.load("tiktok", "1.0.0").unwrap();
    let second = registry.resolve("tiktok", None).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

// ============================================
// FIELD MAPPING
// ============================================

#[test]
fn test_tiktok_post_maps_completely() {
    let outcome = map_with_metadata(&tiktok_post(), &schema("tiktok"), &metadata());
    let record = &outcome.record;

    assert!(!outcome.has_errors(), "{:?}", outcome.errors);
    assert_eq!(record.get_str("id"), Some("7301_crawl-42"));
    assert_eq!(record.get_str("platform"), Some("tiktok"));
    assert_eq!(record.get_str("competitor"), Some("nutifood"));
    assert_eq!(record.get_str("video_id"), Some("7301"));
    assert_eq!(record.get_str("date_posted"), Some("2024-01-15T10:30:00.000+00:00"));
    assert_eq!(record.get_str("grouped_date"), Some("2024-01-15"));
    assert_eq!(record.get("author_metadata.followers"), Some(&json!(12000)));
    assert_eq!(record.get("author_metadata.verified"), Some(&json!(true)));

    assert_eq!(record.get("engagement_metrics.total_engagement"), Some(&json!(115)));
    assert_eq!(record.get("engagement_metrics.engagement_rate"), Some(&json!(0.115)));
    assert_eq!(record.get_str("video_metadata.aspect_ratio"), Some("9:16"));
    assert_eq!(record.get("video_metadata.is_short"), Some(&json!(false)));
    assert_eq!(record.get("content_analysis.hashtags"), Some(&json!(["milk", "family"])));
    assert_eq!(record.get("content_analysis.hashtag_count"), Some(&json!(2)));
    assert_eq!(record.get_str("content_analysis.language"), Some("en"));

    assert_eq!(record.quality_score(), 1.0);
    assert_eq!(record.schema_version(), Some("1.0.0"));
    assert!(outcome.validation.passed);
}

#[test]
fn test_facebook_post_maps_reactions_and_attachments() {
    let outcome = map_with_metadata(&facebook_post(), &schema("facebook"), &metadata());
    let record = &outcome.record;

    assert_eq!(record.get_str("id"), Some("fb1_crawl-42"));
    assert_eq!(record.get("engagement_metrics.total_reactions"), Some(&json!(120)));
    assert_eq!(record.get("engagement_metrics.total_engagement"), Some(&json!(138)));
    assert_eq!(record.get("engagement_metrics.engagement_rate"), Some(&json!(0.0)));
    assert_eq!(record.get("media_metadata.attachment_count"), Some(&json!(2)));
    assert_eq!(record.get("media_metadata.has_video"), Some(&json!(true)));
    assert_eq!(record.get("media_metadata.has_image"), Some(&json!(true)));
    assert!(record.get("media_metadata.attachments").is_some_and(Value::is_string));
    assert_eq!(record.get_str("post_type"), Some("post"));
    assert_eq!(record.quality_score(), 1.0);
    assert!(outcome.validation.passed);
}

#[test]
fn test_youtube_video_maps_duration_and_rate() {
    let outcome = map_with_metadata(&youtube_video(), &schema("youtube"), &metadata());
    let record = &outcome.record;

    assert_eq!(record.get_str("published_at"), Some("2024-01-15T00:00:00+00:00"));
    assert_eq!(record.get("engagement_metrics.view_count"), Some(&json!(2000)));
    assert_eq!(record.get("video_metadata.duration_seconds"), Some(&json!(253)));
    assert_eq!(record.get("video_metadata.is_short"), Some(&json!(false)));
    assert_eq!(record.get("engagement_metrics.total_engagement"), Some(&json!(200)));
    assert_eq!(record.get("engagement_metrics.engagement_rate"), Some(&json!(0.1)));
    assert_eq!(record.get("content_analysis.title_length"), Some(&json!(27)));
    assert_eq!(record.quality_score(), 1.0);
}

#[test]
fn test_missing_required_field_is_reported() {
    let raw = json!({ "title": "No identifier", "url": "https://www.youtube.com/watch?v=x" });
    let outcome = map(&raw, &schema("youtube"));

    assert!(outcome.record.get("video_id").is_none());
    assert_eq!(outcome.errors_of(FieldErrorKind::MissingRequired).count(), 1);
    assert!(!outcome.validation.passed);
    assert!(outcome.validation.missing_required.contains(&"video_id".to_string()));
}

#[test]
fn test_unparseable_count_falls_back_to_zero() {
    let raw = json!({ "id": "1", "playCount": "not a number" });
    let outcome = map(&raw, &schema("tiktok"));

    assert_eq!(outcome.record.get("engagement_metrics.play_count"), Some(&json!(0)));
    assert_eq!(outcome.errors_of(FieldErrorKind::MissingRequired).count(), 0);
    assert!(outcome
        .errors_of(FieldErrorKind::CoercionFallback)
        .any(|e| e.field == "engagement_metrics.play_count"));
}

#[test]
fn test_mapping_is_deterministic() {
    for (platform, raw) in [
        ("tiktok", tiktok_post()),
        ("facebook", facebook_post()),
        ("youtube", youtube_video()),
    ] {
        let schema = schema(platform);
        let first = map_with_metadata(&raw, &schema, &metadata());
        let second = map_with_metadata(&raw, &schema, &metadata());
        assert_eq!(
            serde_json::to_string(&first.record).unwrap(),
            serde_json::to_string(&second.record).unwrap()
        );
        assert_eq!(first.errors, second.errors);
    }
}

/// Raw record with every mapped source path set to `value`
fn hostile_record(schema: &SchemaDefinition, value: &Value) -> Value {
    let mut raw = Map::new();
    for mapping in &schema.field_mappings {
        mapping.source.write(&mut raw, value.clone());
    }
    Value::Object(raw)
}

#[test]
fn test_every_target_keeps_its_type_for_hostile_input() {
    let hostile = [
        Value::Null,
        json!(true),
        json!(3.5),
        json!(-7),
        json!(""),
        json!("garbage"),
        json!([1, { "a": null }, "x"]),
        json!({ "nested": [] }),
    ];

    for schema in registry().preload().unwrap() {
        for value in &hostile {
            let raw = hostile_record(&schema, value);
            let outcome = map_with_metadata(&raw, &schema, &metadata());

            for mapping in &schema.field_mappings {
                if let Some(out) = outcome.record.get(mapping.target.as_str()) {
                    assert!(
                        mapping.target_type.accepts(out),
                        "{}: {} produced {out} for input {value}",
                        schema.platform,
                        mapping.target,
                    );
                }
            }
            for spec in &schema.computed_fields {
                if let Some(out) = outcome.record.get(spec.target.as_str()) {
                    assert!(spec.target_type.accepts(out), "{}: {} produced {out}", schema.platform, spec.target);
                }
            }

            let score = outcome.record.quality_score();
            assert!((0.0..=1.0).contains(&score));
        }
    }
}

#[test]
fn test_counters_and_durations_at_numeric_limits() {
    let extreme = [
        json!(i64::MAX),
        json!(i64::MIN),
        json!(u64::MAX),
        json!(f64::MAX),
        json!("999999999999999999:0:0"),
        json!("PT99999999999999999999999H"),
    ];

    for schema in registry().preload().unwrap() {
        for value in &extreme {
            let raw = hostile_record(&schema, value);
            let outcome = map_with_metadata(&raw, &schema, &metadata());

            for spec in &schema.computed_fields {
                if let Some(out) = outcome.record.get(spec.target.as_str()) {
                    assert!(spec.target_type.accepts(out), "{}: {} produced {out}", schema.platform, spec.target);
                }
            }
            assert!((0.0..=1.0).contains(&outcome.record.quality_score()));
        }
    }

    let mut post = tiktok_post();
    post["diggCount"] = json!(i64::MAX);
    post["commentCount"] = json!(1);
    let outcome = map_with_metadata(&post, &schema("tiktok"), &metadata());
    assert_eq!(outcome.record.get("engagement_metrics.total_engagement"), Some(&json!(i64::MAX)));

    let mut video = youtube_video();
    video["duration"] = json!("999999999999999999:0:0");
    let outcome = map_with_metadata(&video, &schema("youtube"), &metadata());
    assert!(outcome
        .record
        .get("video_metadata.duration_seconds")
        .and_then(Value::as_u64)
        .is_none());
}

#[test]
fn test_empty_record_scores_zero() {
    let outcome = map(&json!({}), &schema("facebook"));
    assert_eq!(outcome.validation.score, 0.0);
    assert!(!outcome.validation.passed);
}

// ============================================
// MEDIA CLASSIFICATION AND GROUPING
// ============================================

#[test]
fn test_single_video_is_high_priority() {
    let raw = json!({
        "id": "7301",
        "webVideoUrl": "https://www.tiktok.com/@nutifood/video/7301",
        "videoMeta": { "duration": 77 }
    });
    let items = classify(&raw, &TIKTOK);

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].media_type, MediaType::Video);
    assert_eq!(items[0].priority, Priority::High);
    assert!(items[0].estimated_size_mb > 0.0);
    assert_eq!(items[0].processing_order, 1);

    let batch = group(items, "tiktok", 1);
    assert_eq!(batch.counts.videos, 1);
    assert_eq!(batch.counts.images, 0);
    assert_eq!(batch.posts_with_media, 1);
}

#[test]
fn test_posts_with_media_counts_distinct_posts() {
    let with_video = json!({
        "post_id": "p1",
        "attachments": [{ "type": "Video", "video_url": "https://video.xx.fbcdn.net/v1.mp4" }]
    });
    let with_image = json!({
        "post_id": "p1",
        "post_image": "https://scontent.fbcdn.net/p1.jpg"
    });

    let items: Vec<_> = [with_video, with_image]
        .iter()
        .flat_map(|raw| classify(raw, &FACEBOOK))
        .collect();
    let batch = group(items, "facebook", 2);

    assert_eq!(batch.counts.videos, 1);
    assert_eq!(batch.counts.images, 1);
    assert_eq!(batch.posts_with_media, 1);
    assert_eq!(batch.total_posts, 2);
}

#[test]
fn test_full_posts_classify_every_asset() {
    let tiktok = classify(&tiktok_post(), &TIKTOK);
    let kinds: Vec<_> = tiktok.iter().map(|i| i.media_type).collect();
    assert_eq!(kinds, vec![MediaType::Video, MediaType::Thumbnail, MediaType::ProfileImage]);
    let orders: Vec<_> = tiktok.iter().map(|i| i.processing_order).collect();
    assert_eq!(orders, vec![1, 2, 3]);

    let youtube = classify(&youtube_video(), &YOUTUBE);
    assert_eq!(youtube.len(), 2);
    assert_eq!(youtube[0].estimated_size_mb, 253.0);

    let batch = group(classify(&facebook_post(), &FACEBOOK), "facebook", 1);
    assert_eq!(batch.counts.videos, 1);
    assert_eq!(batch.counts.images, 1);
    assert_eq!(batch.counts.profile_images, 1);
    assert_eq!(batch.total_media_items(), 3);
}

// ============================================
// PARTITIONING
// ============================================

#[test]
fn test_every_record_lands_in_exactly_one_date_group() {
    let schema = schema("tiktok");
    let mut dated = tiktok_post();
    dated["createTimeISO"] = json!("2024-02-01T00:00:00Z");
    let mut undated = tiktok_post();
    undated["id"] = json!("7399");
    undated.as_object_mut().unwrap().remove("createTimeISO");

    let records: Vec<NormalizedRecord> = [tiktok_post(), dated, undated]
        .iter()
        .map(|raw| map_with_metadata(raw, &schema, &metadata()).record)
        .collect();

    let groups = partition::group_by_upload_date(&records);
    let total: usize = groups.values().map(Vec::len).sum();
    assert_eq!(total, records.len());

    let keys: Vec<_> = groups.keys().cloned().collect();
    assert_eq!(keys, vec!["2024-01-15", "2024-02-01", partition::UNKNOWN_DATE]);
}

// ============================================
// BATCH PIPELINE
// ============================================

fn processor(policy: ValidationPolicy) -> BatchProcessor {
    BatchProcessor::new(
        Arc::new(registry()),
        PipelineConfig {
            worker_count: 3,
            validation_policy: policy,
            ..PipelineConfig::default()
        },
    )
}

fn tiktok_batch() -> Vec<Value> {
    let mut second = tiktok_post();
    second["id"] = json!("7302");
    second["webVideoUrl"] = json!("https://www.tiktok.com/@nutifood/video/7302");
    second["createTimeISO"] = json!("2024-01-16T09:00:00Z");

    vec![
        tiktok_post(),
        json!("not an object"),
        second,
        tiktok_post(),
        json!({ "text": "no identifier" }),
    ]
}

#[tokio::test]
async fn test_batch_isolates_bad_records() {
    let outcome = processor(ValidationPolicy::Keep)
        .process(BatchRequest {
            platform: "tiktok".to_string(),
            version: Some("1.0.0".to_string()),
            records: tiktok_batch(),
            metadata: metadata(),
        })
        .await
        .unwrap();
    let report = &outcome.report;

    assert_eq!(report.total, 5);
    assert_eq!(report.record_errors, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.processed, 3);
    assert_eq!(report.validation_failed, 1);
    assert_eq!(outcome.failures[0].index, 1);

    // two posts, each with a video, a cover and the same avatar URL
    assert_eq!(outcome.media.counts.videos, 2);
    assert_eq!(outcome.media.posts_with_media, 2);
    assert_eq!(outcome.media.total_posts, 5);
}

#[tokio::test]
async fn test_batch_delivery_writes_partitions_and_one_event() {
    let dir = tempfile::tempdir().unwrap();
    let processor = processor(ValidationPolicy::Quarantine);
    let meta = metadata();

    let outcome = processor
        .process(BatchRequest {
            platform: "tiktok".to_string(),
            version: None,
            records: tiktok_batch(),
            metadata: meta.clone(),
        })
        .await
        .unwrap();
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.quarantined.len(), 1);

    let records_sink = NdjsonAnalyticsSink::new(dir.path().join("records"));
    let outputs = Outputs {
        records: Arc::new(NdjsonAnalyticsSink::new(dir.path().join("records"))),
        quarantine: Some(Arc::new(NdjsonAnalyticsSink::new(dir.path().join("quarantine")))),
        media: Arc::new(NdjsonMediaPublisher::new(dir.path().join("events"), "media-requests")),
    };
    let timestamp = Utc.with_ymd_and_hms(2024, 1, 16, 8, 10, 0).unwrap();
    let delivery = processor.deliver(&outcome, &meta, &outputs, timestamp).await.unwrap();

    assert_eq!(delivery.records_written, 2);
    assert_eq!(delivery.quarantined_written, 1);
    let receipt = delivery.media_receipt.expect("media event published");
    assert_eq!(receipt.event_id, "crawl-42_snap-7_batch_media");

    for day in ["2024-01-15", "2024-01-16"] {
        let path = records_sink.file_for("tiktok", &meta, day);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 1, "{}", path.display());
    }

    let events = std::fs::read_to_string(dir.path().join("events").join("media-requests.jsonl")).unwrap();
    let lines: Vec<_> = events.lines().collect();
    assert_eq!(lines.len(), 1);

    let envelope: Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(envelope["payload"]["event_type"], json!("batch-media-download-requested"));
    assert_eq!(envelope["payload"]["data"]["batch_summary"]["total_posts"], json!(5));
}
