//! Prometheus metrics for the normalizer
//!
//! Metrics include:
//! - records mapped, failed and deduplicated per platform
//! - field errors by kind
//! - quality score distribution
//! - latency per stage (histogram)
//! - media items by type
//!
//! There is no HTTP endpoint. `gather_metrics` renders the text exposition
//! format and the CLI writes it to a file when asked to.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramOpts, HistogramVec, IntCounterVec,
    Encoder, TextEncoder,
};
use std::path::Path;
use tracing::{error, info};

use crate::error::FieldErrorKind;

pub const STAGE_SCHEMA: &str = "schema";
pub const STAGE_MAP: &str = "map";
pub const STAGE_CLASSIFY: &str = "classify";
pub const STAGE_GROUP: &str = "group";
pub const STAGE_SINK: &str = "sink";
pub const STAGE_PUBLISH: &str = "publish";

static SCHEMA_LOADS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "normalizer_schema_loads_total",
        "Schema documents parsed into the registry cache",
        &["platform"]
    )
    .expect("Failed to create schema_loads metric")
});

static RECORDS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "normalizer_records_total",
        "Records handled by outcome",
        &["platform", "outcome"]
    )
    .expect("Failed to create records metric")
});

static FIELD_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "normalizer_field_errors_total",
        "Non-fatal field errors by kind",
        &["platform", "kind"]
    )
    .expect("Failed to create field_errors metric")
});

static QUALITY_SCORE: Lazy<HistogramVec> = Lazy::new(|| {
    let buckets = vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0];
    register_histogram_vec!(
        HistogramOpts::new("normalizer_quality_score", "Data quality score of mapped records")
            .buckets(buckets),
        &["platform"]
    )
    .expect("Failed to create quality_score metric")
});

static STAGE_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    let buckets = vec![
        0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
    ];
    register_histogram_vec!(
        HistogramOpts::new(
            "normalizer_stage_latency_seconds",
            "Latency of each normalizer stage in seconds"
        )
        .buckets(buckets),
        &["stage"]
    )
    .expect("Failed to create stage_latency metric")
});

static MEDIA_ITEMS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "normalizer_media_items_total",
        "Media items extracted by type",
        &["platform", "media_type"]
    )
    .expect("Failed to create media_items metric")
});

static PUBLISH_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "normalizer_publish_total",
        "Sink writes and event publishes by status",
        &["target", "status"]
    )
    .expect("Failed to create publish_total metric")
});

pub const OUTCOME_MAPPED: &str = "mapped";
pub const OUTCOME_VALIDATION_FAILED: &str = "validation_failed";
pub const OUTCOME_ERROR: &str = "error";
pub const OUTCOME_DUPLICATE: &str = "duplicate";

pub fn record_schema_load(platform: &str) {
    SCHEMA_LOADS.with_label_values(&[platform]).inc();
}

pub fn record_outcome(platform: &str, outcome: &str) {
    RECORDS.with_label_values(&[platform, outcome]).inc();
}

pub fn record_field_error(platform: &str, kind: FieldErrorKind) {
    FIELD_ERRORS.with_label_values(&[platform, kind.as_str()]).inc();
}

pub fn record_quality_score(platform: &str, score: f64) {
    QUALITY_SCORE.with_label_values(&[platform]).observe(score);
}

pub fn record_stage_latency(stage: &str, latency_secs: f64) {
    STAGE_LATENCY.with_label_values(&[stage]).observe(latency_secs);
}

pub fn record_media_items(platform: &str, media_type: &str, count: u64) {
    MEDIA_ITEMS.with_label_values(&[platform, media_type]).inc_by(count);
}

pub fn record_publish_success(target: &str) {
    PUBLISH_TOTAL.with_label_values(&[target, "success"]).inc();
}

pub fn record_publish_failure(target: &str) {
    PUBLISH_TOTAL.with_label_values(&[target, "failure"]).inc();
}

/// Collects all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}

/// Writes the current metrics snapshot to `path`
pub async fn write_metrics_file(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, gather_metrics()).await?;
    info!(path = %path.display(), "Metrics snapshot written");
    Ok(())
}

/// A timer for measuring stage latency
pub struct StageTimer {
    stage: &'static str,
    start: std::time::Instant,
}

impl StageTimer {
    pub fn new(stage: &'static str) -> Self {
        Self {
            stage,
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed().as_secs_f64();
        record_stage_latency(self.stage, elapsed);
    }
}

/// Macro for timing a stage
#[macro_export]
macro_rules! time_stage {
    ($stage:expr, $block:expr) => {{
        let _timer = $crate::metrics::StageTimer::new($stage);
        $block
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_metrics() {
        record_outcome("tiktok", OUTCOME_MAPPED);
        record_field_error("tiktok", FieldErrorKind::CoercionFallback);
        record_quality_score("tiktok", 0.8);
        record_media_items("tiktok", "video", 2);

        let metrics = gather_metrics();
        assert!(metrics.contains("normalizer_records_total"));
        assert!(metrics.contains("normalizer_field_errors_total"));
        assert!(metrics.contains("coercion_fallback"));
        assert!(metrics.contains("normalizer_quality_score"));
        assert!(metrics.contains("normalizer_media_items_total"));
    }

    #[test]
    fn test_stage_timer() {
        let total = time_stage!(STAGE_MAP, { 2 + 2 });
        assert_eq!(total, 4);

        let metrics = gather_metrics();
        assert!(metrics.contains("normalizer_stage_latency_seconds"));
    }

    #[tokio::test]
    async fn test_write_metrics_file() {
        record_publish_success("ndjson");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("metrics.prom");
        write_metrics_file(&path).await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("normalizer_publish_total"));
    }
}
