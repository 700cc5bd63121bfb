//! Batch processing pipeline
//!
//! Implements: resolve schema → dedup → map + classify (per record, parallel)
//! → validation policy → group media → deliver
//!
//! Features:
//! - Record-parallel mapping on a bounded worker pool
//! - Per-record isolation of errors and panics
//! - In-batch duplicate post detection
//! - Keep / quarantine / drop policy for records failing validation
//! - Prometheus metrics per stage

pub mod worker;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dedup::{post_key, DedupStore};
use crate::error::{FieldError, NormalizerError, Result};
use crate::mapping::{self, CrawlMetadata, NormalizedRecord};
use crate::media::{self, table, ExtractionTable, MediaBatch, MediaBatchEvent, MediaItem};
use crate::metrics::{self, STAGE_CLASSIFY, STAGE_GROUP, STAGE_MAP, STAGE_PUBLISH, STAGE_SCHEMA, STAGE_SINK};
use crate::schema::{SchemaDefinition, SchemaRegistry};
use crate::sink::{self, AnalyticsSink, MediaEventPublisher, PublishReceipt};
use crate::time_stage;
use crate::validation::ValidationResult;

// ============================================
// PIPELINE CONFIGURATION
// ============================================

/// What happens to a record that fails validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    /// Returned with the passing records, tagged by its validation result
    Keep,
    /// Routed to a separate list
    Quarantine,
    /// Discarded
    Drop,
}

impl FromStr for ValidationPolicy {
    type Err = NormalizerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "keep" => Ok(ValidationPolicy::Keep),
            "quarantine" => Ok(ValidationPolicy::Quarantine),
            "drop" => Ok(ValidationPolicy::Drop),
            other => Err(NormalizerError::Config(config::ConfigError::Message(format!(
                "unknown validation policy: {other}"
            )))),
        }
    }
}

/// Configuration for batch processing
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Records mapped concurrently
    pub worker_count: usize,
    pub validation_policy: ValidationPolicy,
    /// Upper bound for the downloader's suggested parallelism
    pub max_parallel_downloads: usize,
    /// Overrides the platform table's video bitrate
    pub video_bytes_per_second: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            validation_policy: ValidationPolicy::Keep,
            max_parallel_downloads: 10,
            video_bytes_per_second: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            worker_count: config.worker_count,
            validation_policy: config.validation_policy.parse()?,
            max_parallel_downloads: config.max_parallel_downloads,
            video_bytes_per_second: config.video_bytes_per_second,
        })
    }
}

// ============================================
// BATCH TYPES
// ============================================

/// One batch of already-materialized raw records
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub platform: String,
    /// Pinned schema version; `None` resolves the latest
    pub version: Option<String>,
    pub records: Vec<Value>,
    pub metadata: CrawlMetadata,
}

/// A record that made it through mapping
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedRecord {
    /// Position in the request
    pub index: usize,
    pub record: NormalizedRecord,
    pub field_errors: Vec<FieldError>,
    pub validation: ValidationResult,
    pub media: Vec<MediaItem>,
}

/// A record whose processing failed outright
#[derive(Debug, Clone, Serialize)]
pub struct RecordFailure {
    pub index: usize,
    pub reason: String,
}

impl RecordFailure {
    pub fn new(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index,
            reason: reason.into(),
        }
    }

    pub fn from_error(index: usize, error: NormalizerError) -> Self {
        match error {
            NormalizerError::RecordProcessing { reason, .. } => Self::new(index, reason),
            other => Self::new(index, other.to_string()),
        }
    }

    pub fn into_error(self) -> NormalizerError {
        NormalizerError::RecordProcessing {
            index: self.index,
            reason: self.reason,
        }
    }
}

/// Counts that make partial failure visible without reading logs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub platform: String,
    pub schema_version: String,
    pub total: usize,
    /// Records mapped, whether or not they passed validation
    pub processed: usize,
    pub validation_failed: usize,
    pub record_errors: usize,
    pub duplicates: usize,
    pub quarantined: usize,
    pub dropped: usize,
    pub field_errors: usize,
    pub media_items: usize,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub report: BatchReport,
    /// Passing records, plus failing ones under `ValidationPolicy::Keep`
    pub records: Vec<ProcessedRecord>,
    pub quarantined: Vec<ProcessedRecord>,
    pub failures: Vec<RecordFailure>,
    pub media: MediaBatch,
}

impl BatchOutcome {
    pub fn normalized_records(&self) -> Vec<NormalizedRecord> {
        self.records.iter().map(|p| p.record.clone()).collect()
    }

    pub fn quarantined_records(&self) -> Vec<NormalizedRecord> {
        self.quarantined.iter().map(|p| p.record.clone()).collect()
    }

    /// The outbound media event for this batch
    pub fn media_event(&self, metadata: &CrawlMetadata, timestamp: DateTime<Utc>, max_parallel: usize) -> MediaBatchEvent {
        MediaBatchEvent::new(self.media.clone(), metadata, timestamp, max_parallel)
    }
}

/// Where a processed batch is delivered
pub struct Outputs {
    pub records: Arc<dyn AnalyticsSink>,
    pub quarantine: Option<Arc<dyn AnalyticsSink>>,
    pub media: Arc<dyn MediaEventPublisher>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeliveryReport {
    pub records_written: usize,
    pub quarantined_written: usize,
    pub media_receipt: Option<PublishReceipt>,
}

// ============================================
// BATCH PROCESSOR
// ============================================

pub struct BatchProcessor {
    registry: Arc<SchemaRegistry>,
    config: PipelineConfig,
}

impl BatchProcessor {
    pub fn new(registry: Arc<SchemaRegistry>, config: PipelineConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Built-in extraction table with the configured bitrate override applied
    pub fn extraction_table(&self, platform: &str) -> Option<ExtractionTable> {
        let table = table::for_platform(platform)?;
        Some(match self.config.video_bytes_per_second {
            Some(bps) => table.with_video_bytes_per_second(bps),
            None => table.clone(),
        })
    }

    /// Maps, validates and classifies every record of the batch.
    ///
    /// Only schema errors fail the call; anything wrong with a single record
    /// is reported in the outcome.
    pub async fn process(&self, request: BatchRequest) -> Result<BatchOutcome> {
        let BatchRequest {
            platform,
            version,
            records,
            metadata,
        } = request;

        let schema = time_stage!(STAGE_SCHEMA, { self.registry.resolve(&platform, version.as_deref()) })?;
        let table = self.extraction_table(&schema.platform);
        if table.is_none() {
            warn!(platform = %schema.platform, "No media extraction table, media will not be classified");
        }

        let total = records.len();
        let (jobs, duplicates) = dedup_jobs(records, &schema, &metadata.crawl_id);
        for _ in 0..duplicates {
            metrics::record_outcome(&schema.platform, metrics::OUTCOME_DUPLICATE);
        }

        info!(
            platform = %schema.platform,
            schema_version = %schema.version,
            records = total,
            duplicates,
            workers = self.config.worker_count,
            "Processing batch"
        );

        let ctx = Arc::new(RecordContext {
            schema: schema.clone(),
            table,
            metadata: metadata.clone(),
        });
        let results = time_stage!(STAGE_MAP, {
            worker::run(jobs, self.config.worker_count, move |index, raw| ctx.process(index, raw)).await
        });

        let mut report = BatchReport {
            platform: schema.platform.clone(),
            schema_version: schema.version.clone(),
            total,
            duplicates,
            ..Default::default()
        };
        let mut kept = Vec::new();
        let mut quarantined = Vec::new();
        let mut failures = Vec::new();
        let mut media_items = Vec::new();

        for result in results {
            match result {
                Ok(processed) => {
                    report.processed += 1;
                    report.field_errors += processed.field_errors.len();
                    for error in &processed.field_errors {
                        metrics::record_field_error(&schema.platform, error.kind);
                    }
                    metrics::record_quality_score(&schema.platform, processed.validation.score);
                    media_items.extend(processed.media.iter().cloned());

                    if processed.validation.passed {
                        metrics::record_outcome(&schema.platform, metrics::OUTCOME_MAPPED);
                        kept.push(processed);
                        continue;
                    }

                    report.validation_failed += 1;
                    metrics::record_outcome(&schema.platform, metrics::OUTCOME_VALIDATION_FAILED);
                    debug!(
                        index = processed.index,
                        missing = ?processed.validation.missing_required,
                        score = processed.validation.score,
                        "Record failed validation"
                    );
                    match self.config.validation_policy {
                        ValidationPolicy::Keep => kept.push(processed),
                        ValidationPolicy::Quarantine => {
                            report.quarantined += 1;
                            quarantined.push(processed);
                        }
                        ValidationPolicy::Drop => report.dropped += 1,
                    }
                }
                Err(failure) => {
                    report.record_errors += 1;
                    metrics::record_outcome(&schema.platform, metrics::OUTCOME_ERROR);
                    failures.push(failure);
                }
            }
        }

        let media = time_stage!(STAGE_GROUP, { media::group(media_items, &schema.platform, total) });
        report.media_items = media.total_media_items();
        for partition in media::MediaPartition::ALL {
            let count = media.partition(partition).len() as u64;
            if count > 0 {
                metrics::record_media_items(&schema.platform, partition.as_str(), count);
            }
        }

        info!(
            platform = %report.platform,
            processed = report.processed,
            validation_failed = report.validation_failed,
            record_errors = report.record_errors,
            duplicates = report.duplicates,
            media_items = report.media_items,
            "Batch processed"
        );

        Ok(BatchOutcome {
            report,
            records: kept,
            quarantined,
            failures,
            media,
        })
    }

    /// Writes records to the sinks and publishes the media event
    pub async fn deliver(
        &self,
        outcome: &BatchOutcome,
        metadata: &CrawlMetadata,
        outputs: &Outputs,
        timestamp: DateTime<Utc>,
    ) -> Result<DeliveryReport> {
        let platform = outcome.report.platform.as_str();
        let mut delivery = DeliveryReport::default();

        {
            let _timer = metrics::StageTimer::new(STAGE_SINK);
            delivery.records_written = outputs
                .records
                .insert(platform, metadata, &outcome.normalized_records())
                .await?;

            if let Some(quarantine) = &outputs.quarantine {
                if !outcome.quarantined.is_empty() {
                    delivery.quarantined_written = quarantine
                        .insert(platform, metadata, &outcome.quarantined_records())
                        .await?;
                }
            }
        }

        let event = outcome.media_event(metadata, timestamp, self.config.max_parallel_downloads);
        delivery.media_receipt = {
            let _timer = metrics::StageTimer::new(STAGE_PUBLISH);
            sink::publish_if_any(outputs.media.as_ref(), &event).await?
        };

        info!(
            platform = %platform,
            records_written = delivery.records_written,
            quarantined_written = delivery.quarantined_written,
            media_published = delivery.media_receipt.is_some(),
            "Batch delivered"
        );

        Ok(delivery)
    }
}

/// Drops later copies of a post already seen in this batch
fn dedup_jobs(records: Vec<Value>, schema: &SchemaDefinition, crawl_id: &str) -> (Vec<(usize, Value)>, usize) {
    let seen = DedupStore::new();
    let mut jobs = Vec::with_capacity(records.len());
    let mut duplicates = 0;

    for (index, raw) in records.into_iter().enumerate() {
        if let Some(post_id) = mapping::post_id(&raw, schema) {
            if seen.check_and_mark(&post_key(&schema.platform, &post_id, crawl_id)) {
                duplicates += 1;
                continue;
            }
        }
        jobs.push((index, raw));
    }

    debug!(unique_posts = seen.len(), duplicates, "Deduplicated batch");
    (jobs, duplicates)
}

struct RecordContext {
    schema: Arc<SchemaDefinition>,
    table: Option<ExtractionTable>,
    metadata: CrawlMetadata,
}

impl RecordContext {
    fn process(&self, index: usize, raw: &Value) -> Result<ProcessedRecord> {
        worker::ensure_object(index, raw)?;

        let outcome = mapping::map_with_metadata(raw, &self.schema, &self.metadata);
        let media = match &self.table {
            Some(table) => {
                let _timer = metrics::StageTimer::new(STAGE_CLASSIFY);
                media::classify(raw, table)
            }
            None => Vec::new(),
        };

        Ok(ProcessedRecord {
            index,
            record: outcome.record,
            field_errors: outcome.errors,
            validation: outcome.validation,
            media,
        })
    }
}
