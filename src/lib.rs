//! Social post normalizer
//!
//! Turns raw per-platform social-media posts into one normalized record shape
//! and a prioritized batch of media references.
//!
//! Features:
//! - Versioned, declarative per-platform schemas checked at load time
//! - Field mapping with named preprocessing and computed-field catalogs
//! - Fixed-rubric data quality scoring
//! - Table-driven media classification and batch grouping
//! - Record-parallel batch processing with per-record isolation
//! - NDJSON sinks partitioned by upload date
//! - Prometheus metrics per stage

pub mod config;
pub mod dedup;
pub mod error;
pub mod mapping;
pub mod media;
pub mod metrics;
pub mod partition;
pub mod pipeline;
pub mod schema;
pub mod sink;
pub mod validation;

pub use error::{FieldError, FieldErrorKind, NormalizerError, Result};
pub use mapping::{map, map_with_metadata, CrawlMetadata, MappingOutcome, NormalizedRecord};
pub use media::{classify, group, MediaBatch, MediaBatchEvent, MediaItem, MediaType};
pub use pipeline::{BatchOutcome, BatchProcessor, BatchReport, BatchRequest, PipelineConfig, ValidationPolicy};
pub use schema::{SchemaDefinition, SchemaRegistry};
pub use validation::{validate, ValidationResult};
