//! Error types for the normalizer
//!
//! Fatal errors (`SchemaNotFound`, `SchemaValidation`) stop a whole batch.
//! Per-record errors (`RecordProcessing`, `ValidationFailed`) are isolated to
//! the record they belong to. Field-level problems are not errors at all: they
//! are collected as [`FieldError`] values next to the mapped record.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NormalizerError {
    #[error("Schema not found: {platform} v{version}")]
    SchemaNotFound {
        platform: String,
        version: String,
    },

    #[error("Invalid schema {platform} v{version}: {reason}")]
    SchemaValidation {
        platform: String,
        version: String,
        reason: String,
    },

    #[error("Record {index} could not be processed: {reason}")]
    RecordProcessing {
        index: usize,
        reason: String,
    },

    #[error("Record failed validation (missing: {missing:?}, score {score:.2} < {threshold:.2})")]
    ValidationFailed {
        missing: Vec<String>,
        score: f64,
        threshold: f64,
    },

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Sink error: {0}")]
    Sink(String),
}

impl NormalizerError {
    /// Whether the error must abort the whole batch.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NormalizerError::SchemaNotFound { .. } | NormalizerError::SchemaValidation { .. }
        )
    }

    pub(crate) fn schema_invalid(platform: &str, version: &str, reason: impl Into<String>) -> Self {
        NormalizerError::SchemaValidation {
            platform: platform.to_string(),
            version: version.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, NormalizerError>;

/// Kind of a non-fatal, per-field problem
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    MissingRequired,
    CoercionFallback,
    TruncatedValue,
}

impl FieldErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldErrorKind::MissingRequired => "missing_required",
            FieldErrorKind::CoercionFallback => "coercion_fallback",
            FieldErrorKind::TruncatedValue => "truncated_value",
        }
    }
}

/// A non-fatal problem found while mapping one field of one record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldError {
    /// Target field path
    pub field: String,
    /// Source path the value was read from (or the computation name)
    pub source: String,
    pub kind: FieldErrorKind,
    pub detail: String,
}

impl FieldError {
    pub fn new(
        field: impl Into<String>,
        source: impl Into<String>,
        kind: FieldErrorKind,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            source: source.into(),
            kind,
            detail: detail.into(),
        }
    }
}
