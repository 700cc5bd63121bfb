//! Field mapping engine
//!
//! Turns one raw platform record into a normalized record by walking the
//! schema's field mappings in order, then its computed fields in order, then
//! stamping processing metadata and the quality score. Mapping is a pure
//! function of `(raw, schema, metadata)`: the same inputs always give a
//! byte-identical record, and nothing in here reads the clock.

pub mod coerce;
pub mod computed;
pub mod path;
pub mod preprocess;

use crate::error::{FieldError, FieldErrorKind};
use crate::schema::{
    ComputedFieldSpec, FieldMapping, SchemaDefinition, PROCESSING_VERSION, PROCESSING_VERSION_FIELD,
    QUALITY_SCORE_FIELD, SCHEMA_VERSION_FIELD,
};
use crate::validation::{self, ValidationResult};
use coerce::{coerce, truncate};
use path::FieldPath;
use preprocess::Preprocessed;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Crawl-level labels copied onto every record of a batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlMetadata {
    #[serde(default)]
    pub crawl_id: String,
    #[serde(default)]
    pub snapshot_id: String,
    #[serde(default)]
    pub competitor: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub crawl_date: String,
    /// Supplied by the caller so that mapping stays deterministic
    #[serde(default)]
    pub processed_date: String,
}

/// Normalized output record. Keys serialize in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedRecord(Map<String, Value>);

impl NormalizedRecord {
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Objects become records; any other value gives an empty record
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self(fields),
            _ => Self::default(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        path::lookup_in(&self.0, field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn quality_score(&self) -> f64 {
        self.get(QUALITY_SCORE_FIELD)
            .and_then(Value::as_f64)
            .unwrap_or_else(|| validation::quality_score(&self.0))
    }

    pub fn schema_version(&self) -> Option<&str> {
        self.get_str(SCHEMA_VERSION_FIELD)
    }
}

/// Everything produced for one raw record
#[derive(Debug, Clone, Serialize)]
pub struct MappingOutcome {
    pub record: NormalizedRecord,
    pub errors: Vec<FieldError>,
    pub validation: ValidationResult,
}

impl MappingOutcome {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors_of(&self, kind: FieldErrorKind) -> impl Iterator<Item = &FieldError> {
        self.errors.iter().filter(move |e| e.kind == kind)
    }
}

/// Maps a raw record without crawl-level base fields
pub fn map(raw: &Value, schema: &SchemaDefinition) -> MappingOutcome {
    run(raw, schema, None)
}

/// Maps a raw record and fills the base fields from `metadata`
pub fn map_with_metadata(raw: &Value, schema: &SchemaDefinition, metadata: &CrawlMetadata) -> MappingOutcome {
    run(raw, schema, Some(metadata))
}

/// Source post id, taken from the first id field that resolves
pub fn post_id(raw: &Value, schema: &SchemaDefinition) -> Option<String> {
    schema
        .id_source_fields
        .iter()
        .filter_map(|field| field.resolve(raw))
        .find_map(path::scalar_to_string)
}

fn run(raw: &Value, schema: &SchemaDefinition, metadata: Option<&CrawlMetadata>) -> MappingOutcome {
    let mut out = Map::new();
    let mut errors = Vec::new();

    if let Some(metadata) = metadata {
        write_base_fields(&mut out, raw, schema, metadata);
    }

    for mapping in &schema.field_mappings {
        apply_mapping(raw, mapping, &mut out, &mut errors);
    }

    for spec in &schema.computed_fields {
        apply_computed(spec, &mut out, &mut errors);
    }

    write_fixed(&mut out, SCHEMA_VERSION_FIELD, json!(schema.version));
    write_fixed(&mut out, PROCESSING_VERSION_FIELD, json!(PROCESSING_VERSION));
    let score = validation::quality_score(&out);
    write_fixed(&mut out, QUALITY_SCORE_FIELD, json!(score));

    let record = NormalizedRecord(out);
    let validation = validation::validate(&record, &schema.validation);

    MappingOutcome {
        record,
        errors,
        validation,
    }
}

fn write_fixed(out: &mut Map<String, Value>, field: &str, value: Value) {
    if let Some(path) = FieldPath::parse(field) {
        path.write(out, value);
    }
}

fn write_base_fields(out: &mut Map<String, Value>, raw: &Value, schema: &SchemaDefinition, meta: &CrawlMetadata) {
    let id = format!("{}_{}", post_id(raw, schema).unwrap_or_default(), meta.crawl_id);
    let fields = [
        ("id", id.as_str()),
        ("crawl_id", meta.crawl_id.as_str()),
        ("snapshot_id", meta.snapshot_id.as_str()),
        ("platform", schema.platform.as_str()),
        ("competitor", meta.competitor.as_str()),
        ("brand", meta.brand.as_str()),
        ("category", meta.category.as_str()),
        ("crawl_date", meta.crawl_date.as_str()),
        ("processed_date", meta.processed_date.as_str()),
    ];
    for (field, value) in fields {
        out.insert(field.to_string(), Value::String(value.to_string()));
    }
}

fn apply_mapping(raw: &Value, mapping: &FieldMapping, out: &mut Map<String, Value>, errors: &mut Vec<FieldError>) {
    let target = mapping.target.as_str();
    let source = mapping.source.as_str();

    let Some(found) = mapping.source.resolve(raw) else {
        if mapping.required {
            errors.push(FieldError::new(
                target,
                source,
                FieldErrorKind::MissingRequired,
                "required source field is absent",
            ));
        } else if let Some(default) = &mapping.default_value {
            mapping.target.write(out, coerce(default, mapping.target_type).value);
        }
        return;
    };

    let mut value = found.clone();
    for step in &mapping.preprocessing {
        match (step.func)(&value) {
            Preprocessed::Converted(v) => value = v,
            Preprocessed::Fallback(v) => {
                errors.push(FieldError::new(
                    target,
                    source,
                    FieldErrorKind::CoercionFallback,
                    format!("{} could not convert the value", step.name),
                ));
                value = v;
            }
        }
    }

    let coerced = coerce(&value, mapping.target_type);
    if let Some(detail) = coerced.fallback {
        errors.push(FieldError::new(target, source, FieldErrorKind::CoercionFallback, detail));
    }
    let mut value = coerced.value;

    if let Some(tag) = mapping.format {
        if !tag.accepts(&value) {
            errors.push(FieldError::new(
                target,
                source,
                FieldErrorKind::CoercionFallback,
                format!("value failed {}", tag.as_str()),
            ));
            match &mapping.default_value {
                Some(default) => value = coerce(default, mapping.target_type).value,
                None => return,
            }
        }
    }

    if let (Some(max), Value::String(text)) = (mapping.max_length, &value) {
        if let Some(cut) = truncate(text, max) {
            errors.push(FieldError::new(
                target,
                source,
                FieldErrorKind::TruncatedValue,
                format!("truncated to {max} characters"),
            ));
            value = Value::String(cut);
        }
    }

    mapping.target.write(out, value);
}

fn apply_computed(spec: &ComputedFieldSpec, out: &mut Map<String, Value>, errors: &mut Vec<FieldError>) {
    let Some(value) = (spec.func)(out) else {
        return;
    };

    let coerced = coerce(&value, spec.target_type);
    if let Some(detail) = coerced.fallback {
        errors.push(FieldError::new(
            spec.target.as_str(),
            spec.computation.as_str(),
            FieldErrorKind::CoercionFallback,
            detail,
        ));
    }
    spec.target.write(out, coerced.value);
}
