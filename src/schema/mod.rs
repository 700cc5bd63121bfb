//! Versioned per-platform schema definitions
//!
//! A schema document is parsed once, checked, and turned into an immutable
//! [`SchemaDefinition`] whose preprocessing and computation names are already
//! resolved to functions. Anything wrong with a document is reported at load
//! time as `SchemaValidation` so that no record is ever mapped with a broken
//! schema.

mod document;
pub mod registry;
pub mod store;
pub mod version;

pub use registry::SchemaRegistry;
pub use store::{FsSchemaStore, MemorySchemaStore, SchemaStore};

use crate::error::{NormalizerError, Result};
use crate::mapping::computed::{self, ComputedFn};
use crate::mapping::path::FieldPath;
use crate::mapping::preprocess::{self, PreprocessFn};
use crate::validation;
use document::{ComputedFieldDocument, FieldMappingDocument, SchemaDocument};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// Version stamped into `processing_metadata.processing_version`
pub const PROCESSING_VERSION: &str = "1.0.0";

pub const QUALITY_SCORE_FIELD: &str = "processing_metadata.data_quality_score";
pub const SCHEMA_VERSION_FIELD: &str = "processing_metadata.schema_version";
pub const PROCESSING_VERSION_FIELD: &str = "processing_metadata.processing_version";

/// Fields the engine fills from crawl metadata
pub const BASE_FIELDS: &[&str] = &[
    "id",
    "crawl_id",
    "snapshot_id",
    "platform",
    "competitor",
    "brand",
    "category",
    "crawl_date",
    "processed_date",
];

const RESERVED_FIELDS: &[&str] = &[QUALITY_SCORE_FIELD, SCHEMA_VERSION_FIELD, PROCESSING_VERSION_FIELD];

const DEFAULT_ID_SOURCE_FIELDS: &[&str] = &["post_id", "id"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetType {
    #[serde(rename = "STRING")]
    String,
    #[serde(rename = "INT64")]
    Int64,
    #[serde(rename = "FLOAT64")]
    Float64,
    #[serde(rename = "BOOL")]
    Bool,
    #[serde(rename = "ARRAY<STRING>")]
    StringArray,
    #[serde(rename = "JSON")]
    Json,
}

impl TargetType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "STRING" => Some(TargetType::String),
            "INT64" | "INTEGER" => Some(TargetType::Int64),
            "FLOAT64" | "FLOAT" => Some(TargetType::Float64),
            "BOOL" | "BOOLEAN" => Some(TargetType::Bool),
            "ARRAY<STRING>" | "REPEATED_STRING" => Some(TargetType::StringArray),
            "JSON" => Some(TargetType::Json),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::String => "STRING",
            TargetType::Int64 => "INT64",
            TargetType::Float64 => "FLOAT64",
            TargetType::Bool => "BOOL",
            TargetType::StringArray => "ARRAY<STRING>",
            TargetType::Json => "JSON",
        }
    }

    /// Whether `value` already has this type's JSON shape
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            TargetType::String | TargetType::Json => value.is_string(),
            TargetType::Int64 => value.is_i64(),
            TargetType::Float64 => value.is_number(),
            TargetType::Bool => value.is_boolean(),
            TargetType::StringArray => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-field format check applied after coercion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatTag {
    NonEmptyString,
    UrlFormat,
    EmailFormat,
    TimestampFormat,
}

impl FormatTag {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "non_empty_string" => Some(FormatTag::NonEmptyString),
            "url_format" => Some(FormatTag::UrlFormat),
            "email_format" => Some(FormatTag::EmailFormat),
            "timestamp_format" => Some(FormatTag::TimestampFormat),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FormatTag::NonEmptyString => "non_empty_string",
            FormatTag::UrlFormat => "url_format",
            FormatTag::EmailFormat => "email_format",
            FormatTag::TimestampFormat => "timestamp_format",
        }
    }

    pub fn accepts(&self, value: &Value) -> bool {
        let Some(text) = value.as_str() else {
            return false;
        };
        match self {
            FormatTag::NonEmptyString => !text.trim().is_empty(),
            FormatTag::UrlFormat => validation::is_url(text),
            FormatTag::EmailFormat => validation::is_email(text),
            FormatTag::TimestampFormat => validation::is_timestamp(text),
        }
    }
}

/// A preprocessing function resolved from its catalog name
#[derive(Debug, Clone)]
pub struct PreprocessStep {
    pub name: String,
    pub func: PreprocessFn,
}

#[derive(Debug, Clone)]
pub struct FieldMapping {
    /// `category.key` as declared in the document
    pub key: String,
    pub source: FieldPath,
    pub target: FieldPath,
    pub target_type: TargetType,
    pub required: bool,
    pub preprocessing: Vec<PreprocessStep>,
    pub default_value: Option<Value>,
    pub max_length: Option<usize>,
    pub format: Option<FormatTag>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ComputedFieldSpec {
    pub key: String,
    pub target: FieldPath,
    pub target_type: TargetType,
    pub computation: String,
    pub func: ComputedFn,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatValidators {
    pub url: Vec<String>,
    pub timestamp: Vec<String>,
    pub integer: Vec<String>,
    pub boolean: Vec<String>,
}

/// Validation rules with every required mapping target already folded in
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSpec {
    pub required_fields: Vec<String>,
    pub minimum_score: f64,
    pub format_validators: FormatValidators,
}

/// An immutable, fully checked schema
#[derive(Debug, Clone)]
pub struct SchemaDefinition {
    pub platform: String,
    pub version: String,
    pub description: Option<String>,
    pub id_source_fields: Vec<FieldPath>,
    pub field_mappings: Vec<FieldMapping>,
    pub computed_fields: Vec<ComputedFieldSpec>,
    pub validation: ValidationSpec,
}

/// Lightweight summary for listings
#[derive(Debug, Clone, Serialize)]
pub struct SchemaSummary {
    pub platform: String,
    pub version: String,
    pub field_mappings: usize,
    pub computed_fields: usize,
    pub required_fields: Vec<String>,
    pub minimum_score: f64,
}

impl SchemaDefinition {
    /// Parses and checks a schema document
    pub fn parse(text: &str) -> Result<Self> {
        let doc: SchemaDocument = serde_json::from_str(text).map_err(|e| {
            NormalizerError::schema_invalid("unknown", "unknown", format!("malformed document: {e}"))
        })?;
        let (platform, version) = (doc.platform.clone(), doc.schema_version.clone());
        Builder::new(&platform, &version).build(doc)
    }

    /// Every output path this schema writes, base fields included
    pub fn output_fields(&self) -> Vec<&str> {
        BASE_FIELDS
            .iter()
            .copied()
            .chain(RESERVED_FIELDS.iter().copied())
            .chain(self.field_mappings.iter().map(|m| m.target.as_str()))
            .chain(self.computed_fields.iter().map(|c| c.target.as_str()))
            .collect()
    }

    pub fn summary(&self) -> SchemaSummary {
        SchemaSummary {
            platform: self.platform.clone(),
            version: self.version.clone(),
            field_mappings: self.field_mappings.len(),
            computed_fields: self.computed_fields.len(),
            required_fields: self.validation.required_fields.clone(),
            minimum_score: self.validation.minimum_score,
        }
    }
}

struct Builder<'a> {
    platform: &'a str,
    version: &'a str,
}

impl<'a> Builder<'a> {
    fn new(platform: &'a str, version: &'a str) -> Self {
        Self { platform, version }
    }

    fn invalid(&self, reason: impl Into<String>) -> NormalizerError {
        NormalizerError::schema_invalid(self.platform, self.version, reason)
    }

    fn path(&self, raw: &str, context: &str) -> Result<FieldPath> {
        FieldPath::parse(raw).ok_or_else(|| self.invalid(format!("{context}: invalid path '{raw}'")))
    }

    fn target_type(&self, raw: &str, context: &str) -> Result<TargetType> {
        TargetType::from_name(raw)
            .ok_or_else(|| self.invalid(format!("{context}: unknown target type '{raw}'")))
    }

    fn build(&self, doc: SchemaDocument) -> Result<SchemaDefinition> {
        if self.platform.trim().is_empty() {
            return Err(self.invalid("platform is empty"));
        }
        if version::SchemaVersion::parse(self.version).is_none() {
            return Err(self.invalid(format!("unparseable schema_version '{}'", self.version)));
        }

        let id_source_fields = match &doc.id_source_fields {
            Some(fields) if fields.is_empty() => return Err(self.invalid("id_source_fields is empty")),
            Some(fields) => fields
                .iter()
                .map(|f| self.path(f, "id_source_fields"))
                .collect::<Result<Vec<_>>>()?,
            None => DEFAULT_ID_SOURCE_FIELDS
                .iter()
                .map(|f| self.path(f, "id_source_fields"))
                .collect::<Result<Vec<_>>>()?,
        };

        let mut field_mappings = Vec::new();
        for (category, entries) in &doc.field_mappings.0 {
            for (name, raw) in &entries.0 {
                let key = format!("{category}.{name}");
                let entry: FieldMappingDocument = serde_json::from_value(raw.clone())
                    .map_err(|e| self.invalid(format!("mapping {key}: {e}")))?;
                field_mappings.push(self.mapping(key, entry)?);
            }
        }
        if field_mappings.is_empty() {
            return Err(self.invalid("field_mappings is empty"));
        }

        let mut computed_fields = Vec::new();
        for (name, raw) in &doc.computed_fields.0 {
            let entry: ComputedFieldDocument = serde_json::from_value(raw.clone())
                .map_err(|e| self.invalid(format!("computed field {name}: {e}")))?;
            computed_fields.push(self.computed(name.clone(), entry)?);
        }

        self.check_targets(&field_mappings, &computed_fields)?;

        let validation = self.validation(&doc, &field_mappings, &computed_fields)?;

        Ok(SchemaDefinition {
            platform: self.platform.to_string(),
            version: self.version.to_string(),
            description: doc.description.clone(),
            id_source_fields,
            field_mappings,
            computed_fields,
            validation,
        })
    }

    fn mapping(&self, key: String, entry: FieldMappingDocument) -> Result<FieldMapping> {
        let source = self.path(&entry.source_field, &key)?;
        let target = self.path(&entry.target_field, &key)?;
        let target_type = self.target_type(&entry.target_type, &key)?;

        if entry.required && entry.default_value.is_some() {
            return Err(self.invalid(format!("mapping {key}: a required field cannot declare a default_value")));
        }
        if entry.max_length == Some(0) {
            return Err(self.invalid(format!("mapping {key}: max_length must be positive")));
        }

        let preprocessing = entry
            .preprocessing
            .iter()
            .map(|name| {
                preprocess::lookup(name)
                    .map(|func| PreprocessStep {
                        name: name.clone(),
                        func,
                    })
                    .ok_or_else(|| self.invalid(format!("mapping {key}: unknown preprocessing function '{name}'")))
            })
            .collect::<Result<Vec<_>>>()?;

        let format = match &entry.validation {
            Some(tag) => Some(
                FormatTag::from_name(tag)
                    .ok_or_else(|| self.invalid(format!("mapping {key}: unknown validation tag '{tag}'")))?,
            ),
            None => None,
        };

        Ok(FieldMapping {
            key,
            source,
            target,
            target_type,
            required: entry.required,
            preprocessing,
            default_value: entry.default_value,
            max_length: entry.max_length,
            format,
            description: entry.description,
        })
    }

    fn computed(&self, key: String, entry: ComputedFieldDocument) -> Result<ComputedFieldSpec> {
        let context = format!("computed field {key}");
        let target = self.path(&entry.target_field, &context)?;
        let target_type = self.target_type(&entry.target_type, &context)?;
        let func = computed::lookup(&entry.computation).ok_or_else(|| {
            self.invalid(format!("{context}: unknown computation '{}'", entry.computation))
        })?;

        Ok(ComputedFieldSpec {
            key,
            target,
            target_type,
            computation: entry.computation,
            func,
            description: entry.description,
        })
    }

    /// Targets must be unique, must not nest inside each other and must not
    /// collide with base or reserved fields
    fn check_targets(&self, mappings: &[FieldMapping], computed: &[ComputedFieldSpec]) -> Result<()> {
        let fixed: Vec<FieldPath> = BASE_FIELDS
            .iter()
            .chain(RESERVED_FIELDS.iter())
            .filter_map(|f| FieldPath::parse(f))
            .collect();

        let declared: Vec<(&str, &FieldPath)> = mappings
            .iter()
            .map(|m| (m.key.as_str(), &m.target))
            .chain(computed.iter().map(|c| (c.key.as_str(), &c.target)))
            .collect();

        let mut seen = HashSet::new();
        for (key, target) in &declared {
            if !seen.insert(target.as_str()) {
                return Err(self.invalid(format!("{key}: duplicate target field '{target}'")));
            }
            if let Some(clash) = fixed
                .iter()
                .find(|f| f == target || f.is_prefix_of(target) || target.is_prefix_of(f))
            {
                return Err(self.invalid(format!("{key}: target '{target}' collides with engine field '{clash}'")));
            }
        }

        for (key, target) in &declared {
            if let Some((_, inner)) = declared.iter().find(|(_, other)| target.is_prefix_of(other)) {
                return Err(self.invalid(format!("{key}: target '{target}' is a prefix of '{inner}'")));
            }
        }

        Ok(())
    }

    fn validation(
        &self,
        doc: &SchemaDocument,
        mappings: &[FieldMapping],
        computed: &[ComputedFieldSpec],
    ) -> Result<ValidationSpec> {
        let rules = &doc.validation_rules;
        let minimum_score = rules.data_quality_thresholds.minimum_score;
        if !(0.0..=1.0).contains(&minimum_score) {
            return Err(self.invalid(format!("minimum_score {minimum_score} is outside [0, 1]")));
        }

        let produced: HashSet<&str> = BASE_FIELDS
            .iter()
            .copied()
            .chain(mappings.iter().map(|m| m.target.as_str()))
            .chain(computed.iter().map(|c| c.target.as_str()))
            .collect();
        let known = |field: &String, context: &str| -> Result<()> {
            if produced.contains(field.as_str()) {
                Ok(())
            } else {
                Err(self.invalid(format!("{context} names '{field}', which no mapping produces")))
            }
        };

        let mut required_fields: Vec<String> = Vec::new();
        for field in &rules.required_fields {
            known(field, "required_fields")?;
            if !required_fields.contains(field) {
                required_fields.push(field.clone());
            }
        }
        for mapping in mappings.iter().filter(|m| m.required) {
            let target = mapping.target.as_str().to_string();
            if !required_fields.contains(&target) {
                required_fields.push(target);
            }
        }

        let mut formats = FormatValidators::default();
        for (validator, fields) in &rules.format_validators {
            let context = format!("format_validators.{validator}");
            for field in fields {
                known(field, &context)?;
            }
            let slot = match validator.as_str() {
                "url" => &mut formats.url,
                "timestamp" => &mut formats.timestamp,
                "integer" => &mut formats.integer,
                "boolean" => &mut formats.boolean,
                other => return Err(self.invalid(format!("unknown format validator '{other}'"))),
            };
            slot.extend(fields.iter().cloned());
        }

        Ok(ValidationSpec {
            required_fields,
            minimum_score,
            format_validators: formats,
        })
    }
}
