//! On-disk schema document layout
//!
//! Field mappings and computed fields are evaluated in declaration order, so
//! those objects are read into ordered entry lists rather than maps.

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

/// JSON object read as `(key, value)` pairs in document order
#[derive(Debug, Clone, Default)]
pub(crate) struct Ordered<T>(pub Vec<(String, T)>);

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Ordered<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for OrderedVisitor<T> {
            type Value = Ordered<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, T>()? {
                    entries.push((key, value));
                }
                Ok(Ordered(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor(PhantomData))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SchemaDocument {
    pub schema_version: String,
    pub platform: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub id_source_fields: Option<Vec<String>>,
    /// category -> mapping key -> mapping entry
    pub field_mappings: Ordered<Ordered<Value>>,
    #[serde(default)]
    pub computed_fields: Ordered<Value>,
    #[serde(default)]
    pub validation_rules: ValidationRulesDocument,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct FieldMappingDocument {
    pub source_field: String,
    pub target_field: String,
    pub target_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub preprocessing: Vec<String>,
    #[serde(default)]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub validation: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ComputedFieldDocument {
    pub target_field: String,
    pub target_type: String,
    pub computation: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ValidationRulesDocument {
    #[serde(default)]
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub data_quality_thresholds: QualityThresholdsDocument,
    /// validator name (`url`, `timestamp`, `integer`, `boolean`) -> fields
    #[serde(default)]
    pub format_validators: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct QualityThresholdsDocument {
    #[serde(default)]
    pub minimum_score: f64,
}
