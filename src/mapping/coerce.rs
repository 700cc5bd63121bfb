//! Total type coercion
//!
//! `coerce` never fails. When a value cannot be represented in the target
//! type it returns the type's neutral value plus a short description of what
//! was lost, which the engine turns into a field error.

use crate::mapping::preprocess::{lenient_float, lenient_int};
use crate::schema::TargetType;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct Coerced {
    pub value: Value,
    pub fallback: Option<String>,
}

impl Coerced {
    fn exact(value: Value) -> Self {
        Self { value, fallback: None }
    }

    fn fallback(value: Value, detail: impl Into<String>) -> Self {
        Self {
            value,
            fallback: Some(detail.into()),
        }
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn coerce(value: &Value, target: TargetType) -> Coerced {
    match target {
        TargetType::String => Coerced::exact(Value::String(to_text(value))),
        TargetType::Int64 => match lenient_int(value) {
            Some(n) => Coerced::exact(json!(n)),
            None => Coerced::fallback(json!(0), format!("{} is not an integer", describe(value))),
        },
        TargetType::Float64 => match lenient_float(value) {
            Some(f) => Coerced::exact(json!(f)),
            None => Coerced::fallback(json!(0.0), format!("{} is not a number", describe(value))),
        },
        TargetType::Bool => coerce_bool(value),
        TargetType::StringArray => coerce_string_array(value),
        TargetType::Json => Coerced::exact(Value::String(to_text(value))),
    }
}

/// Strings pass through unchanged; everything else is compact JSON
fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn coerce_bool(value: &Value) -> Coerced {
    match value {
        Value::Bool(b) => Coerced::exact(Value::Bool(*b)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "y" => Coerced::exact(Value::Bool(true)),
            "false" | "0" | "no" | "n" | "" => Coerced::exact(Value::Bool(false)),
            other => Coerced::fallback(Value::Bool(false), format!("'{other}' is not a boolean")),
        },
        Value::Number(n) => match n.as_f64() {
            Some(f) if f == 1.0 => Coerced::exact(Value::Bool(true)),
            Some(f) if f == 0.0 => Coerced::exact(Value::Bool(false)),
            _ => Coerced::fallback(Value::Bool(false), format!("{n} is not a boolean")),
        },
        other => Coerced::fallback(Value::Bool(false), format!("{} is not a boolean", describe(other))),
    }
}

fn coerce_string_array(value: &Value) -> Coerced {
    match value {
        Value::Array(items) => Coerced::exact(Value::Array(
            items
                .iter()
                .filter(|item| !item.is_null())
                .map(|item| Value::String(to_text(item)))
                .collect(),
        )),
        Value::String(s) if s.is_empty() => Coerced::exact(json!([])),
        Value::String(_) | Value::Number(_) | Value::Bool(_) => {
            Coerced::exact(Value::Array(vec![Value::String(to_text(value))]))
        }
        other => Coerced::fallback(json!([]), format!("{} is not a list", describe(other))),
    }
}

/// Cuts `text` to `max_chars` characters and appends `...`. `None` when it already fits.
pub fn truncate(text: &str, max_chars: usize) -> Option<String> {
    if text.chars().count() <= max_chars {
        return None;
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str("...");
    Some(cut)
}
