//! Core value types for tfplug
//!
//! Terraform hands configuration, plan and state to a provider as dynamic
//! values. This module holds that representation, the paths used to address
//! attributes inside it, and the diagnostics returned alongside every
//! response. Typed resource models cross this boundary through
//! [`DynamicValue::from_model`] and [`DynamicValue::to_model`].

use crate::error::{Result, TfplugError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Dynamic represents Terraform values that can be of any type
/// IMPORTANT: Always use type-safe accessors instead of matching directly
#[derive(Debug, Clone, PartialEq)]
pub enum Dynamic {
    /// Explicit null value
    Null,
    Bool(bool),
    /// Number value (all numbers are f64 to match Terraform)
    Number(f64),
    String(String),
    /// List of values (ordered, allows duplicates)
    List(Vec<Dynamic>),
    /// Map of string keys to values (objects are represented as Maps)
    Map(HashMap<String, Dynamic>),
    /// Value not yet known (during planning)
    Unknown,
}

const UNKNOWN_SENTINEL: &str = "__unknown__";

impl Dynamic {
    /// Convert to a JSON tree. Unknown values have no JSON form and become null.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            Dynamic::Null | Dynamic::Unknown => Value::Null,
            Dynamic::Bool(b) => Value::Bool(*b),
            Dynamic::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Dynamic::String(s) => Value::String(s.clone()),
            Dynamic::List(items) => Value::Array(items.iter().map(Dynamic::to_json).collect()),
            Dynamic::Map(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }

    pub fn from_json(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Dynamic::Null,
            Value::Bool(b) => Dynamic::Bool(b),
            Value::Number(n) => n.as_f64().map(Dynamic::Number).unwrap_or(Dynamic::Null),
            Value::String(s) => Dynamic::String(s),
            Value::Array(items) => Dynamic::List(items.into_iter().map(Dynamic::from_json).collect()),
            Value::Object(map) => Dynamic::Map(
                map.into_iter()
                    .map(|(key, value)| (key, Dynamic::from_json(value)))
                    .collect(),
            ),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Dynamic::Null => "null",
            Dynamic::Bool(_) => "bool",
            Dynamic::Number(_) => "number",
            Dynamic::String(_) => "string",
            Dynamic::List(_) => "list",
            Dynamic::Map(_) => "map",
            Dynamic::Unknown => "unknown",
        }
    }
}

impl Serialize for Dynamic {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Dynamic::Unknown => serializer.serialize_str(UNKNOWN_SENTINEL),
            other => other.to_json().serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Dynamic {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::String(s) if s == UNKNOWN_SENTINEL => Ok(Dynamic::Unknown),
            other => Ok(Dynamic::from_json(other)),
        }
    }
}

/// DynamicValue wraps Dynamic and is what gets passed between Terraform and the provider
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicValue {
    pub value: Dynamic,
}

impl DynamicValue {
    pub fn new(value: Dynamic) -> Self {
        Self { value }
    }

    pub fn null() -> Self {
        Self {
            value: Dynamic::Null,
        }
    }

    pub fn unknown() -> Self {
        Self {
            value: Dynamic::Unknown,
        }
    }

    pub fn encode_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.value)
            .map_err(|e| TfplugError::EncodingError(format!("json encoding failed: {}", e)))
    }

    pub fn decode_json(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Ok(Self::null());
        }
        let value = serde_json::from_slice(data)
            .map_err(|e| TfplugError::DecodingError(format!("json decoding failed: {}", e)))?;
        Ok(Self { value })
    }

    /// Build a value from a typed model (resource state, plan, ...)
    pub fn from_model<T: Serialize>(model: &T) -> Result<Self> {
        let json = serde_json::to_value(model)
            .map_err(|e| TfplugError::EncodingError(format!("model encoding failed: {}", e)))?;
        Ok(Self::new(Dynamic::from_json(json)))
    }

    /// Decode into a typed model. Unknown values decode as null.
    pub fn to_model<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.value.to_json())
            .map_err(|e| TfplugError::DecodingError(format!("model decoding failed: {}", e)))
    }

    /// Type-safe accessors - ALWAYS use these instead of pattern matching
    pub fn get_string(&self, path: &AttributePath) -> Result<String> {
        match self.navigate_path(path)? {
            Dynamic::String(s) => Ok(s.clone()),
            other => Err(TfplugError::TypeMismatch {
                expected: "string".to_string(),
                actual: other.type_name().to_string(),
            }),
        }
    }

    pub fn set_string(&mut self, path: &AttributePath, value: String) -> Result<()> {
        self.set_value(path, Dynamic::String(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self.value, Dynamic::Null)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self.value, Dynamic::Unknown)
    }

    /// Returns true when the attribute is absent or null
    pub fn is_attribute_null(&self, path: &AttributePath) -> bool {
        matches!(self.navigate_path(path), Err(_) | Ok(Dynamic::Null))
    }

    fn navigate_path<'a>(&'a self, path: &AttributePath) -> Result<&'a Dynamic> {
        let mut current = &self.value;

        for step in &path.steps {
            current = match (current, step) {
                (Dynamic::Map(m), AttributePathStep::AttributeName(name))
                | (Dynamic::Map(m), AttributePathStep::ElementKeyString(name)) => m
                    .get(name)
                    .ok_or_else(|| TfplugError::AttributeNotFound(name.clone()))?,
                (Dynamic::List(l), AttributePathStep::ElementKeyInt(idx)) => {
                    let idx = *idx as usize;
                    l.get(idx).ok_or_else(|| {
                        TfplugError::Custom(format!("list index {} out of bounds", idx))
                    })?
                }
                _ => return Err(TfplugError::Custom("invalid path navigation".to_string())),
            };
        }

        Ok(current)
    }

    fn set_value(&mut self, path: &AttributePath, new_value: Dynamic) -> Result<()> {
        let Some((last, parents)) = path.steps.split_last() else {
            self.value = new_value;
            return Ok(());
        };

        if !matches!(self.value, Dynamic::Map(_)) {
            self.value = Dynamic::Map(HashMap::new());
        }

        let mut current = &mut self.value;
        for step in parents {
            current = match (current, step) {
                (Dynamic::Map(m), AttributePathStep::AttributeName(name))
                | (Dynamic::Map(m), AttributePathStep::ElementKeyString(name)) => m
                    .entry(name.clone())
                    .or_insert_with(|| Dynamic::Map(HashMap::new())),
                (Dynamic::List(l), AttributePathStep::ElementKeyInt(idx)) => {
                    let idx = *idx as usize;
                    let len = l.len();
                    l.get_mut(idx).ok_or_else(|| {
                        TfplugError::Custom(format!("list index {} out of bounds ({})", idx, len))
                    })?
                }
                _ => return Err(TfplugError::Custom("invalid path navigation".to_string())),
            };
        }

        match (current, last) {
            (Dynamic::Map(m), AttributePathStep::AttributeName(name))
            | (Dynamic::Map(m), AttributePathStep::ElementKeyString(name)) => {
                m.insert(name.clone(), new_value);
                Ok(())
            }
            (Dynamic::List(l), AttributePathStep::ElementKeyInt(idx)) => {
                let idx = *idx as usize;
                match l.get_mut(idx) {
                    Some(slot) => {
                        *slot = new_value;
                        Ok(())
                    }
                    None => Err(TfplugError::Custom(format!(
                        "list index {} out of bounds",
                        idx
                    ))),
                }
            }
            _ => Err(TfplugError::Custom("invalid path navigation".to_string())),
        }
    }
}

/// AttributePath represents a path to an attribute within a DynamicValue
#[derive(Debug, Clone, PartialEq)]
pub struct AttributePath {
    pub steps: Vec<AttributePathStep>,
}

impl AttributePath {
    pub fn new(name: &str) -> Self {
        Self {
            steps: vec![AttributePathStep::AttributeName(name.to_string())],
        }
    }

    pub fn attribute(mut self, name: &str) -> Self {
        self.steps
            .push(AttributePathStep::AttributeName(name.to_string()));
        self
    }

    pub fn index(mut self, idx: i64) -> Self {
        self.steps.push(AttributePathStep::ElementKeyInt(idx));
        self
    }
}

/// Individual step in an AttributePath
#[derive(Debug, Clone, PartialEq)]
pub enum AttributePathStep {
    /// Access attribute by name in object/map
    AttributeName(String),
    /// Access element by string key (for maps)
    ElementKeyString(String),
    /// Access element by integer index (for lists)
    ElementKeyInt(i64),
}

/// RawState holds the stored state for a resource to be upgraded
#[derive(Debug, Clone)]
pub struct RawState {
    pub json: Option<Vec<u8>>,
}

/// Diagnostic represents a warning or error from the provider
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub summary: String,
    pub detail: String,
    pub attribute: Option<AttributePath>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    pub fn with_attribute(mut self, path: AttributePath) -> Self {
        self.attribute = Some(path);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }

    pub fn is_warning(&self) -> bool {
        self.severity == DiagnosticSeverity::Warning
    }
}

/// Severity level for diagnostics
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

/// Convenience queries over a response's diagnostics
pub trait DiagnosticsExt {
    fn has_errors(&self) -> bool;
    fn errors(&self) -> Vec<&Diagnostic>;
    fn warnings(&self) -> Vec<&Diagnostic>;
}

impl DiagnosticsExt for [Diagnostic] {
    fn has_errors(&self) -> bool {
        self.iter().any(Diagnostic::is_error)
    }

    fn errors(&self) -> Vec<&Diagnostic> {
        self.iter().filter(|d| d.is_error()).collect()
    }

    fn warnings(&self) -> Vec<&Diagnostic> {
        self.iter().filter(|d| d.is_warning()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[test]
    fn dynamic_value_string_access() {
        let mut dv = DynamicValue::new(Dynamic::Map(HashMap::new()));
        dv.set_string(&AttributePath::new("name"), "test".to_string())
            .unwrap();

        let result = dv.get_string(&AttributePath::new("name")).unwrap();
        assert_eq!(result, "test");
    }

    #[test]
    fn dynamic_value_nested_access() {
        let mut dv = DynamicValue::null();
        let path = AttributePath::new("config").attribute("endpoint");
        dv.set_string(&path, "https://example.com".to_string())
            .unwrap();

        let result = dv.get_string(&path).unwrap();
        assert_eq!(result, "https://example.com");
    }

    #[test]
    fn dynamic_value_reports_type_mismatch() {
        let mut dv = DynamicValue::null();
        dv.set_value(&AttributePath::new("flag"), Dynamic::Bool(true))
            .unwrap();

        match dv.get_string(&AttributePath::new("flag")) {
            Err(TfplugError::TypeMismatch { expected, actual }) => {
                assert_eq!(expected, "string");
                assert_eq!(actual, "bool");
            }
            other => panic!("expected type mismatch, got {:?}", other),
        }
    }

    #[test]
    fn missing_and_null_attributes_are_null() {
        let mut dv = DynamicValue::null();
        dv.set_value(&AttributePath::new("gone"), Dynamic::Null)
            .unwrap();

        assert!(dv.is_attribute_null(&AttributePath::new("gone")));
        assert!(dv.is_attribute_null(&AttributePath::new("never_set")));
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        tags: Option<Vec<String>>,
    }

    #[test]
    fn typed_models_cross_the_boundary() {
        let sample = Sample {
            name: "alice".to_string(),
            tags: Some(vec!["a".to_string(), "b".to_string()]),
        };

        let value = DynamicValue::from_model(&sample).unwrap();
        assert_eq!(value.get_string(&AttributePath::new("name")).unwrap(), "alice");
        assert_eq!(
            value
                .get_string(&AttributePath::new("tags").index(1))
                .unwrap(),
            "b"
        );

        let back: Sample = value.to_model().unwrap();
        assert_eq!(back, sample);
    }

    #[test]
    fn unknown_values_decode_as_null() {
        let mut value = DynamicValue::null();
        value
            .set_string(&AttributePath::new("name"), "bob".to_string())
            .unwrap();
        value
            .set_value(&AttributePath::new("tags"), Dynamic::Unknown)
            .unwrap();

        let sample: Sample = value.to_model().unwrap();
        assert_eq!(sample.tags, None);
    }

    #[test]
    fn json_encoding_keeps_unknown_marker() {
        let value = DynamicValue::unknown();
        let encoded = value.encode_json().unwrap();
        let decoded = DynamicValue::decode_json(&encoded).unwrap();
        assert!(decoded.is_unknown());

        assert!(DynamicValue::decode_json(&[]).unwrap().is_null());
    }

    #[test]
    fn diagnostics_ext_partitions_by_severity() {
        let diags = vec![
            Diagnostic::warning("drift", "policy changed"),
            Diagnostic::error("[API ERROR] failed", "boom"),
        ];

        assert!(diags.has_errors());
        assert_eq!(diags.errors().len(), 1);
        assert_eq!(diags.warnings()[0].summary, "drift");
        assert!(!diags[..1].has_errors());
    }
}
