//! Report metadata record
//!
//! An untyped map of string fields (client name, location, industry
//! labels, free-text narrative fields). Values arrive as arbitrary JSON and
//! are flattened to text on the way in; pipeline stages write computed
//! values back with [`ReportMetadata::set`].

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

lazy_static! {
    static ref FIELD_REF: Regex = Regex::new(r"\{([A-Za-z0-9_]+)\}").unwrap();
}

/// Errors raised while reading a metadata record
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Metadata must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("Invalid metadata JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Build the placeholder marker used in templates for a metadata key
pub fn marker_for(key: &str) -> String {
    format!("[[{}]]", key)
}

/// Flat key/value metadata for one report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportMetadata {
    fields: BTreeMap<String, String>,
}

impl ReportMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an uploaded JSON document
    pub fn from_json_str(raw: &str) -> Result<Self, MetadataError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_json_value(&value)
    }

    /// Flatten a JSON object into string fields
    pub fn from_json_value(value: &Value) -> Result<Self, MetadataError> {
        let object = match value {
            Value::Object(map) => map,
            Value::Array(_) => return Err(MetadataError::NotAnObject("array")),
            Value::String(_) => return Err(MetadataError::NotAnObject("string")),
            Value::Number(_) => return Err(MetadataError::NotAnObject("number")),
            Value::Bool(_) => return Err(MetadataError::NotAnObject("bool")),
            Value::Null => return Err(MetadataError::NotAnObject("null")),
        };

        let fields = object
            .iter()
            .map(|(key, value)| (key.clone(), value_to_text(value)))
            .collect();

        Ok(Self { fields })
    }

    /// Layer `self` over `defaults`: keys present here win
    pub fn with_defaults(self, defaults: &ReportMetadata) -> Self {
        let mut fields = defaults.fields.clone();
        fields.extend(self.fields);
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Value for `key`, or the empty string
    pub fn get_or_empty(&self, key: &str) -> &str {
        self.get(key).unwrap_or("")
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Set `key` only when it is absent or blank
    pub fn set_if_blank(&mut self, key: &str, value: impl Into<String>) {
        let blank = self.get(key).map(|v| v.trim().is_empty()).unwrap_or(true);
        if blank {
            self.fields.insert(key.to_string(), value.into());
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Marker → value pairs for every field (`[[key]]` → value)
    pub fn placeholder_map(&self) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .map(|(k, v)| (marker_for(k), v.clone()))
            .collect()
    }

    /// Replace `{field}` references in `template` with field values.
    ///
    /// Unknown fields render as the empty string.
    pub fn fill(&self, template: &str) -> String {
        FIELD_REF
            .replace_all(template, |caps: &regex::Captures<'_>| {
                self.get_or_empty(&caps[1]).to_string()
            })
            .into_owned()
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    }
}
