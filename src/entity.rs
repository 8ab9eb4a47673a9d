//! Core timeline entity type.
//!
//! A [`TimelineEntity`] is the canonical output of extraction: one interval with
//! its provenance and the untouched source object it was built from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dates::iso_millis;

/// One normalized interval extracted from a JSON document.
///
/// `end_date >= start_date` is expected but not enforced; point-in-time events
/// carry `end_date == start_date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntity {
    pub id: String,
    #[serde(with = "iso_millis")]
    pub start_date: DateTime<Utc>,
    #[serde(with = "iso_millis")]
    pub end_date: DateTime<Utc>,
    /// Untyped axis value. Numbers, strings and anything else pass through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_value: Option<Value>,
    pub source_array: String,
    pub source_file: String,
    #[serde(default)]
    pub original_data: Value,
}

impl TimelineEntity {
    /// Key used when merging entity groups.
    pub fn dedup_key(&self) -> (&str, &str, &str) {
        (&self.source_file, &self.source_array, &self.id)
    }

    pub fn is_point_event(&self) -> bool {
        self.start_date == self.end_date
    }

    /// Signed duration in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        (self.end_date - self.start_date).num_milliseconds()
    }

    /// Convert entity to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Convert entity to pretty-printed JSON string
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Convert entity to NDJSON line (newline-delimited JSON)
    pub fn to_ndjson_line(&self) -> Result<String, serde_json::Error> {
        let json = self.to_json()?;
        Ok(format!("{}\n", json))
    }
}

/// Render a JSON value the way it reads as a label: strings unquoted,
/// everything else in compact JSON.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Truthiness of a JSON value: null, false, zero, NaN and "" are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
