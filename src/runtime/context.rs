//! Per-call extraction report.
//!
//! Collects the entities produced from one or more documents together with the
//! warnings raised along the way. A fresh report is created for every
//! extraction call; nothing is shared between calls.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::TimelineEntity;

/// Why an element or a whole rule was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WarningKind {
    /// The start date did not resolve or did not normalize. The element is dropped.
    #[serde(rename_all = "camelCase")]
    MissingStartDate { path: String },
    /// A rule path could not be parsed. The rule is skipped for this document.
    #[serde(rename_all = "camelCase")]
    MalformedPath { path: String, reason: String },
    /// The array element is not an object, so no path can resolve in it.
    NotAnObject,
}

/// A non-fatal problem recorded during extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionWarning {
    pub source_file: String,
    pub source_array: String,
    /// Element index, absent for rule-level warnings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(flatten)]
    pub kind: WarningKind,
}

impl fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let location = match self.index {
            Some(i) => format!("{}:{}[{}]", self.source_file, self.source_array, i),
            None => format!("{}:{}", self.source_file, self.source_array),
        };
        match &self.kind {
            WarningKind::MissingStartDate { path } => {
                write!(f, "{}: skipped, no valid start date at '{}'", location, path)
            }
            WarningKind::MalformedPath { path, reason } => {
                write!(f, "{}: rule skipped, malformed path '{}': {}", location, path, reason)
            }
            WarningKind::NotAnObject => write!(f, "{}: skipped, element is not an object", location),
        }
    }
}

/// Entities and warnings accumulated by one extraction call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionReport {
    #[serde(default)]
    pub entities: Vec<TimelineEntity>,
    #[serde(default)]
    pub warnings: Vec<ExtractionWarning>,
}

impl ExtractionReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_entity(&mut self, entity: TimelineEntity) {
        self.entities.push(entity);
    }

    pub fn warn(&mut self, warning: ExtractionWarning) {
        tracing::debug!("{}", warning);
        self.warnings.push(warning);
    }

    /// Append another report, keeping order.
    pub fn absorb(&mut self, other: ExtractionReport) {
        self.entities.extend(other.entities);
        self.warnings.extend(other.warnings);
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn into_parts(self) -> (Vec<TimelineEntity>, Vec<ExtractionWarning>) {
        (self.entities, self.warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warning(index: Option<usize>) -> ExtractionWarning {
        ExtractionWarning {
            source_file: "plan.json".to_string(),
            source_array: "events".to_string(),
            index,
            kind: WarningKind::MissingStartDate { path: "startDate".to_string() },
        }
    }

    #[test]
    fn test_create_empty_report() {
        let report = ExtractionReport::new();
        assert_eq!(report.entity_count(), 0);
        assert!(!report.has_warnings());
    }

    #[test]
    fn test_absorb_keeps_order() {
        let mut first = ExtractionReport::new();
        first.warn(warning(Some(0)));
        let mut second = ExtractionReport::new();
        second.warn(warning(Some(1)));

        first.absorb(second);
        assert_eq!(first.warning_count(), 2);
        assert_eq!(first.warnings[1].index, Some(1));
    }

    #[test]
    fn test_warning_display() {
        assert_eq!(
            warning(Some(3)).to_string(),
            "plan.json:events[3]: skipped, no valid start date at 'startDate'"
        );
    }

    #[test]
    fn test_warning_serializes_flat() {
        let json = serde_json::to_value(warning(None)).unwrap();
        assert_eq!(json["kind"], "missingStartDate");
        assert_eq!(json["path"], "startDate");
        assert!(json.get("index").is_none());
    }
}
