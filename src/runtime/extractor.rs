//! Timeline entity extraction.
//!
//! Turns one JSON document into timeline entities, either through the enabled
//! extraction rules or, when none are enabled, through heuristic
//! auto-detection. Failures never escape: a bad element is dropped with a
//! warning, a bad rule is skipped with a warning, everything else carries on.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::dates::parse_date;
use crate::entity::{is_truthy, value_to_string, TimelineEntity};
use crate::extraction::{resolve_path, FieldPath, PathError};
use crate::heuristics::FieldDetector;
use crate::rules::ExtractionRule;
use crate::runtime::context::{ExtractionReport, ExtractionWarning, WarningKind};

/// Tag given to entities found in a document whose root is itself an array.
pub const ROOT_ARRAY_TAG: &str = "$root";

/// Something that can pull entities out of a document.
///
/// Implementations must not fail outward; problems go into the report.
pub trait EntitySource {
    /// Name used as the `sourceArray` tag (or a description, for auto-detection).
    fn name(&self) -> &str;

    /// Extract entities from `document` into `report`.
    fn extract_into(&self, document_id: &str, document: &Value, report: &mut ExtractionReport);
}

/// Rule-driven extraction for a single rule.
pub struct RuleSource<'a> {
    rule: &'a ExtractionRule,
}

/// Paths of a rule, parsed once per document.
///
/// Only the array path is required to parse. The others resolve to nothing
/// when malformed: an unparseable start path drops every element, an
/// unparseable end path makes every element a point event.
struct CompiledRule {
    array: FieldPath,
    start: Option<FieldPath>,
    end: Option<FieldPath>,
    y_axis: Option<FieldPath>,
    id: Option<FieldPath>,
}

impl<'a> RuleSource<'a> {
    pub fn new(rule: &'a ExtractionRule) -> Self {
        Self { rule }
    }

    fn compile(&self) -> Result<CompiledRule, (String, PathError)> {
        let array = FieldPath::parse(&self.rule.array_path)
            .map_err(|e| (self.rule.array_path.clone(), e))?;

        let lenient = |path: &str| match FieldPath::parse(path) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                tracing::debug!("Rule '{}': path '{}' resolves to nothing: {}", self.rule.name, path, err);
                None
            }
        };
        let optional = |path: &Option<String>| path.as_deref().and_then(|p| FieldPath::parse(p).ok());

        Ok(CompiledRule {
            array,
            start: lenient(&self.rule.start_date_path),
            end: lenient(&self.rule.end_date_path),
            y_axis: optional(&self.rule.y_axis_path),
            id: optional(&self.rule.id_path),
        })
    }

    fn build_entity(
        &self,
        compiled: &CompiledRule,
        item: &Value,
        index: usize,
        document_id: &str,
    ) -> Option<TimelineEntity> {
        let start = compiled
            .start
            .as_ref()
            .and_then(|p| p.resolve(item))
            .and_then(|v| parse_date(v))?;

        let end = compiled
            .end
            .as_ref()
            .and_then(|p| p.resolve(item))
            .and_then(|v| parse_date(v))
            .unwrap_or(start);

        let y_value = compiled
            .y_axis
            .as_ref()
            .and_then(|p| p.resolve(item))
            .filter(|v| !v.is_null())
            .cloned();

        let id = compiled
            .id
            .as_ref()
            .and_then(|p| p.resolve(item))
            .filter(|v| is_truthy(v))
            .map(value_to_string)
            .unwrap_or_else(|| format!("{}-{}", self.rule.name, index));

        Some(TimelineEntity {
            id,
            start_date: start,
            end_date: end,
            y_value,
            source_array: self.rule.name.clone(),
            source_file: document_id.to_string(),
            original_data: item.clone(),
        })
    }
}

impl EntitySource for RuleSource<'_> {
    fn name(&self) -> &str {
        &self.rule.name
    }

    fn extract_into(&self, document_id: &str, document: &Value, report: &mut ExtractionReport) {
        let compiled = match self.compile() {
            Ok(compiled) => compiled,
            Err((path, err)) => {
                tracing::warn!("Rule '{}' skipped for {}: {}", self.rule.name, document_id, err);
                report.warn(ExtractionWarning {
                    source_file: document_id.to_string(),
                    source_array: self.rule.name.clone(),
                    index: None,
                    kind: WarningKind::MalformedPath {
                        path,
                        reason: err.to_string(),
                    },
                });
                return;
            }
        };

        let Some(items) = compiled.array.resolve(document).and_then(Value::as_array) else {
            tracing::debug!(
                "Rule '{}': no array at '{}' in {}",
                self.rule.name,
                self.rule.array_path,
                document_id
            );
            return;
        };

        for (index, item) in items.iter().enumerate() {
            let kind = if !item.is_object() {
                WarningKind::NotAnObject
            } else {
                match self.build_entity(&compiled, item, index, document_id) {
                    Some(entity) => {
                        report.push_entity(entity);
                        continue;
                    }
                    None => WarningKind::MissingStartDate {
                        path: self.rule.start_date_path.clone(),
                    },
                }
            };
            report.warn(ExtractionWarning {
                source_file: document_id.to_string(),
                source_array: self.rule.name.clone(),
                index: Some(index),
                kind,
            });
        }
    }
}

/// Heuristic extraction over the whole document.
///
/// Walks nested objects looking for non-empty arrays; each array whose
/// elements pass date-field detection contributes entities tagged with the
/// array's dotted path. Elements that are not timeline items are skipped
/// silently.
#[derive(Debug, Clone, Default)]
pub struct AutoDetector {
    detector: FieldDetector,
}

impl AutoDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detector(detector: FieldDetector) -> Self {
        Self { detector }
    }

    /// Detect entities directly, without a report.
    pub fn detect(&self, document: &Value, document_id: &str) -> Vec<TimelineEntity> {
        let mut entities = Vec::new();
        match document {
            Value::Array(items) => self.scan_array(items, ROOT_ARRAY_TAG, document_id, &mut entities),
            other => self.walk(other, "", document_id, &mut entities),
        }
        entities
    }

    fn walk(&self, value: &Value, prefix: &str, document_id: &str, out: &mut Vec<TimelineEntity>) {
        let Some(map) = value.as_object() else {
            return;
        };

        for (key, child) in map {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };

            match child {
                Value::Array(items) if !items.is_empty() => {
                    self.scan_array(items, &path, document_id, out)
                }
                Value::Object(_) => self.walk(child, &path, document_id, out),
                _ => {}
            }
        }
    }

    fn scan_array(&self, items: &[Value], tag: &str, document_id: &str, out: &mut Vec<TimelineEntity>) {
        let before = out.len();

        for (index, item) in items.iter().enumerate() {
            let Some(map) = item.as_object() else {
                continue;
            };
            if let Some(entity) = self.build_entity(map, item, tag, index, document_id) {
                out.push(entity);
            }
        }

        if out.len() > before {
            tracing::debug!("Auto-detected {} entities in '{}' of {}", out.len() - before, tag, document_id);
        }
    }

    fn build_entity(
        &self,
        map: &Map<String, Value>,
        item: &Value,
        tag: &str,
        index: usize,
        document_id: &str,
    ) -> Option<TimelineEntity> {
        let fields = self.detector.detect(map)?;
        let start: DateTime<Utc> = map.get(&fields.dates.start).and_then(|v| parse_date(v))?;
        let end = map
            .get(&fields.dates.end)
            .and_then(|v| parse_date(v))
            .unwrap_or(start);

        let id = fields
            .id
            .as_deref()
            .and_then(|key| map.get(key))
            .map(value_to_string)
            .unwrap_or_else(|| format!("{}-{}", tag, index));

        let y_value = fields.y_axis.as_deref().and_then(|key| map.get(key)).cloned();

        Some(TimelineEntity {
            id,
            start_date: start,
            end_date: end,
            y_value,
            source_array: tag.to_string(),
            source_file: document_id.to_string(),
            original_data: item.clone(),
        })
    }
}

impl EntitySource for AutoDetector {
    fn name(&self) -> &str {
        "auto-detect"
    }

    fn extract_into(&self, document_id: &str, document: &Value, report: &mut ExtractionReport) {
        for entity in self.detect(document, document_id) {
            report.push_entity(entity);
        }
    }
}

/// Extraction entry point parameterized by a rule list.
#[derive(Debug, Clone, Default)]
pub struct TimelineExtractor {
    auto: AutoDetector,
}

impl TimelineExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detector(detector: FieldDetector) -> Self {
        Self {
            auto: AutoDetector::with_detector(detector),
        }
    }

    /// Extract entities from one document.
    ///
    /// With no enabled rules the whole document is auto-detected; otherwise
    /// every enabled rule runs independently, in order.
    pub fn extract<'r, I>(&self, document_id: &str, document: &Value, rules: I) -> ExtractionReport
    where
        I: IntoIterator<Item = &'r ExtractionRule>,
    {
        let mut report = ExtractionReport::new();
        let enabled: Vec<&ExtractionRule> = rules.into_iter().filter(|r| r.enabled).collect();

        if enabled.is_empty() {
            self.auto.extract_into(document_id, document, &mut report);
        } else {
            for rule in enabled {
                RuleSource::new(rule).extract_into(document_id, document, &mut report);
            }
        }

        tracing::info!(
            "Extracted {} entities from {} ({} warnings)",
            report.entity_count(),
            document_id,
            report.warning_count()
        );
        report
    }

    /// Extract from several documents and concatenate the reports in input order.
    pub fn extract_all<'d, D>(&self, documents: D, rules: &[ExtractionRule]) -> ExtractionReport
    where
        D: IntoIterator<Item = (&'d str, &'d Value)>,
    {
        let mut combined = ExtractionReport::new();
        for (document_id, document) in documents {
            combined.absorb(self.extract(document_id, document, rules));
        }
        combined
    }

    pub fn auto_detect(&self, document: &Value, document_id: &str) -> Vec<TimelineEntity> {
        self.auto.detect(document, document_id)
    }
}

/// Extract entities from one document with the default detector.
pub fn extract_from_document<'r, I>(document_id: &str, document: &Value, rules: I) -> ExtractionReport
where
    I: IntoIterator<Item = &'r ExtractionRule>,
{
    TimelineExtractor::new().extract(document_id, document, rules)
}

/// Heuristic extraction with the default detector.
pub fn auto_detect(document: &Value, document_id: &str) -> Vec<TimelineEntity> {
    AutoDetector::new().detect(document, document_id)
}

/// Standalone path lookup kept next to the extractor for rule authoring.
pub fn probe_rule(document: &Value, rule: &ExtractionRule) -> Option<usize> {
    resolve_path(document, &rule.array_path)
        .and_then(Value::as_array)
        .map(Vec::len)
}
