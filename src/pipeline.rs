//! Merge, filter and sort extracted entities for presentation.
//!
//! Every function here takes its inputs by reference and returns new lists;
//! entities are cloned, never edited. Running [`transform`] twice on the same
//! inputs gives the same output.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dates::{iso_millis, parse_date, to_iso_string, DateRange};
use crate::entity::{value_to_string, TimelineEntity};
use crate::extraction::resolve_path;
use crate::rules::ExtractionRule;

/// Value a column filter compares against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum FilterValue {
    /// Case-insensitive substring match.
    String(String),
    /// Exact numeric equality.
    Number(f64),
    /// Exact instant equality.
    Date(#[serde(with = "iso_millis")] DateTime<Utc>),
    /// Membership test.
    Array(Vec<Value>),
    /// String-equality fallback.
    Other(Value),
}

impl FilterValue {
    /// Classify an untyped JSON value.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::String(s) => FilterValue::String(s),
            Value::Number(n) => match n.as_f64() {
                Some(f) => FilterValue::Number(f),
                None => FilterValue::Other(Value::Number(n)),
            },
            Value::Array(items) => FilterValue::Array(items),
            other => FilterValue::Other(other),
        }
    }

    /// Empty strings and nulls leave the entity list untouched.
    fn is_inactive(&self) -> bool {
        matches!(self, FilterValue::String(s) if s.is_empty())
            || matches!(self, FilterValue::Other(Value::Null))
    }
}

/// User-selected filters, held by the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    #[serde(default)]
    pub column_filters: IndexMap<String, FilterValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    /// Allowed `sourceArray` values; empty means all.
    #[serde(default)]
    pub array_types: Vec<String>,
}

/// Output of [`transform`], regenerated wholesale on every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationData {
    pub entities: Vec<TimelineEntity>,
    pub configurations: Vec<ExtractionRule>,
    pub selected_files: Vec<String>,
    pub filter_state: FilterState,
}

/// Filter and sort entities for display.
///
/// Stages, in order: selected files (empty = all), enabled rule names,
/// date-range overlap, array-type allow-list, column filters, then a stable
/// sort by start date, most recent first. Only entities whose `sourceArray`
/// names an enabled rule pass the rule-name stage, so with no rule enabled
/// nothing does.
pub fn transform(
    entities: &[TimelineEntity],
    rules: &[ExtractionRule],
    selected_files: &[String],
    filter_state: &FilterState,
) -> VisualizationData {
    let enabled: HashSet<&str> = rules
        .iter()
        .filter(|r| r.enabled)
        .map(|r| r.name.as_str())
        .collect();

    let selected: Vec<TimelineEntity> = entities
        .iter()
        .filter(|e| selected_files.is_empty() || selected_files.iter().any(|f| *f == e.source_file))
        .filter(|e| enabled.contains(e.source_array.as_str()))
        .cloned()
        .collect();

    let mut filtered = apply_filters(selected, filter_state);
    sort_by_start_desc(&mut filtered);

    tracing::debug!("Transform kept {} of {} entities", filtered.len(), entities.len());

    VisualizationData {
        entities: filtered,
        configurations: rules.to_vec(),
        selected_files: selected_files.to_vec(),
        filter_state: filter_state.clone(),
    }
}

/// Apply date-range, array-type and column filters.
pub fn apply_filters(entities: Vec<TimelineEntity>, filter_state: &FilterState) -> Vec<TimelineEntity> {
    let mut filtered = entities;

    if let Some(range) = &filter_state.date_range {
        filtered.retain(|e| range.overlaps(&e.start_date, &e.end_date));
    }

    if !filter_state.array_types.is_empty() {
        filtered.retain(|e| filter_state.array_types.contains(&e.source_array));
    }

    for (column, filter) in &filter_state.column_filters {
        if filter.is_inactive() {
            continue;
        }
        filtered.retain(|e| matches_filter(column_value(e, column), filter));
    }

    filtered
}

/// Stable sort, latest start first.
pub fn sort_by_start_desc(entities: &mut [TimelineEntity]) {
    entities.sort_by(|a, b| b.start_date.cmp(&a.start_date));
}

/// A column value borrowed from an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue<'a> {
    Text(&'a str),
    Date(DateTime<Utc>),
    Json(&'a Value),
}

impl ColumnValue<'_> {
    fn as_text(&self) -> String {
        match self {
            ColumnValue::Text(s) => s.to_string(),
            ColumnValue::Date(d) => to_iso_string(d),
            ColumnValue::Json(v) => value_to_string(v),
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            ColumnValue::Text(s) => parse_number(s),
            ColumnValue::Date(d) => Some(d.timestamp_millis() as f64),
            ColumnValue::Json(Value::Number(n)) => n.as_f64(),
            ColumnValue::Json(Value::String(s)) => parse_number(s),
            ColumnValue::Json(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
            ColumnValue::Json(_) => None,
        }
    }

    fn as_instant(&self) -> Option<DateTime<Utc>> {
        match self {
            ColumnValue::Date(d) => Some(*d),
            ColumnValue::Text(s) => parse_date(*s),
            ColumnValue::Json(v) => parse_date(*v),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            ColumnValue::Text(s) => Value::String(s.to_string()),
            ColumnValue::Date(d) => Value::String(to_iso_string(d)),
            ColumnValue::Json(v) => (*v).clone(),
        }
    }
}

fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// Look up a column: one of the fixed entity fields, else a path into `originalData`.
pub fn column_value<'a>(entity: &'a TimelineEntity, column: &str) -> Option<ColumnValue<'a>> {
    let value = match column {
        "id" => ColumnValue::Text(&entity.id),
        "startDate" => ColumnValue::Date(entity.start_date),
        "endDate" => ColumnValue::Date(entity.end_date),
        "yValue" => ColumnValue::Json(entity.y_value.as_ref()?),
        "sourceArray" => ColumnValue::Text(&entity.source_array),
        "sourceFile" => ColumnValue::Text(&entity.source_file),
        _ => ColumnValue::Json(resolve_path(&entity.original_data, column)?),
    };

    match value {
        ColumnValue::Json(Value::Null) => None,
        other => Some(other),
    }
}

/// Missing values never match.
fn matches_filter(value: Option<ColumnValue<'_>>, filter: &FilterValue) -> bool {
    let Some(value) = value else {
        return false;
    };

    match filter {
        FilterValue::String(needle) => value.as_text().to_lowercase().contains(&needle.to_lowercase()),
        FilterValue::Number(n) => value.as_number() == Some(*n),
        FilterValue::Date(d) => value.as_instant() == Some(*d),
        FilterValue::Array(items) => items.contains(&value.to_json()),
        FilterValue::Other(other) => value.as_text() == value_to_string(other),
    }
}

/// Combine entity groups, dropping later entities whose
/// `(sourceFile, sourceArray, id)` was already seen.
pub fn merge_entity_groups<G>(groups: G) -> Vec<TimelineEntity>
where
    G: IntoIterator,
    G::Item: IntoIterator<Item = TimelineEntity>,
{
    let mut seen: HashSet<(String, String, String)> = HashSet::new();
    let mut merged = Vec::new();

    for group in groups {
        for entity in group {
            let (file, array, id) = entity.dedup_key();
            let key = (file.to_string(), array.to_string(), id.to_string());
            if seen.insert(key) {
                merged.push(entity);
            }
        }
    }

    merged
}

/// Group entities by `sourceArray`, in first-seen order.
pub fn group_by_source_array(entities: &[TimelineEntity]) -> IndexMap<String, Vec<TimelineEntity>> {
    let mut groups: IndexMap<String, Vec<TimelineEntity>> = IndexMap::new();
    for entity in entities {
        groups
            .entry(entity.source_array.clone())
            .or_default()
            .push(entity.clone());
    }
    groups
}

/// Earliest start to latest end.
pub fn date_range(entities: &[TimelineEntity]) -> Option<DateRange> {
    let start = entities.iter().map(|e| e.start_date).min()?;
    let end = entities.iter().map(|e| e.end_date).max()?;
    Some(DateRange::new(start, end))
}

/// Numeric bounds of the y values that are numbers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

pub fn y_axis_range(entities: &[TimelineEntity]) -> Option<AxisRange> {
    entities
        .iter()
        .filter_map(|e| e.y_value.as_ref().and_then(Value::as_f64))
        .fold(None, |acc, v| match acc {
            None => Some(AxisRange { min: v, max: v }),
            Some(r) => Some(AxisRange {
                min: r.min.min(v),
                max: r.max.max(v),
            }),
        })
}

/// Flattened table rows: nested `originalData` objects become dotted keys,
/// followed by the underscore-prefixed entity fields.
pub fn table_rows(entities: &[TimelineEntity]) -> Vec<Map<String, Value>> {
    entities
        .iter()
        .map(|entity| {
            let mut row = Map::new();
            flatten_into(&entity.original_data, "", &mut row);
            row.insert("_id".to_string(), Value::String(entity.id.clone()));
            row.insert("_startDate".to_string(), Value::String(to_iso_string(&entity.start_date)));
            row.insert("_endDate".to_string(), Value::String(to_iso_string(&entity.end_date)));
            row.insert("_yValue".to_string(), entity.y_value.clone().unwrap_or(Value::Null));
            row.insert("_sourceArray".to_string(), Value::String(entity.source_array.clone()));
            row.insert("_sourceFile".to_string(), Value::String(entity.source_file.clone()));
            row.insert("_duration".to_string(), Value::from(entity.duration_ms()));
            row
        })
        .collect()
}

fn flatten_into(value: &Value, prefix: &str, out: &mut Map<String, Value>) {
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
            Value::Object(nested) if !nested.is_empty() => flatten_into(child, &path, out),
            _ => {
                out.insert(path, child.clone());
            }
        }
    }
}

/// Distinct non-null values of a column, sorted by their text form.
pub fn unique_column_values(entities: &[TimelineEntity], column: &str) -> Vec<Value> {
    let mut values: Vec<Value> = Vec::new();
    for entity in entities {
        if let Some(value) = column_value(entity, column).map(|v| v.to_json()) {
            if !values.contains(&value) {
                values.push(value);
            }
        }
    }
    values.sort_by_key(value_to_string);
    values
}

/// An entity that failed integrity checks, with the reasons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidEntity {
    pub entity: TimelineEntity,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityValidation {
    pub valid: Vec<TimelineEntity>,
    pub invalid: Vec<InvalidEntity>,
}

/// Split entities into valid and invalid. Point events are valid; a start
/// after the end is not.
pub fn validate_entities(entities: &[TimelineEntity]) -> EntityValidation {
    let mut result = EntityValidation::default();

    for entity in entities {
        let mut errors = Vec::new();
        if entity.id.is_empty() {
            errors.push("Missing ID".to_string());
        }
        if entity.start_date > entity.end_date {
            errors.push("Start date must not be after end date".to_string());
        }
        if entity.source_array.is_empty() {
            errors.push("Missing source array".to_string());
        }
        if entity.source_file.is_empty() {
            errors.push("Missing source file".to_string());
        }

        if errors.is_empty() {
            result.valid.push(entity.clone());
        } else {
            result.invalid.push(InvalidEntity {
                entity: entity.clone(),
                errors,
            });
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn day(m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, m, d, 0, 0, 0).unwrap()
    }

    fn entity(id: &str, array: &str, file: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> TimelineEntity {
        TimelineEntity {
            id: id.to_string(),
            start_date: start,
            end_date: end,
            y_value: None,
            source_array: array.to_string(),
            source_file: file.to_string(),
            original_data: json!({"id": id}),
        }
    }

    fn rule(name: &str, enabled: bool) -> ExtractionRule {
        ExtractionRule::new(name, name, "start", "end").with_enabled(enabled)
    }

    #[test]
    fn test_transform_stages_and_sort() {
        let entities = vec![
            entity("a", "events", "one.json", day(1, 1), day(1, 2)),
            entity("b", "events", "two.json", day(3, 1), day(3, 2)),
            entity("c", "tasks", "one.json", day(2, 1), day(2, 2)),
            entity("d", "hidden", "one.json", day(4, 1), day(4, 2)),
        ];
        let rules = vec![rule("events", true), rule("tasks", true), rule("hidden", false)];

        let data = transform(&entities, &rules, &["one.json".to_string()], &FilterState::default());
        let ids: Vec<&str> = data.entities.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
        assert_eq!(data.configurations.len(), 3);
        assert_eq!(data.selected_files, vec!["one.json"]);
    }

    #[test]
    fn test_unclaimed_arrays_excluded() {
        let entities = vec![entity("a", "timeline", "f", day(1, 1), day(1, 1))];
        let data = transform(&entities, &[rule("events", true)], &[], &FilterState::default());
        assert!(data.entities.is_empty());

        let data = transform(&entities, &[rule("events", false)], &[], &FilterState::default());
        assert!(data.entities.is_empty());

        let data = transform(&entities, &[], &[], &FilterState::default());
        assert!(data.entities.is_empty());
    }

    #[test]
    fn test_disabled_rule_hides_its_entities() {
        let entities = vec![
            entity("a", "events", "f", day(1, 1), day(1, 1)),
            entity("b", "tasks", "f", day(1, 2), day(1, 2)),
        ];
        let rules = vec![rule("events", false), rule("tasks", true)];
        let data = transform(&entities, &rules, &[], &FilterState::default());
        let ids: Vec<&str> = data.entities.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[test]
    fn test_date_range_overlap_keeps_spanning_entity() {
        let entities = vec![
            entity("span", "e", "f", day(1, 1), day(12, 31)),
            entity("before", "e", "f", day(1, 1), day(1, 31)),
            entity("edge", "e", "f", day(1, 1), day(3, 1)),
        ];
        let filter = FilterState {
            date_range: Some(DateRange::new(day(3, 1), day(3, 31))),
            ..FilterState::default()
        };
        let kept: Vec<String> = apply_filters(entities, &filter).into_iter().map(|e| e.id).collect();
        assert_eq!(kept, vec!["span", "edge"]);
    }

    #[test]
    fn test_array_types_allow_list() {
        let entities = vec![
            entity("a", "events", "f", day(1, 1), day(1, 1)),
            entity("b", "tasks", "f", day(1, 1), day(1, 1)),
        ];
        let filter = FilterState {
            array_types: vec!["tasks".to_string()],
            ..FilterState::default()
        };
        let kept = apply_filters(entities, &filter);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "b");
    }

    #[test]
    fn test_column_filter_semantics() {
        let mut e = entity("Deploy-42", "events", "f", day(5, 1), day(5, 2));
        e.y_value = Some(json!(3));
        e.original_data = json!({"owner": {"team": "Platform"}, "tags": ["x"], "flag": true, "note": null});

        let check = |column: &str, filter: FilterValue| matches_filter(column_value(&e, column), &filter);

        assert!(check("id", FilterValue::String("deploy".into())));
        assert!(!check("id", FilterValue::String("release".into())));
        assert!(check("owner.team", FilterValue::String("PLAT".into())));
        assert!(check("yValue", FilterValue::Number(3.0)));
        assert!(!check("yValue", FilterValue::Number(4.0)));
        assert!(check("startDate", FilterValue::Date(day(5, 1))));
        assert!(!check("endDate", FilterValue::Date(day(5, 1))));
        assert!(check("sourceArray", FilterValue::Array(vec![json!("tasks"), json!("events")])));
        assert!(check("flag", FilterValue::Other(json!(true))));
        assert!(check("startDate", FilterValue::String("2024-05".into())));

        assert!(!check("note", FilterValue::String("".into())));
        assert!(!check("missing", FilterValue::String("x".into())));
        assert!(!check("note", FilterValue::Other(json!(null))));
    }

    #[test]
    fn test_missing_y_value_never_matches() {
        let e = entity("a", "events", "f", day(1, 1), day(1, 1));
        assert!(!matches_filter(column_value(&e, "yValue"), &FilterValue::String(String::new())));
    }

    #[test]
    fn test_inactive_column_filters_skipped() {
        let entities = vec![entity("a", "events", "f", day(1, 1), day(1, 1))];
        let mut filter = FilterState::default();
        filter.column_filters.insert("missing".into(), FilterValue::String(String::new()));
        filter.column_filters.insert("other".into(), FilterValue::Other(Value::Null));
        assert_eq!(apply_filters(entities, &filter).len(), 1);
    }

    #[test]
    fn test_transform_idempotent() {
        let entities = vec![
            entity("a", "events", "f", day(1, 1), day(1, 5)),
            entity("b", "events", "f", day(1, 1), day(1, 3)),
            entity("c", "events", "f", day(6, 1), day(6, 5)),
        ];
        let rules = vec![rule("events", true)];
        let mut filter = FilterState::default();
        filter.column_filters.insert("id".into(), FilterValue::String("".into()));

        let once = transform(&entities, &rules, &[], &filter);
        let twice = transform(&once.entities, &rules, &[], &filter);
        assert_eq!(once, twice);
        let ids: Vec<&str> = once.entities.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_merge_first_occurrence_wins() {
        let e1 = entity("1", "events", "f", day(1, 1), day(1, 1));
        let mut dup = e1.clone();
        dup.start_date = day(9, 9);
        let e2 = entity("2", "events", "f", day(1, 1), day(1, 1));

        let merged = merge_entity_groups(vec![vec![e1.clone(), dup], vec![e2.clone()]]);
        assert_eq!(merged, vec![e1, e2]);
    }

    #[test]
    fn test_merge_key_includes_file() {
        let a = entity("1", "events", "a.json", day(1, 1), day(1, 1));
        let b = entity("1", "events", "b.json", day(1, 1), day(1, 1));
        assert_eq!(merge_entity_groups(vec![vec![a], vec![b]]).len(), 2);
    }

    #[test]
    fn test_filter_state_json() {
        let filter: FilterState = serde_json::from_value(json!({
            "columnFilters": {
                "id": {"type": "string", "value": "E"},
                "startDate": {"type": "date", "value": "2024-01-01T00:00:00.000Z"}
            },
            "dateRange": {"start": "2024-01-01T00:00:00.000Z", "end": "2024-02-01T00:00:00.000Z"}
        }))
        .unwrap();

        assert_eq!(filter.column_filters["id"], FilterValue::String("E".into()));
        assert_eq!(filter.column_filters["startDate"], FilterValue::Date(day(1, 1)));
        assert!(filter.array_types.is_empty());
        assert_eq!(filter.date_range.unwrap().end, day(2, 1));
    }

    #[test]
    fn test_filter_value_from_json() {
        assert_eq!(FilterValue::from_json(json!("x")), FilterValue::String("x".into()));
        assert_eq!(FilterValue::from_json(json!(2)), FilterValue::Number(2.0));
        assert_eq!(FilterValue::from_json(json!([1])), FilterValue::Array(vec![json!(1)]));
        assert_eq!(FilterValue::from_json(json!(true)), FilterValue::Other(json!(true)));
    }

    #[test]
    fn test_aggregates() {
        let mut a = entity("a", "events", "f", day(2, 1), day(2, 10));
        a.y_value = Some(json!(5));
        let mut b = entity("b", "tasks", "f", day(1, 1), day(3, 1));
        b.y_value = Some(json!("high"));
        let mut c = entity("c", "events", "f", day(4, 1), day(4, 2));
        c.y_value = Some(json!(-2.5));
        let all = vec![a, b, c];

        let groups = group_by_source_array(&all);
        assert_eq!(groups.keys().collect::<Vec<_>>(), vec!["events", "tasks"]);
        assert_eq!(groups["events"].len(), 2);

        let range = date_range(&all).unwrap();
        assert_eq!(range, DateRange::new(day(1, 1), day(4, 2)));
        assert_eq!(date_range(&[]), None);

        assert_eq!(y_axis_range(&all), Some(AxisRange { min: -2.5, max: 5.0 }));
    }

    #[test]
    fn test_table_rows_flatten() {
        let mut e = entity("a", "events", "f", day(1, 1), day(1, 2));
        e.original_data = json!({"id": "a", "owner": {"name": "Ann", "team": {"code": "P"}}, "tags": ["x"]});
        let rows = table_rows(&[e]);

        let row = &rows[0];
        assert_eq!(row["owner.name"], json!("Ann"));
        assert_eq!(row["owner.team.code"], json!("P"));
        assert_eq!(row["tags"], json!(["x"]));
        assert_eq!(row["_duration"], json!(86_400_000));
        assert_eq!(row["_startDate"], json!("2024-01-01T00:00:00.000Z"));
        assert_eq!(row["_yValue"], Value::Null);
    }

    #[test]
    fn test_unique_column_values() {
        let entities = vec![
            entity("b", "tasks", "f", day(1, 1), day(1, 1)),
            entity("a", "events", "f", day(1, 1), day(1, 1)),
            entity("c", "tasks", "f", day(1, 1), day(1, 1)),
        ];
        assert_eq!(unique_column_values(&entities, "sourceArray"), vec![json!("events"), json!("tasks")]);
        assert_eq!(unique_column_values(&entities, "id"), vec![json!("a"), json!("b"), json!("c")]);
    }

    #[test]
    fn test_validate_entities() {
        let ok = entity("a", "events", "f", day(1, 1), day(1, 1));
        let reversed = entity("b", "events", "f", day(2, 1), day(1, 1));
        let anonymous = entity("", "events", "", day(1, 1), day(1, 2));

        let result = validate_entities(&[ok, reversed, anonymous]);
        assert_eq!(result.valid.len(), 1);
        assert_eq!(result.invalid.len(), 2);
        assert_eq!(result.invalid[0].errors, vec!["Start date must not be after end date"]);
        assert_eq!(result.invalid[1].errors, vec!["Missing ID", "Missing source file"]);
    }
}
