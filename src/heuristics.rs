//! Heuristic discovery of timeline fields in unknown objects.
//!
//! Every guess is a first-match-wins scan over an ordered keyword list. The
//! lists are plain data; [`FieldDetector`] holds its own copy of each.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::dates::parse_date;
use crate::entity::is_truthy;

/// Keys that usually mark the start of an interval, most specific first.
pub const START_KEYWORDS: &[&str] = &[
    "startDate", "start", "startTime", "startDateTime", "begin", "beginDate",
    "from", "fromDate", "createdAt", "created", "deployedAt", "targetDate",
];

/// Keys that usually mark the end of an interval.
pub const END_KEYWORDS: &[&str] = &[
    "endDate", "end", "endTime", "endDateTime", "finish", "finishDate",
    "to", "toDate", "completedAt", "completed", "actualDate", "dueDate",
];

/// Identifier keys in priority order.
pub const ID_KEYS: &[&str] = &[
    "id", "ID", "_id", "uuid", "key", "name", "title", "identifier",
    "taskId", "eventId", "projectId", "phaseId", "sprintId", "milestoneId",
    "version", "deploymentId",
];

/// Axis keys in priority order. Values are carried untyped.
pub const Y_AXIS_KEYS: &[&str] = &[
    "priority", "level", "status", "type", "category", "environment",
    "team", "assignee", "budget", "cost", "value", "importance",
    "criticality", "severity", "velocity", "capacity",
];

/// Epoch millis for 2000-01-01; smaller numbers are not taken as dates by shape alone.
const EPOCH_SHAPE_FLOOR: f64 = 946_684_800_000.0;

static DATE_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2}|\d{2}/\d{2}/\d{4}|\d{2}-\d{2}-\d{4})").expect("date shape regex")
});

/// Start and end keys chosen for an object. `end == start` for point events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFields {
    pub start: String,
    pub end: String,
}

/// Everything the detector could guess about one sample object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedFields {
    pub dates: DateFields,
    pub id: Option<String>,
    pub y_axis: Option<String>,
}

/// Ordered keyword lists driving detection.
#[derive(Debug, Clone)]
pub struct FieldDetector {
    pub start_keywords: Vec<String>,
    pub end_keywords: Vec<String>,
    pub id_keys: Vec<String>,
    pub y_axis_keys: Vec<String>,
}

impl Default for FieldDetector {
    fn default() -> Self {
        let owned = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
        Self {
            start_keywords: owned(START_KEYWORDS),
            end_keywords: owned(END_KEYWORDS),
            id_keys: owned(ID_KEYS),
            y_axis_keys: owned(Y_AXIS_KEYS),
        }
    }
}

impl FieldDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run all detections. `None` when the object has no usable start date.
    pub fn detect(&self, item: &Map<String, Value>) -> Option<DetectedFields> {
        let dates = self.detect_date_fields(item)?;
        Some(DetectedFields {
            dates,
            id: self.detect_id_field(item).map(str::to_string),
            y_axis: self.detect_y_axis_field(item).map(str::to_string),
        })
    }

    /// Pick start and end keys.
    ///
    /// Keywords are matched against whole keys case-insensitively first, then
    /// against camelCase/snake_case word runs inside a key (`projectStartDate`
    /// matches `start`, `total` does not match `to`). Keys whose values merely
    /// look like dates then fill whichever slot is still empty, start before
    /// end. A shaped key only becomes the end when it is not itself a start
    /// keyword and its date is not before the start. A missing end reuses the
    /// start.
    pub fn detect_date_fields(&self, item: &Map<String, Value>) -> Option<DateFields> {
        let start = match_keyword(item, &self.start_keywords, None);
        let end = match_keyword(item, &self.end_keywords, start);

        let mut shaped = item
            .iter()
            .filter(|(key, value)| {
                Some(key.as_str()) != start && Some(key.as_str()) != end && looks_like_date(value)
            })
            .map(|(key, _)| key.as_str());

        // A lone end keyword still makes a point event.
        let start = start.or_else(|| shaped.next()).or(end)?;
        let end = end
            .or_else(|| {
                let from = item.get(start).and_then(|v| parse_date(v));
                shaped.find(|key| {
                    !self.is_start_key(key)
                        && item.get(*key).and_then(|v| parse_date(v)) >= from
                })
            })
            .unwrap_or(start);

        Some(DateFields {
            start: start.to_string(),
            end: end.to_string(),
        })
    }

    /// Whether `key` matches a start keyword, whole or by word run.
    fn is_start_key(&self, key: &str) -> bool {
        let words = key_words(key);
        self.start_keywords
            .iter()
            .any(|keyword| key.eq_ignore_ascii_case(keyword) || contains_run(&words, &key_words(keyword)))
    }

    /// First identifier key, in priority order, whose value is not null.
    pub fn detect_id_field<'a>(&self, item: &'a Map<String, Value>) -> Option<&'a str> {
        first_present(item, &self.id_keys)
    }

    /// First axis key, in priority order, whose value is not null.
    pub fn detect_y_axis_field<'a>(&self, item: &'a Map<String, Value>) -> Option<&'a str> {
        first_present(item, &self.y_axis_keys)
    }
}

fn first_present<'a>(item: &'a Map<String, Value>, keys: &[String]) -> Option<&'a str> {
    keys.iter().find_map(|key| {
        item.get_key_value(key.as_str())
            .filter(|(_, value)| !value.is_null())
            .map(|(k, _)| k.as_str())
    })
}

fn match_keyword<'a>(
    item: &'a Map<String, Value>,
    keywords: &[String],
    exclude: Option<&str>,
) -> Option<&'a str> {
    let candidates = || {
        item.iter()
            .filter(move |(key, value)| Some(key.as_str()) != exclude && is_date_value(value))
    };

    let exact = keywords.iter().find_map(|keyword| {
        candidates()
            .find(|(key, _)| key.eq_ignore_ascii_case(keyword))
            .map(|(key, _)| key.as_str())
    });
    if exact.is_some() {
        return exact;
    }

    keywords.iter().find_map(|keyword| {
        let wanted = key_words(keyword);
        candidates()
            .find(|(key, _)| contains_run(&key_words(key), &wanted))
            .map(|(key, _)| key.as_str())
    })
}

fn is_date_value(value: &Value) -> bool {
    is_truthy(value) && parse_date(value).is_some()
}

/// Whether a value is date-shaped regardless of its key.
pub fn looks_like_date(value: &Value) -> bool {
    match value {
        Value::String(s) => DATE_SHAPE.is_match(s.trim()) && parse_date(s.as_str()).is_some(),
        Value::Number(n) => n
            .as_f64()
            .map(|f| f > EPOCH_SHAPE_FLOOR && parse_date(value).is_some())
            .unwrap_or(false),
        _ => false,
    }
}

/// Split a key into lowercase words on case changes and separators.
fn key_words(key: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in key.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }

    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn contains_run(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}
