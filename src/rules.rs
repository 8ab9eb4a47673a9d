//! Extraction rules and the rule store.
//!
//! A rule names an array inside a document and the per-element paths that make
//! up a timeline entity. Rule names are unique within a [`RuleSet`]; adding a
//! rule whose name already exists replaces it in place.

use std::fmt;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::heuristics::FieldDetector;

/// Colors handed out to suggested rules, in order.
pub const DEFAULT_PALETTE: &[&str] = &[
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd",
    "#8c564b", "#e377c2", "#7f7f7f", "#bcbd22", "#17becf",
];

static COLOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("color regex"));

/// A named mapping from a document array to timeline entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRule {
    pub name: String,
    pub array_path: String,
    pub start_date_path: String,
    pub end_date_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_axis_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_path: Option<String>,
    pub color: String,
    pub enabled: bool,
}

impl ExtractionRule {
    /// Create an enabled rule with the first palette color.
    pub fn new(
        name: impl Into<String>,
        array_path: impl Into<String>,
        start_date_path: impl Into<String>,
        end_date_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            array_path: array_path.into(),
            start_date_path: start_date_path.into(),
            end_date_path: end_date_path.into(),
            y_axis_path: None,
            id_path: None,
            color: DEFAULT_PALETTE[0].to_string(),
            enabled: true,
        }
    }

    /// Set the y-axis path
    pub fn with_y_axis(mut self, path: impl Into<String>) -> Self {
        self.y_axis_path = Some(path.into());
        self
    }

    /// Set the id path
    pub fn with_id(mut self, path: impl Into<String>) -> Self {
        self.id_path = Some(path.into());
        self
    }

    /// Set the display color
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    /// Set the enabled flag
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Structural validation of a typed rule.
    pub fn validate(&self) -> RuleValidation {
        let mut errors = Vec::new();

        for (field, value) in [
            ("name", &self.name),
            ("arrayPath", &self.array_path),
            ("startDatePath", &self.start_date_path),
            ("endDatePath", &self.end_date_path),
        ] {
            if value.trim().is_empty() {
                errors.push(format!("{} is required", field));
            }
        }

        if !COLOR_RE.is_match(&self.color) {
            errors.push(format!("color '{}' must be a hex color like #1f77b4", self.color));
        }

        RuleValidation::from_errors(errors)
    }
}

/// Outcome of rule validation. Never an error value; callers inspect it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl RuleValidation {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

/// Validate an untyped rule as it arrives from JSON.
///
/// Required string fields must be present and non-empty, `color` must match
/// `#RRGGBB`, `enabled` must be a boolean and the optional paths, when
/// present, must be strings.
pub fn validate_rule(raw: &Value) -> RuleValidation {
    let Some(obj) = raw.as_object() else {
        return RuleValidation::from_errors(vec!["rule must be a JSON object".to_string()]);
    };

    let mut errors = Vec::new();

    for field in ["name", "arrayPath", "startDatePath", "endDatePath"] {
        match obj.get(field) {
            Some(Value::String(s)) if !s.trim().is_empty() => {}
            Some(Value::String(_)) => errors.push(format!("{} is required", field)),
            Some(_) => errors.push(format!("{} must be a string", field)),
            None => errors.push(format!("{} is required", field)),
        }
    }

    match obj.get("color") {
        Some(Value::String(c)) if COLOR_RE.is_match(c) => {}
        Some(Value::String(c)) => {
            errors.push(format!("color '{}' must be a hex color like #1f77b4", c))
        }
        Some(_) => errors.push("color must be a string".to_string()),
        None => errors.push("color is required".to_string()),
    }

    match obj.get("enabled") {
        Some(Value::Bool(_)) => {}
        Some(_) => errors.push("enabled must be a boolean".to_string()),
        None => errors.push("enabled is required".to_string()),
    }

    for field in ["yAxisPath", "idPath"] {
        match obj.get(field) {
            None | Some(Value::Null) | Some(Value::String(_)) => {}
            Some(_) => errors.push(format!("{} must be a string when present", field)),
        }
    }

    RuleValidation::from_errors(errors)
}

/// Partial update applied by [`RuleSet::update`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulePatch {
    pub array_path: Option<String>,
    pub start_date_path: Option<String>,
    pub end_date_path: Option<String>,
    pub y_axis_path: Option<Option<String>>,
    pub id_path: Option<Option<String>>,
    pub color: Option<String>,
    pub enabled: Option<bool>,
}

/// Error type for rule-set import
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    Malformed(String),
    NotAnArray,
    NoValidRules { rejected: usize },
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportError::Malformed(msg) => write!(f, "Failed to import rules: malformed JSON: {}", msg),
            ImportError::NotAnArray => write!(f, "Failed to import rules: expected a JSON array"),
            ImportError::NoValidRules { rejected } => write!(
                f,
                "Failed to import rules: no valid rules found ({} rejected)",
                rejected
            ),
        }
    }
}

impl std::error::Error for ImportError {}

/// Ordered, name-keyed collection of extraction rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<ExtractionRule>", into = "Vec<ExtractionRule>")]
pub struct RuleSet {
    rules: IndexMap<String, ExtractionRule>,
}

impl From<Vec<ExtractionRule>> for RuleSet {
    fn from(rules: Vec<ExtractionRule>) -> Self {
        let mut set = RuleSet::new();
        for rule in rules {
            set.add(rule);
        }
        set
    }
}

impl From<RuleSet> for Vec<ExtractionRule> {
    fn from(set: RuleSet) -> Self {
        set.rules.into_values().collect()
    }
}

impl RuleSet {
    /// Create an empty rule set
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in rules for common document shapes.
    pub fn with_defaults() -> Self {
        Self::from(default_rules())
    }

    /// Insert a rule. An existing rule with the same name is replaced where it stands.
    pub fn add(&mut self, rule: ExtractionRule) {
        if let Some(slot) = self.rules.get_mut(&rule.name) {
            *slot = rule;
        } else {
            self.rules.insert(rule.name.clone(), rule);
        }
    }

    /// Remove a rule by name, keeping the order of the rest
    pub fn remove(&mut self, name: &str) -> Option<ExtractionRule> {
        self.rules.shift_remove(name)
    }

    /// Look up a rule by name
    pub fn get(&self, name: &str) -> Option<&ExtractionRule> {
        self.rules.get(name)
    }

    /// Apply a partial update. Returns `false` when no rule has that name.
    pub fn update(&mut self, name: &str, patch: RulePatch) -> bool {
        let Some(rule) = self.rules.get_mut(name) else {
            return false;
        };

        if let Some(v) = patch.array_path {
            rule.array_path = v;
        }
        if let Some(v) = patch.start_date_path {
            rule.start_date_path = v;
        }
        if let Some(v) = patch.end_date_path {
            rule.end_date_path = v;
        }
        if let Some(v) = patch.y_axis_path {
            rule.y_axis_path = v;
        }
        if let Some(v) = patch.id_path {
            rule.id_path = v;
        }
        if let Some(v) = patch.color {
            rule.color = v;
        }
        if let Some(v) = patch.enabled {
            rule.enabled = v;
        }
        true
    }

    /// Toggle a rule without removing it.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        self.update(name, RulePatch { enabled: Some(enabled), ..RulePatch::default() })
    }

    /// Enabled rules, in order
    pub fn enabled(&self) -> impl Iterator<Item = &ExtractionRule> {
        self.rules.values().filter(|r| r.enabled)
    }

    /// All rules, in order
    pub fn iter(&self) -> impl Iterator<Item = &ExtractionRule> {
        self.rules.values()
    }

    /// Rule names, in order
    pub fn names(&self) -> Vec<&str> {
        self.rules.keys().map(String::as_str).collect()
    }

    /// Number of rules, enabled or not
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if the set has no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Clone the rules into a list
    pub fn to_vec(&self) -> Vec<ExtractionRule> {
        self.rules.values().cloned().collect()
    }

    /// Replace every rule with the built-in defaults
    pub fn reset_to_defaults(&mut self) {
        *self = Self::with_defaults();
    }

    /// Pretty-printed JSON array of all rules.
    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_vec())
    }

    /// Parse a rule set from JSON text.
    ///
    /// Invalid entries are dropped. Duplicate names resolve last-wins, keeping
    /// the position of the first occurrence. Malformed JSON, a non-array
    /// payload or zero surviving rules fail the whole import.
    pub fn parse_json(text: &str) -> Result<Self, ImportError> {
        let raw: Value =
            serde_json::from_str(text).map_err(|e| ImportError::Malformed(e.to_string()))?;
        let items = raw.as_array().ok_or(ImportError::NotAnArray)?;

        let mut set = RuleSet::new();
        let mut rejected = 0;

        for (i, item) in items.iter().enumerate() {
            let validation = validate_rule(item);
            if !validation.is_valid {
                tracing::warn!("Rejected imported rule #{}: {}", i, validation.errors.join("; "));
                rejected += 1;
                continue;
            }
            match serde_json::from_value::<ExtractionRule>(item.clone()) {
                Ok(rule) => set.add(rule),
                Err(e) => {
                    tracing::warn!("Rejected imported rule #{}: {}", i, e);
                    rejected += 1;
                }
            }
        }

        if set.is_empty() {
            return Err(ImportError::NoValidRules { rejected });
        }

        tracing::info!("Imported {} rules ({} rejected)", set.len(), rejected);
        Ok(set)
    }

    /// Replace this set with the rules parsed from `text`. On failure the
    /// current rules are left untouched.
    pub fn import_json(&mut self, text: &str) -> Result<usize, ImportError> {
        let imported = Self::parse_json(text)?;
        *self = imported;
        Ok(self.len())
    }
}

/// Rules for the document shapes seen most often.
pub fn default_rules() -> Vec<ExtractionRule> {
    vec![
        ExtractionRule::new("events", "events", "startDate", "endDate")
            .with_y_axis("priority")
            .with_id("id")
            .with_color("#1f77b4"),
        ExtractionRule::new("timeline", "timeline", "start", "end")
            .with_y_axis("level")
            .with_id("name")
            .with_color("#ff7f0e"),
        ExtractionRule::new("tasks", "data.tasks", "startTime", "endTime")
            .with_y_axis("priority")
            .with_id("taskId")
            .with_color("#2ca02c"),
        ExtractionRule::new("deployments", "deployments", "deployedAt", "completedAt")
            .with_y_axis("environment")
            .with_id("version")
            .with_color("#d62728"),
        ExtractionRule::new("projects", "projects", "startDate", "endDate")
            .with_y_axis("budget")
            .with_id("projectName")
            .with_color("#9467bd"),
    ]
}

/// Propose one rule per object array whose first element looks like a timeline item.
///
/// Rules are named after the array's dotted path, which is also the tag
/// auto-detection gives its entities. Colors cycle through `palette`.
pub fn suggest_rules(document: &Value, palette: &[String]) -> Vec<ExtractionRule> {
    let detector = FieldDetector::new();
    let mut suggestions = Vec::new();
    collect_suggestions(document, "", &detector, palette, &mut suggestions);
    suggestions
}

fn collect_suggestions(
    value: &Value,
    prefix: &str,
    detector: &FieldDetector,
    palette: &[String],
    out: &mut Vec<ExtractionRule>,
) {
    let Some(map) = value.as_object() else {
        return;
    };

    for (key, child) in map {
        if !is_path_safe(key) {
            continue;
        }
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        match child {
            Value::Array(items) => {
                let Some(sample) = items.first().and_then(Value::as_object) else {
                    continue;
                };
                let Some(fields) = detector.detect(sample) else {
                    continue;
                };
                if !is_path_safe(&fields.dates.start) || !is_path_safe(&fields.dates.end) {
                    continue;
                }

                let color = palette
                    .get(out.len() % palette.len().max(1))
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_PALETTE[0].to_string());

                out.push(ExtractionRule {
                    name: path.clone(),
                    array_path: path,
                    start_date_path: fields.dates.start,
                    end_date_path: fields.dates.end,
                    y_axis_path: fields.y_axis.filter(|k| is_path_safe(k)),
                    id_path: fields.id.filter(|k| is_path_safe(k)),
                    color,
                    enabled: true,
                });
            }
            Value::Object(_) => collect_suggestions(child, &path, detector, palette, out),
            _ => {}
        }
    }
}

/// Keys containing path syntax cannot be addressed by a rule path.
fn is_path_safe(key: &str) -> bool {
    !key.is_empty() && !key.contains('.') && !key.contains('[') && !key.contains(']')
}

/// The default palette as owned strings.
pub fn default_palette() -> Vec<String> {
    DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn events_rule() -> Value {
        json!({
            "name": "events",
            "arrayPath": "events",
            "startDatePath": "startDate",
            "endDatePath": "endDate",
            "idPath": "id",
            "color": "#1f77b4",
            "enabled": true
        })
    }

    #[test]
    fn test_validate_rule_accepts_well_formed() {
        let result = validate_rule(&events_rule());
        assert!(result.is_valid, "{:?}", result.errors);
    }

    #[test]
    fn test_validate_rule_reports_every_problem() {
        let result = validate_rule(&json!({
            "name": "",
            "arrayPath": 3,
            "startDatePath": "start",
            "color": "blue",
            "enabled": "yes",
            "idPath": 7
        }));

        assert!(!result.is_valid);
        assert!(result.errors.contains(&"name is required".to_string()));
        assert!(result.errors.contains(&"arrayPath must be a string".to_string()));
        assert!(result.errors.contains(&"endDatePath is required".to_string()));
        assert!(result.errors.contains(&"enabled must be a boolean".to_string()));
        assert!(result.errors.contains(&"idPath must be a string when present".to_string()));
        assert!(result.errors.iter().any(|e| e.starts_with("color 'blue'")));
    }

    #[test]
    fn test_validate_rule_color_pattern() {
        for (color, ok) in [("#1F77b4", true), ("#1f77b", false), ("1f77b4", false), ("#1f77b4ff", false)] {
            let mut rule = events_rule();
            rule["color"] = json!(color);
            assert_eq!(validate_rule(&rule).is_valid, ok, "{}", color);
        }
    }

    #[test]
    fn test_validate_non_object() {
        assert!(!validate_rule(&json!([1, 2])).is_valid);
    }

    #[test]
    fn test_typed_validate() {
        assert!(ExtractionRule::new("a", "b", "c", "d").validate().is_valid);
        let bad = ExtractionRule::new("", "b", "c", "d").with_color("red");
        assert_eq!(bad.validate().errors.len(), 2);
    }

    #[test]
    fn test_add_overwrites_in_place() {
        let mut set = RuleSet::with_defaults();
        let replacement = ExtractionRule::new("timeline", "items", "from", "to");
        set.add(replacement.clone());

        assert_eq!(set.len(), 5);
        assert_eq!(set.names()[1], "timeline");
        assert_eq!(set.get("timeline"), Some(&replacement));
    }

    #[test]
    fn test_disable_keeps_rule() {
        let mut set = RuleSet::with_defaults();
        assert!(set.set_enabled("events", false));
        assert_eq!(set.len(), 5);
        assert_eq!(set.enabled().count(), 4);
        assert!(!set.set_enabled("missing", false));
    }

    #[test]
    fn test_update_and_remove() {
        let mut set = RuleSet::with_defaults();
        let patch = RulePatch {
            color: Some("#000000".to_string()),
            id_path: Some(None),
            ..RulePatch::default()
        };
        assert!(set.update("events", patch));
        let rule = set.get("events").unwrap();
        assert_eq!(rule.color, "#000000");
        assert_eq!(rule.id_path, None);
        assert_eq!(rule.y_axis_path.as_deref(), Some("priority"));

        assert!(set.remove("events").is_some());
        assert!(set.get("events").is_none());
        assert_eq!(set.names()[0], "timeline");
    }

    #[test]
    fn test_export_then_import() {
        let set = RuleSet::with_defaults();
        let text = set.export_json().unwrap();
        assert_eq!(RuleSet::parse_json(&text).unwrap(), set);
    }

    #[test]
    fn test_import_drops_invalid_entries() {
        let text = json!([events_rule(), {"name": "broken"}]).to_string();
        let set = RuleSet::parse_json(&text).unwrap();
        assert_eq!(set.names(), vec!["events"]);
    }

    #[test]
    fn test_import_duplicate_names_last_wins() {
        let mut second = events_rule();
        second["arrayPath"] = json!("data.events");
        let mut other = events_rule();
        other["name"] = json!("other");
        let text = json!([events_rule(), other, second]).to_string();

        let set = RuleSet::parse_json(&text).unwrap();
        assert_eq!(set.names(), vec!["events", "other"]);
        assert_eq!(set.get("events").unwrap().array_path, "data.events");
    }

    #[test]
    fn test_import_failures_are_terminal() {
        assert!(matches!(RuleSet::parse_json("{not json"), Err(ImportError::Malformed(_))));
        assert_eq!(RuleSet::parse_json("{}"), Err(ImportError::NotAnArray));
        assert_eq!(
            RuleSet::parse_json(r#"[{"name": 1}]"#),
            Err(ImportError::NoValidRules { rejected: 1 })
        );
    }

    #[test]
    fn test_failed_import_leaves_rules_untouched() {
        let mut set = RuleSet::with_defaults();
        assert!(set.import_json("[]").is_err());
        assert_eq!(set, RuleSet::with_defaults());
    }

    #[test]
    fn test_suggest_rules() {
        let doc = json!({
            "meta": {"owner": "ops"},
            "data": {
                "releases": [
                    {"version": "1.0", "startDate": "2024-01-01", "endDate": "2024-01-03", "priority": 2}
                ]
            },
            "tags": ["a", "b"],
            "milestones": [{"title": "M1", "dueDate": "2024-05-01"}]
        });

        let suggestions = suggest_rules(&doc, &default_palette());
        assert_eq!(suggestions.len(), 2);

        let releases = &suggestions[0];
        assert_eq!(releases.name, "data.releases");
        assert_eq!(releases.array_path, "data.releases");
        assert_eq!(releases.start_date_path, "startDate");
        assert_eq!(releases.end_date_path, "endDate");
        assert_eq!(releases.id_path.as_deref(), Some("version"));
        assert_eq!(releases.y_axis_path.as_deref(), Some("priority"));
        assert_eq!(releases.color, "#1f77b4");

        let milestones = &suggestions[1];
        assert_eq!(milestones.start_date_path, "dueDate");
        assert_eq!(milestones.end_date_path, "dueDate");
        assert_eq!(milestones.id_path.as_deref(), Some("title"));
        assert_eq!(milestones.color, "#ff7f0e");
        assert!(milestones.validate().is_valid);
    }
}
