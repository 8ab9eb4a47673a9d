//! # jsontimeline: Timeline Entities from Arbitrary JSON
//!
//! jsontimeline pulls time-bounded records out of JSON documents of unknown
//! shape and normalizes them into a single timeline entity model, ready to be
//! filtered, merged and rendered.
//!
//! ## Features
//!
//! - **Rule-driven extraction**: declare an array path and per-element field paths
//! - **Auto-detection**: heuristic discovery of date, id and axis fields when no rule is enabled
//! - **Lenient dates**: ISO-8601, epoch milliseconds and a few explicit formats, all normalized to UTC
//! - **Non-fatal failures**: bad elements and bad rules become warnings, never errors
//! - **Presentation pipeline**: file, rule, date-range, array-type and column filters with a stable sort
//!
//! ## Example: Extraction Rule
//!
//! ```json
//! {
//!   "name": "deployments",
//!   "arrayPath": "data.deployments",
//!   "startDatePath": "deployedAt",
//!   "endDatePath": "completedAt",
//!   "yAxisPath": "environment",
//!   "idPath": "version",
//!   "color": "#d62728",
//!   "enabled": true
//! }
//! ```
//!
//! ## Example: Extract and Transform
//!
//! ```ignore
//! use jsontimeline::{extract_from_document, transform, FilterState, RuleSet};
//!
//! let rules = RuleSet::with_defaults().to_vec();
//! let report = extract_from_document("plan.json", &document, &rules);
//! let view = transform(&report.entities, &rules, &[], &FilterState::default());
//! ```

// Core modules
pub mod entity;
pub mod extraction;
pub mod dates;
pub mod heuristics;
pub mod rules;
pub mod pipeline;
pub mod serialization;

// Extraction runtime and settings
pub mod runtime;

// I/O boundary
pub mod source;
pub mod error;

// Re-export key types
pub use entity::TimelineEntity;
pub use extraction::{list_available_paths, resolve_path, validate_path, FieldPath, PathError};
pub use dates::{parse_date, to_iso_string, DateRange};
pub use heuristics::FieldDetector;
pub use rules::{suggest_rules, validate_rule, ExtractionRule, ImportError, RuleSet, RuleValidation};
pub use pipeline::{merge_entity_groups, transform, FilterState, FilterValue, VisualizationData};
pub use serialization::{write_entities, OutputFormat};
pub use error::TimelineError;

// Re-export runtime types
pub use runtime::{
    auto_detect, extract_from_document, ExtractionReport, ExtractionWarning, Settings,
    TimelineExtractor, WarningKind,
};

pub use source::{load_document, load_documents, SourceDocument};
