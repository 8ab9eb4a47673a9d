//! Extraction runtime.
//!
//! Rule-driven and heuristic extraction, the per-call report that collects
//! entities and warnings, and the settings shared by the front ends.

pub mod context;
pub mod extractor;
pub mod config_loader;

// Re-export key types
pub use context::{ExtractionReport, ExtractionWarning, WarningKind};
pub use extractor::{
    auto_detect, extract_from_document, probe_rule, AutoDetector, EntitySource, RuleSource,
    TimelineExtractor, ROOT_ARRAY_TAG,
};
pub use config_loader::{load_rules_file, Settings, DEFAULT_MAX_FILE_SIZE};
