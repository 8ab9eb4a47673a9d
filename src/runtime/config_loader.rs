//! Settings loader.
//!
//! Loads engine settings from YAML, applies environment overrides and resolves
//! the active rule set (rules file when configured, built-in defaults otherwise).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::TimelineError;
use crate::extraction::DEFAULT_PATH_DEPTH;
use crate::rules::{default_palette, default_rules, ExtractionRule, RuleSet};

/// Default cap on document size: 10 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Engine settings shared by the CLI and the HTTP API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Colors handed out to suggested rules.
    pub color_palette: Vec<String>,

    /// Documents larger than this many bytes are refused.
    pub max_file_size: u64,

    /// Accepted document extensions, including the dot.
    pub supported_extensions: Vec<String>,

    /// Depth bound for available-path listings.
    pub available_paths_depth: usize,

    /// Rules used when no rules file is configured.
    pub default_rules: Vec<ExtractionRule>,

    /// JSON rule-set file; replaces `default_rules` when present.
    pub rules_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            color_palette: default_palette(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            supported_extensions: vec![".json".to_string()],
            available_paths_depth: DEFAULT_PATH_DEPTH,
            default_rules: default_rules(),
            rules_file: None,
        }
    }
}

impl Settings {
    /// Load settings from a YAML file.
    ///
    /// Missing keys take their defaults.
    ///
    /// # Example
    /// ```ignore
    /// use jsontimeline::runtime::Settings;
    ///
    /// let settings = Settings::load_from_file("config/timeline.yaml")?;
    /// println!("Palette: {:?}", settings.color_palette);
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, TimelineError> {
        let path = path.as_ref();

        let contents = fs::read_to_string(path).map_err(|source| TimelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let settings: Settings = serde_yaml::from_str(&contents).map_err(|source| TimelineError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, TimelineError> {
        Self::default().with_env_overrides()
    }

    /// Apply `JSONTIMELINE_MAX_FILE_SIZE` and `JSONTIMELINE_RULES_FILE`.
    pub fn with_env_overrides(mut self) -> Result<Self, TimelineError> {
        if let Ok(raw) = std::env::var("JSONTIMELINE_MAX_FILE_SIZE") {
            self.max_file_size = raw.trim().parse().map_err(|_| {
                TimelineError::Config(format!("JSONTIMELINE_MAX_FILE_SIZE is not a byte count: {}", raw))
            })?;
        }
        if let Ok(raw) = std::env::var("JSONTIMELINE_RULES_FILE") {
            if !raw.trim().is_empty() {
                self.rules_file = Some(PathBuf::from(raw));
            }
        }
        Ok(self)
    }

    fn validate(&self) -> Result<(), TimelineError> {
        if self.color_palette.is_empty() {
            return Err(TimelineError::Config("color_palette must not be empty".to_string()));
        }
        for rule in &self.default_rules {
            let validation = rule.validate();
            if !validation.is_valid {
                return Err(TimelineError::Config(format!(
                    "default rule '{}' is invalid: {}",
                    rule.name,
                    validation.errors.join("; ")
                )));
            }
        }
        Ok(())
    }

    /// Whether a path has one of the supported extensions (case-insensitive).
    pub fn is_supported(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        self.supported_extensions
            .iter()
            .any(|ext| name.ends_with(&ext.to_lowercase()))
    }

    /// The active rule set: the rules file when configured, else the defaults.
    pub fn load_rules(&self) -> Result<RuleSet, TimelineError> {
        match &self.rules_file {
            Some(path) => load_rules_file(path),
            None => Ok(RuleSet::from(self.default_rules.clone())),
        }
    }
}

/// Read and import a JSON rule-set file.
pub fn load_rules_file<P: AsRef<Path>>(path: P) -> Result<RuleSet, TimelineError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| TimelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(RuleSet::parse_json(&text)?)
}
