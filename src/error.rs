//! Error type for the I/O boundary.
//!
//! The extraction engine itself reports problems as values (warnings,
//! validation results, `None`). This type covers what can go wrong around it:
//! reading files, parsing documents and loading settings or rule sets.

use std::fmt;
use std::path::PathBuf;

use crate::rules::ImportError;

#[derive(Debug)]
pub enum TimelineError {
    Io { path: PathBuf, source: std::io::Error },
    Json { path: PathBuf, source: serde_json::Error },
    Yaml { path: PathBuf, source: serde_yaml::Error },
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },
    UnsupportedExtension { path: PathBuf },
    Import(ImportError),
    Config(String),
}

impl fmt::Display for TimelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimelineError::Io { path, source } => {
                write!(f, "Failed to read {}: {}", path.display(), source)
            }
            TimelineError::Json { path, source } => {
                write!(f, "Invalid JSON in {}: {}", path.display(), source)
            }
            TimelineError::Yaml { path, source } => {
                write!(f, "Invalid YAML in {}: {}", path.display(), source)
            }
            TimelineError::FileTooLarge { path, size, limit } => write!(
                f,
                "File {} is {} bytes, larger than the {} byte limit",
                path.display(),
                size,
                limit
            ),
            TimelineError::UnsupportedExtension { path } => {
                write!(f, "Unsupported file type: {}", path.display())
            }
            TimelineError::Import(err) => write!(f, "{}", err),
            TimelineError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for TimelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TimelineError::Io { source, .. } => Some(source),
            TimelineError::Json { source, .. } => Some(source),
            TimelineError::Yaml { source, .. } => Some(source),
            TimelineError::Import(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ImportError> for TimelineError {
    fn from(err: ImportError) -> Self {
        TimelineError::Import(err)
    }
}
