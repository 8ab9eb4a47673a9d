//! Document loading.
//!
//! Reads JSON documents from disk with the size and extension gates from
//! [`Settings`]. A document's id is its file name, which becomes the
//! `sourceFile` of every entity extracted from it.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::TimelineError;
use crate::runtime::Settings;

/// A parsed JSON document ready for extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub id: String,
    pub path: PathBuf,
    pub content: Value,
}

/// File name of a path, or the whole path when it has none.
pub fn document_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Load one document.
///
/// Checks the extension first, then the size on disk, then parses.
pub fn load_document<P: AsRef<Path>>(path: P, settings: &Settings) -> Result<SourceDocument, TimelineError> {
    let path = path.as_ref();

    if !settings.is_supported(path) {
        return Err(TimelineError::UnsupportedExtension {
            path: path.to_path_buf(),
        });
    }

    let io_err = |source: std::io::Error| TimelineError::Io {
        path: path.to_path_buf(),
        source,
    };

    let size = fs::metadata(path).map_err(io_err)?.len();
    if size > settings.max_file_size {
        return Err(TimelineError::FileTooLarge {
            path: path.to_path_buf(),
            size,
            limit: settings.max_file_size,
        });
    }

    let text = fs::read_to_string(path).map_err(io_err)?;
    let content = parse_document(path, &text)?;

    tracing::debug!("Loaded {} ({} bytes)", path.display(), size);

    Ok(SourceDocument {
        id: document_name(path),
        path: path.to_path_buf(),
        content,
    })
}

/// Parse document text already in memory.
pub fn parse_document(path: &Path, text: &str) -> Result<Value, TimelineError> {
    serde_json::from_str(text).map_err(|source| TimelineError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Outcome of loading several documents.
#[derive(Debug, Default)]
pub struct LoadedDocuments {
    pub documents: Vec<SourceDocument>,
    pub failures: Vec<TimelineError>,
}

/// Load every path, collecting failures instead of stopping at the first.
pub fn load_documents<I, P>(paths: I, settings: &Settings) -> LoadedDocuments
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut loaded = LoadedDocuments::default();

    for path in paths {
        match load_document(path.as_ref(), settings) {
            Ok(document) => loaded.documents.push(document),
            Err(err) => {
                tracing::warn!("{}", err);
                loaded.failures.push(err);
            }
        }
    }

    tracing::info!(
        "Loaded {} documents ({} failed)",
        loaded.documents.len(),
        loaded.failures.len()
    );
    loaded
}
