//! Path resolution over arbitrary JSON.
//!
//! Paths are dotted field names with optional single-level array indexing:
//! `data.events`, `timeline.items[0].date`, `user.profile.name`. Dots inside
//! brackets never split a segment.

use std::fmt;

use serde_json::Value;

/// Default depth bound for [`list_available_paths`].
pub const DEFAULT_PATH_DEPTH: usize = 3;

/// A parsed path into a JSON document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    /// The raw path string
    pub raw: String,
    /// Parsed path segments
    pub segments: Vec<PathSegment>,
}

/// A segment in a field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A named field (e.g., "user", "name")
    Field(String),
    /// A named array followed by a literal index (e.g., "items[0]")
    Index { field: String, index: usize },
}

/// Error type for path parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    Empty,
    Malformed { path: String, segment: String },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::Empty => write!(f, "Path is empty"),
            PathError::Malformed { path, segment } => {
                write!(f, "Malformed segment '{}' in path '{}'", segment, path)
            }
        }
    }
}

impl std::error::Error for PathError {}

impl FieldPath {
    /// Parse a path string.
    ///
    /// A path with no `.` and no `[` is a single key, taken verbatim.
    ///
    /// # Example
    ///
    /// ```
    /// use jsontimeline::extraction::{FieldPath, PathSegment};
    ///
    /// let path = FieldPath::parse("timeline.items[0].date").unwrap();
    /// assert_eq!(path.segments.len(), 3);
    /// assert_eq!(
    ///     path.segments[1],
    ///     PathSegment::Index { field: "items".to_string(), index: 0 }
    /// );
    /// ```
    pub fn parse(path: &str) -> Result<Self, PathError> {
        if path.is_empty() {
            return Err(PathError::Empty);
        }

        if !path.contains('.') && !path.contains('[') {
            return Ok(Self {
                raw: path.to_string(),
                segments: vec![PathSegment::Field(path.to_string())],
            });
        }

        let segments = split_segments(path)
            .into_iter()
            .map(|s| parse_segment(path, s))
            .collect::<Result<Vec<_>, _>>()?;

        if segments.is_empty() {
            return Err(PathError::Empty);
        }

        Ok(Self {
            raw: path.to_string(),
            segments,
        })
    }

    /// Follow this path from `root`. `None` means not found.
    pub fn resolve<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;

        for segment in &self.segments {
            if current.is_null() {
                return None;
            }

            current = match segment {
                PathSegment::Field(name) => current.as_object()?.get(name)?,
                PathSegment::Index { field, index } => {
                    current.as_object()?.get(field)?.as_array()?.get(*index)?
                }
            };
        }

        Some(current)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Split on dots outside brackets, dropping empty pieces.
fn split_segments(path: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_brackets = false;
    let mut start = 0;

    for (i, c) in path.char_indices() {
        match c {
            '[' => in_brackets = true,
            ']' => in_brackets = false,
            '.' if !in_brackets => {
                if i > start {
                    parts.push(&path[start..i]);
                }
                start = i + 1;
            }
            _ => {}
        }
    }

    if start < path.len() {
        parts.push(&path[start..]);
    }

    parts
}

fn parse_segment(path: &str, segment: &str) -> Result<PathSegment, PathError> {
    if !segment.contains('[') && !segment.contains(']') {
        return Ok(PathSegment::Field(segment.to_string()));
    }

    let malformed = || PathError::Malformed {
        path: path.to_string(),
        segment: segment.to_string(),
    };

    let open = segment.find('[').ok_or_else(malformed)?;
    let (field, rest) = segment.split_at(open);
    let digits = rest
        .strip_prefix('[')
        .and_then(|r| r.strip_suffix(']'))
        .ok_or_else(malformed)?;

    if field.is_empty()
        || field.contains(']')
        || digits.is_empty()
        || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(malformed());
    }

    let index = digits.parse::<usize>().map_err(|_| malformed())?;

    Ok(PathSegment::Index {
        field: field.to_string(),
        index,
    })
}

/// Resolve `path` against `root`. Empty paths, null roots and malformed
/// syntax all resolve to `None`.
pub fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if root.is_null() {
        return None;
    }
    FieldPath::parse(path).ok()?.resolve(root)
}

/// Whether `path` addresses anything in `root`. A present `null` counts.
pub fn validate_path(root: &Value, path: &str) -> bool {
    resolve_path(root, path).is_some()
}

/// Enumerate dotted paths in a document, sampling the first element of each
/// non-empty array. Order follows the document; duplicates are dropped.
pub fn list_available_paths(root: &Value, max_depth: usize) -> Vec<String> {
    let mut paths = Vec::new();
    collect_paths(root, "", 0, max_depth, &mut paths);

    let mut seen = std::collections::HashSet::new();
    paths.retain(|p| !p.is_empty() && seen.insert(p.clone()));
    paths
}

fn collect_paths(current: &Value, prefix: &str, depth: usize, max_depth: usize, out: &mut Vec<String>) {
    if depth > max_depth {
        return;
    }

    match current {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                out.push(path.clone());
                collect_paths(child, &path, depth + 1, max_depth, out);
            }
        }
        Value::Array(items) => {
            if let Some(first) = items.first() {
                out.push(prefix.to_string());
                let sample = format!("{}[0]", prefix);
                out.push(sample.clone());
                collect_paths(first, &sample, depth + 1, max_depth, out);
            }
        }
        _ => {}
    }
}
