//! Output writers for extracted entities and table rows.
//!
//! Entities leave the engine either as NDJSON (one object per line, suited to
//! piping) or as a single JSON array, compact or pretty.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use serde::Serialize;

use crate::entity::TimelineEntity;

#[derive(Debug)]
pub enum OutputError {
    Json(serde_json::Error),
    Io(std::io::Error),
}

impl From<serde_json::Error> for OutputError {
    fn from(err: serde_json::Error) -> Self {
        OutputError::Json(err)
    }
}

impl From<std::io::Error> for OutputError {
    fn from(err: std::io::Error) -> Self {
        OutputError::Io(err)
    }
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputError::Json(e) => write!(f, "Failed to encode output: {}", e),
            OutputError::Io(e) => write!(f, "Failed to write output: {}", e),
        }
    }
}

impl std::error::Error for OutputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OutputError::Json(e) => Some(e),
            OutputError::Io(e) => Some(e),
        }
    }
}

/// Output layout selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Ndjson,
    Json,
    Pretty,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ndjson" | "jsonl" => Ok(OutputFormat::Ndjson),
            "json" => Ok(OutputFormat::Json),
            "pretty" => Ok(OutputFormat::Pretty),
            other => Err(format!("unknown output format '{}' (expected ndjson, json or pretty)", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Ndjson => "ndjson",
            OutputFormat::Json => "json",
            OutputFormat::Pretty => "pretty",
        };
        write!(f, "{}", name)
    }
}

/// One JSON document per line.
pub struct NdjsonWriter<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> NdjsonWriter<W> {
    /// Create a new NDJSON writer
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Write one item as a line
    pub fn write<T: Serialize>(&mut self, item: &T) -> Result<(), OutputError> {
        serde_json::to_writer(&mut self.writer, item)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    /// Write each item as its own line
    pub fn write_all<T: Serialize>(&mut self, items: &[T]) -> Result<(), OutputError> {
        for item in items {
            self.write(item)?;
        }
        Ok(())
    }

    /// Lines written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush the underlying writer
    pub fn flush(&mut self) -> Result<(), OutputError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Streams items into a single JSON array.
///
/// The opening bracket is written on construction; call [`finish`](Self::finish)
/// to close it.
pub struct JsonArrayWriter<W: Write> {
    writer: W,
    first: bool,
    pretty: bool,
}

impl<W: Write> JsonArrayWriter<W> {
    /// Create a compact array writer
    pub fn new(writer: W) -> Result<Self, OutputError> {
        Self::with_layout(writer, false)
    }

    /// Indented output, one element per block.
    pub fn pretty(writer: W) -> Result<Self, OutputError> {
        Self::with_layout(writer, true)
    }

    fn with_layout(mut writer: W, pretty: bool) -> Result<Self, OutputError> {
        writer.write_all(b"[")?;
        Ok(Self {
            writer,
            first: true,
            pretty,
        })
    }

    /// Append one element
    pub fn write<T: Serialize>(&mut self, item: &T) -> Result<(), OutputError> {
        if !self.first {
            self.writer.write_all(b",")?;
        }
        self.first = false;

        if self.pretty {
            let body = serde_json::to_string_pretty(item)?;
            self.writer.write_all(b"\n")?;
            for (i, line) in body.lines().enumerate() {
                if i > 0 {
                    self.writer.write_all(b"\n")?;
                }
                write!(self.writer, "  {}", line)?;
            }
        } else {
            serde_json::to_writer(&mut self.writer, item)?;
        }
        Ok(())
    }

    /// Close the array and flush
    pub fn finish(mut self) -> Result<(), OutputError> {
        if self.pretty && !self.first {
            self.writer.write_all(b"\n")?;
        }
        self.writer.write_all(b"]\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Write any serializable items in the chosen layout.
pub fn write_items<W: Write, T: Serialize>(writer: W, items: &[T], format: OutputFormat) -> Result<(), OutputError> {
    match format {
        OutputFormat::Ndjson => {
            let mut out = NdjsonWriter::new(writer);
            out.write_all(items)?;
            out.flush()
        }
        OutputFormat::Json | OutputFormat::Pretty => {
            let mut out = if format == OutputFormat::Pretty {
                JsonArrayWriter::pretty(writer)?
            } else {
                JsonArrayWriter::new(writer)?
            };
            for item in items {
                out.write(item)?;
            }
            out.finish()
        }
    }
}

/// Write entities in the chosen layout.
pub fn write_entities<W: Write>(writer: W, entities: &[TimelineEntity], format: OutputFormat) -> Result<(), OutputError> {
    write_items(writer, entities, format)
}
