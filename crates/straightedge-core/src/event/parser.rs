//! Line-oriented reader for diff stream files.
//!
//! # Format (v1)
//!
//! ```text
//! # straightedge diff stream v1
//! # any comment
//! {"sequence": 1, "changes": [ ... ]}
//! {"sequence": 2, "changes": [ ... ]}
//! ```
//!
//! - Comment lines start with `#` and are returned as [`ParsedLine::Comment`].
//! - Blank/whitespace-only lines are returned as [`ParsedLine::Blank`].
//! - Every other line is one JSON [`DiffBatch`].
//!
//! The header is optional. When the first line looks like a header, its
//! version must not be newer than [`CURRENT_VERSION`].

use std::io::BufRead;

use tracing::warn;

use super::DiffBatch;
use crate::error::ErrorCode;

/// The header line written at the top of a diff stream file.
pub const STREAM_HEADER: &str = "# straightedge diff stream v1";

/// The stream format version understood by this build.
pub const CURRENT_VERSION: u32 = 1;

const HEADER_PREFIX: &str = "# straightedge diff stream v";

/// One classified line of a diff stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine<'a> {
    Blank,
    Comment(&'a str),
    Batch(DiffBatch),
}

/// Errors raised while reading a diff stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("failed to read diff stream: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: invalid batch JSON: {source}")]
    InvalidBatch {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    VersionMismatch(String),
}

impl StreamError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Io(_) | Self::InvalidBatch { .. } => ErrorCode::StreamParseError,
            Self::VersionMismatch(_) => ErrorCode::StreamVersionMismatch,
        }
    }
}

/// Detect the stream format version from a header line.
///
/// # Errors
///
/// Returns an actionable message if the header is malformed or announces a
/// version newer than [`CURRENT_VERSION`].
pub fn detect_version(first_line: &str) -> Result<u32, String> {
    let line = first_line.trim();
    let Some(version_str) = line.strip_prefix(HEADER_PREFIX) else {
        return Err(format!(
            "Invalid diff stream header: expected '{HEADER_PREFIX}N', got '{line}'."
        ));
    };
    let version: u32 = version_str.parse().map_err(|_| {
        format!(
            "Invalid version number '{version_str}' in diff stream header.\n\
             Expected a positive integer after '{HEADER_PREFIX}'."
        )
    })?;
    if version > CURRENT_VERSION {
        return Err(format!(
            "Diff stream version {version} is newer than this version of straightedge \
             (supports up to v{CURRENT_VERSION}).\n\
             Please upgrade straightedge."
        ));
    }
    Ok(version)
}

/// Classify and parse a single line.
///
/// # Errors
///
/// Returns the JSON error when a data line is not a valid batch.
pub fn parse_line(line: &str) -> Result<ParsedLine<'_>, serde_json::Error> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(ParsedLine::Blank);
    }
    if let Some(comment) = trimmed.strip_prefix('#') {
        return Ok(ParsedLine::Comment(comment.trim_start()));
    }
    serde_json::from_str(trimmed).map(ParsedLine::Batch)
}

/// Streams batches out of a reader, one line at a time.
#[derive(Debug)]
pub struct BatchReader<R> {
    reader: R,
    line_no: usize,
    buf: String,
    last_sequence: Option<u64>,
}

impl<R: BufRead> BatchReader<R> {
    pub const fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            buf: String::new(),
            last_sequence: None,
        }
    }

    fn next_batch(&mut self) -> Result<Option<DiffBatch>, StreamError> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            if self.line_no == 1 && self.buf.trim_start().starts_with(HEADER_PREFIX) {
                detect_version(&self.buf).map_err(StreamError::VersionMismatch)?;
                continue;
            }

            let line = self.line_no;
            match parse_line(&self.buf) {
                Ok(ParsedLine::Blank | ParsedLine::Comment(_)) => {}
                Ok(ParsedLine::Batch(batch)) => {
                    if let Some(last) = self.last_sequence.filter(|&last| batch.sequence <= last) {
                        warn!(
                            line,
                            sequence = batch.sequence,
                            previous = last,
                            "diff stream sequence is not increasing"
                        );
                    }
                    self.last_sequence = Some(batch.sequence);
                    return Ok(Some(batch));
                }
                Err(source) => return Err(StreamError::InvalidBatch { line, source }),
            }
        }
    }
}

impl<R: BufRead> Iterator for BatchReader<R> {
    type Item = Result<DiffBatch, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch().transpose()
    }
}

/// Read a whole diff stream.
///
/// # Errors
///
/// Returns the first [`StreamError`] met.
pub fn read_stream(reader: impl BufRead) -> Result<Vec<DiffBatch>, StreamError> {
    BatchReader::new(reader).collect()
}
