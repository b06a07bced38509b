//! Parsers for the text printed by the benchmark binaries.
//!
//! Every format gets a dedicated function that takes the output lines
//! (as produced by splitting the file content on `\n`) and either returns a
//! measurement or fails with a [`ParseError`]. None of them guess: a layout
//! that does not match the documented one is an error.

use crate::utils::clean_line;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseFloatError;
use std::path::Path;
use thiserror::Error;

pub mod bandwidth;
pub mod latency;
pub mod overhead;
pub mod overlap;

/// Unit reported when an output file does not announce one
pub const UNKNOWN_UNIT: &str = "Unknown";

/// Errors raised when an output file does not follow its expected layout
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("expected at least {expected} lines, found {found}")]
    TooFewLines { expected: usize, found: usize },

    #[error("expected exactly {expected} lines, found {found}")]
    LineCount { expected: usize, found: usize },

    #[error("line {line}: expected a header starting with `{expected}`, found `{found}`")]
    MissingHeader {
        line: usize,
        expected: &'static str,
        found: String,
    },

    #[error("line {line}: unexpected layout `{content}` ({reason})")]
    Layout {
        line: usize,
        content: String,
        reason: String,
    },

    #[error("line {line}: invalid number `{token}`")]
    InvalidNumber {
        line: usize,
        token: String,
        #[source]
        source: ParseFloatError,
    },

    #[error("no data found")]
    NoData,
}

/// A value together with the unit it was reported in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub value: f64,
    pub unit: String,
}

impl Measurement {
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

/// The content of one output file
///
/// Lines are split on `\n` only, so a file ending with a newline yields a
/// trailing empty line. The line-count checks of the parsers rely on it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawData {
    pub lines: Vec<String>,
    pub unit: Option<String>,
}

impl RawData {
    pub fn from_text(text: &str) -> Self {
        Self {
            lines: text.split('\n').map(str::to_string).collect(),
            unit: None,
        }
    }

    pub fn read(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_text(&text))
    }

    /// Record the unit announced by a header such as `# Size Latency (us)`
    ///
    /// Lines are whitespace-normalized before matching `header_prefix`.
    pub fn with_unit_from_header(mut self, header_prefix: &str) -> Self {
        self.unit = self.lines.iter().find_map(|line| {
            clean_line(line)
                .strip_prefix(header_prefix)
                .map(|rest| rest.trim_end().trim_end_matches(')').to_string())
        });
        self
    }
}

pub(crate) fn parse_number(line: usize, token: &str) -> Result<f64, ParseError> {
    token
        .trim()
        .parse::<f64>()
        .map_err(|source| ParseError::InvalidNumber {
            line,
            token: token.to_string(),
            source,
        })
}
