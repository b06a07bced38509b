//! OSU latency table.
//!
//! ```text
//! # OSU MPI Latency Test v5.8
//! # Size          Latency (us)
//! 1                       1.23
//! 2                       1.24
//! ```
//!
//! Only the first data row (the smallest message size) is used.

use super::{parse_number, Measurement, ParseError, UNKNOWN_UNIT};
use tracing::trace;

const UNIT_MARKER: &str = "Latency (";

pub fn parse<S: AsRef<str>>(lines: &[S]) -> Result<Measurement, ParseError> {
    let mut unit = UNKNOWN_UNIT.to_string();

    for (idx, line) in lines.iter().enumerate().skip(1) {
        let line = line.as_ref();

        if line.trim().is_empty() || line.starts_with('#') {
            if let Some((_, rest)) = line.split_once(UNIT_MARKER) {
                if let Some(end) = rest.find(')') {
                    unit = rest[..end].to_string();
                }
            }
            continue;
        }

        let mut tokens = line.split_whitespace();
        let size = tokens.next().ok_or_else(|| layout(idx, line))?;
        parse_number(idx, size)?;
        let latency = tokens.next().ok_or_else(|| layout(idx, line))?;
        let value = parse_number(idx, latency)?;

        trace!("latency for {} byte(s): {} {}", size, value, unit);
        return Ok(Measurement::new(value, unit));
    }

    Err(ParseError::NoData)
}

fn layout(line: usize, content: &str) -> ParseError {
    ParseError::Layout {
        line,
        content: content.to_string(),
        reason: "expected `<size> <latency>`".to_string(),
    }
}
