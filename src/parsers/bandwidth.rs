//! OSU bandwidth table.
//!
//! ```text
//! # OSU MPI Bandwidth Test v5.8
//! # Size      Bandwidth (MB/s)
//! ...
//! 4194304              4500.00
//! ```
//!
//! The header sits on line 2. The bandwidth is the maximum over the last
//! non-empty row, which must be the 4 MiB row, and the five rows before it.
//! Several rows are considered because protocol cutovers make the largest
//! sizes noisy.

use super::{parse_number, Measurement, ParseError};
use crate::utils::clean_line;

pub const HEADER_PREFIX: &str = "# Size Bandwidth (";
pub const LARGEST_MESSAGE_SIZE: &str = "4194304";
pub const NORMALIZED_UNIT: &str = "Gb/s";

const HEADER_LINE: usize = 2;
const ROWS_CONSIDERED: usize = 6;

/// Extract the peak bandwidth, converting `MB/s` to `Gb/s`
pub fn parse<S: AsRef<str>>(lines: &[S]) -> Result<Measurement, ParseError> {
    if lines.len() < HEADER_LINE + 1 {
        return Err(ParseError::TooFewLines {
            expected: HEADER_LINE + 1,
            found: lines.len(),
        });
    }

    let header = clean_line(lines[HEADER_LINE].as_ref());
    let unit = header
        .strip_prefix(HEADER_PREFIX)
        .map(|rest| rest.trim_end().trim_end_matches(')').to_string())
        .ok_or_else(|| ParseError::MissingHeader {
            line: HEADER_LINE,
            expected: HEADER_PREFIX,
            found: header.clone(),
        })?;

    let last = lines
        .iter()
        .rposition(|line| !line.as_ref().trim().is_empty())
        .ok_or(ParseError::NoData)?;

    let last_line = lines[last].as_ref();
    if !last_line.trim_start().starts_with(LARGEST_MESSAGE_SIZE) {
        return Err(ParseError::Layout {
            line: last,
            content: last_line.to_string(),
            reason: format!("no result for {} byte messages", LARGEST_MESSAGE_SIZE),
        });
    }
    if last < HEADER_LINE + ROWS_CONSIDERED {
        return Err(ParseError::Layout {
            line: last,
            content: last_line.to_string(),
            reason: format!("fewer than {} data rows", ROWS_CONSIDERED),
        });
    }

    let mut peak = f64::MIN;
    for idx in (last + 1 - ROWS_CONSIDERED)..=last {
        let row = clean_line(lines[idx].as_ref().trim());
        let tokens: Vec<&str> = row.split(' ').collect();
        if tokens.len() != 2 {
            return Err(ParseError::Layout {
                line: idx,
                content: row,
                reason: "expected `<size> <bandwidth>`".to_string(),
            });
        }
        parse_number(idx, tokens[0])?;
        let value = parse_number(idx, tokens[1])?;
        peak = peak.max(value);
    }

    Ok(normalize(Measurement::new(peak, unit)))
}

/// Convert `MB/s` to `Gb/s`; other units are left untouched
pub fn normalize(measurement: Measurement) -> Measurement {
    if measurement.unit == "MB/s" {
        Measurement::new(measurement.value / 125.0, NORMALIZED_UNIT)
    } else {
        measurement
    }
}
