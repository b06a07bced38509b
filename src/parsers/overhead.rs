//! SMB `mpi_overhead` output.
//!
//! The tool prints a header, a column-title line, one data line and a final
//! newline, so a well-formed file splits into exactly four lines. The data
//! line carries eight space-separated fields once whitespace is normalized
//! (the trailing column separator produces the last, empty one); field 6 is
//! the CPU availability percentage used as the overhead score.

use super::{parse_number, ParseError};
use crate::utils::clean_line;

const EXPECTED_LINES: usize = 4;
const DATA_LINE: usize = 2;
const EXPECTED_FIELDS: usize = 8;
const OVERHEAD_FIELD: usize = 6;

pub fn parse<S: AsRef<str>>(lines: &[S]) -> Result<f64, ParseError> {
    if lines.len() != EXPECTED_LINES {
        return Err(ParseError::LineCount {
            expected: EXPECTED_LINES,
            found: lines.len(),
        });
    }

    let data = clean_line(lines[DATA_LINE].as_ref());
    let fields: Vec<&str> = data.split(' ').collect();
    if fields.len() != EXPECTED_FIELDS {
        return Err(ParseError::Layout {
            line: DATA_LINE,
            content: data.clone(),
            reason: format!(
                "{} fields instead of {}",
                fields.len(),
                EXPECTED_FIELDS
            ),
        });
    }

    parse_number(DATA_LINE, fields[OVERHEAD_FIELD])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_six_is_the_overhead() {
        let lines = [
            "# mpi_overhead",
            "msgsize iterations iter_t work_t overhead base_t avail(%) ",
            "8       1000        1.10        2.20        0.30        1.90        12.5        ",
            "",
        ];
        assert_eq!(parse(&lines).unwrap(), 12.5);
    }

    #[test]
    fn test_tabs_are_normalized() {
        let lines = ["h", "c", "8\t1000\t1.1\t2.2\t0.3\t1.9\t-3.0\t", ""];
        assert_eq!(parse(&lines).unwrap(), -3.0);
    }

    #[test]
    fn test_three_lines_is_a_format_error() {
        let lines = ["# mpi_overhead", "columns", "8 1000 1.1 2.2 0.3 1.9 12.5 "];
        assert_eq!(
            parse(&lines),
            Err(ParseError::LineCount {
                expected: 4,
                found: 3
            })
        );
    }

    #[test]
    fn test_wrong_field_count_is_a_format_error() {
        let lines = ["h", "c", "8 1000 12.5", ""];
        assert!(matches!(
            parse(&lines),
            Err(ParseError::Layout { line: 2, .. })
        ));
    }

    #[test]
    fn test_non_numeric_field() {
        let lines = ["h", "c", "8 1000 1.1 2.2 0.3 1.9 n/a ", ""];
        assert!(matches!(
            parse(&lines),
            Err(ParseError::InvalidNumber { line: 2, .. })
        ));
    }
}
