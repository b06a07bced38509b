//! Overlap suite output.
//!
//! Each overlap benchmark reports its result on a single line such as
//! `Overlap: 87 %`. Output without that line yields `None` so the caller can
//! record the sub-benchmark as missing data.

use super::{parse_number, ParseError};

const PREFIX: &str = "Overlap: ";

pub fn parse<S: AsRef<str>>(lines: &[S]) -> Result<Option<f64>, ParseError> {
    let found = lines
        .iter()
        .enumerate()
        .find(|(_, line)| line.as_ref().starts_with(PREFIX));

    match found {
        Some((idx, line)) => {
            let value = line.as_ref()[PREFIX.len()..]
                .trim_end_matches(|c| c == '\n' || c == '\r')
                .trim_end_matches(" %");
            parse_number(idx, value).map(Some)
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_line() {
        let lines = ["Running overlap_iallreduce", "Overlap: 87 %", ""];
        assert_eq!(parse(&lines).unwrap(), Some(87.0));
    }

    #[test]
    fn test_first_overlap_line_wins() {
        let lines = ["Overlap: 12.5 %", "Overlap: 99 %"];
        assert_eq!(parse(&lines).unwrap(), Some(12.5));
    }

    #[test]
    fn test_missing_line_is_none() {
        let lines = ["Calibration failed", ""];
        assert_eq!(parse(&lines).unwrap(), None);
    }

    #[test]
    fn test_carriage_return() {
        assert_eq!(parse(&["Overlap: 40 %\r"]).unwrap(), Some(40.0));
    }

    #[test]
    fn test_garbage_value_is_an_error() {
        let err = parse(&["", "Overlap: lots %"]).unwrap_err();
        assert!(matches!(err, ParseError::InvalidNumber { line: 1, .. }));
    }
}
