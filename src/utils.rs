//! # Utility Functions and Helper Module
//!
//! Small helpers shared by the scheduler, the parsers and the report code:
//!
//! - **Text normalization**: collapsing the irregular spacing that benchmark
//!   tools emit in their tables
//! - **Formatting**: human-readable durations and progress bars for the
//!   scheduler's progress log
//!
//! ## Usage Examples
//!
//! ```rust
//! use hpca_bench::utils::*;
//! use std::time::Duration;
//!
//! assert_eq!(clean_line("4194304\t\t  4500.00"), "4194304 4500.00");
//! assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
//! ```

use std::time::Duration;

/// Normalize a line of benchmark output
///
/// Tabs become spaces and every run of spaces collapses to a single space.
/// Leading and trailing spaces are preserved as a single space, so callers
/// that count tokens after `split(' ')` see the same token layout the
/// benchmark tools produce (a trailing column separator yields a trailing
/// empty token).
pub fn clean_line(line: &str) -> String {
    let mut cleaned = String::with_capacity(line.len());
    let mut previous_was_space = false;

    for c in line.chars() {
        let c = if c == '\t' { ' ' } else { c };
        if c == ' ' {
            if !previous_was_space {
                cleaned.push(' ');
            }
            previous_was_space = true;
        } else {
            cleaned.push(c);
            previous_was_space = false;
        }
    }

    cleaned
}

/// Convert a duration to a human-readable string
///
/// Picks the largest unit that keeps the value at or above 1.
pub fn format_duration(duration: Duration) -> String {
    let ns = duration.as_nanos();

    if ns < 1_000 {
        format!("{}ns", ns)
    } else if ns < 1_000_000 {
        format!("{:.2}μs", ns as f64 / 1_000.0)
    } else if ns < 1_000_000_000 {
        format!("{:.2}ms", ns as f64 / 1_000_000.0)
    } else if ns < 60_000_000_000 {
        format!("{:.2}s", ns as f64 / 1_000_000_000.0)
    } else {
        let secs = duration.as_secs();
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}

/// Create a simple progress bar
///
/// ```rust
/// # use hpca_bench::utils::create_progress_indicator;
/// assert_eq!(create_progress_indicator(0, 100, 10), "░░░░░░░░░░");
/// assert_eq!(create_progress_indicator(50, 100, 10), "█████░░░░░");
/// assert_eq!(create_progress_indicator(100, 100, 10), "██████████");
/// ```
pub fn create_progress_indicator(current: usize, total: usize, width: usize) -> String {
    if total == 0 {
        return "█".repeat(width);
    }

    let progress = (current as f64 / total as f64).min(1.0);
    let filled = ((progress * width as f64) as usize).min(width);
    let empty = width - filled;

    format!("{}{}", "█".repeat(filled), "░".repeat(empty))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_line_collapses_tabs_and_spaces() {
        assert_eq!(clean_line("1\t\t1.23"), "1 1.23");
        assert_eq!(clean_line("# Size      Bandwidth (MB/s)"), "# Size Bandwidth (MB/s)");
        assert_eq!(clean_line("no-op"), "no-op");
    }

    #[test]
    fn test_clean_line_keeps_single_trailing_separator() {
        let cleaned = clean_line("8       1000        12.5        ");
        assert_eq!(cleaned, "8 1000 12.5 ");
        assert_eq!(cleaned.split(' ').count(), 4);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_nanos(500)), "500ns");
        assert_eq!(format_duration(Duration::from_micros(1500)), "1.50ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m05s");
    }

    #[test]
    fn test_create_progress_indicator() {
        assert_eq!(create_progress_indicator(0, 7, 7), "░░░░░░░");
        assert_eq!(create_progress_indicator(7, 7, 7), "███████");
        assert_eq!(create_progress_indicator(0, 0, 3), "███");
    }
}
