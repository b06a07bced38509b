//! Markdown report of a run.
//!
//! `report.md` holds, in order, the configuration files verbatim, the count
//! of successful and failed runs, and every catalogued error with its
//! occurrences. Uncatalogued errors go to `unknown_errors.md`, written only
//! when there is at least one.

use crate::classify::{self, Classification, ClassifyError, KnownError};
use crate::defaults::{REPORT_FILE, UNKNOWN_ERRORS_FILE};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("unable to read configuration file {path}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to analyze the run errors")]
    Classify(#[from] ClassifyError),

    #[error("unable to write {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Files produced by [`generate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFiles {
    pub report: PathBuf,
    pub unknown_errors: Option<PathBuf>,
    pub classification: Classification,
}

/// Classify the errors of `run_dir` and write the report into `output_dir`
pub fn generate(config_files: &[PathBuf], run_dir: &Path, output_dir: &Path) -> Result<ReportFiles, ReportError> {
    let mut configuration = Vec::with_capacity(config_files.len());
    for path in config_files {
        let content = std::fs::read_to_string(path).map_err(|source| ReportError::ReadConfig {
            path: path.clone(),
            source,
        })?;
        configuration.push((path.as_path(), content));
    }

    let classification = classify::classify(run_dir)?;

    let unknown_errors = if classification.unknown.is_empty() {
        None
    } else {
        let path = output_dir.join(UNKNOWN_ERRORS_FILE);
        write_file(&path, &render_unknown_errors(&classification.unknown))?;
        info!("Successfully created {:?}", path);
        Some(path)
    };

    let report = output_dir.join(REPORT_FILE);
    write_file(&report, &render_report(&configuration, &classification))?;
    info!("Successfully created {:?}", report);

    Ok(ReportFiles {
        report,
        unknown_errors,
        classification,
    })
}

pub fn render_report(configuration: &[(&Path, String)], classification: &Classification) -> String {
    let mut out = String::new();

    out.push_str("# Configuration\n\n");
    for (path, content) in configuration {
        let _ = writeln!(out, "## {}\n", path.display());
        out.push_str(content);
        if !content.ends_with('\n') {
            out.push('\n');
        }
        out.push('\n');
    }

    let _ = write!(
        out,
        "# Results overview\n\nNumber of successful runs: {}\nNumber of failed runs: {}\n\n",
        classification.successful, classification.failed
    );

    if !classification.catalogued.is_empty() {
        out.push_str("# Catalogued errors\n\n");
        for known in KnownError::ALL {
            let Some(messages) = classification.catalogued.get(&known) else {
                continue;
            };
            let _ = write!(
                out,
                "## {}\n\n{} error(s) of type:\n{}\n\n",
                known,
                messages.len(),
                known.signature()
            );
            for message in messages {
                let _ = write!(out, "{}\n\n", message);
            }
        }
    }

    out
}

/// Uncatalogued messages are copied byte for byte
pub fn render_unknown_errors(messages: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for (idx, message) in messages.iter().enumerate() {
        out.extend_from_slice(format!("# Error {}:\n", idx).as_bytes());
        out.extend_from_slice(message);
        out.extend_from_slice(b"\n\n");
    }
    out
}

fn write_file(path: &Path, content: impl AsRef<[u8]>) -> Result<(), ReportError> {
    std::fs::write(path, content).map_err(|source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    })
}
