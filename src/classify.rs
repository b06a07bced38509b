//! Classification of failed runs.
//!
//! An empty `.err` file is a successful run. Anything else is a failure
//! whose content is matched against the [`KnownError`] catalogue by
//! substring, in declaration order; the first match wins, so a message is
//! never counted under two signatures. Messages matching nothing are kept
//! verbatim so the catalogue can be extended later.

use crate::experiment::ERROR_SUFFIX;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("unable to list run directory {path}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to read error log {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Known failure signatures, in matching order
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KnownError {
    /// An Open MPI runtime daemon died before reporting back to `mpirun`
    DaemonLaunchFailure,
    /// The Slurm step daemon killed the job, usually on time limit
    SchedulerTimeout,
    /// The overlap benchmark reached its element-count ceiling
    ElementCountCeiling,
    /// The overlap benchmark could not calibrate its compute loop
    CalibrationFailure,
}

impl KnownError {
    pub const ALL: [KnownError; 4] = [
        KnownError::DaemonLaunchFailure,
        KnownError::SchedulerTimeout,
        KnownError::ElementCountCeiling,
        KnownError::CalibrationFailure,
    ];

    /// Literal substring identifying the failure
    pub fn signature(&self) -> &'static str {
        match self {
            KnownError::DaemonLaunchFailure => "An ORTE daemon has unexpectedly failed after launch",
            KnownError::SchedulerTimeout => "slurmstepd",
            KnownError::ElementCountCeiling => "Cannot further increase n_elts",
            KnownError::CalibrationFailure => "Calibration failed",
        }
    }

    pub fn matching(message: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|known| message.contains(known.signature()))
    }
}

impl fmt::Display for KnownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KnownError::DaemonLaunchFailure => write!(f, "MPI daemon launch failure"),
            KnownError::SchedulerTimeout => write!(f, "Job manager timeout"),
            KnownError::ElementCountCeiling => write!(f, "Overlap element count ceiling"),
            KnownError::CalibrationFailure => write!(f, "Overlap calibration failure"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub successful: usize,
    pub failed: usize,
    pub catalogued: BTreeMap<KnownError, Vec<String>>,
    /// Raw content of the uncatalogued error logs, byte for byte
    pub unknown: Vec<Vec<u8>>,
}

impl Classification {
    /// Account for one run given the content of its error log
    pub fn record(&mut self, message: String) {
        self.record_bytes(message.into_bytes());
    }

    /// Same as [`Classification::record`] for logs that may not be UTF-8
    pub fn record_bytes(&mut self, content: Vec<u8>) {
        if content.is_empty() {
            self.successful += 1;
            return;
        }

        self.failed += 1;
        let known = KnownError::matching(&String::from_utf8_lossy(&content));
        match known {
            Some(known) => {
                let message = String::from_utf8_lossy(&content).into_owned();
                self.catalogued.entry(known).or_default().push(message);
            }
            None => self.unknown.push(content),
        }
    }

    pub fn count(&self, known: KnownError) -> usize {
        self.catalogued.get(&known).map_or(0, Vec::len)
    }

    pub fn total(&self) -> usize {
        self.successful + self.failed
    }
}

/// Classify every `.err` file of `run_dir`, in file name order
pub fn classify(run_dir: &Path) -> Result<Classification, ClassifyError> {
    let read_dir_error = |source| ClassifyError::ReadDir {
        path: run_dir.to_path_buf(),
        source,
    };

    let mut error_files = Vec::new();
    for entry in std::fs::read_dir(run_dir).map_err(read_dir_error)? {
        let path = entry.map_err(read_dir_error)?.path();
        if path
            .file_name()
            .and_then(|name| name.to_str())
            .map_or(false, |name| name.ends_with(ERROR_SUFFIX))
        {
            error_files.push(path);
        }
    }
    error_files.sort();

    let mut classification = Classification::default();
    for path in error_files {
        let content = std::fs::read(&path).map_err(|source| ClassifyError::Read {
            path: path.clone(),
            source,
        })?;
        classification.record_bytes(content);
    }

    debug!(
        "{} successful run(s), {} failed run(s), {} uncatalogued error(s)",
        classification.successful,
        classification.failed,
        classification.unknown.len()
    );
    Ok(classification)
}
