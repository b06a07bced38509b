//! Maps the output files of a run directory back to benchmark names.

use crate::experiment::OUTPUT_SUFFIX;
use crate::labels::LabelStore;
use crate::suites::BenchmarkFamily;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Number of `-` separated tokens in a well-formed output file name
const NAME_TOKENS: usize = 3;

const DOUBLED_OVERLAP_PREFIX: &str = "overlap_overlap_";

#[derive(Debug, Error)]
pub enum CorrelateError {
    #[error("unable to list run directory {path}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("output file {path} has no label for fingerprint {hash}")]
    UnlabelledOutput { hash: String, path: PathBuf },

    #[error("unable to find output file for {label} (fingerprint {hash})")]
    MissingOutput { hash: String, label: String },
}

/// Output files of one run, per family, keyed by benchmark name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelatedOutputs {
    pub point_to_point: BTreeMap<String, PathBuf>,
    pub message_rate: BTreeMap<String, PathBuf>,
    pub overlap: BTreeMap<String, PathBuf>,
}

impl CorrelatedOutputs {
    pub fn family(&self, family: BenchmarkFamily) -> &BTreeMap<String, PathBuf> {
        match family {
            BenchmarkFamily::PointToPoint => &self.point_to_point,
            BenchmarkFamily::MessageRate => &self.message_rate,
            BenchmarkFamily::Overlap => &self.overlap,
        }
    }

    fn family_mut(&mut self, family: BenchmarkFamily) -> &mut BTreeMap<String, PathBuf> {
        match family {
            BenchmarkFamily::PointToPoint => &mut self.point_to_point,
            BenchmarkFamily::MessageRate => &mut self.message_rate,
            BenchmarkFamily::Overlap => &mut self.overlap,
        }
    }

    pub fn len(&self) -> usize {
        self.point_to_point.len() + self.message_rate.len() + self.overlap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Output files of a run directory, keyed by fingerprint
///
/// Only `<hash>-<meta>-<meta>.out` names are candidates; anything else is
/// ignored.
pub fn output_files(run_dir: &Path) -> Result<BTreeMap<String, PathBuf>, CorrelateError> {
    let entries = std::fs::read_dir(run_dir).map_err(|source| CorrelateError::ReadDir {
        path: run_dir.to_path_buf(),
        source,
    })?;

    let mut files = BTreeMap::new();
    for entry in entries {
        let entry = entry.map_err(|source| CorrelateError::ReadDir {
            path: run_dir.to_path_buf(),
            source,
        })?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if !name.ends_with(OUTPUT_SUFFIX) {
            continue;
        }

        let tokens: Vec<&str> = name.split('-').collect();
        if tokens.len() != NAME_TOKENS {
            debug!("Skipping {}: not an experiment output file", name);
            continue;
        }
        if let Some(previous) = files.insert(tokens[0].to_string(), entry.path()) {
            warn!("Several output files for fingerprint {}, ignoring {:?}", tokens[0], previous);
        }
    }

    Ok(files)
}

/// Resolve every labelled experiment to its output file
///
/// Both directions must be complete: an output file without a label, or a
/// label without an output file, means the run directory is corrupted or
/// partial.
pub fn correlate(run_dir: &Path, labels: &LabelStore) -> Result<CorrelatedOutputs, CorrelateError> {
    let files = output_files(run_dir)?;

    if let Some((hash, path)) = files.iter().find(|(hash, _)| labels.get(hash).is_none()) {
        return Err(CorrelateError::UnlabelledOutput {
            hash: hash.clone(),
            path: path.clone(),
        });
    }

    let mut outputs = CorrelatedOutputs::default();
    for (hash, label) in labels.iter() {
        let path = files.get(hash).ok_or_else(|| CorrelateError::MissingOutput {
            hash: hash.to_string(),
            label: label.to_string(),
        })?;

        let Some(family) = BenchmarkFamily::from_label(label) else {
            debug!("Ignoring {}: not part of any benchmark family", label);
            continue;
        };
        let name = match family {
            BenchmarkFamily::Overlap => canonical_overlap_name(label),
            _ => label.to_string(),
        };
        outputs.family_mut(family).insert(name, path.clone());
    }

    debug!(
        "Correlated {} output file(s) in {:?}: {} point-to-point, {} message rate, {} overlap",
        outputs.len(),
        run_dir,
        outputs.point_to_point.len(),
        outputs.message_rate.len(),
        outputs.overlap.len()
    );
    Ok(outputs)
}

/// `overlap_overlap_X` becomes `overlap_X`
pub fn canonical_overlap_name(label: &str) -> String {
    label.replace(DOUBLED_OVERLAP_PREFIX, "overlap_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, "").unwrap();
        path
    }

    #[test]
    fn test_only_three_token_out_files_are_candidates() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "aaaa-2x1-0.out");
        touch(dir.path(), "aaaa-2x1-0.err");
        touch(dir.path(), "bbbb-2x1.out");
        touch(dir.path(), "cccc-2-x-1.out");
        touch(dir.path(), "labels.json");

        let files = output_files(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files["aaaa"].ends_with("aaaa-2x1-0.out"));
    }

    #[test]
    fn test_routing_by_family() {
        let dir = TempDir::new().unwrap();
        let mut labels = LabelStore::new();
        for (hash, label) in [
            ("h1", "osu_latency"),
            ("h2", "smb_mpi_overhead"),
            ("h3", "overlap_overlap_ibcast"),
            ("h4", "overlap_iallreduce"),
            ("h5", "imb_pingpong"),
        ] {
            labels.insert(hash, label).unwrap();
            touch(dir.path(), &format!("{}-2x1-0.out", hash));
        }

        let outputs = correlate(dir.path(), &labels).unwrap();
        assert_eq!(outputs.point_to_point.keys().collect::<Vec<_>>(), vec!["osu_latency"]);
        assert_eq!(outputs.message_rate.keys().collect::<Vec<_>>(), vec!["smb_mpi_overhead"]);
        assert_eq!(
            outputs.family(BenchmarkFamily::Overlap).keys().collect::<Vec<_>>(),
            vec!["overlap_iallreduce", "overlap_ibcast"]
        );
        assert_eq!(outputs.len(), 4);
    }

    #[test]
    fn test_label_without_output_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut labels = LabelStore::new();
        labels.insert("h1", "osu_latency").unwrap();
        labels.insert("h2", "osu_bw").unwrap();
        touch(dir.path(), "h1-2x1-0.out");

        let err = correlate(dir.path(), &labels).unwrap_err();
        assert!(matches!(err, CorrelateError::MissingOutput { ref label, .. } if label == "osu_bw"));
    }

    #[test]
    fn test_output_without_label_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut labels = LabelStore::new();
        labels.insert("h1", "osu_latency").unwrap();
        touch(dir.path(), "h1-2x1-0.out");
        touch(dir.path(), "h9-2x1-1.out");

        let err = correlate(dir.path(), &labels).unwrap_err();
        assert!(matches!(err, CorrelateError::UnlabelledOutput { ref hash, .. } if hash == "h9"));
    }

    #[test]
    fn test_missing_run_directory() {
        let dir = TempDir::new().unwrap();
        let err = correlate(&dir.path().join("absent"), &LabelStore::new()).unwrap_err();
        assert!(matches!(err, CorrelateError::ReadDir { .. }));
    }

    #[test]
    fn test_canonical_overlap_name() {
        assert_eq!(canonical_overlap_name("overlap_overlap_igather"), "overlap_igather");
        assert_eq!(canonical_overlap_name("overlap_igather"), "overlap_igather");
    }
}
