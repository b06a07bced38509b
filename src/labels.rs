//! Fingerprint to benchmark-name map.
//!
//! The scheduler writes the map once into `<run_dir>/labels.json` before
//! launching anything. Readers (the correlator, the `results` and `report`
//! commands) only ever load it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("unable to read label file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to write label file {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid label file {path}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("fingerprint {hash} is already labelled `{existing}`, cannot relabel it `{label}`")]
    Duplicate {
        hash: String,
        existing: String,
        label: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelStore {
    labels: BTreeMap<String, String>,
}

impl LabelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(run_dir: &Path) -> PathBuf {
        run_dir.join(crate::defaults::LABELS_FILE)
    }

    /// Add a label; a fingerprint can only be labelled once
    pub fn insert(&mut self, hash: impl Into<String>, label: impl Into<String>) -> Result<(), LabelError> {
        let hash = hash.into();
        let label = label.into();
        if let Some(existing) = self.labels.get(&hash) {
            return Err(LabelError::Duplicate {
                hash,
                existing: existing.clone(),
                label,
            });
        }
        self.labels.insert(hash, label);
        Ok(())
    }

    pub fn get(&self, hash: &str) -> Option<&str> {
        self.labels.get(hash).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labels.iter().map(|(h, l)| (h.as_str(), l.as_str()))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn load(run_dir: &Path) -> Result<Self, LabelError> {
        let path = Self::path(run_dir);
        let content = std::fs::read_to_string(&path).map_err(|source| LabelError::Read {
            path: path.clone(),
            source,
        })?;
        let store: Self =
            serde_json::from_str(&content).map_err(|source| LabelError::Format { path: path.clone(), source })?;
        debug!("Loaded {} label(s) from {:?}", store.len(), path);
        Ok(store)
    }

    pub fn save(&self, run_dir: &Path) -> Result<PathBuf, LabelError> {
        let path = Self::path(run_dir);
        let json = serde_json::to_string_pretty(self).map_err(|source| LabelError::Format {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, json).map_err(|source| LabelError::Write {
            path: path.clone(),
            source,
        })?;
        debug!("Saved {} label(s) to {:?}", self.len(), path);
        Ok(path)
    }
}
