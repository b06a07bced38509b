//! Tool and workspace configuration.
//!
//! Both files use the same line-oriented format:
//!
//! ```text
//! # comment
//! dir = /scratch/hpca
//! mpi = /opt/openmpi
//!
//! [slurm]
//! partition = cpu
//! ```
//!
//! The tool file (`hpca.conf`, shipped with the installation) holds one
//! section per benchmark suite with its source `URL`. The sentinel
//! `OPENHPCA_DIR` in a URL is replaced by the installation base directory.
//! The workspace file holds the workspace directory, the MPI installation
//! and the job manager settings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Replaced by the installation base directory in `URL` values
pub const BASEDIR_SENTINEL: &str = "OPENHPCA_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read configuration file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: invalid entry `{content}`")]
    InvalidLine {
        path: PathBuf,
        line: usize,
        content: String,
    },

    #[error("{path}:{line}: unknown section `{section}`")]
    UnknownSection {
        path: PathBuf,
        line: usize,
        section: String,
    },

    #[error("installation base directory {0} does not exist")]
    Basedir(PathBuf),

    #[error("no workspace has been defined ({0} does not exist)")]
    MissingWorkspace(PathBuf),

    #[error("the workspace configuration {0} does not set `dir`")]
    UndefinedWorkspaceDir(PathBuf),

    #[error("MPI installation directory {0} is not valid")]
    InvalidMpiDir(PathBuf),

    #[error("the maximum number of active jobs must be greater than 0 ({0})")]
    InvalidMaxRunningJobs(usize),

    #[error("invalid overlap configuration {path}")]
    OverlapTuning {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Source locations of the benchmark suites
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteSources {
    pub osu: Option<String>,
    pub osu_noncontig_mem: Option<String>,
    pub smb: Option<String>,
    pub overlap: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub config_file: PathBuf,
    pub dir: PathBuf,
    pub mpi_dir: Option<PathBuf>,
    pub mpirun_args: Vec<String>,
    pub slurm_partition: Option<String>,
}

impl Workspace {
    pub fn run_dir(&self) -> PathBuf {
        self.dir.join("run")
    }

    pub fn install_dir(&self) -> PathBuf {
        self.dir.join("install")
    }
}

/// The loaded configuration, passed explicitly to whoever needs it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub basedir: PathBuf,
    pub tool_config_file: PathBuf,
    pub sources: SuiteSources,
    pub workspace: Workspace,
}

impl Config {
    /// Load and check both configuration files
    pub fn load(basedir: &Path, tool_config: &Path, workspace_config: &Path) -> Result<Self, ConfigError> {
        if !basedir.is_dir() {
            return Err(ConfigError::Basedir(basedir.to_path_buf()));
        }

        info!("Parsing the configuration file {:?}", tool_config);
        let mut sources = SuiteSources::default();
        for entry in read_entries(tool_config)? {
            let url = (entry.key == "URL").then(|| substitute_basedir(&entry.value, basedir));
            let slot = match entry.section.as_str() {
                "OSU" => &mut sources.osu,
                "osu_noncontig_mem" => &mut sources.osu_noncontig_mem,
                "SMB" => &mut sources.smb,
                "overlap" => &mut sources.overlap,
                _ => return Err(entry.unknown_section(tool_config)),
            };
            if url.is_some() {
                *slot = url;
            }
        }

        info!("Parsing the workspace configuration file {:?}", workspace_config);
        if !workspace_config.is_file() {
            return Err(ConfigError::MissingWorkspace(workspace_config.to_path_buf()));
        }
        let mut workspace = Workspace {
            config_file: workspace_config.to_path_buf(),
            ..Workspace::default()
        };
        for entry in read_entries(workspace_config)? {
            match (entry.section.to_lowercase().as_str(), entry.key.as_str()) {
                ("", "dir") => workspace.dir = PathBuf::from(&entry.value),
                ("", "mpi") | ("", "MPI") => workspace.mpi_dir = Some(PathBuf::from(&entry.value)),
                ("", "mpirun_args") => {
                    workspace.mpirun_args = entry.value.split_whitespace().map(str::to_string).collect()
                }
                ("slurm", "partition") => workspace.slurm_partition = Some(entry.value.clone()),
                ("", _) | ("slurm", _) => debug!("Ignoring workspace key `{}`", entry.key),
                _ => return Err(entry.unknown_section(workspace_config)),
            }
        }
        if workspace.dir.as_os_str().is_empty() {
            return Err(ConfigError::UndefinedWorkspaceDir(workspace_config.to_path_buf()));
        }

        Ok(Self {
            basedir: basedir.to_path_buf(),
            tool_config_file: tool_config.to_path_buf(),
            sources,
            workspace,
        })
    }

    pub fn run_dir(&self) -> PathBuf {
        self.workspace.run_dir()
    }

    pub fn install_dir(&self) -> PathBuf {
        self.workspace.install_dir()
    }

    /// Files copied verbatim into the report
    pub fn files(&self) -> Vec<PathBuf> {
        vec![self.tool_config_file.clone(), self.workspace.config_file.clone()]
    }

    /// The MPI installation must exist whenever `mpirun` comes from it
    pub fn check_mpi_dir(&self) -> Result<(), ConfigError> {
        match &self.workspace.mpi_dir {
            Some(dir) if !dir.is_dir() => Err(ConfigError::InvalidMpiDir(dir.clone())),
            _ => Ok(()),
        }
    }
}

/// Zero would never launch anything; any positive budget is accepted
pub fn check_max_running_jobs(max_running_jobs: usize) -> Result<(), ConfigError> {
    if max_running_jobs == 0 {
        return Err(ConfigError::InvalidMaxRunningJobs(max_running_jobs));
    }
    Ok(())
}

pub fn substitute_basedir(value: &str, basedir: &Path) -> String {
    value.replace(BASEDIR_SENTINEL, &basedir.display().to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    line: usize,
    section: String,
    key: String,
    value: String,
}

impl Entry {
    fn unknown_section(&self, path: &Path) -> ConfigError {
        ConfigError::UnknownSection {
            path: path.to_path_buf(),
            line: self.line,
            section: self.section.clone(),
        }
    }
}

fn read_entries(path: &Path) -> Result<Vec<Entry>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_entries(path, &content)
}

fn parse_entries(path: &Path, content: &str) -> Result<Vec<Entry>, ConfigError> {
    let mut entries = Vec::new();
    let mut section = String::new();

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = name.trim().to_string();
            continue;
        }

        let tokens: Vec<&str> = line.split('=').collect();
        if tokens.len() != 2 {
            return Err(ConfigError::InvalidLine {
                path: path.to_path_buf(),
                line: idx + 1,
                content: raw.to_string(),
            });
        }
        entries.push(Entry {
            line: idx + 1,
            section: section.clone(),
            key: tokens[0].trim().to_string(),
            value: tokens[1].trim().to_string(),
        });
    }

    Ok(entries)
}

/// Per-benchmark element-count ceilings for the overlap suite
///
/// ```json
/// { "max_num_elts": { "overlap_iallreduce": 1048576 } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlapTuning {
    #[serde(default)]
    max_num_elts: BTreeMap<String, u64>,
}

impl OverlapTuning {
    pub fn from_table(max_num_elts: BTreeMap<String, u64>) -> Self {
        Self { max_num_elts }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::OverlapTuning {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn max_num_elts(&self, benchmark: &str) -> Option<u64> {
        self.max_num_elts.get(benchmark).copied()
    }
}
