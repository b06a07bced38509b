//! Experiment descriptors and the launchers that turn them into command lines.
//!
//! An [`Experiment`] is immutable once built. Its fingerprint is derived from
//! every field, so two experiments that would produce different output can
//! never share an output file name.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Number of hex characters kept from the SHA-256 digest
pub const FINGERPRINT_LEN: usize = 16;

pub const OUTPUT_SUFFIX: &str = ".out";
pub const ERROR_SUFFIX: &str = ".err";

/// Where and how wide an experiment runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// Maximum number of MPI ranks per node
    pub max_ppr: usize,
    /// Maximum number of nodes
    pub max_nodes: usize,
    /// Job manager partition, when one is used
    pub partition: Option<String>,
    /// Network device requested by the operator
    pub device: Option<String>,
}

impl Platform {
    pub fn new(max_ppr: usize, max_nodes: usize) -> Self {
        Self {
            max_ppr,
            max_nodes,
            partition: None,
            device: None,
        }
    }

    pub fn num_ranks(&self) -> usize {
        self.max_ppr * self.max_nodes
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::new(crate::defaults::PPN, crate::defaults::NUM_NODES)
    }
}

/// One scheduled invocation of a benchmark binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    name: String,
    binary: PathBuf,
    args: Vec<String>,
    platform: Platform,
    env: BTreeMap<String, String>,
    launcher_args: Vec<String>,
}

impl Experiment {
    pub fn new(name: impl Into<String>, binary: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            binary: binary.into(),
            args: Vec::new(),
            platform: Platform::default(),
            env: BTreeMap::new(),
            launcher_args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    pub fn with_launcher_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.launcher_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn launcher_args(&self) -> &[String] {
        &self.launcher_args
    }

    /// Stable hash of every defining parameter
    ///
    /// Hex-encoded, so it never contains the `-` used to separate the
    /// tokens of output file names.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hash_field(&mut hasher, self.name.as_bytes());
        hash_field(&mut hasher, &path_bytes(&self.binary));
        hash_list(&mut hasher, &self.args);
        hash_field(&mut hasher, &(self.platform.max_ppr as u64).to_le_bytes());
        hash_field(&mut hasher, &(self.platform.max_nodes as u64).to_le_bytes());
        hash_optional(&mut hasher, self.platform.partition.as_deref());
        hash_optional(&mut hasher, self.platform.device.as_deref());
        hash_field(&mut hasher, &(self.env.len() as u64).to_le_bytes());
        for (name, value) in &self.env {
            hash_field(&mut hasher, name.as_bytes());
            hash_field(&mut hasher, value.as_bytes());
        }
        hash_list(&mut hasher, &self.launcher_args);

        let mut digest = format!("{:x}", hasher.finalize());
        digest.truncate(FINGERPRINT_LEN);
        digest
    }

    /// `<hash>-<nodes>x<ppr>-<index>`, shared by the `.out` and `.err` files
    pub fn file_stem(&self, index: usize) -> String {
        format!(
            "{}-{}x{}-{}",
            self.fingerprint(),
            self.platform.max_nodes,
            self.platform.max_ppr,
            index
        )
    }

    pub fn output_path(&self, run_dir: &Path, index: usize) -> PathBuf {
        run_dir.join(format!("{}{}", self.file_stem(index), OUTPUT_SUFFIX))
    }

    pub fn error_path(&self, run_dir: &Path, index: usize) -> PathBuf {
        run_dir.join(format!("{}{}", self.file_stem(index), ERROR_SUFFIX))
    }
}

impl fmt::Display for Experiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} node(s) x {} rank(s))",
            self.name, self.platform.max_nodes, self.platform.max_ppr
        )
    }
}

// Length-prefixed so that adjacent fields cannot run into each other.
fn hash_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn hash_list(hasher: &mut Sha256, items: &[String]) {
    hash_field(hasher, &(items.len() as u64).to_le_bytes());
    for item in items {
        hash_field(hasher, item.as_bytes());
    }
}

fn hash_optional(hasher: &mut Sha256, value: Option<&str>) {
    match value {
        Some(value) => {
            hasher.update([1u8]);
            hash_field(hasher, value.as_bytes());
        }
        None => hasher.update([0u8]),
    }
}

/// Raw bytes of a path, including paths that are not valid UTF-8
#[cfg(unix)]
fn path_bytes(path: &Path) -> Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    Cow::Borrowed(path.as_os_str().as_bytes())
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Cow<'_, [u8]> {
    Cow::Owned(path.to_string_lossy().into_owned().into_bytes())
}

/// MPI implementation family, which decides how environment variables are
/// forwarded to remote ranks
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum MpiFamily {
    #[clap(name = "openmpi")]
    OpenMpi,
    #[clap(name = "mpich")]
    Mpich,
    #[clap(name = "mvapich2")]
    Mvapich2,
}

impl fmt::Display for MpiFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MpiFamily::OpenMpi => write!(f, "Open MPI"),
            MpiFamily::Mpich => write!(f, "MPICH"),
            MpiFamily::Mvapich2 => write!(f, "MVAPICH2"),
        }
    }
}

impl MpiFamily {
    /// Launcher flags exporting one environment variable to every rank
    pub fn forward_env(&self, name: &str, value: &str) -> Vec<String> {
        match self {
            MpiFamily::OpenMpi => vec!["-x".to_string(), format!("{}={}", name, value)],
            MpiFamily::Mpich | MpiFamily::Mvapich2 => {
                vec!["-genv".to_string(), name.to_string(), value.to_string()]
            }
        }
    }

    fn placement(&self, platform: &Platform) -> Vec<String> {
        let mut args = vec!["-np".to_string(), platform.num_ranks().to_string()];
        match self {
            MpiFamily::OpenMpi => {
                args.push("--map-by".to_string());
                args.push(format!("ppr:{}:node", platform.max_ppr));
            }
            MpiFamily::Mpich | MpiFamily::Mvapich2 => {
                args.push("-ppn".to_string());
                args.push(platform.max_ppr.to_string());
            }
        }
        args
    }
}

/// How experiment processes are started
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launcher {
    /// Run the benchmark binary as is
    Direct,
    /// `mpirun` from the given MPI installation, or from `PATH`
    Mpirun {
        family: MpiFamily,
        mpi_dir: Option<PathBuf>,
        extra_args: Vec<String>,
    },
    /// Slurm `srun`
    Srun { partition: Option<String> },
}

/// A fully resolved command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

impl Launcher {
    pub fn command_line(&self, experiment: &Experiment) -> CommandLine {
        let platform = experiment.platform();
        match self {
            Launcher::Direct => CommandLine {
                program: experiment.binary().to_path_buf(),
                args: experiment.args().to_vec(),
            },
            Launcher::Mpirun {
                family,
                mpi_dir,
                extra_args,
            } => {
                let program = match mpi_dir {
                    Some(dir) => dir.join("bin").join("mpirun"),
                    None => PathBuf::from("mpirun"),
                };
                let mut args = family.placement(platform);
                args.extend(extra_args.iter().cloned());
                for (name, value) in experiment.env() {
                    args.extend(family.forward_env(name, value));
                }
                args.extend(experiment.launcher_args().iter().cloned());
                args.push(experiment.binary().display().to_string());
                args.extend(experiment.args().iter().cloned());
                CommandLine { program, args }
            }
            Launcher::Srun { partition } => {
                let mut args = vec![
                    "-N".to_string(),
                    platform.max_nodes.to_string(),
                    "--ntasks-per-node".to_string(),
                    platform.max_ppr.to_string(),
                ];
                if let Some(partition) = platform.partition.as_ref().or(partition.as_ref()) {
                    args.push("-p".to_string());
                    args.push(partition.clone());
                }
                args.extend(experiment.launcher_args().iter().cloned());
                args.push(experiment.binary().display().to_string());
                args.extend(experiment.args().iter().cloned());
                CommandLine {
                    program: PathBuf::from("srun"),
                    args,
                }
            }
        }
    }
}

impl fmt::Display for Launcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Launcher::Direct => write!(f, "direct"),
            Launcher::Mpirun { family, .. } => write!(f, "mpirun ({})", family),
            Launcher::Srun { .. } => write!(f, "srun"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlap_experiment() -> Experiment {
        Experiment::new("overlap_iallreduce", "/opt/hpca/overlap/overlap/overlap_iallreduce")
            .with_platform(Platform::new(2, 4))
            .with_env("OPENHPCA_OVERLAP_MAX_NUM_ELTS", "1048576")
    }

    #[test]
    fn test_fingerprint_is_stable_and_dash_free() {
        let exp = overlap_experiment();
        let fp = exp.fingerprint();
        assert_eq!(fp.len(), FINGERPRINT_LEN);
        assert!(!fp.contains('-'));
        assert_eq!(fp, overlap_experiment().fingerprint());
    }

    #[test]
    fn test_fingerprint_covers_every_parameter() {
        let base = overlap_experiment();
        let variants = [
            base.clone().with_args(["--msgsize", "8"]),
            base.clone().with_platform(Platform::new(1, 2)),
            base.clone().with_env("OTHER", "1"),
            base.clone().with_launcher_args(["--bind-to", "core"]),
            Experiment::new("overlap_ibcast", base.binary()),
        ];
        for variant in &variants {
            assert_ne!(variant.fingerprint(), base.fingerprint());
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_fingerprint_of_non_utf8_binaries() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let first = Experiment::new("osu_bw", Path::new(OsStr::from_bytes(b"/opt/\xff/osu_bw")));
        let second = Experiment::new("osu_bw", Path::new(OsStr::from_bytes(b"/opt/\xfe/osu_bw")));
        assert_eq!(first.fingerprint().len(), FINGERPRINT_LEN);
        assert_ne!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn test_fingerprint_field_boundaries() {
        let joined = Experiment::new("osu_bw", "/bin/x").with_args(["ab"]);
        let split = Experiment::new("osu_bw", "/bin/x").with_args(["a", "b"]);
        assert_ne!(joined.fingerprint(), split.fingerprint());
    }

    #[test]
    fn test_file_names_have_three_dash_tokens() {
        let exp = overlap_experiment();
        let out = exp.output_path(Path::new("/run"), 3);
        let name = out.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with("-4x2-3.out"));
        assert_eq!(name.split('-').count(), 3);
        assert_eq!(
            exp.error_path(Path::new("/run"), 3).extension().unwrap(),
            "err"
        );
    }

    #[test]
    fn test_direct_launcher() {
        let exp = Experiment::new("smb_mpi_overhead", "/bin/mpi_overhead").with_args(["--msgsize", "8"]);
        let cmd = Launcher::Direct.command_line(&exp);
        assert_eq!(cmd.program, PathBuf::from("/bin/mpi_overhead"));
        assert_eq!(cmd.args, vec!["--msgsize", "8"]);
    }

    #[test]
    fn test_openmpi_forwards_env_with_x() {
        let launcher = Launcher::Mpirun {
            family: MpiFamily::OpenMpi,
            mpi_dir: Some(PathBuf::from("/opt/ompi")),
            extra_args: vec!["--oversubscribe".to_string()],
        };
        let cmd = launcher.command_line(&overlap_experiment());
        assert_eq!(cmd.program, PathBuf::from("/opt/ompi/bin/mpirun"));
        assert_eq!(
            cmd.args,
            vec![
                "-np",
                "8",
                "--map-by",
                "ppr:2:node",
                "--oversubscribe",
                "-x",
                "OPENHPCA_OVERLAP_MAX_NUM_ELTS=1048576",
                "/opt/hpca/overlap/overlap/overlap_iallreduce",
            ]
        );
    }

    #[test]
    fn test_mpich_family_forwards_env_with_genv() {
        for family in [MpiFamily::Mpich, MpiFamily::Mvapich2] {
            let launcher = Launcher::Mpirun {
                family,
                mpi_dir: None,
                extra_args: Vec::new(),
            };
            let cmd = launcher.command_line(&overlap_experiment());
            assert_eq!(cmd.program, PathBuf::from("mpirun"));
            assert_eq!(&cmd.args[..4], &["-np", "8", "-ppn", "2"]);
            assert_eq!(
                &cmd.args[4..7],
                &["-genv", "OPENHPCA_OVERLAP_MAX_NUM_ELTS", "1048576"]
            );
        }
    }

    #[test]
    fn test_srun_partition_prefers_experiment_platform() {
        let mut platform = Platform::new(1, 2);
        platform.partition = Some("gpu".to_string());
        let exp = Experiment::new("osu_latency", "/bin/osu_latency").with_platform(platform);
        let launcher = Launcher::Srun {
            partition: Some("cpu".to_string()),
        };
        let cmd = launcher.command_line(&exp);
        assert_eq!(cmd.to_string(), "srun -N 2 --ntasks-per-node 1 -p gpu /bin/osu_latency");
    }
}
