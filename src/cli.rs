use crate::config::Config;
use crate::experiment::{Launcher, MpiFamily, Platform};
use crate::suites::Selection;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// HPCA Bench - runs MPI micro-benchmarks and reports HPC metrics
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Verbose output
    #[clap(short = 'v', long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Installation base directory holding the tool configuration file
    #[clap(long, global = true)]
    pub basedir: Option<PathBuf>,

    /// Workspace configuration file (default: ~/.hpca/workspace.conf)
    #[clap(long, global = true)]
    pub workspace_config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the benchmarks, then compute the metrics and write the report
    Run(RunArgs),
    /// Compute and display the metrics of an existing run
    Results(ResultsArgs),
    /// Generate the report of an existing run
    Report(ReportArgs),
}

impl Command {
    /// Short name used for the log file
    pub fn name(&self) -> &'static str {
        match self {
            Command::Run(_) => "run",
            Command::Results(_) => "results",
            Command::Report(_) => "report",
        }
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Partition to submit the jobs to (job manager only)
    #[clap(short = 'p', long, help_heading = "Platform")]
    pub partition: Option<String>,

    /// Network device to use
    #[clap(short = 'd', long, help_heading = "Platform")]
    pub device: Option<String>,

    /// Number of MPI ranks per node
    #[clap(long, default_value_t = crate::defaults::PPN, help_heading = "Platform")]
    pub ppn: usize,

    /// Number of nodes
    #[clap(long, default_value_t = crate::defaults::NUM_NODES, help_heading = "Platform")]
    pub num_nodes: usize,

    /// Maximum number of experiments running at any given time; the others
    /// are queued and started as running ones complete
    #[clap(long, default_value_t = crate::defaults::MAX_RUNNING_JOBS, help_heading = "Execution")]
    pub max_running_jobs: usize,

    /// How experiment processes are started
    #[clap(long, value_enum, default_value_t = LauncherKind::Mpirun, help_heading = "Execution")]
    pub launcher: LauncherKind,

    /// MPI implementation family used by mpirun
    #[clap(long, value_enum, default_value_t = MpiFamily::OpenMpi, help_heading = "Execution")]
    pub mpi: MpiFamily,

    /// Interval between two progress messages (e.g. "5s", "500ms")
    #[clap(long, value_parser = parse_duration, default_value = "5s", help_heading = "Execution")]
    pub progress_interval: Duration,

    /// Run every installed benchmark, including those not used by the metrics
    #[clap(long, default_value_t = false, help_heading = "Benchmark Selection")]
    pub long: bool,

    /// Select the OSU suite
    #[clap(long, default_value_t = false, help_heading = "Benchmark Selection")]
    pub osu: bool,

    /// Select the OSU suite for non-contiguous memory
    #[clap(long = "osu-noncontigmem", default_value_t = false, help_heading = "Benchmark Selection")]
    pub osu_noncontig_mem: bool,

    /// Select the SMB suite
    #[clap(long, default_value_t = false, help_heading = "Benchmark Selection")]
    pub smb: bool,

    /// Select the overlap suite
    #[clap(long, default_value_t = false, help_heading = "Benchmark Selection")]
    pub overlap: bool,

    /// JSON file with per-benchmark element-count ceilings for the overlap suite
    #[clap(long, help_heading = "Benchmark Selection")]
    pub overlap_config: Option<PathBuf>,
}

impl RunArgs {
    pub fn selection(&self) -> Selection {
        Selection {
            long: self.long,
            osu: self.osu,
            osu_noncontig_mem: self.osu_noncontig_mem,
            smb: self.smb,
            overlap: self.overlap,
        }
    }

    /// Batch-wide platform; the workspace partition is used when none is given
    pub fn platform(&self, config: &Config) -> Platform {
        Platform {
            max_ppr: self.ppn,
            max_nodes: self.num_nodes,
            partition: self
                .partition
                .clone()
                .or_else(|| config.workspace.slurm_partition.clone()),
            device: self.device.clone(),
        }
    }

    pub fn launcher(&self, config: &Config) -> Launcher {
        match self.launcher {
            LauncherKind::Direct => Launcher::Direct,
            LauncherKind::Mpirun => Launcher::Mpirun {
                family: self.mpi,
                mpi_dir: config.workspace.mpi_dir.clone(),
                extra_args: config.workspace.mpirun_args.clone(),
            },
            LauncherKind::Srun => Launcher::Srun {
                partition: config.workspace.slurm_partition.clone(),
            },
        }
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ResultsArgs {
    /// Run directory (default: the workspace run directory)
    #[clap(long)]
    pub run_dir: Option<PathBuf>,

    /// Print the metrics as JSON
    #[clap(long, default_value_t = false)]
    pub json: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ReportArgs {
    /// Run directory (default: the workspace run directory)
    #[clap(long)]
    pub run_dir: Option<PathBuf>,

    /// Directory receiving report.md and unknown_errors.md (default: the
    /// workspace directory)
    #[clap(short = 'o', long)]
    pub output_dir: Option<PathBuf>,
}

/// Available launchers
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum LauncherKind {
    /// mpirun from the workspace MPI installation
    #[clap(name = "mpirun")]
    Mpirun,

    /// Slurm srun
    #[clap(name = "srun")]
    Srun,

    /// Run benchmark binaries directly, without MPI launcher
    #[clap(name = "direct")]
    Direct,
}

impl std::fmt::Display for LauncherKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LauncherKind::Mpirun => write!(f, "mpirun"),
            LauncherKind::Srun => write!(f, "srun"),
            LauncherKind::Direct => write!(f, "direct"),
        }
    }
}

/// Parse duration from string (e.g., "500ms", "10s", "5m"); a bare number is
/// in seconds
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else {
        (s, "s")
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", num_str))?;

    let secs = match unit {
        "ms" => num / 1000.0,
        "s" => num,
        "m" => num * 60.0,
        _ => return Err(format!("Invalid duration unit: {}", unit)),
    };
    let duration = Duration::try_from_secs_f64(secs)
        .map_err(|_| format!("Invalid duration: {}", s))?;

    if duration.is_zero() {
        return Err("Duration must be greater than zero".to_string());
    }

    Ok(duration)
}
