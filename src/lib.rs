//! # HPCA Bench Library
//!
//! Orchestration and result analysis for a suite of MPI micro-benchmarks:
//! point-to-point latency and bandwidth (OSU), message rate and MPI overhead
//! (SMB) and communication/computation overlap.
//!
//! The library runs a fixed batch of benchmark experiments as independent
//! processes under a bounded concurrency budget, then turns the loosely
//! structured text the benchmarks print into one metrics record and a
//! Markdown report of successful and failed runs.
//!
//! ## Architecture Overview
//!
//! The pipeline is organized leaf-first:
//!
//! - `labels`: fingerprint to benchmark-name map persisted in the run directory
//! - `correlate`: maps output files back to benchmarks, grouped by family
//! - `parsers`: one pure function per benchmark output format
//! - `aggregate`: combines parsed measurements into a `Metrics` record
//! - `classify`: buckets failed runs by known error signatures
//! - `report`: writes the Markdown report and the unknown-errors log
//! - `scheduler`: launches experiments with bounded concurrency
//! - `pipeline`: runs a batch, then always writes the report
//!
//! Supporting modules:
//!
//! - `config`: tool and workspace configuration files
//! - `experiment`: experiment descriptors, fingerprints and launchers
//! - `suites`: the benchmark catalogue and selection rules
//! - `results`: results summary output (text and JSON)
//! - `cli`, `logging`, `utils`: command line, log formatting, helpers
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use hpca_bench::{aggregate, report};
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let run_dir = Path::new("/scratch/hpca/run");
//!
//!     let metrics = aggregate::compute(run_dir)?;
//!     println!("Bandwidth: {}", metrics.bandwidth);
//!     println!("Overlap: {:.2}%", metrics.overlap_score);
//!
//!     report::generate(&[Path::new("hpca.conf").to_path_buf()], run_dir, Path::new("."))?;
//!     Ok(())
//! }
//! ```

/// Score aggregation over a completed run directory
///
/// Runs every parser over the correlated output files and produces a single
/// `Metrics` value, failing on any parse error or unexpected unit.
pub mod aggregate;

/// Failed-run classification against the known error catalogue
pub mod classify;

/// Command-line interface
///
/// Provides argument parsing using clap for the `run`, `results` and `report`
/// subcommands.
pub mod cli;

/// Tool and workspace configuration loading
pub mod config;

/// Output file correlation
///
/// Maps `<hash>-<meta>-<meta>.out` files back to benchmark names through the
/// label store and partitions them by benchmark family.
pub mod correlate;

/// Experiment descriptors, fingerprints and launcher command lines
pub mod experiment;

/// Experiment label store persisted as `labels.json`
pub mod labels;

pub mod logging;

/// Text metric parsers
///
/// Each benchmark output format has a dedicated pure function taking the
/// output lines and returning either a measurement or a `ParseError` that
/// names the offending line.
pub mod parsers;

/// Batch execution followed by metrics and report generation
pub mod pipeline;

/// Markdown report generation
pub mod report;

/// Results summary output
///
/// Writes the aggregated metrics as a human-readable text summary and as a
/// JSON document with run metadata.
pub mod results;

/// Bounded-concurrency experiment scheduler
///
/// Launches each experiment as an OS process with its stdout and stderr
/// redirected into the run directory, never running more than the configured
/// number of processes at once.
pub mod scheduler;

/// Benchmark catalogue, selection rules and experiment construction
pub mod suites;

pub mod utils;

pub use aggregate::Metrics;
pub use classify::{Classification, KnownError};
pub use config::Config;
pub use experiment::{Experiment, Launcher, MpiFamily, Platform};
pub use labels::LabelStore;
pub use results::ResultsManager;
pub use scheduler::{BatchSummary, Scheduler, SchedulerConfig};
pub use suites::BenchmarkFamily;

/// The current version of the benchmark orchestrator
///
/// Populated from Cargo.toml and recorded in the JSON results summary.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
///
/// Defaults for the command line and the file names used inside the
/// workspace and the run directory.
pub mod defaults {
    use std::time::Duration;

    /// Default maximum number of experiment processes running at once
    pub const MAX_RUNNING_JOBS: usize = 5;

    /// Default number of MPI ranks per node
    pub const PPN: usize = 1;

    /// Default number of nodes
    pub const NUM_NODES: usize = 2;

    /// Interval between two scheduler progress log lines
    pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

    /// Width of the progress bar in the scheduler's progress log
    pub const PROGRESS_BAR_WIDTH: usize = 30;

    /// Tool configuration file, relative to the installation base directory
    pub const TOOL_CONFIG_FILE: &str = "hpca.conf";

    /// Workspace configuration directory, relative to `$HOME`
    pub const WORKSPACE_CONFIG_DIR: &str = ".hpca";

    /// Workspace configuration file name inside `WORKSPACE_CONFIG_DIR`
    pub const WORKSPACE_CONFIG_FILE: &str = "workspace.conf";

    /// Label map file name inside the run directory
    pub const LABELS_FILE: &str = "labels.json";

    /// Text results summary
    pub const RESULTS_FILE: &str = "hpca_results.txt";

    /// JSON results summary
    pub const RESULTS_JSON_FILE: &str = "hpca_results.json";

    /// Markdown report
    pub const REPORT_FILE: &str = "report.md";

    /// Uncatalogued error messages, written only when there is at least one
    pub const UNKNOWN_ERRORS_FILE: &str = "unknown_errors.md";
}
