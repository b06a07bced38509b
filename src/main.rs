//! # HPCA Bench - Main Entry Point
//!
//! Three commands share one configuration:
//! - `run`: select and launch the benchmark experiments under the concurrency
//!   cap, then compute the metrics and generate the report
//! - `results`: compute the metrics of an existing run directory
//! - `report`: classify the errors of an existing run directory
//!
//! The report is generated even when the batch or the metrics fail, so a
//! failed run still leaves a diagnosis behind; the process then exits with a
//! non-zero status.

use anyhow::{Context, Result};
use clap::Parser;
use hpca_bench::{
    aggregate,
    cli::{Args, Command, ReportArgs, ResultsArgs, RunArgs},
    config::{self, Config, OverlapTuning},
    defaults, logging, pipeline, report,
    scheduler::{Scheduler, SchedulerConfig},
    suites::{self, ExperimentPlan, OVERLAP_MAX_NUM_ELTS_ENV},
};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args)?;

    let log_file = config
        .workspace
        .dir
        .join(format!("hpca-{}.log", args.command.name()));
    let log_file = std::fs::create_dir_all(&config.workspace.dir)
        .ok()
        .map(|_| log_file);
    let _guard = logging::init(args.verbose, log_file.as_deref());

    info!("Starting HPCA Bench {}", hpca_bench::VERSION);
    debug!("Configuration: {:?}", config);

    match &args.command {
        Command::Run(run) => run_command(&config, run).await,
        Command::Results(results) => results_command(&config, results),
        Command::Report(report) => report_command(&config, report),
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let basedir = match &args.basedir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Unable to determine the current directory")?,
    };
    let tool_config = basedir.join(defaults::TOOL_CONFIG_FILE);
    let workspace_config = match &args.workspace_config {
        Some(path) => path.clone(),
        None => default_workspace_config()?,
    };

    Config::load(&basedir, &tool_config, &workspace_config).context("Invalid configuration")
}

fn default_workspace_config() -> Result<PathBuf> {
    let home = std::env::var_os("HOME").context("HOME is not set; use --workspace-config")?;
    Ok(PathBuf::from(home)
        .join(defaults::WORKSPACE_CONFIG_DIR)
        .join(defaults::WORKSPACE_CONFIG_FILE))
}

async fn run_command(config: &Config, run: &RunArgs) -> Result<()> {
    config::check_max_running_jobs(run.max_running_jobs)?;
    config.check_mpi_dir()?;

    let overlap_tuning = run
        .overlap_config
        .as_deref()
        .map(OverlapTuning::load)
        .transpose()?;
    let plan = ExperimentPlan {
        platform: run.platform(config),
        overlap_max_num_elts: std::env::var(OVERLAP_MAX_NUM_ELTS_ENV).ok(),
        overlap_tuning,
    };

    let install_dir = config.install_dir();
    let benchmarks = suites::select(suites::installed(suites::catalogue(&install_dir)), &run.selection());
    if benchmarks.is_empty() {
        warn!("No installed benchmark under {:?} matches the selection", install_dir);
    }
    let experiments = suites::build_experiments(&benchmarks, &plan);

    let mut scheduler_config = SchedulerConfig::new(config.run_dir(), run.launcher(config), run.max_running_jobs);
    scheduler_config.progress_interval = run.progress_interval;

    let mut scheduler = Scheduler::new(scheduler_config)?;
    match pipeline::run_and_report(&mut scheduler, experiments, &config.files(), &config.workspace.dir).await {
        Ok(outcome) => {
            print!("{}", outcome.results);
            Ok(())
        }
        Err(e) => {
            error!("{:#}", e);
            Err(e)
        }
    }
}

fn results_command(config: &Config, args: &ResultsArgs) -> Result<()> {
    let run_dir = run_dir_or_default(config, args.run_dir.as_deref());
    let metrics = aggregate::compute(&run_dir)
        .with_context(|| format!("Unable to compute the metrics of {:?}", run_dir))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    } else {
        print!("{}", hpca_bench::results::format_metrics(&metrics));
    }
    Ok(())
}

fn report_command(config: &Config, args: &ReportArgs) -> Result<()> {
    let run_dir = run_dir_or_default(config, args.run_dir.as_deref());
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| config.workspace.dir.clone());

    let files = report::generate(&config.files(), &run_dir, &output_dir)?;
    println!("Report: {}", files.report.display());
    if let Some(unknown) = &files.unknown_errors {
        println!("Uncatalogued errors: {}", unknown.display());
    }
    Ok(())
}

fn run_dir_or_default(config: &Config, run_dir: Option<&Path>) -> PathBuf {
    run_dir.map(Path::to_path_buf).unwrap_or_else(|| config.run_dir())
}
