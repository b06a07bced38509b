//! The `run` flow: launch the batch, compute the metrics, write the report.
//!
//! The report is attempted whatever happened before it, so a batch that
//! could not complete or a run whose metrics cannot be computed still leaves
//! `report.md` behind. The first failure is the one returned.

use crate::aggregate;
use crate::experiment::Experiment;
use crate::report::{self, ReportFiles};
use crate::results::ResultsManager;
use crate::scheduler::{BatchSummary, Scheduler};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Everything a successful run produced
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: BatchSummary,
    /// Human-readable metrics, as written to `hpca_results.txt`
    pub results: String,
    pub report: ReportFiles,
}

pub async fn run_and_report(
    scheduler: &mut Scheduler,
    experiments: Vec<Experiment>,
    config_files: &[PathBuf],
    output_dir: &Path,
) -> Result<RunOutcome> {
    let run_dir = scheduler.config().run_dir.clone();

    let batch = match scheduler.run(experiments) {
        Ok(()) => scheduler.wait().await,
        Err(e) => Err(e),
    };
    let outcome = batch
        .context("The benchmark batch did not complete")
        .and_then(|summary| {
            let metrics = aggregate::compute(&run_dir).context("Unable to compute the metrics")?;
            let results = ResultsManager::new(output_dir)
                .with_batch(summary)
                .write(&run_dir, &metrics)?;
            Ok((summary, results))
        });

    let report = report::generate(config_files, &run_dir, output_dir);
    if let Ok(files) = &report {
        info!(
            "Report written to {:?} ({} successful, {} failed)",
            files.report, files.classification.successful, files.classification.failed
        );
    }

    match (outcome, report) {
        (Ok((summary, results)), Ok(report)) => Ok(RunOutcome {
            summary,
            results,
            report,
        }),
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(e), Ok(_)) => Err(e),
        (Err(e), Err(report_error)) => {
            error!("Unable to generate the report: {:#}", anyhow::Error::from(report_error));
            Err(e)
        }
    }
}
