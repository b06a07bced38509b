//! Bounded-concurrency experiment scheduler.
//!
//! A batch of experiments is launched as independent OS processes. At most
//! `max_running_jobs` of them run at any time; a queued experiment starts as
//! soon as a running one exits. Each process writes its stdout to
//! `<stem>.out` and its stderr to `<stem>.err` in the run directory, where
//! the stem is `<hash>-<nodes>x<ppr>-<index>`.
//!
//! [`Scheduler::run`] returns immediately after the label map is written and
//! the submission task is started; [`Scheduler::wait`] is the only blocking
//! point. Failed experiments are recorded in their `.err` file and never
//! affect their siblings. Nothing is retried.

use crate::experiment::{Experiment, Launcher};
use crate::labels::{LabelError, LabelStore};
use crate::utils::{create_progress_indicator, format_duration};
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("the maximum number of active jobs must be greater than 0 ({0})")]
    InvalidMaxRunningJobs(usize),

    #[error("unable to create run directory {path}")]
    RunDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("experiments `{first}` and `{second}` share fingerprint {hash}")]
    DuplicateFingerprint {
        hash: String,
        first: String,
        second: String,
    },

    #[error(transparent)]
    Labels(#[from] LabelError),

    #[error("this scheduler has already run a batch")]
    AlreadyStarted,

    #[error("no batch has been started")]
    NotStarted,

    #[error("the submission task failed")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub max_running_jobs: usize,
    pub run_dir: PathBuf,
    pub launcher: Launcher,
    pub progress_interval: Duration,
}

impl SchedulerConfig {
    pub fn new(run_dir: impl Into<PathBuf>, launcher: Launcher, max_running_jobs: usize) -> Self {
        Self {
            max_running_jobs,
            run_dir: run_dir.into(),
            launcher,
            progress_interval: crate::defaults::PROGRESS_INTERVAL,
        }
    }
}

/// Outcome of a batch once every experiment is terminal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Highest number of experiment processes observed running at once
    pub peak_running: usize,
}

#[derive(Debug, Default)]
struct Tracker {
    total: usize,
    running: AtomicUsize,
    peak_running: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

impl Tracker {
    fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    fn started(&self) {
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_running.fetch_max(running, Ordering::SeqCst);
    }

    fn finished(&self, success: bool) {
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.terminal(success);
    }

    fn terminal(&self, success: bool) {
        if success {
            self.succeeded.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn completed(&self) -> usize {
        self.succeeded.load(Ordering::SeqCst) + self.failed.load(Ordering::SeqCst)
    }

    fn summary(&self) -> BatchSummary {
        BatchSummary {
            total: self.total,
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            peak_running: self.peak_running.load(Ordering::SeqCst),
        }
    }
}

/// One experiment with its output locations
struct Job {
    experiment: Experiment,
    out_path: PathBuf,
    err_path: PathBuf,
}

pub struct Scheduler {
    config: SchedulerConfig,
    batch: Option<JoinHandle<BatchSummary>>,
    started: bool,
}

impl Scheduler {
    /// Reject an invalid concurrency budget before anything is launched
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        if config.max_running_jobs == 0 {
            return Err(SchedulerError::InvalidMaxRunningJobs(config.max_running_jobs));
        }
        Ok(Self {
            config,
            batch: None,
            started: false,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Write the label map and start submitting `experiments` in the
    /// background
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run(&mut self, experiments: Vec<Experiment>) -> Result<(), SchedulerError> {
        if self.started {
            return Err(SchedulerError::AlreadyStarted);
        }

        let run_dir = &self.config.run_dir;
        std::fs::create_dir_all(run_dir).map_err(|source| SchedulerError::RunDir {
            path: run_dir.clone(),
            source,
        })?;

        let jobs = plan_jobs(run_dir, experiments)?;
        let mut labels = LabelStore::new();
        for job in &jobs {
            labels.insert(job.experiment.fingerprint(), job.experiment.name())?;
        }
        labels.save(run_dir)?;

        info!(
            "Submitting {} experiment(s) with {} (at most {} running)",
            jobs.len(),
            self.config.launcher,
            self.config.max_running_jobs
        );

        self.started = true;
        self.batch = Some(tokio::spawn(run_batch(
            jobs,
            Arc::new(self.config.launcher.clone()),
            self.config.max_running_jobs,
            self.config.progress_interval,
        )));
        Ok(())
    }

    /// Block until every experiment has reached a terminal state
    pub async fn wait(&mut self) -> Result<BatchSummary, SchedulerError> {
        let batch = self.batch.take().ok_or(SchedulerError::NotStarted)?;
        let summary = batch.await?;
        info!(
            "{} experiment(s) completed: {} succeeded, {} failed",
            summary.total, summary.succeeded, summary.failed
        );
        Ok(summary)
    }
}

fn plan_jobs(run_dir: &Path, experiments: Vec<Experiment>) -> Result<Vec<Job>, SchedulerError> {
    let mut seen: HashMap<String, String> = HashMap::new();
    let mut names = HashSet::new();
    let mut jobs = Vec::with_capacity(experiments.len());

    for (index, experiment) in experiments.into_iter().enumerate() {
        let hash = experiment.fingerprint();
        if let Some(first) = seen.get(&hash) {
            return Err(SchedulerError::DuplicateFingerprint {
                hash,
                first: first.clone(),
                second: experiment.name().to_string(),
            });
        }
        if !names.insert(experiment.name().to_string()) {
            warn!("Experiment name {} is used more than once", experiment.name());
        }
        seen.insert(hash, experiment.name().to_string());

        jobs.push(Job {
            out_path: experiment.output_path(run_dir, index),
            err_path: experiment.error_path(run_dir, index),
            experiment,
        });
    }

    Ok(jobs)
}

#[instrument(skip_all, fields(total = jobs.len(), max_running_jobs = max_running_jobs))]
async fn run_batch(
    jobs: Vec<Job>,
    launcher: Arc<Launcher>,
    max_running_jobs: usize,
    progress_interval: Duration,
) -> BatchSummary {
    let tracker = Arc::new(Tracker::new(jobs.len()));
    // Budgets beyond the semaphore's capacity are effectively unbounded.
    let semaphore = Arc::new(Semaphore::new(max_running_jobs.min(Semaphore::MAX_PERMITS)));
    let progress = tokio::spawn(report_progress(tracker.clone(), progress_interval));
    let mut running = JoinSet::new();

    for job in jobs {
        // Waits for a free slot before the next experiment is launched.
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                error!("Experiment slots are no longer available, {} not launched", job.experiment.name());
                tracker.terminal(false);
                continue;
            }
        };

        let launcher = launcher.clone();
        let tracker = tracker.clone();
        running.spawn(async move {
            let success = execute(&job, &launcher, &tracker).await;
            drop(permit);
            success
        });
    }

    while let Some(result) = running.join_next().await {
        if let Err(e) = result {
            error!("Experiment task failed: {}", e);
            tracker.terminal(false);
        }
    }

    progress.abort();
    tracker.summary()
}

/// Launch one experiment and wait for it; returns whether it succeeded
async fn execute(job: &Job, launcher: &Launcher, tracker: &Tracker) -> bool {
    let experiment = &job.experiment;
    let command_line = launcher.command_line(experiment);
    debug!("Launching {}: {}", experiment, command_line);

    let (stdout, stderr) = match (File::create(&job.out_path), File::create(&job.err_path)) {
        (Ok(out), Ok(err)) => (out, err),
        (Err(e), _) | (_, Err(e)) => {
            error!("Unable to create output files for {}: {}", experiment.name(), e);
            record_failure(&job.err_path, &format!("unable to create output files: {}\n", e));
            tracker.terminal(false);
            return false;
        }
    };

    let mut command = Command::new(&command_line.program);
    command
        .args(&command_line.args)
        .envs(experiment.env())
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .kill_on_drop(true);

    let started = Instant::now();
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            error!("Unable to launch {}: {}", experiment.name(), e);
            record_failure(
                &job.err_path,
                &format!("unable to launch `{}`: {}\n", command_line, e),
            );
            tracker.terminal(false);
            return false;
        }
    };
    tracker.started();

    let success = match child.wait().await {
        Ok(status) if status.success() => {
            debug!("{} completed in {}", experiment.name(), format_duration(started.elapsed()));
            true
        }
        Ok(status) => {
            warn!("{} terminated unsuccessfully ({})", experiment.name(), status);
            if is_empty(&job.err_path) {
                record_failure(
                    &job.err_path,
                    &format!("{} terminated unsuccessfully: {}\n", experiment.name(), status),
                );
            }
            false
        }
        Err(e) => {
            error!("Unable to wait for {}: {}", experiment.name(), e);
            record_failure(&job.err_path, &format!("unable to wait for the process: {}\n", e));
            false
        }
    };

    tracker.finished(success);
    success
}

/// Append a diagnostic to an experiment's error log so the failure is visible
/// to the error classifier
fn record_failure(err_path: &Path, message: &str) {
    let written = OpenOptions::new()
        .create(true)
        .append(true)
        .open(err_path)
        .and_then(|mut file| file.write_all(message.as_bytes()));
    if let Err(e) = written {
        error!("Unable to record failure in {:?}: {}", err_path, e);
    }
}

fn is_empty(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true)
}

async fn report_progress(tracker: Arc<Tracker>, every: Duration) {
    let started = Instant::now();
    let mut ticker = tokio::time::interval(every);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let completed = tracker.completed();
        info!(
            "[{}] {}/{} experiment(s) completed, {} running, elapsed {}",
            create_progress_indicator(completed, tracker.total, crate::defaults::PROGRESS_BAR_WIDTH),
            completed,
            tracker.total,
            tracker.running.load(Ordering::SeqCst),
            format_duration(started.elapsed())
        );
    }
}
