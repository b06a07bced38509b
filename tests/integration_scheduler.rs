use anyhow::Result;
use hpca_bench::{report, Experiment, LabelStore, Launcher, Scheduler, SchedulerConfig};
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Prints its start and end time in nanoseconds around a short sleep
fn sleeper(index: usize) -> Experiment {
    Experiment::new(format!("sleeper_{}", index), "/bin/sh")
        .with_args(["-c", "date +%s%N; sleep 0.2; date +%s%N"])
}

/// Start and end timestamps recorded by every sleeper in `dir`
fn recorded_intervals(dir: &Path) -> Result<Vec<(u128, u128)>> {
    let mut intervals = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().map_or(true, |ext| ext != "out") {
            continue;
        }
        let content = std::fs::read_to_string(&path)?;
        let stamps = content
            .lines()
            .map(|line| line.trim().parse::<u128>())
            .collect::<Result<Vec<_>, _>>()?;
        anyhow::ensure!(stamps.len() == 2, "unexpected output in {:?}: {:?}", path, content);
        intervals.push((stamps[0], stamps[1]));
    }
    Ok(intervals)
}

/// Largest number of intervals covering the same instant
fn max_overlap(intervals: &[(u128, u128)]) -> usize {
    let mut events: Vec<(u128, i32)> = intervals
        .iter()
        .flat_map(|(start, end)| [(*start, 1), (*end, -1)])
        .collect();
    // At equal timestamps an end is processed before a start.
    events.sort();

    let mut running = 0i32;
    let mut peak = 0i32;
    for (_, delta) in events {
        running += delta;
        peak = peak.max(running);
    }
    peak as usize
}

fn count_files(dir: &Path, suffix: &str) -> Result<usize> {
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        if entry?.file_name().to_string_lossy().ends_with(suffix) {
            count += 1;
        }
    }
    Ok(count)
}

/// Seven experiments under a budget of three never run more than three at a
/// time, and all of them complete.
#[tokio::test]
async fn concurrency_budget_is_respected() -> Result<()> {
    let dir = TempDir::new()?;
    let run_dir = dir.path().join("run");
    let mut config = SchedulerConfig::new(&run_dir, Launcher::Direct, 3);
    config.progress_interval = Duration::from_millis(50);

    let mut scheduler = Scheduler::new(config)?;
    let started = Instant::now();
    scheduler.run((0..7).map(sleeper).collect())?;
    let summary = scheduler.wait().await?;

    assert_eq!(summary.total, 7);
    assert_eq!(summary.succeeded, 7);
    assert_eq!(summary.failed, 0);
    assert!(summary.peak_running >= 1);
    assert!(summary.peak_running <= 3, "peak was {}", summary.peak_running);
    // Three waves of at most three sleepers each.
    assert!(started.elapsed() >= Duration::from_millis(600));

    assert_eq!(count_files(&run_dir, ".out")?, 7);
    assert_eq!(count_files(&run_dir, ".err")?, 7);
    assert_eq!(LabelStore::load(&run_dir)?.len(), 7);

    // The processes' own clocks agree with the scheduler's accounting.
    let intervals = recorded_intervals(&run_dir)?;
    assert_eq!(intervals.len(), 7);
    assert!(intervals.iter().all(|(start, end)| start < end));
    let overlap = max_overlap(&intervals);
    assert!(overlap <= 3, "{} sleepers overlapped", overlap);
    Ok(())
}

#[test]
fn max_overlap_counts_concurrent_intervals() {
    assert_eq!(max_overlap(&[]), 0);
    assert_eq!(max_overlap(&[(0, 10), (10, 20)]), 1);
    assert_eq!(max_overlap(&[(0, 10), (5, 15), (6, 7), (20, 30)]), 3);
}

/// Failed experiments are counted and end up in the report.
#[tokio::test]
async fn failures_are_reported() -> Result<()> {
    let dir = TempDir::new()?;
    let run_dir = dir.path().join("run");
    let experiments = vec![
        Experiment::new("ok", "/bin/sh").with_args(["-c", "echo done"]),
        Experiment::new("calibration", "/bin/sh")
            .with_args(["-c", "echo 'Calibration failed' >&2; exit 1"]),
        Experiment::new("silent", "/bin/sh").with_args(["-c", "exit 3"]),
    ];

    let mut scheduler = Scheduler::new(SchedulerConfig::new(&run_dir, Launcher::Direct, 2))?;
    scheduler.run(experiments)?;
    let summary = scheduler.wait().await?;
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 2);

    let config_file = dir.path().join("workspace.conf");
    std::fs::write(&config_file, "dir = /scratch\n")?;
    let files = report::generate(&[config_file], &run_dir, dir.path())?;

    assert_eq!(files.classification.successful, 1);
    assert_eq!(files.classification.failed, 2);
    let report = std::fs::read_to_string(&files.report)?;
    assert!(report.contains("1 error(s) of type:\nCalibration failed\n"));

    // A non-zero exit without diagnostics is still recorded as a failure.
    let unknown = std::fs::read_to_string(files.unknown_errors.expect("unknown errors file"))?;
    assert!(unknown.contains("silent terminated unsuccessfully"));
    Ok(())
}
