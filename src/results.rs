use crate::aggregate::{Metrics, MISSING_DATA, OVERHEAD_DETAIL};
use crate::scheduler::BatchSummary;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

/// Complete results of one run, as written to the JSON summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResults {
    pub metadata: RunMetadata,
    pub metrics: Metrics,
}

/// Metadata for reproducibility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub run_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchCounts>,
    pub system_info: SystemInfo,
}

/// Experiment counts of the batch that produced the results
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BatchCounts {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl From<BatchSummary> for BatchCounts {
    fn from(summary: BatchSummary) -> Self {
        Self {
            total: summary.total,
            succeeded: summary.succeeded,
            failed: summary.failed,
        }
    }
}

/// System information for reproducibility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub architecture: String,
    pub cpu_cores: usize,
    pub hostname: Option<String>,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_cores: num_cpus::get(),
            hostname: std::env::var("HOSTNAME").ok(),
        }
    }
}

/// Results manager writing the text and JSON summaries
pub struct ResultsManager {
    text_file: PathBuf,
    json_file: PathBuf,
    batch: Option<BatchCounts>,
}

impl ResultsManager {
    /// Create a results manager writing into `output_dir`
    pub fn new(output_dir: &Path) -> Self {
        Self {
            text_file: output_dir.join(crate::defaults::RESULTS_FILE),
            json_file: output_dir.join(crate::defaults::RESULTS_JSON_FILE),
            batch: None,
        }
    }

    /// Record the counts of the batch that produced the results
    pub fn with_batch(mut self, summary: BatchSummary) -> Self {
        self.batch = Some(summary.into());
        self
    }

    pub fn text_file(&self) -> &Path {
        &self.text_file
    }

    pub fn json_file(&self) -> &Path {
        &self.json_file
    }

    /// Write both summaries; returns the text summary
    pub fn write(&self, run_dir: &Path, metrics: &Metrics) -> Result<String> {
        let text = format_metrics(metrics);
        std::fs::write(&self.text_file, &text)
            .with_context(|| format!("Failed to write results to {:?}", self.text_file))?;

        let results = RunResults {
            metadata: RunMetadata {
                version: crate::VERSION.to_string(),
                timestamp: chrono::Utc::now(),
                run_dir: run_dir.to_path_buf(),
                batch: self.batch,
                system_info: SystemInfo::default(),
            },
            metrics: metrics.clone(),
        };
        let json = serde_json::to_string_pretty(&results)?;
        std::fs::write(&self.json_file, json)
            .with_context(|| format!("Failed to write results to {:?}", self.json_file))?;

        info!("Results written to {:?} and {:?}", self.text_file, self.json_file);
        Ok(text)
    }
}

/// Human-readable summary of the metrics
pub fn format_metrics(metrics: &Metrics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Bandwidth: {:.2} {}", metrics.bandwidth.value, metrics.bandwidth.unit);
    let _ = writeln!(out, "Latency: {:.2} {}", metrics.latency.value, metrics.latency.unit);
    if let Some(bw) = &metrics.noncontig_bandwidth {
        let _ = writeln!(out, "Non-contiguous bandwidth: {:.2} {}", bw.value, bw.unit);
    }
    if let Some(lat) = &metrics.noncontig_latency {
        let _ = writeln!(out, "Non-contiguous latency: {:.2} {}", lat.value, lat.unit);
    }
    let _ = writeln!(out, "Overlap: {:.2}%", metrics.overlap_score);

    for (name, detail) in &metrics.overlap_details {
        if name == OVERHEAD_DETAIL {
            continue;
        }
        if detail.missing {
            let _ = writeln!(out, "  {}: {:.2}% ({})", name, detail.value, MISSING_DATA);
        } else {
            let _ = writeln!(out, "  {}: {:.2}%", name, detail.value);
        }
    }
    if let Some(overhead) = metrics.overlap_details.get(OVERHEAD_DETAIL) {
        let _ = writeln!(out, "  {}: {:.2}%", OVERHEAD_DETAIL, overhead.value);
    }

    out
}
