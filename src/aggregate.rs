//! Combine the parsed measurements of a run into one [`Metrics`] record.
//!
//! The overlap score is the mean of the overlap percentages and of the SMB
//! MPI overhead (clamped at zero), with one extra slot in the divisor:
//!
//! ```text
//! score = (sum(overlap of observed sub-benchmarks) + max(overhead, 0))
//!         / (observed + backfilled + 1)
//! ```
//!
//! `overlap_ibarrier` never takes part: it is left out of the sum, of the
//! observed count and of the backfill. Every other canonical sub-benchmark
//! that did not run is backfilled with 0 and marked as missing data.

use crate::correlate::{self, CorrelateError};
use crate::labels::{LabelError, LabelStore};
use crate::parsers::{bandwidth, latency, overhead, overlap, Measurement, ParseError, RawData};
use crate::suites::{
    OSU_BANDWIDTH, OSU_LATENCY, OSU_NONCONTIG_BANDWIDTH, OSU_NONCONTIG_LATENCY, OVERLAP_IBARRIER,
    OVERLAP_SUB_BENCHMARKS, SMB_MPI_OVERHEAD,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const BANDWIDTH_UNIT: &str = "Gb/s";
pub const LATENCY_UNIT: &str = "us";

/// Key of the overhead contribution in the overlap details
pub const OVERHEAD_DETAIL: &str = "SMB mpi_overhead";

/// Stands in for the output of a sub-benchmark that produced no result
pub const MISSING_DATA: &str = "Data missing";

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error(transparent)]
    Labels(#[from] LabelError),

    #[error(transparent)]
    Correlate(#[from] CorrelateError),

    #[error("no output file for {0}")]
    MissingBenchmark(&'static str),

    #[error("unable to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to parse {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error("{metric} is reported in `{found}` instead of `{expected}`")]
    UnitMismatch {
        metric: &'static str,
        expected: &'static str,
        found: String,
    },
}

/// One entry of the overlap breakdown
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlapDetail {
    pub value: f64,
    /// No result was found for this sub-benchmark
    pub missing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub bandwidth: Measurement,
    pub latency: Measurement,
    /// SMB MPI overhead as reported, before clamping
    pub overhead: f64,
    pub overlap_score: f64,
    pub overlap_details: BTreeMap<String, OverlapDetail>,
    /// Output lines of every overlap sub-benchmark, backfilled ones included
    pub overlap_data: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noncontig_bandwidth: Option<Measurement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noncontig_latency: Option<Measurement>,
}

/// Result of the overlap composition
#[derive(Debug, Clone, PartialEq)]
pub struct OverlapComposition {
    pub score: f64,
    pub details: BTreeMap<String, OverlapDetail>,
    /// Canonical sub-benchmarks that were absent from the run
    pub backfilled: Vec<String>,
}

/// Parse every result of `run_dir` and combine them
pub fn compute(run_dir: &Path) -> Result<Metrics, AggregateError> {
    let labels = LabelStore::load(run_dir)?;
    let outputs = correlate::correlate(run_dir, &labels)?;

    let required = |name: &'static str, files: &BTreeMap<String, PathBuf>| {
        files
            .get(name)
            .cloned()
            .ok_or(AggregateError::MissingBenchmark(name))
    };

    let overhead_file = required(SMB_MPI_OVERHEAD, &outputs.message_rate)?;
    let overhead = parse_file(&overhead_file, |lines| overhead::parse(lines))?;

    let bandwidth_file = required(OSU_BANDWIDTH, &outputs.point_to_point)?;
    let bandwidth = parse_file(&bandwidth_file, |lines| bandwidth::parse(lines))?;
    let latency_file = required(OSU_LATENCY, &outputs.point_to_point)?;
    let latency = parse_file(&latency_file, |lines| latency::parse(lines))?;

    check_unit("bandwidth", &bandwidth, BANDWIDTH_UNIT)?;
    check_unit("latency", &latency, LATENCY_UNIT)?;

    let noncontig_bandwidth = outputs
        .point_to_point
        .get(OSU_NONCONTIG_BANDWIDTH)
        .map(|path| parse_file(path, |lines| bandwidth::parse(lines)))
        .transpose()?;
    let noncontig_latency = outputs
        .point_to_point
        .get(OSU_NONCONTIG_LATENCY)
        .map(|path| parse_file(path, |lines| latency::parse(lines)))
        .transpose()?;
    if let Some(bw) = &noncontig_bandwidth {
        check_unit("non-contiguous bandwidth", bw, BANDWIDTH_UNIT)?;
    }
    if let Some(lat) = &noncontig_latency {
        check_unit("non-contiguous latency", lat, LATENCY_UNIT)?;
    }

    let mut overlap_data = BTreeMap::new();
    let mut observed = BTreeMap::new();
    for (name, path) in &outputs.overlap {
        let data = RawData::read(path).map_err(|source| AggregateError::Read {
            path: path.clone(),
            source,
        })?;
        let value = overlap::parse(&data.lines).map_err(|source| AggregateError::Parse {
            path: path.clone(),
            source,
        })?;
        if value.is_none() {
            warn!("No overlap result in {:?}", path);
        }
        observed.insert(name.clone(), value);
        overlap_data.insert(name.clone(), data.lines);
    }

    let composition = compose_overlap(overhead, &observed);
    for name in &composition.backfilled {
        overlap_data.insert(name.clone(), vec![MISSING_DATA.to_string()]);
    }

    info!(
        "Bandwidth: {}, latency: {}, overlap: {:.2}%",
        bandwidth, latency, composition.score
    );

    Ok(Metrics {
        bandwidth,
        latency,
        overhead,
        overlap_score: composition.score,
        overlap_details: composition.details,
        overlap_data,
        noncontig_bandwidth,
        noncontig_latency,
    })
}

/// Compose the overlap score from per-benchmark results
///
/// `observed` holds every overlap sub-benchmark that ran; `None` means its
/// output had no result line. Such entries count as present with a value of
/// 0 and are flagged as missing.
///
/// `overlap_ibarrier` never contributes to the sum or the present count. Like
/// every canonical sub-benchmark without a result, it is backfilled with 0
/// and counted in the divisor.
pub fn compose_overlap(overhead: f64, observed: &BTreeMap<String, Option<f64>>) -> OverlapComposition {
    let mut details = BTreeMap::new();
    let mut sum = 0.0;
    let mut present = 0usize;

    for (name, value) in observed {
        if name == OVERLAP_IBARRIER {
            debug!("Leaving {} out of the overlap score", name);
            continue;
        }
        present += 1;
        sum += value.unwrap_or(0.0);
        details.insert(
            name.clone(),
            OverlapDetail {
                value: value.unwrap_or(0.0),
                missing: value.is_none(),
            },
        );
    }

    let overhead = overhead.max(0.0);
    sum += overhead;
    details.insert(
        OVERHEAD_DETAIL.to_string(),
        OverlapDetail {
            value: overhead,
            missing: false,
        },
    );

    let backfilled: Vec<String> = OVERLAP_SUB_BENCHMARKS
        .iter()
        .filter(|name| !details.contains_key(**name))
        .map(|name| name.to_string())
        .collect();
    for name in &backfilled {
        details.insert(
            name.clone(),
            OverlapDetail {
                value: 0.0,
                missing: true,
            },
        );
    }

    let score = sum / (present + backfilled.len() + 1) as f64;
    OverlapComposition {
        score,
        details,
        backfilled,
    }
}

fn parse_file<T>(
    path: &Path,
    parser: impl FnOnce(&[String]) -> Result<T, ParseError>,
) -> Result<T, AggregateError> {
    let data = RawData::read(path).map_err(|source| AggregateError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parser(&data.lines).map_err(|source| AggregateError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn check_unit(
    metric: &'static str,
    measurement: &Measurement,
    expected: &'static str,
) -> Result<(), AggregateError> {
    if measurement.unit != expected {
        return Err(AggregateError::UnitMismatch {
            metric,
            expected,
            found: measurement.unit.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observed(entries: &[(&str, Option<f64>)]) -> BTreeMap<String, Option<f64>> {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }

    fn all_observed(value: f64) -> BTreeMap<String, Option<f64>> {
        OVERLAP_SUB_BENCHMARKS
            .iter()
            .map(|name| (name.to_string(), Some(value)))
            .collect()
    }

    #[test]
    fn test_complete_run() {
        let composition = compose_overlap(10.0, &all_observed(50.0));
        // nine sub-benchmarks plus the overhead, divided by 9 + the
        // backfilled barrier + 1
        assert!((composition.score - (9.0 * 50.0 + 10.0) / 11.0).abs() < 1e-9);
        assert_eq!(composition.backfilled, vec![OVERLAP_IBARRIER.to_string()]);
        let barrier = composition.details[OVERLAP_IBARRIER];
        assert_eq!(barrier.value, 0.0);
        assert!(barrier.missing);
        assert_eq!(composition.details.len(), 11);
    }

    #[test]
    fn test_barrier_is_excluded_from_sum_and_count() {
        let with_barrier = compose_overlap(0.0, &all_observed(40.0));
        let mut high_barrier = all_observed(40.0);
        high_barrier.insert(OVERLAP_IBARRIER.to_string(), Some(100.0));
        let changed = compose_overlap(0.0, &high_barrier);
        assert_eq!(with_barrier.score, changed.score);

        let mut without = all_observed(40.0);
        without.remove(OVERLAP_IBARRIER);
        assert_eq!(compose_overlap(0.0, &without).score, with_barrier.score);
    }

    #[test]
    fn test_missing_sub_benchmarks_are_backfilled() {
        let composition = compose_overlap(0.0, &observed(&[("overlap_iallreduce", Some(90.0))]));
        assert_eq!(composition.backfilled.len(), 9);
        assert!(composition.backfilled.iter().any(|n| n == OVERLAP_IBARRIER));
        // one observed + nine backfilled + 1
        assert!((composition.score - 90.0 / 11.0).abs() < 1e-9);
        let igather = composition.details["overlap_igather"];
        assert_eq!(igather.value, 0.0);
        assert!(igather.missing);
    }

    #[test]
    fn test_negative_overhead_is_clamped() {
        let composition = compose_overlap(-5.0, &all_observed(0.0));
        assert_eq!(composition.score, 0.0);
        assert_eq!(composition.details[OVERHEAD_DETAIL].value, 0.0);
    }

    #[test]
    fn test_overlap_without_result_counts_as_zero() {
        let mut data = all_observed(20.0);
        data.insert("overlap_ialltoall".to_string(), None);
        let composition = compose_overlap(0.0, &data);
        assert!((composition.score - 8.0 * 20.0 / 11.0).abs() < 1e-9);
        assert!(composition.details["overlap_ialltoall"].missing);
        assert_eq!(composition.backfilled, vec![OVERLAP_IBARRIER.to_string()]);
    }

    #[test]
    fn test_empty_run_still_divides_by_backfill_plus_one() {
        let composition = compose_overlap(30.0, &BTreeMap::new());
        assert_eq!(composition.backfilled.len(), 10);
        assert!((composition.score - 30.0 / 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_unit_gate() {
        assert!(check_unit("bandwidth", &Measurement::new(1.0, "Gb/s"), BANDWIDTH_UNIT).is_ok());
        let err = check_unit("latency", &Measurement::new(1.0, "Unknown"), LATENCY_UNIT).unwrap_err();
        assert!(matches!(err, AggregateError::UnitMismatch { metric: "latency", .. }));
    }
}
