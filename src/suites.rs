//! Benchmark catalogue, selection rules and experiment construction.
//!
//! Benchmarks come in three families that the result pipeline handles
//! differently: point-to-point (OSU latency and bandwidth, contiguous or
//! not), message rate (SMB) and overlap. Within a family, a [`Suite`] names
//! the installed package the binaries come from.

use crate::config::OverlapTuning;
use crate::experiment::{Experiment, Platform};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable holding the element-count ceiling of the overlap
/// benchmarks
pub const OVERLAP_MAX_NUM_ELTS_ENV: &str = "OPENHPCA_OVERLAP_MAX_NUM_ELTS";

pub const OSU_LATENCY: &str = "osu_latency";
pub const OSU_BANDWIDTH: &str = "osu_bw";
pub const OSU_NONCONTIG_LATENCY: &str = "osu_noncontig_mem_latency";
pub const OSU_NONCONTIG_BANDWIDTH: &str = "osu_noncontig_mem_bw";
pub const SMB_MPI_OVERHEAD: &str = "smb_mpi_overhead";
pub const OVERLAP_IBARRIER: &str = "overlap_ibarrier";

/// Every overlap sub-benchmark, in reporting order
pub const OVERLAP_SUB_BENCHMARKS: [&str; 10] = [
    "overlap_iallreduce",
    "overlap_ireduce",
    "overlap_iallgather",
    "overlap_iallgatherv",
    "overlap_ialltoall",
    "overlap_ialltoallv",
    OVERLAP_IBARRIER,
    "overlap_ibcast",
    "overlap_igather",
    "overlap_igatherv",
];

const OSU_PT2PT_BINARIES: [&str; 6] = [
    "osu_latency",
    "osu_bw",
    "osu_bibw",
    "osu_mbw_mr",
    "osu_multi_lat",
    "osu_latency_mt",
];
const OSU_NONCONTIG_BINARIES: [&str; 2] = ["osu_latency", "osu_bw"];
const OSU_PT2PT_DIR: [&str; 4] = ["libexec", "osu-micro-benchmarks", "mpi", "pt2pt"];

const SMB_MSGRATE: &str = "smb_msgrate";
const SMB_RMA_MT_MPI: &str = "smb_rma_mt_mpi";
const MPI_OVERHEAD_MSG_SIZE: usize = 8;

/// How the result pipeline treats a benchmark's output
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BenchmarkFamily {
    PointToPoint,
    MessageRate,
    Overlap,
}

impl BenchmarkFamily {
    pub const ALL: [BenchmarkFamily; 3] = [
        BenchmarkFamily::PointToPoint,
        BenchmarkFamily::MessageRate,
        BenchmarkFamily::Overlap,
    ];

    /// Label prefix shared by every benchmark of the family
    pub fn prefix(&self) -> &'static str {
        match self {
            BenchmarkFamily::PointToPoint => "osu",
            BenchmarkFamily::MessageRate => "smb",
            BenchmarkFamily::Overlap => "overlap",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|family| label.starts_with(family.prefix()))
    }
}

impl fmt::Display for BenchmarkFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BenchmarkFamily::PointToPoint => write!(f, "point-to-point"),
            BenchmarkFamily::MessageRate => write!(f, "message rate"),
            BenchmarkFamily::Overlap => write!(f, "overlap"),
        }
    }
}

/// An installable benchmark package
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Suite {
    Osu,
    OsuNoncontigMem,
    Smb,
    Overlap,
}

impl Suite {
    pub fn family(&self) -> BenchmarkFamily {
        match self {
            Suite::Osu | Suite::OsuNoncontigMem => BenchmarkFamily::PointToPoint,
            Suite::Smb => BenchmarkFamily::MessageRate,
            Suite::Overlap => BenchmarkFamily::Overlap,
        }
    }

    /// Directory of the suite under the workspace install directory
    pub fn install_subdir(&self) -> &'static str {
        match self {
            Suite::Osu => "osu",
            Suite::OsuNoncontigMem => "osu_noncontig_mem",
            Suite::Smb => "smb",
            Suite::Overlap => "overlap",
        }
    }
}

/// One runnable benchmark binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubBenchmark {
    pub suite: Suite,
    pub label: String,
    pub binary: PathBuf,
    pub args: Vec<String>,
    /// Needed to compute the metrics
    pub required: bool,
}

impl SubBenchmark {
    fn new(suite: Suite, label: impl Into<String>, binary: PathBuf) -> Self {
        Self {
            suite,
            label: label.into(),
            binary,
            args: Vec::new(),
            required: false,
        }
    }

    fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Benchmarks measuring one pair of ranks, always run on two nodes with
    /// one rank each
    pub fn is_strictly_point_to_point(&self) -> bool {
        matches!(
            self.label.as_str(),
            OSU_LATENCY | OSU_BANDWIDTH | OSU_NONCONTIG_LATENCY | OSU_NONCONTIG_BANDWIDTH | SMB_MPI_OVERHEAD
        )
    }

    pub fn is_message_rate(&self) -> bool {
        self.label == SMB_MSGRATE || self.label == SMB_RMA_MT_MPI
    }
}

/// Every benchmark known to the tool, with its binary location under
/// `install_dir`
pub fn catalogue(install_dir: &Path) -> Vec<SubBenchmark> {
    let mut benchmarks = Vec::new();

    let pt2pt_dir = |suite: Suite| {
        OSU_PT2PT_DIR
            .iter()
            .fold(install_dir.join(suite.install_subdir()), |dir, part| dir.join(part))
    };

    let osu_dir = pt2pt_dir(Suite::Osu);
    for binary in OSU_PT2PT_BINARIES {
        let bench = SubBenchmark::new(Suite::Osu, binary, osu_dir.join(binary));
        benchmarks.push(if binary == OSU_LATENCY || binary == OSU_BANDWIDTH {
            bench.required()
        } else {
            bench
        });
    }

    let noncontig_dir = pt2pt_dir(Suite::OsuNoncontigMem);
    for binary in OSU_NONCONTIG_BINARIES {
        let label = format!("osu_noncontig_mem_{}", binary.trim_start_matches("osu_"));
        benchmarks.push(SubBenchmark::new(
            Suite::OsuNoncontigMem,
            label,
            noncontig_dir.join(binary),
        ));
    }

    let mut overhead = SubBenchmark::new(
        Suite::Smb,
        SMB_MPI_OVERHEAD,
        install_dir.join("mpi_overhead").join("mpi_overhead").join("mpi_overhead"),
    )
    .required();
    overhead.args = vec!["--msgsize".to_string(), MPI_OVERHEAD_MSG_SIZE.to_string()];
    benchmarks.push(overhead);
    benchmarks.push(SubBenchmark::new(
        Suite::Smb,
        SMB_MSGRATE,
        install_dir.join("msgrate").join("msgrate").join("msgrate"),
    ));
    benchmarks.push(SubBenchmark::new(
        Suite::Smb,
        SMB_RMA_MT_MPI,
        install_dir.join("rma_mt_mpi").join("rma_mt_mpi").join("msgrate"),
    ));

    let overlap_dir = install_dir.join("overlap").join("overlap");
    for id in OVERLAP_SUB_BENCHMARKS {
        let bench = SubBenchmark::new(Suite::Overlap, id, overlap_dir.join(id));
        benchmarks.push(if id == OVERLAP_IBARRIER { bench } else { bench.required() });
    }

    benchmarks
}

/// Keep the benchmarks whose binary exists
pub fn installed(benchmarks: Vec<SubBenchmark>) -> Vec<SubBenchmark> {
    benchmarks
        .into_iter()
        .filter(|bench| {
            let present = bench.binary.is_file();
            if !present {
                debug!("{} is not installed ({:?} missing)", bench.label, bench.binary);
            }
            present
        })
        .collect()
}

/// The operator's choice of benchmarks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    /// Run everything installed, including benchmarks not used by the metrics
    pub long: bool,
    pub osu: bool,
    pub osu_noncontig_mem: bool,
    pub smb: bool,
    pub overlap: bool,
}

impl Selection {
    fn selects(&self, suite: Suite) -> bool {
        match suite {
            Suite::Osu => self.osu,
            Suite::OsuNoncontigMem => self.osu_noncontig_mem,
            Suite::Smb => self.smb,
            Suite::Overlap => self.overlap,
        }
    }

    fn any_suite(&self) -> bool {
        self.osu || self.osu_noncontig_mem || self.smb || self.overlap
    }

    fn every_suite(&self) -> bool {
        self.osu && self.osu_noncontig_mem && self.smb && self.overlap
    }
}

/// Apply the selection rules
///
/// - nothing selected: the benchmarks required by the metrics
/// - some suites selected: every benchmark of those suites
/// - `long`, or every suite selected: everything
pub fn select(benchmarks: Vec<SubBenchmark>, selection: &Selection) -> Vec<SubBenchmark> {
    if selection.long || selection.every_suite() {
        return benchmarks;
    }
    if selection.any_suite() {
        return benchmarks
            .into_iter()
            .filter(|bench| selection.selects(bench.suite))
            .collect();
    }
    benchmarks.into_iter().filter(|bench| bench.required).collect()
}

/// Batch-wide settings applied while turning benchmarks into experiments
#[derive(Debug, Clone, Default)]
pub struct ExperimentPlan {
    pub platform: Platform,
    /// Value of `OPENHPCA_OVERLAP_MAX_NUM_ELTS` in the caller's environment
    pub overlap_max_num_elts: Option<String>,
    /// Per-benchmark ceilings; entries take precedence over the environment
    pub overlap_tuning: Option<OverlapTuning>,
}

impl ExperimentPlan {
    fn overlap_ceiling(&self, label: &str) -> Option<String> {
        self.overlap_tuning
            .as_ref()
            .and_then(|tuning| tuning.max_num_elts(label))
            .map(|value| value.to_string())
            .or_else(|| self.overlap_max_num_elts.clone())
    }
}

pub fn build_experiments(benchmarks: &[SubBenchmark], plan: &ExperimentPlan) -> Vec<Experiment> {
    benchmarks
        .iter()
        .map(|bench| {
            let platform = if bench.is_strictly_point_to_point() {
                Platform {
                    max_ppr: 1,
                    max_nodes: 2,
                    ..plan.platform.clone()
                }
            } else {
                plan.platform.clone()
            };

            let mut experiment = Experiment::new(bench.label.clone(), bench.binary.clone())
                .with_args(bench.args.iter().cloned())
                .with_platform(platform);

            if bench.is_message_rate() {
                experiment = experiment.with_args([
                    "-p".to_string(),
                    plan.platform.max_nodes.saturating_sub(1).to_string(),
                    "-n".to_string(),
                    plan.platform.max_ppr.to_string(),
                ]);
            }

            if bench.suite == Suite::Overlap {
                if let Some(ceiling) = plan.overlap_ceiling(&bench.label) {
                    experiment = experiment.with_env(OVERLAP_MAX_NUM_ELTS_ENV, ceiling);
                }
            }

            experiment
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn labels(benchmarks: &[SubBenchmark]) -> Vec<&str> {
        benchmarks.iter().map(|b| b.label.as_str()).collect()
    }

    #[test]
    fn test_family_from_label() {
        assert_eq!(
            BenchmarkFamily::from_label("osu_noncontig_mem_bw"),
            Some(BenchmarkFamily::PointToPoint)
        );
        assert_eq!(
            BenchmarkFamily::from_label("smb_mpi_overhead"),
            Some(BenchmarkFamily::MessageRate)
        );
        assert_eq!(
            BenchmarkFamily::from_label("overlap_overlap_ibcast"),
            Some(BenchmarkFamily::Overlap)
        );
        assert_eq!(BenchmarkFamily::from_label("imb_pingpong"), None);
    }

    #[test]
    fn test_catalogue_locations() {
        let all = catalogue(Path::new("/ws/install"));
        let latency = all.iter().find(|b| b.label == OSU_LATENCY).unwrap();
        assert_eq!(
            latency.binary,
            PathBuf::from("/ws/install/osu/libexec/osu-micro-benchmarks/mpi/pt2pt/osu_latency")
        );
        let overhead = all.iter().find(|b| b.label == SMB_MPI_OVERHEAD).unwrap();
        assert_eq!(
            overhead.binary,
            PathBuf::from("/ws/install/mpi_overhead/mpi_overhead/mpi_overhead")
        );
        assert_eq!(overhead.args, vec!["--msgsize", "8"]);
        assert!(all.iter().any(|b| b.label == OSU_NONCONTIG_BANDWIDTH));
        assert_eq!(
            all.iter().filter(|b| b.suite == Suite::Overlap).count(),
            OVERLAP_SUB_BENCHMARKS.len()
        );
    }

    #[test]
    fn test_default_selection_is_the_required_set() {
        let selected = select(catalogue(Path::new("/i")), &Selection::default());
        let names = labels(&selected);
        assert!(names.contains(&OSU_LATENCY));
        assert!(names.contains(&OSU_BANDWIDTH));
        assert!(names.contains(&SMB_MPI_OVERHEAD));
        assert!(!names.contains(&OVERLAP_IBARRIER));
        assert!(!names.contains(&"osu_bibw"));
        assert_eq!(selected.len(), 2 + 1 + 9);
    }

    #[test]
    fn test_suite_selection() {
        let selection = Selection {
            smb: true,
            ..Selection::default()
        };
        let selected = select(catalogue(Path::new("/i")), &selection);
        assert_eq!(
            labels(&selected),
            vec![SMB_MPI_OVERHEAD, "smb_msgrate", "smb_rma_mt_mpi"]
        );
    }

    #[test]
    fn test_long_and_all_suites_select_everything() {
        let total = catalogue(Path::new("/i")).len();
        let long = Selection {
            long: true,
            ..Selection::default()
        };
        assert_eq!(select(catalogue(Path::new("/i")), &long).len(), total);

        let every = Selection {
            long: false,
            osu: true,
            osu_noncontig_mem: true,
            smb: true,
            overlap: true,
        };
        assert_eq!(select(catalogue(Path::new("/i")), &every).len(), total);
    }

    #[test]
    fn test_installed_filters_missing_binaries() {
        let dir = tempfile::TempDir::new().unwrap();
        let all = catalogue(dir.path());
        let overhead = all.iter().find(|b| b.label == SMB_MPI_OVERHEAD).unwrap();
        std::fs::create_dir_all(overhead.binary.parent().unwrap()).unwrap();
        std::fs::write(&overhead.binary, "").unwrap();

        assert_eq!(labels(&installed(all)), vec![SMB_MPI_OVERHEAD]);
    }

    #[test]
    fn test_point_to_point_forced_to_two_nodes() {
        let plan = ExperimentPlan {
            platform: Platform::new(4, 8),
            ..ExperimentPlan::default()
        };
        let benches: Vec<SubBenchmark> = catalogue(Path::new("/i"))
            .into_iter()
            .filter(|b| b.label == OSU_LATENCY || b.label == "osu_bibw")
            .collect();
        let experiments = build_experiments(&benches, &plan);
        assert_eq!(experiments[0].platform(), &Platform::new(1, 2));
        assert_eq!(experiments[1].platform(), &Platform::new(4, 8));
    }

    #[test]
    fn test_message_rate_arguments() {
        let plan = ExperimentPlan {
            platform: Platform::new(4, 3),
            ..ExperimentPlan::default()
        };
        let benches: Vec<SubBenchmark> = catalogue(Path::new("/i"))
            .into_iter()
            .filter(|b| b.label == "smb_msgrate")
            .collect();
        let experiments = build_experiments(&benches, &plan);
        assert_eq!(experiments[0].args(), &["-p", "2", "-n", "4"]);
    }

    #[test]
    fn test_overlap_ceiling_precedence() {
        let mut table = BTreeMap::new();
        table.insert("overlap_ibcast".to_string(), 4096);
        let plan = ExperimentPlan {
            platform: Platform::default(),
            overlap_max_num_elts: Some("1024".to_string()),
            overlap_tuning: Some(OverlapTuning::from_table(table)),
        };
        let benches: Vec<SubBenchmark> = catalogue(Path::new("/i"))
            .into_iter()
            .filter(|b| b.suite == Suite::Overlap || b.label == OSU_LATENCY)
            .collect();
        let experiments = build_experiments(&benches, &plan);

        let env_of = |name: &str| {
            experiments
                .iter()
                .find(|e| e.name() == name)
                .unwrap()
                .env()
                .get(OVERLAP_MAX_NUM_ELTS_ENV)
                .cloned()
        };
        assert_eq!(env_of("overlap_ibcast").as_deref(), Some("4096"));
        assert_eq!(env_of("overlap_iallreduce").as_deref(), Some("1024"));
        assert_eq!(env_of(OSU_LATENCY), None);
    }
}
