//! Immutable catalogue of the benchmarks this tool knows how to run.
//!
//! The registry is built once at start-up and handed by reference to the
//! driver, the validation policy and the matrix builder.

use crate::backend::Backend;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

const KERNELS_USER: &str = "prk";
const KERNELS_NATIVE_BUILD: &str = "/code/experiment-mpi/third-party/kernels-native";
const KERNELS_DEFAULT_NP: &[u32] = &[2, 4, 8, 16];

const LAMMPS_USER: &str = "lammps";
const LAMMPS_FUNCTION: &str = "main";
const LAMMPS_NATIVE_DIR: &str = "/code/lammps";
const LAMMPS_DEFAULT_NP: &[u32] = &[2, 4, 6, 8, 10, 12, 14, 16];

pub const RATE_MFLOPS: &str = "Rate (MFlops/s)";
pub const RATE_MBS: &str = "Rate (MB/s)";
pub const AVG_TIME: &str = "Avg time (s)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Kernels,
    Lammps,
}

impl Family {
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Kernels => "kernels",
            Family::Lammps => "lammps",
        }
    }

    pub fn default_process_counts(&self) -> &'static [u32] {
        match self {
            Family::Kernels => KERNELS_DEFAULT_NP,
            Family::Lammps => LAMMPS_DEFAULT_NP,
        }
    }

    pub fn table_layout(&self) -> TableLayout {
        match self {
            Family::Kernels => TableLayout::PerStatistic,
            Family::Lammps => TableLayout::ExecTime,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Family {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kernels" => Ok(Family::Kernels),
            "lammps" => Ok(Family::Lammps),
            other => Err(format!(
                "unrecognised family ({}) must be one of: kernels, lammps",
                other
            )),
        }
    }
}

/// Shape of the result file an experiment writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableLayout {
    /// One row per extracted statistic: `Kernel,WorldSize,Run,StatName,StatValue,ActualTime`.
    PerStatistic,
    /// One row per cell carrying only the execution time: `NumProc,Run,ExecTimeSecs`.
    ExecTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedParam {
    pub name: String,
    pub value: u64,
}

/// Typed arguments of a benchmark binary, rendered to its command line only at
/// the execution boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadArgs {
    Positional(Vec<NamedParam>),
    InputFile {
        remote_uri: String,
        native_path: String,
    },
}

impl WorkloadArgs {
    pub fn positional(params: &[(&str, u64)]) -> Self {
        WorkloadArgs::Positional(
            params
                .iter()
                .map(|(name, value)| NamedParam {
                    name: name.to_string(),
                    value: *value,
                })
                .collect(),
        )
    }

    pub fn param(&self, name: &str) -> Option<u64> {
        match self {
            WorkloadArgs::Positional(params) => {
                params.iter().find(|p| p.name == name).map(|p| p.value)
            }
            WorkloadArgs::InputFile { .. } => None,
        }
    }

    pub fn render(&self, backend: Backend) -> String {
        match self {
            WorkloadArgs::Positional(params) => params
                .iter()
                .map(|p| p.value.to_string())
                .collect::<Vec<_>>()
                .join(" "),
            WorkloadArgs::InputFile {
                remote_uri,
                native_path,
            } => match backend {
                Backend::Remote => format!("-in {}", remote_uri),
                Backend::Native => format!("-in {}", native_path),
            },
        }
    }
}

/// Structural requirement a process count must meet for a given benchmark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    PowerOfTwo,
    /// The grid has `2^param` points per side and must split evenly across ranks.
    DividesGrid { log2_param: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ExperimentSpec {
    pub id: String,
    pub family: Family,
    pub user: String,
    pub function: String,
    pub args: WorkloadArgs,
    pub native_binary: PathBuf,
    pub stats: Vec<String>,
    pub constraints: Vec<Constraint>,
    /// Whether control-plane submissions carry `"mpi": true`.
    pub mpi_flag: bool,
}

impl ExperimentSpec {
    pub fn layout(&self) -> TableLayout {
        self.family.table_layout()
    }

    /// Whether a run over the whole family should include this experiment.
    pub fn is_reportable(&self) -> bool {
        match self.layout() {
            TableLayout::PerStatistic => !self.stats.is_empty(),
            TableLayout::ExecTime => true,
        }
    }

    pub fn cmdline(&self, backend: Backend) -> String {
        self.args.render(backend)
    }
}

#[derive(Debug, Clone)]
pub struct ExperimentRegistry {
    specs: Vec<ExperimentSpec>,
}

impl ExperimentRegistry {
    pub fn new(specs: Vec<ExperimentSpec>) -> Self {
        Self { specs }
    }

    pub fn builtin() -> Self {
        let specs = vec![
            kernel(
                "dgemm",
                "DGEMM/dgemm",
                &[
                    ("iterations", 1000),
                    ("order", 500),
                    ("outer_block", 32),
                    ("inner_block", 1),
                ],
                &[],
                vec![],
            ),
            kernel(
                "nstream",
                "Nstream/nstream",
                &[("iterations", 2_000_000), ("length", 200_000), ("offset", 0)],
                &[],
                vec![],
            ),
            kernel(
                "random",
                "Random/random",
                &[("update_ratio", 16), ("table_size_log2", 16)],
                &[],
                vec![Constraint::PowerOfTwo],
            ),
            kernel(
                "reduce",
                "Reduce/reduce",
                &[("iterations", 40_000), ("length", 20_000)],
                &[RATE_MFLOPS, AVG_TIME],
                vec![],
            ),
            kernel(
                "sparse",
                "Sparse/sparse",
                &[("iterations", 400), ("grid_log2", 10), ("radius", 4)],
                &[RATE_MFLOPS, AVG_TIME],
                vec![Constraint::DividesGrid {
                    log2_param: "grid_log2".to_string(),
                }],
            ),
            kernel(
                "stencil",
                "Stencil/stencil",
                &[("iterations", 20_000), ("dimension", 1000)],
                &[],
                vec![],
            ),
            kernel(
                "global",
                "Synch_global/global",
                &[("iterations", 1000), ("scramble_length", 10_000)],
                &[],
                vec![],
            ),
            kernel(
                "p2p",
                "Synch_p2p/p2p",
                &[("iterations", 10_000), ("width", 10_000), ("height", 1000)],
                &[RATE_MFLOPS, AVG_TIME],
                vec![],
            ),
            // Above 500 iterations the checksum overflows.
            kernel(
                "transpose",
                "Transpose/transpose",
                &[("iterations", 500), ("order", 2000), ("tile", 64)],
                &[RATE_MBS, AVG_TIME],
                vec![],
            ),
            lammps("compute", "bench/in.lj"),
            lammps("network", "bench/in.rhodo"),
        ];
        Self::new(specs)
    }

    pub fn get(&self, id: &str) -> Option<&ExperimentSpec> {
        self.specs.iter().find(|s| s.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExperimentSpec> {
        self.specs.iter()
    }

    pub fn family(&self, family: Family) -> impl Iterator<Item = &ExperimentSpec> {
        self.specs.iter().filter(move |s| s.family == family)
    }
}

fn kernel(
    id: &str,
    binary: &str,
    params: &[(&str, u64)],
    stats: &[&str],
    constraints: Vec<Constraint>,
) -> ExperimentSpec {
    ExperimentSpec {
        id: id.to_string(),
        family: Family::Kernels,
        user: KERNELS_USER.to_string(),
        function: id.to_string(),
        args: WorkloadArgs::positional(params),
        native_binary: PathBuf::from(KERNELS_NATIVE_BUILD).join("MPI1").join(binary),
        stats: stats.iter().map(|s| s.to_string()).collect(),
        constraints,
        mpi_flag: false,
    }
}

fn lammps(id: &str, data_file: &str) -> ExperimentSpec {
    let file_name = data_file.rsplit('/').next().unwrap_or(data_file);
    ExperimentSpec {
        id: id.to_string(),
        family: Family::Lammps,
        user: LAMMPS_USER.to_string(),
        function: LAMMPS_FUNCTION.to_string(),
        args: WorkloadArgs::InputFile {
            remote_uri: format!("faasm://lammps-data/{}", file_name),
            native_path: format!("{}/{}.faasm.native", LAMMPS_NATIVE_DIR, data_file),
        },
        native_binary: PathBuf::from(LAMMPS_NATIVE_DIR).join("build").join("lmp"),
        stats: Vec::new(),
        constraints: Vec::new(),
        mpi_flag: true,
    }
}
