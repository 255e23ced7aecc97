//! Benchmark execution and result harvesting for MPI workloads running on a
//! function-execution control plane or on a native OpenMPI cluster.

pub mod backend;
pub mod config;
pub mod driver;
pub mod error;
pub mod extract;
pub mod job;
pub mod matrix;
pub mod native;
pub mod registry;
pub mod remote;
pub mod results;
pub mod validation;

pub use backend::{Backend, JobBackend, JobOutput};
pub use config::BenchConfig;
pub use driver::{ExperimentDriver, RunPlan, RunSummary};
pub use error::{BenchError, Result};
pub use extract::{JsonObject, LabelAnchored, StatExtractor};
pub use matrix::{ExperimentMatrix, ExperimentSelection, MatrixCell, ProcessSelection};
pub use native::{KubectlShell, NativeRunner};
pub use registry::{ExperimentRegistry, ExperimentSpec, Family};
pub use remote::{ControlPlaneClient, HttpTransport, PollPolicy};
pub use results::{ResultRow, ResultTable};
pub use validation::{is_power_of_two, ValidationPolicy};
