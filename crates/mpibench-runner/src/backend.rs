use crate::error::Result;
use crate::matrix::MatrixCell;
use crate::registry::ExperimentSpec;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Where a cell is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Asynchronous submission to the function-execution control plane.
    Remote,
    /// `mpirun` on the native reference cluster.
    Native,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Remote => "remote",
            Backend::Native => "native",
        }
    }

    /// Tag used in result file names.
    pub fn file_tag(&self) -> &'static str {
        match self {
            Backend::Remote => "wasm",
            Backend::Native => "native",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "remote" => Ok(Backend::Remote),
            "native" => Ok(Backend::Native),
            other => Err(format!(
                "unrecognised backend ({}) must be one of: remote, native",
                other
            )),
        }
    }
}

/// What a finished job hands back for result extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutput {
    pub exec_time_secs: f64,
    pub output: String,
}

/// Runs a single matrix cell to completion.
///
/// Implementations block until the job reaches a terminal state. Any failure
/// is fatal to the whole run; there is no retry at this layer.
pub trait JobBackend {
    fn kind(&self) -> Backend;

    /// Called once before the first cell of a run.
    fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    fn execute(&mut self, spec: &ExperimentSpec, cell: &MatrixCell) -> Result<JobOutput>;
}
