//! Enumeration of the (experiment, process count, repeat) cells of a run.

use crate::error::{BenchError, Result};
use crate::registry::{ExperimentRegistry, Family};
use crate::validation::ValidationPolicy;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ExperimentSelection {
    One(String),
    All(Family),
}

impl ExperimentSelection {
    /// Family the selection runs in; `None` for an unknown experiment id.
    pub fn family(&self, registry: &ExperimentRegistry) -> Option<Family> {
        match self {
            ExperimentSelection::One(id) => registry.get(id).map(|s| s.family),
            ExperimentSelection::All(family) => Some(*family),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessSelection {
    Single(u32),
    /// Every count in `1..=n`.
    Range(u32),
    /// The family's default list.
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixCell {
    pub experiment: String,
    pub np: u32,
    pub run: u32,
}

#[derive(Debug, Clone)]
pub struct ExperimentMatrix {
    cells: Vec<MatrixCell>,
}

impl ExperimentMatrix {
    /// Outer loop over experiments (registry order), middle over process
    /// counts (in the order given), inner over repeats.
    pub fn build(
        registry: &ExperimentRegistry,
        experiments: &ExperimentSelection,
        procs: ProcessSelection,
        repeats: u32,
    ) -> Result<Self> {
        if repeats == 0 {
            return Err(BenchError::Config("repeats must be at least 1".to_string()));
        }
        let specs: Vec<_> = match experiments {
            ExperimentSelection::One(id) => vec![registry
                .get(id)
                .ok_or_else(|| BenchError::UnknownExperiment(id.clone()))?],
            ExperimentSelection::All(family) => registry
                .family(*family)
                .filter(|s| s.is_reportable())
                .collect(),
        };

        let mut cells = Vec::new();
        for spec in specs {
            let counts: Vec<u32> = match procs {
                ProcessSelection::Single(n) => vec![n],
                ProcessSelection::Range(n) => (1..=n).collect(),
                ProcessSelection::Default => spec.family.default_process_counts().to_vec(),
            };
            for np in counts {
                for run in 0..repeats {
                    cells.push(MatrixCell {
                        experiment: spec.id.clone(),
                        np,
                        run,
                    });
                }
            }
        }
        Ok(Self { cells })
    }

    /// Checks every cell up front so an invalid count aborts before any job runs.
    pub fn validate(&self, policy: &ValidationPolicy<'_>) -> Result<()> {
        for cell in &self.cells {
            policy.validate(&cell.experiment, cell.np)?;
        }
        Ok(())
    }

    pub fn cells(&self) -> &[MatrixCell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Contiguous runs of cells sharing an experiment id.
    pub fn groups(&self) -> Vec<(&str, &[MatrixCell])> {
        let mut out = Vec::new();
        let mut start = 0;
        for i in 1..=self.cells.len() {
            if i == self.cells.len() || self.cells[i].experiment != self.cells[start].experiment {
                out.push((self.cells[start].experiment.as_str(), &self.cells[start..i]));
                start = i;
            }
        }
        out
    }
}
