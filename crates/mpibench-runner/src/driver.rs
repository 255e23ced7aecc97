//! Cell-by-cell orchestration of a benchmark run.

use crate::backend::JobBackend;
use crate::error::{BenchError, Result};
use crate::extract::{extract_stats, StatExtractor};
use crate::matrix::{ExperimentMatrix, ExperimentSelection, MatrixCell, ProcessSelection};
use crate::registry::{ExperimentRegistry, ExperimentSpec, TableLayout};
use crate::results::{ResultRow, ResultTable};
use crate::validation::ValidationPolicy;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const EXEC_TIME_STAT: &str = "ExecTimeSecs";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunPlan {
    pub experiments: ExperimentSelection,
    pub procs: ProcessSelection,
    pub repeats: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub cells: usize,
    pub rows: usize,
    pub misses: usize,
    pub tables: Vec<PathBuf>,
}

pub struct ExperimentDriver<'a, B> {
    registry: &'a ExperimentRegistry,
    extractor: &'a dyn StatExtractor,
    backend: B,
    results_dir: PathBuf,
}

impl<'a, B: JobBackend> ExperimentDriver<'a, B> {
    pub fn new(
        registry: &'a ExperimentRegistry,
        extractor: &'a dyn StatExtractor,
        backend: B,
        results_dir: &Path,
    ) -> Self {
        Self {
            registry,
            extractor,
            backend,
            results_dir: results_dir.to_path_buf(),
        }
    }

    /// `<results>/<family>/<family>_<backend>_<experiment>.csv`
    pub fn table_path(&self, spec: &ExperimentSpec) -> PathBuf {
        let family = spec.family.as_str();
        self.results_dir.join(family).join(format!(
            "{}_{}_{}.csv",
            family,
            self.backend.kind().file_tag(),
            spec.id
        ))
    }

    pub fn run(&mut self, plan: &RunPlan) -> Result<RunSummary> {
        let registry = self.registry;
        let matrix = ExperimentMatrix::build(registry, &plan.experiments, plan.procs, plan.repeats)?;
        matrix.validate(&ValidationPolicy::new(registry))?;
        info!(
            backend = %self.backend.kind(),
            cells = matrix.len(),
            "starting run"
        );

        self.backend.prepare()?;
        let mut summary = RunSummary::default();
        for (experiment, cells) in matrix.groups() {
            let spec = registry
                .get(experiment)
                .ok_or_else(|| BenchError::UnknownExperiment(experiment.to_string()))?;
            let path = self.table_path(spec);
            let table = ResultTable::create(&path, spec.layout())?;
            info!(experiment, table = %path.display(), "writing results");
            if spec.layout() == TableLayout::PerStatistic && spec.stats.is_empty() {
                warn!(experiment, "no statistics declared; cells will produce no rows");
            }
            for cell in cells {
                self.run_cell(spec, cell, &table, &mut summary)?;
            }
            summary.tables.push(path);
        }
        info!(
            cells = summary.cells,
            rows = summary.rows,
            misses = summary.misses,
            "run complete"
        );
        Ok(summary)
    }

    fn run_cell(
        &mut self,
        spec: &ExperimentSpec,
        cell: &MatrixCell,
        table: &ResultTable,
        summary: &mut RunSummary,
    ) -> Result<()> {
        info!(experiment = %cell.experiment, np = cell.np, run = cell.run, "running cell");
        let output = self.backend.execute(spec, cell)?;
        info!(actual_time = output.exec_time_secs, "cell finished");
        summary.cells += 1;

        let row = |stat_name: &str, stat_value: f64| ResultRow {
            experiment: spec.id.clone(),
            np: cell.np,
            run: cell.run,
            stat_name: stat_name.to_string(),
            stat_value,
            actual_time: output.exec_time_secs,
        };
        match spec.layout() {
            TableLayout::PerStatistic => {
                let extracted =
                    extract_stats(self.extractor, &output.output, &spec.stats, &spec.id)?;
                summary.misses += extracted.misses.len();
                for (name, value) in &extracted.values {
                    table.append(&row(name.as_str(), *value))?;
                    summary.rows += 1;
                }
            }
            TableLayout::ExecTime => {
                table.append(&row(EXEC_TIME_STAT, output.exec_time_secs))?;
                summary.rows += 1;
            }
        }
        Ok(())
    }
}
