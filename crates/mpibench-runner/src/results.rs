use crate::error::Result;
use crate::registry::TableLayout;
use csv::{Terminator, WriterBuilder};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

pub const PER_STATISTIC_HEADER: [&str; 6] = [
    "Kernel",
    "WorldSize",
    "Run",
    "StatName",
    "StatValue",
    "ActualTime",
];
pub const EXEC_TIME_HEADER: [&str; 3] = ["NumProc", "Run", "ExecTimeSecs"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub experiment: String,
    pub np: u32,
    pub run: u32,
    pub stat_name: String,
    pub stat_value: f64,
    pub actual_time: f64,
}

impl ResultRow {
    fn record(&self, layout: TableLayout) -> Vec<String> {
        match layout {
            TableLayout::PerStatistic => vec![
                self.experiment.clone(),
                self.np.to_string(),
                self.run.to_string(),
                self.stat_name.clone(),
                format!("{:.8}", self.stat_value),
                format!("{:.8}", self.actual_time),
            ],
            TableLayout::ExecTime => vec![
                self.np.to_string(),
                self.run.to_string(),
                format!("{:.8}", self.actual_time),
            ],
        }
    }
}

/// Append-only CSV result file.
///
/// The file is reopened for every row so no handle is held while a job is
/// being polled.
#[derive(Debug, Clone)]
pub struct ResultTable {
    path: PathBuf,
    layout: TableLayout,
}

impl ResultTable {
    /// Creates the file (and its directory), truncating previous content and
    /// writing the header.
    pub fn create(path: &Path, layout: TableLayout) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = WriterBuilder::new()
            .terminator(Terminator::Any(b'\n'))
            .from_path(path)?;
        match layout {
            TableLayout::PerStatistic => writer.write_record(PER_STATISTIC_HEADER)?,
            TableLayout::ExecTime => writer.write_record(EXEC_TIME_HEADER)?,
        }
        writer.flush()?;
        Ok(Self {
            path: path.to_path_buf(),
            layout,
        })
    }

    pub fn append(&self, row: &ResultRow) -> Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(file);
        writer.write_record(row.record(self.layout))?;
        writer.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> TableLayout {
        self.layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "mpibench_{}_{}_{}",
            tag,
            std::process::id(),
            Utc::now().timestamp_micros()
        ))
    }

    fn row(run: u32, name: &str, value: f64) -> ResultRow {
        ResultRow {
            experiment: "reduce".to_string(),
            np: 4,
            run,
            stat_name: name.to_string(),
            stat_value: value,
            actual_time: 1.5,
        }
    }

    #[test]
    fn appends_rows_after_single_header() {
        let dir = temp_dir("table_append");
        let path = dir.join("kernels").join("kernels_wasm_reduce.csv");
        let table = ResultTable::create(&path, TableLayout::PerStatistic).expect("create");
        table.append(&row(0, "Rate (MFlops/s)", 123.45)).expect("row 1");
        table.append(&row(0, "Avg time (s)", 0.002)).expect("row 2");
        table.append(&row(1, "Rate (MFlops/s)", 100.0)).expect("row 3");

        let text = fs::read_to_string(&path).expect("read");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Kernel,WorldSize,Run,StatName,StatValue,ActualTime",
                "reduce,4,0,Rate (MFlops/s),123.45000000,1.50000000",
                "reduce,4,0,Avg time (s),0.00200000,1.50000000",
                "reduce,4,1,Rate (MFlops/s),100.00000000,1.50000000",
            ]
        );
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn create_truncates_previous_content() {
        let dir = temp_dir("table_truncate");
        let path = dir.join("lammps_native_compute.csv");
        let table = ResultTable::create(&path, TableLayout::ExecTime).expect("create");
        table.append(&row(0, "ExecTimeSecs", 3.0)).expect("row");
        let table = ResultTable::create(&path, TableLayout::ExecTime).expect("recreate");
        table.append(&row(2, "ExecTimeSecs", 3.0)).expect("row");

        let text = fs::read_to_string(&path).expect("read");
        assert_eq!(text, "NumProc,Run,ExecTimeSecs\n4,2,1.50000000\n");
        let _ = fs::remove_dir_all(dir);
    }
}
