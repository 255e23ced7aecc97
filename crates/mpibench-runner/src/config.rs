use crate::error::Result;
use crate::registry::Family;
use crate::remote::PollPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub results_dir: PathBuf,
    pub control_plane: ControlPlaneConfig,
    pub native: NativeConfig,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
            control_plane: ControlPlaneConfig::default(),
            native: NativeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    pub host: String,
    pub port: u16,
    pub poll_interval_ms: u64,
    /// Unbounded when absent.
    pub max_wait_secs: Option<u64>,
    /// Flush cached worker state before the first submission. When absent,
    /// LAMMPS runs flush and kernel runs do not.
    pub flush_before_run: Option<bool>,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            poll_interval_ms: 2000,
            max_wait_secs: None,
            flush_before_run: None,
        }
    }
}

impl ControlPlaneConfig {
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_wait: self.max_wait_secs.map(Duration::from_secs),
        }
    }

    pub fn flush_before(&self, family: Family) -> bool {
        self.flush_before_run.unwrap_or(matches!(family, Family::Lammps))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeConfig {
    pub namespace: String,
    pub pod: String,
    /// Primary host first; a second host absorbs ranks beyond `cores_per_host`.
    pub hosts: Vec<String>,
    pub cores_per_host: u32,
    pub exec_user: String,
}

impl Default for NativeConfig {
    fn default() -> Self {
        Self {
            namespace: "mpi".to_string(),
            pod: "mpi-master".to_string(),
            hosts: vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()],
            cores_per_host: 8,
            exec_user: "mpirun".to_string(),
        }
    }
}

impl BenchConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }
}
