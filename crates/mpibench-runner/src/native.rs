//! Synchronous `mpirun` execution on the native reference cluster.

use crate::backend::{Backend, JobBackend, JobOutput};
use crate::error::{BenchError, Result};
use crate::matrix::MatrixCell;
use crate::registry::ExperimentSpec;
use std::process::Command;
use std::time::Instant;
use tracing::{debug, info};

/// Runs a command on the primary host of the native cluster and returns its
/// combined stdout and stderr.
pub trait RemoteShell {
    fn exec(&self, argv: &[String]) -> Result<String>;
}

impl<T: RemoteShell + ?Sized> RemoteShell for &T {
    fn exec(&self, argv: &[String]) -> Result<String> {
        (**self).exec(argv)
    }
}

/// `kubectl exec` into the primary MPI pod.
pub struct KubectlShell {
    pub namespace: String,
    pub pod: String,
}

impl RemoteShell for KubectlShell {
    fn exec(&self, argv: &[String]) -> Result<String> {
        let mut cmd = Command::new("kubectl");
        cmd.args(["-n", self.namespace.as_str(), "exec", self.pod.as_str(), "--"]);
        cmd.args(argv);
        debug!(namespace = %self.namespace, pod = %self.pod, ?argv, "kubectl exec");
        let output = cmd
            .output()
            .map_err(|e| BenchError::Native(format!("failed to spawn kubectl: {}", e)))?;
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        if !output.status.success() {
            let tail = combined
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("no output")
                .to_string();
            return Err(BenchError::Native(format!(
                "remote command exited with {}: {}",
                output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                tail
            )));
        }
        Ok(combined)
    }
}

/// Splits `np` ranks across hosts: the first host is filled to its core
/// count before the remainder spills onto the second.
pub fn host_allocation(np: u32, hosts: &[String], cores_per_host: u32) -> Result<Vec<String>> {
    let primary = hosts
        .first()
        .ok_or_else(|| BenchError::Config("no native hosts configured".to_string()))?;
    if np <= cores_per_host {
        return Ok(vec![format!("{}:{}", primary, np)]);
    }
    let secondary = hosts.get(1).ok_or_else(|| {
        BenchError::Config(format!(
            "{} processes exceed the {} cores of a single host and no second host is configured",
            np, cores_per_host
        ))
    })?;
    Ok(vec![
        format!("{}:{}", primary, cores_per_host),
        format!("{}:{}", secondary, np - cores_per_host),
    ])
}

pub struct NativeRunner<S> {
    shell: S,
    hosts: Vec<String>,
    cores_per_host: u32,
    exec_user: String,
}

impl<S: RemoteShell> NativeRunner<S> {
    pub fn new(shell: S, hosts: Vec<String>, cores_per_host: u32, exec_user: String) -> Self {
        Self {
            shell,
            hosts,
            cores_per_host,
            exec_user,
        }
    }

    pub fn mpirun_command(&self, spec: &ExperimentSpec, np: u32) -> Result<String> {
        let allocation = host_allocation(np, &self.hosts, self.cores_per_host)?;
        let parts = vec![
            "mpirun".to_string(),
            "-np".to_string(),
            np.to_string(),
            "-host".to_string(),
            allocation.join(","),
            spec.native_binary.to_string_lossy().to_string(),
        ];
        let cmdline = spec.cmdline(Backend::Native);
        if cmdline.is_empty() {
            Ok(shell_join(&parts))
        } else {
            Ok(format!("{} {}", shell_join(&parts), cmdline))
        }
    }
}

impl<S: RemoteShell> JobBackend for NativeRunner<S> {
    fn kind(&self) -> Backend {
        Backend::Native
    }

    fn execute(&mut self, spec: &ExperimentSpec, cell: &MatrixCell) -> Result<JobOutput> {
        let mpirun = self.mpirun_command(spec, cell.np)?;
        info!(experiment = %spec.id, np = cell.np, run = cell.run, %mpirun, "running natively");
        let argv = vec![
            "su".to_string(),
            self.exec_user.clone(),
            "-c".to_string(),
            mpirun,
        ];
        let start = Instant::now();
        let output = self.shell.exec(&argv)?;
        let exec_time_secs = start.elapsed().as_secs_f64();
        debug!(experiment = %spec.id, %output, "native output");
        Ok(JobOutput {
            exec_time_secs,
            output,
        })
    }
}

fn shell_join(parts: &[String]) -> String {
    parts
        .iter()
        .map(|p| shell_quote(p))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        "''".to_string()
    } else if s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./:,".contains(c))
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\"'\"'"))
    }
}


#[cfg(test)]
mod tests {
    use super::fake::RecordingShell;
    use super::*;
    use crate::registry::ExperimentRegistry;

    fn hosts() -> Vec<String> {
        vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()]
    }

    #[test]
    fn allocation_fills_primary_first() {
        assert_eq!(
            host_allocation(4, &hosts(), 8).expect("alloc"),
            vec!["10.0.0.1:4"]
        );
        assert_eq!(
            host_allocation(8, &hosts(), 8).expect("alloc"),
            vec!["10.0.0.1:8"]
        );
        assert_eq!(
            host_allocation(14, &hosts(), 8).expect("alloc"),
            vec!["10.0.0.1:8", "10.0.0.2:6"]
        );
    }

    #[test]
    fn allocation_needs_second_host_when_oversubscribed() {
        let one = vec!["10.0.0.1".to_string()];
        assert!(host_allocation(8, &one, 8).is_ok());
        assert!(matches!(
            host_allocation(9, &one, 8),
            Err(BenchError::Config(_))
        ));
        assert!(host_allocation(1, &[], 8).is_err());
    }

    #[test]
    fn runs_mpirun_as_exec_user() {
        let registry = ExperimentRegistry::builtin();
        let reduce = registry.get("reduce").expect("reduce");
        let shell = RecordingShell::replying("Rate (MFlops/s): 5.0\n");
        let mut runner = NativeRunner::new(&shell, hosts(), 8, "mpirun".to_string());
        let cell = MatrixCell {
            experiment: "reduce".to_string(),
            np: 12,
            run: 0,
        };
        let out = runner.execute(reduce, &cell).expect("execute");
        assert_eq!(out.output, "Rate (MFlops/s): 5.0\n");
        assert!(out.exec_time_secs >= 0.0);

        let calls = shell.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(&calls[0][..3], &["su", "mpirun", "-c"]);
        assert_eq!(
            calls[0][3],
            "mpirun -np 12 -host 10.0.0.1:8,10.0.0.2:4 \
             /code/experiment-mpi/third-party/kernels-native/MPI1/Reduce/reduce 40000 20000"
        );
    }

    #[test]
    fn shell_failure_is_fatal() {
        let registry = ExperimentRegistry::builtin();
        let compute = registry.get("compute").expect("compute");
        let shell = RecordingShell {
            output: String::new(),
            fail: true,
            calls: std::cell::RefCell::new(Vec::new()),
        };
        let mut runner = NativeRunner::new(&shell, hosts(), 8, "mpirun".to_string());
        let cell = MatrixCell {
            experiment: "compute".to_string(),
            np: 2,
            run: 0,
        };
        assert!(matches!(
            runner.execute(compute, &cell),
            Err(BenchError::Native(_))
        ));
    }

    #[test]
    fn quoting_leaves_plain_words_alone() {
        assert_eq!(shell_quote("/code/bin/lmp"), "/code/bin/lmp");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote(""), "''");
    }
}
