//! Submission and polling of jobs on the function-execution control plane.

use crate::backend::{Backend, JobBackend, JobOutput};
use crate::error::{BenchError, Result};
use crate::job::{Job, JobOutcome, StatusResponse};
use crate::matrix::MatrixCell;
use crate::registry::ExperimentSpec;
use serde::Serialize;
use serde_json::{json, Value};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const MESSAGE_TYPE_FLUSH: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Delivers one JSON message to the control plane and returns the raw reply.
pub trait ControlPlaneTransport {
    fn post_json(&self, message: &Value) -> Result<TransportResponse>;
}

impl<T: ControlPlaneTransport + ?Sized> ControlPlaneTransport for &T {
    fn post_json(&self, message: &Value) -> Result<TransportResponse> {
        (**self).post_json(message)
    }
}

pub struct HttpTransport {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        Self::with_url(format!("http://{}:{}", host, port))
    }

    pub fn with_url(url: String) -> Result<Self> {
        // Submissions can block for as long as the job takes to be accepted.
        let client = reqwest::blocking::Client::builder()
            .timeout(None::<Duration>)
            .build()?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ControlPlaneTransport for HttpTransport {
    fn post_json(&self, message: &Value) -> Result<TransportResponse> {
        let response = self.client.post(&self.url).json(message).send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        Ok(TransportResponse { status, body })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` waits for a terminal status indefinitely.
    pub max_wait: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_wait: None,
        }
    }
}

#[derive(Serialize)]
struct InvocationRequest<'a> {
    user: &'a str,
    function: &'a str,
    cmdline: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    mpi: bool,
    mpi_world_size: u32,
    #[serde(rename = "async")]
    is_async: bool,
}

#[derive(Serialize)]
struct StatusRequest<'a> {
    user: &'a str,
    function: &'a str,
    status: bool,
    id: u64,
}

pub struct ControlPlaneClient<T> {
    transport: T,
    poll: PollPolicy,
    flush_before_run: bool,
}

impl<T: ControlPlaneTransport> ControlPlaneClient<T> {
    pub fn new(transport: T, poll: PollPolicy) -> Self {
        Self {
            transport,
            poll,
            flush_before_run: false,
        }
    }

    pub fn with_flush_before_run(mut self, flush: bool) -> Self {
        self.flush_before_run = flush;
        self
    }

    /// Asks the control plane to drop cached state on every worker.
    pub fn flush(&self) -> Result<()> {
        info!("flushing control plane workers");
        let response = self
            .transport
            .post_json(&json!({ "type": MESSAGE_TYPE_FLUSH }))?;
        if !response.is_success() {
            return Err(BenchError::ControlPlane(format!(
                "flush failed: {}: {}",
                response.status, response.body
            )));
        }
        Ok(())
    }

    pub fn submit(&self, spec: &ExperimentSpec, cell: &MatrixCell) -> Result<Job> {
        let request = InvocationRequest {
            user: &spec.user,
            function: &spec.function,
            cmdline: spec.cmdline(Backend::Remote),
            mpi: spec.mpi_flag,
            mpi_world_size: cell.np,
            is_async: true,
        };
        let message = serde_json::to_value(&request)?;
        debug!(%message, "submitting job");
        let response = self.transport.post_json(&message)?;
        if !response.is_success() {
            return Err(BenchError::ControlPlane(format!(
                "initial request failed: {}: {}",
                response.status, response.body
            )));
        }
        let id = response.body.trim().parse::<u64>().map_err(|_| {
            BenchError::ControlPlane(format!(
                "submission returned an invalid job id: {:?}",
                response.body
            ))
        })?;
        Ok(Job::submitted(id))
    }

    /// Polls at a fixed interval until the job is terminal or `max_wait` elapses.
    pub fn await_job(&self, spec: &ExperimentSpec, mut job: Job) -> Result<(JobOutcome, u32)> {
        info!(job_id = job.id, "polling job");
        let started = Instant::now();
        while !job.is_terminal() {
            thread::sleep(self.poll.interval);
            let request = StatusRequest {
                user: &spec.user,
                function: &spec.function,
                status: true,
                id: job.id,
            };
            let response = self.transport.post_json(&serde_json::to_value(&request)?)?;
            let status = if response.is_success() {
                StatusResponse::parse(&response.body)
            } else {
                StatusResponse::Failed(format!(
                    "status query returned {}: {}",
                    response.status, response.body
                ))
            };
            job.observe(status);
            if let Some(max_wait) = self.poll.max_wait {
                if started.elapsed() >= max_wait {
                    job.time_out();
                }
            }
        }
        let queries = job.status_queries;
        let outcome = job
            .into_outcome()
            .ok_or_else(|| BenchError::ControlPlane("job left polling without an outcome".into()))?;
        Ok((outcome, queries))
    }
}

impl<T: ControlPlaneTransport> JobBackend for ControlPlaneClient<T> {
    fn kind(&self) -> Backend {
        Backend::Remote
    }

    fn prepare(&mut self) -> Result<()> {
        if self.flush_before_run {
            self.flush()?;
        }
        Ok(())
    }

    fn execute(&mut self, spec: &ExperimentSpec, cell: &MatrixCell) -> Result<JobOutput> {
        let job = self.submit(spec, cell)?;
        let id = job.id;
        let (outcome, queries) = self.await_job(spec, job)?;
        debug!(job_id = id, queries, "job reached terminal state");
        match outcome {
            JobOutcome::Succeeded(payload) => {
                let exec_time_secs = payload.exec_time_secs().ok_or_else(|| {
                    BenchError::ControlPlane(format!(
                        "result for job {} has missing or invalid start/finish timestamps",
                        id
                    ))
                })?;
                info!(job_id = id, exec_time_secs, "job finished");
                Ok(JobOutput {
                    exec_time_secs,
                    output: payload.output_data,
                })
            }
            JobOutcome::Failed(reason) => Err(BenchError::JobFailed { id, reason }),
            JobOutcome::TimedOut => Err(BenchError::JobTimedOut {
                id,
                waited: self.poll.max_wait.unwrap_or_default(),
            }),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fake::ScriptedTransport;
    use super::*;
    use crate::registry::ExperimentRegistry;

    const PAYLOAD: &str = r#"{"output_data": "Rate (MFlops/s): 1.0", "start_ts": 0, "finish_ts": 1500}"#;

    fn no_wait() -> PollPolicy {
        PollPolicy {
            interval: Duration::ZERO,
            max_wait: None,
        }
    }

    fn cell(experiment: &str, np: u32) -> MatrixCell {
        MatrixCell {
            experiment: experiment.to_string(),
            np,
            run: 0,
        }
    }

    #[test]
    fn submit_sends_invocation_message() {
        let registry = ExperimentRegistry::builtin();
        let reduce = registry.get("reduce").expect("reduce");
        let transport = ScriptedTransport::new(&[(200, "42\n")]);
        let client = ControlPlaneClient::new(&transport, no_wait());
        let job = client.submit(reduce, &cell("reduce", 4)).expect("submit");
        assert_eq!(job.id, 42);
        assert_eq!(
            transport.sent.borrow()[0],
            json!({
                "user": "prk",
                "function": "reduce",
                "cmdline": "40000 20000",
                "mpi_world_size": 4,
                "async": true
            })
        );
    }

    #[test]
    fn lammps_submission_carries_mpi_flag() {
        let registry = ExperimentRegistry::builtin();
        let compute = registry.get("compute").expect("compute");
        let transport = ScriptedTransport::new(&[(200, "9")]);
        let client = ControlPlaneClient::new(&transport, no_wait());
        client.submit(compute, &cell("compute", 2)).expect("submit");
        let sent = transport.sent.borrow();
        assert_eq!(sent[0]["mpi"], json!(true));
        assert_eq!(sent[0]["function"], json!("main"));
    }

    #[test]
    fn submit_failures_are_fatal() {
        let registry = ExperimentRegistry::builtin();
        let reduce = registry.get("reduce").expect("reduce");

        let transport = ScriptedTransport::new(&[(500, "internal error")]);
        let client = ControlPlaneClient::new(&transport, no_wait());
        let err = client.submit(reduce, &cell("reduce", 2)).expect_err("500");
        assert!(err.to_string().contains("initial request failed"), "{}", err);

        let transport = ScriptedTransport::new(&[(200, "not-an-id")]);
        let client = ControlPlaneClient::new(&transport, no_wait());
        assert!(matches!(
            client.submit(reduce, &cell("reduce", 2)),
            Err(BenchError::ControlPlane(_))
        ));
    }

    #[test]
    fn polls_until_result_payload() {
        let registry = ExperimentRegistry::builtin();
        let reduce = registry.get("reduce").expect("reduce");
        let transport = ScriptedTransport::new(&[
            (200, "5"),
            (200, "RUNNING"),
            (200, "RUNNING"),
            (200, PAYLOAD),
        ]);
        let mut client = ControlPlaneClient::new(&transport, no_wait());
        let out = client.execute(reduce, &cell("reduce", 2)).expect("execute");
        assert_eq!(transport.status_queries(), 3);
        assert_eq!(out.exec_time_secs, 1.5);
        assert_eq!(out.output, "Rate (MFlops/s): 1.0");
        let sent = transport.sent.borrow();
        assert_eq!(
            sent[1],
            json!({"user": "prk", "function": "reduce", "status": true, "id": 5})
        );
    }

    #[test]
    fn failed_marker_aborts() {
        let registry = ExperimentRegistry::builtin();
        let reduce = registry.get("reduce").expect("reduce");
        let transport = ScriptedTransport::new(&[(200, "11"), (200, "FAILED")]);
        let mut client = ControlPlaneClient::new(&transport, no_wait());
        let err = client
            .execute(reduce, &cell("reduce", 2))
            .expect_err("failed job");
        assert!(matches!(err, BenchError::JobFailed { id: 11, .. }), "{}", err);
        assert_eq!(transport.status_queries(), 1);
    }

    #[test]
    fn empty_status_aborts() {
        let registry = ExperimentRegistry::builtin();
        let reduce = registry.get("reduce").expect("reduce");
        let transport = ScriptedTransport::new(&[(200, "11"), (200, "RUNNING"), (200, "")]);
        let mut client = ControlPlaneClient::new(&transport, no_wait());
        assert!(matches!(
            client.execute(reduce, &cell("reduce", 2)),
            Err(BenchError::JobFailed { .. })
        ));
    }

    #[test]
    fn bounded_wait_times_out() {
        let registry = ExperimentRegistry::builtin();
        let reduce = registry.get("reduce").expect("reduce");
        let transport = ScriptedTransport::new(&[(200, "3"), (200, "RUNNING")]);
        let mut client = ControlPlaneClient::new(
            &transport,
            PollPolicy {
                interval: Duration::ZERO,
                max_wait: Some(Duration::ZERO),
            },
        );
        let err = client
            .execute(reduce, &cell("reduce", 2))
            .expect_err("timed out");
        assert!(matches!(err, BenchError::JobTimedOut { id: 3, .. }), "{}", err);
        assert_eq!(transport.status_queries(), 1);
    }

    #[test]
    fn payload_without_timestamps_is_rejected() {
        let registry = ExperimentRegistry::builtin();
        let reduce = registry.get("reduce").expect("reduce");
        let transport =
            ScriptedTransport::new(&[(200, "3"), (200, r#"{"output_data": "done"}"#)]);
        let mut client = ControlPlaneClient::new(&transport, no_wait());
        assert!(matches!(
            client.execute(reduce, &cell("reduce", 2)),
            Err(BenchError::ControlPlane(_))
        ));
    }

    #[test]
    fn payload_with_overflowing_timestamps_is_rejected() {
        let registry = ExperimentRegistry::builtin();
        let reduce = registry.get("reduce").expect("reduce");
        let body = format!(
            r#"{{"output_data": "done", "start_ts": {}, "finish_ts": {}}}"#,
            i64::MIN,
            i64::MAX
        );
        let transport = ScriptedTransport::new(&[(200, "3"), (200, body.as_str())]);
        let mut client = ControlPlaneClient::new(&transport, no_wait());
        let err = client
            .execute(reduce, &cell("reduce", 2))
            .expect_err("timestamps overflow");
        assert!(matches!(err, BenchError::ControlPlane(_)), "{}", err);
    }

    #[test]
    fn flush_runs_in_prepare_when_enabled() {
        let transport = ScriptedTransport::new(&[(200, "")]);
        let mut client =
            ControlPlaneClient::new(&transport, no_wait()).with_flush_before_run(true);
        client.prepare().expect("flush");
        assert_eq!(transport.sent.borrow()[0], json!({"type": 3}));

        let transport = ScriptedTransport::new(&[(503, "busy")]);
        let mut client =
            ControlPlaneClient::new(&transport, no_wait()).with_flush_before_run(true);
        assert!(client.prepare().is_err());
    }
}
