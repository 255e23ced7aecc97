//! Lifecycle of one asynchronous control-plane job.
//!
//! `Submitted -> Polling -> {Succeeded, Failed, TimedOut}`. Terminal states
//! are absorbing: once reached, further observations are ignored.

use chrono::{DateTime, Utc};
use serde::Deserialize;

const RUNNING_MARKER: &str = "RUNNING";
const FAILED_MARKER: &str = "FAILED";

/// Result message returned by the control plane once a job has finished.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultPayload {
    #[serde(default)]
    pub output_data: String,
    #[serde(default)]
    pub start_ts: Option<i64>,
    #[serde(default)]
    pub finish_ts: Option<i64>,
}

impl ResultPayload {
    /// Execution time in seconds from the millisecond timestamps. `None` when
    /// either is missing or their difference overflows.
    pub fn exec_time_secs(&self) -> Option<f64> {
        let elapsed_ms = self.finish_ts?.checked_sub(self.start_ts?)?;
        Some(elapsed_ms as f64 / 1000.0)
    }
}

/// Classified body of a status query.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusResponse {
    Running,
    Failed(String),
    Done(ResultPayload),
}

impl StatusResponse {
    pub fn parse(body: &str) -> Self {
        if body.is_empty() {
            return StatusResponse::Failed("empty status response".to_string());
        }
        if body.starts_with(FAILED_MARKER) {
            return StatusResponse::Failed(body.trim().to_string());
        }
        if body.starts_with(RUNNING_MARKER) {
            return StatusResponse::Running;
        }
        match parse_payload(body) {
            Ok(payload) => StatusResponse::Done(payload),
            Err(e) => StatusResponse::Failed(format!("unparseable result payload: {}", e)),
        }
    }
}

/// Parses the result JSON, tolerating raw control characters inside string
/// literals (benchmark output is embedded without escaping newlines).
fn parse_payload(body: &str) -> Result<ResultPayload, serde_json::Error> {
    match serde_json::from_str(body) {
        Ok(payload) => Ok(payload),
        Err(strict_err) => {
            serde_json::from_str(&escape_control_chars(body)).map_err(|_| strict_err)
        }
    }
}

fn escape_control_chars(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut in_string = false;
    let mut escaped = false;
    for c in body.chars() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(c);
                continue;
            }
            match c {
                '\\' => escaped = true,
                '"' => in_string = false,
                '\n' => {
                    out.push_str("\\n");
                    continue;
                }
                '\r' => {
                    out.push_str("\\r");
                    continue;
                }
                '\t' => {
                    out.push_str("\\t");
                    continue;
                }
                c if c.is_control() => {
                    out.push_str(&format!("\\u{:04x}", c as u32));
                    continue;
                }
                _ => {}
            }
        } else if c == '"' {
            in_string = true;
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Succeeded(ResultPayload),
    Failed(String),
    TimedOut,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Submitted,
    Polling,
    Terminal(JobOutcome),
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: u64,
    pub submitted_at: DateTime<Utc>,
    pub status_queries: u32,
    state: JobState,
}

impl Job {
    pub fn submitted(id: u64) -> Self {
        Self {
            id,
            submitted_at: Utc::now(),
            status_queries: 0,
            state: JobState::Submitted,
        }
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, JobState::Terminal(_))
    }

    pub fn observe(&mut self, response: StatusResponse) {
        if self.is_terminal() {
            return;
        }
        self.status_queries += 1;
        self.state = match response {
            StatusResponse::Running => JobState::Polling,
            StatusResponse::Failed(reason) => JobState::Terminal(JobOutcome::Failed(reason)),
            StatusResponse::Done(payload) => JobState::Terminal(JobOutcome::Succeeded(payload)),
        };
    }

    pub fn time_out(&mut self) {
        if !self.is_terminal() {
            self.state = JobState::Terminal(JobOutcome::TimedOut);
        }
    }

    /// Consumes the job, yielding its outcome if terminal.
    pub fn into_outcome(self) -> Option<JobOutcome> {
        match self.state {
            JobState::Terminal(outcome) => Some(outcome),
            _ => None,
        }
    }
}
