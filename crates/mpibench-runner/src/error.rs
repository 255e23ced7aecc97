use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("unknown experiment: {0}")]
    UnknownExperiment(String),

    #[error("invalid process count {np} for {experiment}: {reason}")]
    Rejected {
        experiment: String,
        np: u32,
        reason: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("control plane error: {0}")]
    ControlPlane(String),

    #[error("job execution failed (id={id}): {reason}")]
    JobFailed { id: u64, reason: String },

    #[error("job {id} did not finish within {waited:?}")]
    JobTimedOut { id: u64, waited: Duration },

    #[error("native execution failed: {0}")]
    Native(String),

    #[error("could not parse value {token:?} for statistic {label:?}")]
    ExtractParse { label: String, token: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, BenchError>;
