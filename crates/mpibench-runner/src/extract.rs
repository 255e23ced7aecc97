//! Pulling numeric statistics out of benchmark output.
//!
//! The benchmark binaries print human-oriented summaries, so the default
//! strategy anchors on the literal label text and reads the first token after
//! its last occurrence. Benchmarks that print structured output can plug in a
//! different [`StatExtractor`].

use crate::error::{BenchError, Result};
use serde_json::Value;
use tracing::{debug, warn};

pub trait StatExtractor {
    /// `Ok(None)` when the label is absent; `Err` when it is present but the
    /// value cannot be read as a number.
    fn extract(&self, output: &str, label: &str) -> Result<Option<f64>>;
}

/// Label-anchored, last-match, first-token heuristic.
#[derive(Debug, Default, Clone, Copy)]
pub struct LabelAnchored;

impl StatExtractor for LabelAnchored {
    fn extract(&self, output: &str, label: &str) -> Result<Option<f64>> {
        let fragments: Vec<&str> = output
            .split(label)
            .filter(|s| !s.trim().is_empty())
            .collect();
        if fragments.len() < 2 {
            return Ok(None);
        }
        let last = fragments[fragments.len() - 1].replace(':', "");
        let token = last
            .split_whitespace()
            .next()
            .ok_or_else(|| BenchError::ExtractParse {
                label: label.to_string(),
                token: String::new(),
            })?;
        token
            .parse::<f64>()
            .map(Some)
            .map_err(|_| BenchError::ExtractParse {
                label: label.to_string(),
                token: token.to_string(),
            })
    }
}

/// Reads statistics from output that is a single JSON object keyed by label.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonObject;

impl StatExtractor for JsonObject {
    fn extract(&self, output: &str, label: &str) -> Result<Option<f64>> {
        let value: Value = match serde_json::from_str(output.trim()) {
            Ok(v) => v,
            Err(_) => return Ok(None),
        };
        match value.get(label) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => Ok(n.as_f64()),
            Some(Value::String(s)) => {
                s.trim()
                    .parse::<f64>()
                    .map(Some)
                    .map_err(|_| BenchError::ExtractParse {
                        label: label.to_string(),
                        token: s.clone(),
                    })
            }
            Some(other) => Err(BenchError::ExtractParse {
                label: label.to_string(),
                token: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub values: Vec<(String, f64)>,
    pub misses: Vec<String>,
}

/// Applies `extractor` to every label. Misses are logged and skipped.
pub fn extract_stats(
    extractor: &dyn StatExtractor,
    output: &str,
    labels: &[String],
    experiment: &str,
) -> Result<Extracted> {
    let mut values = Vec::new();
    let mut misses = Vec::new();
    for label in labels {
        match extractor.extract(output, label)? {
            Some(value) => {
                debug!(experiment, stat = %label, value, "extracted statistic");
                values.push((label.clone(), value));
            }
            None => {
                warn!(experiment, stat = %label, "statistic not found in output");
                misses.push(label.clone());
            }
        }
    }
    Ok(Extracted { values, misses })
}
