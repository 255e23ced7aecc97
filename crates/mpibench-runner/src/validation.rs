use crate::error::{BenchError, Result};
use crate::registry::{Constraint, ExperimentRegistry, ExperimentSpec};

/// Exact power-of-two test on the base-2 logarithm. Zero short-circuits.
pub fn is_power_of_two(n: u32) -> bool {
    if n == 0 {
        return false;
    }
    let log = f64::from(n).log2();
    log.ceil() == log.floor()
}

pub struct ValidationPolicy<'a> {
    registry: &'a ExperimentRegistry,
}

impl<'a> ValidationPolicy<'a> {
    pub fn new(registry: &'a ExperimentRegistry) -> Self {
        Self { registry }
    }

    pub fn validate(&self, experiment: &str, np: u32) -> Result<()> {
        let spec = self
            .registry
            .get(experiment)
            .ok_or_else(|| BenchError::UnknownExperiment(experiment.to_string()))?;
        if np == 0 {
            return Err(rejected(spec, np, "process count must be positive"));
        }
        for constraint in &spec.constraints {
            check_constraint(spec, constraint, np)?;
        }
        Ok(())
    }
}

fn check_constraint(spec: &ExperimentSpec, constraint: &Constraint, np: u32) -> Result<()> {
    match constraint {
        Constraint::PowerOfTwo => {
            if !is_power_of_two(np) {
                return Err(rejected(
                    spec,
                    np,
                    "must have a power of two number of processes",
                ));
            }
        }
        Constraint::DividesGrid { log2_param } => {
            let log2 = spec.args.param(log2_param).ok_or_else(|| {
                rejected(spec, np, &format!("missing grid parameter {}", log2_param))
            })?;
            let grid_size = 1u64.checked_shl(log2 as u32).unwrap_or(0);
            if grid_size == 0 || grid_size % u64::from(np) != 0 {
                return Err(rejected(
                    spec,
                    np,
                    &format!(
                        "grid size must be a multiple of the process count (grid_size={})",
                        grid_size
                    ),
                ));
            }
        }
    }
    Ok(())
}

fn rejected(spec: &ExperimentSpec, np: u32, reason: &str) -> BenchError {
    BenchError::Rejected {
        experiment: spec.id.clone(),
        np,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_of_two_truth_table() {
        assert!(!is_power_of_two(0));
        for n in [1u32, 2, 4, 8, 16, 1024, 1 << 31] {
            assert!(is_power_of_two(n), "{} should be a power of two", n);
        }
        for n in [3u32, 5, 6, 7, 12, 100, 1023, u32::MAX] {
            assert!(!is_power_of_two(n), "{} should not be a power of two", n);
        }
    }

    #[test]
    fn power_of_two_agrees_with_bit_test() {
        for n in 0u32..=4096 {
            assert_eq!(is_power_of_two(n), n.is_power_of_two(), "n={}", n);
        }
    }

    #[test]
    fn unknown_experiment_is_rejected() {
        let registry = ExperimentRegistry::builtin();
        let policy = ValidationPolicy::new(&registry);
        let err = policy.validate("linpack", 4).expect_err("unknown id");
        assert!(matches!(err, BenchError::UnknownExperiment(ref id) if id == "linpack"));
    }

    #[test]
    fn zero_processes_are_rejected_everywhere() {
        let registry = ExperimentRegistry::builtin();
        let policy = ValidationPolicy::new(&registry);
        for spec in registry.iter() {
            assert!(policy.validate(&spec.id, 0).is_err(), "{}", spec.id);
        }
    }

    #[test]
    fn random_requires_power_of_two() {
        let registry = ExperimentRegistry::builtin();
        let policy = ValidationPolicy::new(&registry);
        policy.validate("random", 8).expect("8 is valid");
        let err = policy.validate("random", 6).expect_err("6 is invalid");
        assert!(err.to_string().contains("power of two"), "{}", err);
    }

    #[test]
    fn sparse_accepts_iff_grid_divisible() {
        let registry = ExperimentRegistry::builtin();
        let policy = ValidationPolicy::new(&registry);
        let grid = 1u32 << 10;
        for np in 1u32..=64 {
            let accepted = policy.validate("sparse", np).is_ok();
            assert_eq!(accepted, grid % np == 0, "np={}", np);
        }
    }

    #[test]
    fn unconstrained_kernels_accept_any_positive_count() {
        let registry = ExperimentRegistry::builtin();
        let policy = ValidationPolicy::new(&registry);
        for np in [1, 3, 7, 13] {
            policy.validate("reduce", np).expect("reduce is unconstrained");
        }
    }
}
