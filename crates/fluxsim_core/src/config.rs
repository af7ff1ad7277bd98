use crate::error::SimulationError;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Relative slack allowed when deciding that a ratio of two intervals is a whole number.
const RATIO_TOLERANCE: f64 = 1e-9;

/// Run duration, integration step and communication interval, all in the model's time unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub duration: f64,
    pub step: f64,
    pub sample_interval: f64,
}

/// Integer step counts derived once from a [`RunConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPlan {
    pub total_steps: u64,
    pub steps_per_sample: u64,
}

impl StepPlan {
    /// Number of rows a run appends after its starting point.
    pub fn samples(&self) -> u64 {
        self.total_steps / self.steps_per_sample
    }

    /// Steps after the last recorded sample. A resumed run restarts from that sample.
    pub fn unsampled_steps(&self) -> u64 {
        self.total_steps % self.steps_per_sample
    }
}

impl RunConfig {
    pub fn new(duration: f64, step: f64, sample_interval: f64) -> Self {
        Self {
            duration,
            step,
            sample_interval,
        }
    }

    /// Validates the configuration and converts it into integer step counts.
    pub fn plan(&self) -> Result<StepPlan, SimulationError> {
        require_positive("duration", self.duration)?;
        require_positive("step", self.step)?;
        require_positive("sample_interval", self.sample_interval)?;

        let steps_per_sample = whole_ratio(self.sample_interval, self.step).ok_or_else(|| {
            SimulationError::config(
                "sample_interval",
                self.sample_interval,
                "must be a positive integer multiple of step",
            )
        })?;

        let total_steps = match whole_ratio(self.duration, self.step) {
            Some(n) => n,
            None => {
                let whole = (self.duration / self.step).floor();
                if whole < 1.0 {
                    return Err(SimulationError::config(
                        "duration",
                        self.duration,
                        "shorter than one integration step",
                    ));
                }
                warn!(
                    duration = self.duration,
                    step = self.step,
                    steps = whole,
                    "duration is not a whole number of steps; trailing partial step dropped"
                );
                whole as u64
            }
        };

        let plan = StepPlan {
            total_steps,
            steps_per_sample,
        };
        let unsampled = plan.unsampled_steps();
        if unsampled > 0 {
            warn!(
                total_steps,
                steps_per_sample,
                unsampled,
                "run does not end on a sample; trailing steps are integrated but not recorded"
            );
        }
        Ok(plan)
    }
}

fn require_positive(field: &'static str, value: f64) -> Result<(), SimulationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SimulationError::config(
            field,
            value,
            "must be finite and strictly positive",
        ))
    }
}

fn whole_ratio(numerator: f64, denominator: f64) -> Option<u64> {
    let ratio = numerator / denominator;
    let nearest = ratio.round();
    if nearest >= 1.0 && (ratio - nearest).abs() <= RATIO_TOLERANCE * nearest {
        Some(nearest as u64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{RunConfig, StepPlan};
    use crate::error::SimulationError;

    fn assert_config_err(config: RunConfig, field: &str) {
        match config.plan() {
            Err(SimulationError::Configuration { field: f, .. }) => assert_eq!(f, field),
            other => panic!("expected configuration error on {field}, got {other:?}"),
        }
    }

    #[test]
    fn plan_survives_inexact_decimal_ratios() {
        // 0.2 / 0.01 and 0.1 / 0.01 are not exact in binary.
        let plan = RunConfig::new(0.2, 0.01, 0.1).plan().unwrap();
        assert_eq!(
            plan,
            StepPlan {
                total_steps: 20,
                steps_per_sample: 10
            }
        );
        assert_eq!(plan.samples(), 2);

        let plan = RunConfig::new(0.1, 0.001, 0.01).plan().unwrap();
        assert_eq!(plan.total_steps, 100);
        assert_eq!(plan.steps_per_sample, 10);
    }

    #[test]
    fn rejects_non_positive_values() {
        assert_config_err(RunConfig::new(0.0, 0.1, 0.1), "duration");
        assert_config_err(RunConfig::new(1.0, -0.1, 0.1), "step");
        assert_config_err(RunConfig::new(1.0, 0.1, 0.0), "sample_interval");
        assert_config_err(RunConfig::new(f64::NAN, 0.1, 0.1), "duration");
        assert_config_err(RunConfig::new(1.0, f64::INFINITY, 0.1), "step");
    }

    #[test]
    fn rejects_non_integer_sample_ratio() {
        assert_config_err(RunConfig::new(1.0, 0.1, 0.25), "sample_interval");
        assert_config_err(RunConfig::new(1.0, 0.1, 0.05), "sample_interval");
    }

    #[test]
    fn partial_trailing_step_is_dropped() {
        let plan = RunConfig::new(1.05, 0.1, 0.1).plan().unwrap();
        assert_eq!(plan.total_steps, 10);
        assert_config_err(RunConfig::new(0.05, 0.1, 0.1), "duration");
    }

    #[test]
    fn steps_past_the_last_sample_are_counted() {
        let plan = RunConfig::new(1.0, 0.1, 0.3).plan().unwrap();
        assert_eq!(plan.total_steps, 10);
        assert_eq!(plan.samples(), 3);
        assert_eq!(plan.unsampled_steps(), 1);

        // Interval longer than the run: nothing recorded after the start.
        let plan = RunConfig::new(0.2, 0.1, 0.5).plan().unwrap();
        assert_eq!(plan.samples(), 0);
        assert_eq!(plan.unsampled_steps(), 2);

        assert_eq!(RunConfig::new(0.2, 0.01, 0.1).plan().unwrap().unsampled_steps(), 0);
    }
}
