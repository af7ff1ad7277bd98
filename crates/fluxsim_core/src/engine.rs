//! The simulation driver.
//!
//! A run owns one mutable state snapshot that the RK4 stepper advances in place and a
//! separate, append-only [`ResultTable`]. Rows are recorded every `steps_per_sample`
//! completed steps, each from a dedicated model evaluation at the new state and time.

use crate::config::RunConfig;
use crate::derivatives::Derivatives;
use crate::error::{check_finite, SimulationError};
use crate::solvers::{VectorField, RK4};
use crate::table::{ResultTable, TIME_COLUMN};
use crate::traits::{ModelFunction, Parameters, StateVars, Steppable};
use std::collections::HashSet;
use tracing::{debug, info};

/// Where a run starts from.
#[derive(Debug, Clone, Copy)]
pub enum Start<'a> {
    /// t = 0 from the given initial values.
    Fresh(&'a StateVars),
    /// The last row of a table produced by an earlier run with the same outputs.
    Resume(&'a ResultTable),
}

/// A model together with everything that stays fixed across runs.
///
/// Holds no per-run state; each call to [`Simulation::run`] allocates its own.
pub struct Simulation<M: ModelFunction> {
    parameters: Parameters,
    model: M,
    derivatives: Derivatives,
    outputs: Vec<String>,
}

impl<M: ModelFunction> Simulation<M> {
    pub fn new(
        parameters: Parameters,
        model: M,
        derivatives: Derivatives,
        outputs: Vec<String>,
    ) -> Result<Self, SimulationError> {
        let mut seen = HashSet::with_capacity(outputs.len());
        for name in &outputs {
            if !seen.insert(name.as_str()) {
                return Err(SimulationError::DuplicateColumn(name.clone()));
            }
        }
        if !seen.contains(TIME_COLUMN) {
            return Err(SimulationError::Schema(format!(
                "outputs must include the time column `{TIME_COLUMN}`"
            )));
        }
        Ok(Self {
            parameters,
            model,
            derivatives,
            outputs,
        })
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Integrates for `config.duration` from `start`.
    ///
    /// A fresh run records the t = 0 row first. A resumed run returns the prior rows
    /// followed by the new ones.
    pub fn run(
        &self,
        config: &RunConfig,
        start: Start<'_>,
    ) -> Result<ResultTable, SimulationError> {
        let plan = config.plan()?;

        let (mut table, mut state, t_start) = match start {
            Start::Fresh(initial) => {
                self.derivatives.check_state(initial)?;
                let table = ResultTable::new(self.outputs.clone())?;
                (table, initial.clone(), 0.0)
            }
            Start::Resume(prior) => {
                let (state, t) = self.recover_state(prior)?;
                (prior.clone(), state, t)
            }
        };
        let resumed = matches!(start, Start::Resume(_));

        info!(
            duration = config.duration,
            step = config.step,
            sample_interval = config.sample_interval,
            t_start,
            resumed,
            samples = plan.samples(),
            "simulation starting"
        );

        // Surfaces missing or non-finite outputs before the first step.
        let initial_row = self.output_row(&state, t_start)?;
        if !resumed {
            table.push_row(initial_row)?;
        }

        let field = VectorField::new(&self.model, &self.parameters, &self.derivatives);
        let mut stepper = RK4::new(self.derivatives.len());
        let h = config.step;
        let mut t = t_start;

        for n in 1..=plan.total_steps {
            stepper.step(&field, &mut t, &mut state, h)?;
            // Clock follows the step count.
            t = t_start + n as f64 * h;

            if n % plan.steps_per_sample == 0 {
                let row = self.output_row(&state, t)?;
                debug!(t, "sample recorded");
                table.push_row(row)?;
            }
        }

        info!(rows = table.len(), t_end = t, "simulation finished");
        Ok(table)
    }

    /// Evaluates the model at (state, t) and assembles one row in output order.
    ///
    /// Names resolve to the engine clock for the time column, then to a state variable,
    /// then to a model output. A model output that shadows a state name is ignored.
    pub fn output_row(&self, state: &StateVars, t: f64) -> Result<Vec<f64>, SimulationError> {
        let field = VectorField::new(&self.model, &self.parameters, &self.derivatives);
        let values = field.evaluate(t, state)?;

        self.outputs
            .iter()
            .map(|name| {
                let value = if name == TIME_COLUMN {
                    t
                } else if let Some(&v) = state.get(name) {
                    v
                } else if let Some(&v) = values.get(name) {
                    v
                } else {
                    return Err(SimulationError::MissingName {
                        name: name.clone(),
                        time: t,
                    });
                };
                check_finite(name, value, t)
            })
            .collect()
    }

    fn recover_state(&self, prior: &ResultTable) -> Result<(StateVars, f64), SimulationError> {
        if prior.columns() != self.outputs.as_slice() {
            return Err(SimulationError::Schema(format!(
                "prior table columns {:?} do not match outputs {:?}",
                prior.columns(),
                self.outputs
            )));
        }
        let last = prior.last_row().ok_or_else(|| {
            SimulationError::ResumeState("prior result table has no rows".to_string())
        })?;
        let value_of = |name: &str| prior.column_index(name).map(|idx| last[idx]);

        let t = value_of(TIME_COLUMN).ok_or_else(|| {
            SimulationError::Schema(format!("prior table has no `{TIME_COLUMN}` column"))
        })?;
        if !t.is_finite() {
            return Err(SimulationError::ResumeState(format!(
                "last recorded time {t} is not finite"
            )));
        }

        let mut state = StateVars::with_capacity(self.derivatives.len());
        for name in self.derivatives.state_names() {
            let value = value_of(name).ok_or_else(|| {
                SimulationError::Schema(format!(
                    "prior table has no column for state variable `{name}`"
                ))
            })?;
            state.insert(name.to_string(), check_finite(name, value, t)?);
        }
        Ok((state, t))
    }
}

/// One-shot form of [`Simulation::run`].
pub fn run<M: ModelFunction>(
    config: &RunConfig,
    parameters: Parameters,
    start: Start<'_>,
    model: M,
    derivatives: Derivatives,
    outputs: Vec<String>,
) -> Result<ResultTable, SimulationError> {
    Simulation::new(parameters, model, derivatives, outputs)?.run(config, start)
}
