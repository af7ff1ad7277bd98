use crate::error::SimulationError;
use indexmap::IndexMap;

/// Named model parameters, constant for the duration of a run.
pub type Parameters = IndexMap<String, f64>;

/// Named state variables. Insertion order is kept for display only;
/// every access inside the engine goes through the name.
pub type StateVars = IndexMap<String, f64>;

/// Everything a model function reports for one (parameters, state, time) triple:
/// intermediates, fluxes and derivatives, keyed by name.
pub type Evaluation = IndexMap<String, f64>;

/// The model plug-in point.
///
/// Implementations must be pure: the engine calls `evaluate` four times per RK4 step
/// with different trial states and once more for every recorded row, and relies on
/// each call depending only on its arguments.
pub trait ModelFunction {
    fn evaluate(&self, parameters: &Parameters, state: &StateVars, t: f64) -> Evaluation;
}

impl<F> ModelFunction for F
where
    F: Fn(&Parameters, &StateVars, f64) -> Evaluation,
{
    fn evaluate(&self, parameters: &Parameters, state: &StateVars, t: f64) -> Evaluation {
        self(parameters, state, t)
    }
}

/// A trait for fixed-step solvers that advance a named state forward.
pub trait Steppable {
    /// Performs one step of size dt.
    /// t: current time (updated after step)
    /// state: current state (updated in place after step)
    fn step<M: ModelFunction + ?Sized>(
        &mut self,
        field: &crate::solvers::VectorField<'_, M>,
        t: &mut f64,
        state: &mut StateVars,
        dt: f64,
    ) -> Result<(), SimulationError>;
}
