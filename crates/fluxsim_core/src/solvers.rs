use crate::derivatives::Derivatives;
use crate::error::{check_finite, SimulationError};
use crate::traits::{Evaluation, ModelFunction, Parameters, StateVars, Steppable};

/// A model function bound to its parameters and derivative mapping, seen as the
/// right-hand side `dy/dt = f(t, y)`.
pub struct VectorField<'a, M: ModelFunction + ?Sized> {
    model: &'a M,
    parameters: &'a Parameters,
    derivatives: &'a Derivatives,
}

impl<'a, M: ModelFunction + ?Sized> VectorField<'a, M> {
    pub fn new(model: &'a M, parameters: &'a Parameters, derivatives: &'a Derivatives) -> Self {
        Self {
            model,
            parameters,
            derivatives,
        }
    }

    pub fn derivatives(&self) -> &Derivatives {
        self.derivatives
    }

    /// Evaluates the model and checks every derivative field is present and finite.
    pub fn evaluate(&self, t: f64, state: &StateVars) -> Result<Evaluation, SimulationError> {
        let values = self.model.evaluate(self.parameters, state, t);
        for (_, field) in self.derivatives.iter() {
            let value = values
                .get(field)
                .copied()
                .ok_or_else(|| SimulationError::MissingName {
                    name: field.to_string(),
                    time: t,
                })?;
            check_finite(field, value, t)?;
        }
        Ok(values)
    }

    /// Writes the derivative of each state variable into `out`, in derivative declaration order.
    pub fn apply(&self, t: f64, state: &StateVars, out: &mut [f64]) -> Result<(), SimulationError> {
        let values = self.evaluate(t, state)?;
        for (slot, (_, field)) in out.iter_mut().zip(self.derivatives.iter()) {
            // Presence checked by `evaluate`.
            *slot = values.get(field).copied().unwrap_or(f64::NAN);
        }
        Ok(())
    }
}

/// Classic Runge-Kutta 4th Order Solver
pub struct RK4 {
    k1: Vec<f64>,
    k2: Vec<f64>,
    k3: Vec<f64>,
    k4: Vec<f64>,
    tmp: StateVars,
}

impl RK4 {
    pub fn new(dim: usize) -> Self {
        Self {
            k1: vec![0.0; dim],
            k2: vec![0.0; dim],
            k3: vec![0.0; dim],
            k4: vec![0.0; dim],
            tmp: StateVars::with_capacity(dim),
        }
    }
}

/// tmp = base + scale * slopes, matched to state variables by name.
fn offset_state(
    tmp: &mut StateVars,
    base: &StateVars,
    derivatives: &Derivatives,
    slopes: &[f64],
    scale: f64,
) -> Result<(), SimulationError> {
    tmp.clone_from(base);
    for ((name, _), slope) in derivatives.iter().zip(slopes) {
        let slot = tmp
            .get_mut(name)
            .ok_or_else(|| SimulationError::Schema(format!("state variable `{name}` is missing")))?;
        *slot += scale * slope;
    }
    Ok(())
}

impl Steppable for RK4 {
    fn step<M: ModelFunction + ?Sized>(
        &mut self,
        field: &VectorField<'_, M>,
        t: &mut f64,
        state: &mut StateVars,
        dt: f64,
    ) -> Result<(), SimulationError> {
        let derivatives = field.derivatives();
        let half = 0.5 * dt;
        let t0 = *t;

        // k1 = f(t, y)
        field.apply(t0, state, &mut self.k1)?;

        // k2 = f(t + dt/2, y + dt*k1/2)
        offset_state(&mut self.tmp, state, derivatives, &self.k1, half)?;
        field.apply(t0 + half, &self.tmp, &mut self.k2)?;

        // k3 = f(t + dt/2, y + dt*k2/2)
        offset_state(&mut self.tmp, state, derivatives, &self.k2, half)?;
        field.apply(t0 + half, &self.tmp, &mut self.k3)?;

        // k4 = f(t + dt, y + dt*k3)
        offset_state(&mut self.tmp, state, derivatives, &self.k3, dt)?;
        field.apply(t0 + dt, &self.tmp, &mut self.k4)?;

        // y_next = y + dt/6 * (k1 + 2k2 + 2k3 + k4)
        let sixth = dt / 6.0;
        let t1 = t0 + dt;
        for (i, (name, _)) in derivatives.iter().enumerate() {
            let slot = state.get_mut(name).ok_or_else(|| {
                SimulationError::Schema(format!("state variable `{name}` is missing"))
            })?;
            *slot += sixth * (self.k1[i] + 2.0 * self.k2[i] + 2.0 * self.k3[i] + self.k4[i]);
            check_finite(name, *slot, t1)?;
        }

        *t = t1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{VectorField, RK4};
    use crate::derivatives::Derivatives;
    use crate::error::SimulationError;
    use crate::traits::{Evaluation, Parameters, StateVars, Steppable};

    fn decay(params: &Parameters, state: &StateVars, _t: f64) -> Evaluation {
        let mut out = Evaluation::new();
        out.insert("dydt".into(), -params["k"] * state["y"]);
        out
    }

    #[test]
    fn single_step_matches_rk4_polynomial() {
        // For y' = -k y one RK4 step multiplies y by the 4th-order Taylor polynomial of exp(-k h).
        let mut params = Parameters::new();
        params.insert("k".into(), 2.0);
        let derivatives = Derivatives::new([("y", "dydt")]).unwrap();
        let field = VectorField::new(&decay, &params, &derivatives);

        let mut state = StateVars::new();
        state.insert("y".into(), 1.0);
        let mut t = 0.0;
        let h = 0.1;
        RK4::new(1).step(&field, &mut t, &mut state, h).unwrap();

        let z = -2.0 * h;
        let expected = 1.0 + z + z * z / 2.0 + z.powi(3) / 6.0 + z.powi(4) / 24.0;
        assert!((state["y"] - expected).abs() < 1e-15);
        assert!((t - h).abs() < 1e-15);
    }

    #[test]
    fn slopes_are_matched_by_name_not_position() {
        // State insertion order differs from derivative declaration order.
        let model = |_: &Parameters, s: &StateVars, _t: f64| {
            let mut out = Evaluation::new();
            out.insert("da".into(), 1.0);
            out.insert("db".into(), 10.0 * s["b"].signum());
            out
        };
        let params = Parameters::new();
        let derivatives = Derivatives::new([("a", "da"), ("b", "db")]).unwrap();
        let field = VectorField::new(&model, &params, &derivatives);

        let mut state = StateVars::new();
        state.insert("b".into(), 1.0);
        state.insert("a".into(), 0.0);
        let mut t = 0.0;
        RK4::new(2).step(&field, &mut t, &mut state, 0.5).unwrap();

        assert!((state["a"] - 0.5).abs() < 1e-12);
        assert!((state["b"] - 6.0).abs() < 1e-12);
    }

    #[test]
    fn missing_derivative_field_is_reported_by_name() {
        let model = |_: &Parameters, _: &StateVars, _t: f64| Evaluation::new();
        let params = Parameters::new();
        let derivatives = Derivatives::new([("y", "dydt")]).unwrap();
        let field = VectorField::new(&model, &params, &derivatives);

        let mut state = StateVars::new();
        state.insert("y".into(), 1.0);
        let err = RK4::new(1)
            .step(&field, &mut 0.0, &mut state, 0.1)
            .unwrap_err();
        assert_eq!(
            err,
            SimulationError::MissingName {
                name: "dydt".into(),
                time: 0.0
            }
        );
    }

    #[test]
    fn non_finite_derivative_is_numeric_error() {
        let model = |_: &Parameters, s: &StateVars, _t: f64| {
            let mut out = Evaluation::new();
            out.insert("dydt".into(), 1.0 / (s["y"] - 1.0));
            out
        };
        let params = Parameters::new();
        let derivatives = Derivatives::new([("y", "dydt")]).unwrap();
        let field = VectorField::new(&model, &params, &derivatives);

        let mut state = StateVars::new();
        state.insert("y".into(), 1.0);
        let err = RK4::new(1)
            .step(&field, &mut 0.0, &mut state, 0.1)
            .unwrap_err();
        assert!(matches!(err, SimulationError::Numeric { ref name, .. } if name == "dydt"));
    }
}
