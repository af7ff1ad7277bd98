//! Core WASM simulation wrapper.

use fluxsim_core::{
    Derivatives, ExpressionModel, Parameters, ResultTable, RunConfig, Simulation, Start, StateVars,
};
use indexmap::IndexMap;
use js_sys::Float64Array;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

pub(crate) fn to_js_err(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Builds an expression-defined simulation. Parameter and state order follow the maps.
pub(crate) fn build_simulation(
    parameters: Parameters,
    initial_state: &StateVars,
    derivatives: IndexMap<String, String>,
    outputs: Vec<String>,
    equations: &[String],
) -> Result<Simulation<ExpressionModel>, String> {
    let param_names: Vec<String> = parameters.keys().cloned().collect();
    let state_names: Vec<String> = initial_state.keys().cloned().collect();
    let model =
        ExpressionModel::new(&param_names, &state_names, equations).map_err(|e| format!("{e:#}"))?;
    let derivatives = Derivatives::new(derivatives).map_err(|e| e.to_string())?;
    derivatives
        .check_state(initial_state)
        .map_err(|e| e.to_string())?;
    Simulation::new(parameters, model, derivatives, outputs).map_err(|e| e.to_string())
}

#[wasm_bindgen]
pub struct WasmSimulation {
    simulation: Simulation<ExpressionModel>,
    initial_state: StateVars,
}

#[wasm_bindgen]
impl WasmSimulation {
    /// `parameters`, `initial_state`: `{ name: number }`.
    /// `derivatives`: `{ stateName: derivativeName }`.
    /// `equations`: `"name = expression"` lines in calculation order.
    #[wasm_bindgen(constructor)]
    pub fn new(
        parameters: JsValue,
        initial_state: JsValue,
        derivatives: JsValue,
        outputs: Vec<String>,
        equations: Vec<String>,
    ) -> Result<WasmSimulation, JsValue> {
        console_error_panic_hook::set_once();

        let parameters: Parameters = from_value(parameters).map_err(to_js_err)?;
        let initial_state: StateVars = from_value(initial_state).map_err(to_js_err)?;
        let derivatives: IndexMap<String, String> = from_value(derivatives).map_err(to_js_err)?;

        let simulation =
            build_simulation(parameters, &initial_state, derivatives, outputs, &equations)
                .map_err(|e| JsValue::from_str(&e))?;
        Ok(WasmSimulation {
            simulation,
            initial_state,
        })
    }

    pub fn run(&self, duration: f64, step: f64, sample_interval: f64) -> Result<JsValue, JsValue> {
        let config = RunConfig::new(duration, step, sample_interval);
        let table = self
            .simulation
            .run(&config, Start::Fresh(&self.initial_state))
            .map_err(to_js_err)?;
        to_value(&table).map_err(to_js_err)
    }

    /// Continues `table` (as returned by `run` or `resume`) for another `duration`.
    pub fn resume(
        &self,
        table: JsValue,
        duration: f64,
        step: f64,
        sample_interval: f64,
    ) -> Result<JsValue, JsValue> {
        let prior: ResultTable = from_value(table).map_err(to_js_err)?;
        let config = RunConfig::new(duration, step, sample_interval);
        let table = self
            .simulation
            .run(&config, Start::Resume(&prior))
            .map_err(to_js_err)?;
        to_value(&table).map_err(to_js_err)
    }

    pub fn output_names(&self) -> Vec<String> {
        self.simulation.outputs().to_vec()
    }
}

/// Extracts one column of a result table as a typed array.
#[wasm_bindgen]
pub fn table_column(table: JsValue, name: &str) -> Result<Float64Array, JsValue> {
    let table: ResultTable = from_value(table).map_err(to_js_err)?;
    let column = table
        .column(name)
        .ok_or_else(|| JsValue::from_str(&format!("Unknown column `{name}`")))?;
    Ok(Float64Array::from(column.as_slice()))
}

#[cfg(test)]
mod tests {
    use super::build_simulation;
    use fluxsim_core::{Parameters, RunConfig, Start, StateVars};
    use indexmap::IndexMap;

    fn inputs() -> (Parameters, StateVars, IndexMap<String, String>) {
        let mut params = Parameters::new();
        params.insert("k".into(), 1.0);
        let mut state = StateVars::new();
        state.insert("y".into(), 1.0);
        let mut derivatives = IndexMap::new();
        derivatives.insert("y".to_string(), "dydt".to_string());
        (params, state, derivatives)
    }

    #[test]
    fn builds_and_runs_expression_model() {
        let (params, state, derivatives) = inputs();
        let sim = build_simulation(
            params,
            &state,
            derivatives,
            vec!["t".into(), "y".into(), "dydt".into()],
            &["dydt = -k * y".to_string()],
        )
        .unwrap();
        let table = sim
            .run(&RunConfig::new(0.2, 0.01, 0.1), Start::Fresh(&state))
            .unwrap();
        let y = table.column("y").unwrap();
        assert_eq!(y.len(), 3);
        assert!((y[2] - 0.8187).abs() < 1e-4);
    }

    #[test]
    fn reports_bad_equations_and_state_mismatch() {
        let (params, state, derivatives) = inputs();
        let err = build_simulation(
            params.clone(),
            &state,
            derivatives.clone(),
            vec!["t".into()],
            &["dydt = -q * y".to_string()],
        )
        .err()
        .unwrap();
        assert!(err.contains("q"));

        let mut extra = state.clone();
        extra.insert("z".into(), 0.0);
        let err = build_simulation(
            params,
            &extra,
            derivatives,
            vec!["t".into()],
            &["dydt = -k * y".to_string()],
        )
        .err()
        .unwrap();
        assert!(err.contains("`z`"));
    }
}
