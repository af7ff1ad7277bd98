mod system;

pub use system::{table_column, WasmSimulation};

use fluxsim_core::stats;
use fluxsim_core::ResultTable;
use serde_wasm_bindgen::{from_value, to_value};
use system::to_js_err;
use wasm_bindgen::prelude::*;

/// Per-column mean, standard deviation, correlation, MSPE and CCC of
/// `predicted` against `observed`.
#[wasm_bindgen]
pub fn compare(observed: JsValue, predicted: JsValue) -> Result<JsValue, JsValue> {
    let observed: ResultTable = from_value(observed).map_err(to_js_err)?;
    let predicted: ResultTable = from_value(predicted).map_err(to_js_err)?;
    let agreements = stats::compare(&observed, &predicted).map_err(to_js_err)?;
    to_value(&agreements).map_err(to_js_err)
}
