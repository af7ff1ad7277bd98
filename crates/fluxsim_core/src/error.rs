use thiserror::Error;

/// Failures surfaced by a simulation run.
///
/// Every variant is raised before a partially-wrong [`ResultTable`](crate::table::ResultTable)
/// could be returned: configuration and schema checks run before the first step,
/// resume checks before any state is read, and numeric checks after every model evaluation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("invalid run configuration: {field} = {value} ({reason})")]
    Configuration {
        field: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("model output `{name}` is not defined at t = {time}")]
    MissingName { name: String, time: f64 },

    #[error("duplicate column `{0}` in output list")]
    DuplicateColumn(String),

    #[error("schema mismatch: {0}")]
    Schema(String),

    #[error("cannot resume: {0}")]
    ResumeState(String),

    #[error("non-finite value {value} for `{name}` at t = {time}")]
    Numeric { name: String, time: f64, value: f64 },
}

impl SimulationError {
    pub(crate) fn config(field: &'static str, value: f64, reason: &'static str) -> Self {
        SimulationError::Configuration {
            field,
            value,
            reason,
        }
    }

    /// True for the schema family (missing names, duplicate columns, mismatched tables).
    pub fn is_schema(&self) -> bool {
        matches!(
            self,
            SimulationError::MissingName { .. }
                | SimulationError::DuplicateColumn(_)
                | SimulationError::Schema(_)
        )
    }
}

pub(crate) fn check_finite(name: &str, value: f64, time: f64) -> Result<f64, SimulationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SimulationError::Numeric {
            name: name.to_string(),
            time,
            value,
        })
    }
}
