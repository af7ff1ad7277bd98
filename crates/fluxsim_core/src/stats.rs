//! Agreement statistics between an observed and a predicted result table.

use crate::error::SimulationError;
use crate::table::{ResultTable, TIME_COLUMN};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Summary of how well one predicted column tracks its observed counterpart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnAgreement {
    pub name: String,
    pub observed_mean: f64,
    pub predicted_mean: f64,
    pub observed_std: f64,
    pub predicted_std: f64,
    /// Pearson correlation of row-paired values.
    pub correlation: f64,
    pub mspe: f64,
    pub ccc: f64,
}

/// Mean squared prediction error from summary moments.
pub fn mspe(pred_mean: f64, obs_mean: f64, pred_std: f64, obs_std: f64, corr: f64) -> f64 {
    (pred_mean - obs_mean).powi(2)
        + (pred_std - corr * obs_std).powi(2)
        + (1.0 - corr * corr) * obs_std * obs_std
}

/// Lin's concordance correlation coefficient from summary moments.
pub fn ccc(pred_mean: f64, obs_mean: f64, pred_std: f64, obs_std: f64, corr: f64) -> f64 {
    let u = (pred_mean - obs_mean) / (pred_std * obs_std).sqrt();
    let v = pred_std / obs_std;
    let bias_correction = 2.0 / (v + 1.0 / v + u * u);
    corr * bias_correction
}

/// Compares every observed column except time with the predicted column of the same name.
pub fn compare(
    observed: &ResultTable,
    predicted: &ResultTable,
) -> Result<Vec<ColumnAgreement>, SimulationError> {
    if observed.len() != predicted.len() {
        return Err(SimulationError::Schema(format!(
            "observed has {} rows but predicted has {}",
            observed.len(),
            predicted.len()
        )));
    }
    if observed.len() < 2 {
        return Err(SimulationError::Schema(
            "at least two rows are needed to compare tables".to_string(),
        ));
    }

    observed
        .columns()
        .iter()
        .filter(|name| name.as_str() != TIME_COLUMN)
        .map(|name| {
            let obs = observed.column(name).map(DVector::from_vec).ok_or_else(|| {
                SimulationError::Schema(format!("missing observed column `{name}`"))
            })?;
            let pred = predicted.column(name).map(DVector::from_vec).ok_or_else(|| {
                SimulationError::Schema(format!("predicted table is missing column `{name}`"))
            })?;
            Ok(agreement(name, &obs, &pred))
        })
        .collect()
}

fn agreement(name: &str, obs: &DVector<f64>, pred: &DVector<f64>) -> ColumnAgreement {
    let n = obs.len() as f64;
    let observed_mean = obs.mean();
    let predicted_mean = pred.mean();
    let obs_centered = obs.add_scalar(-observed_mean);
    let pred_centered = pred.add_scalar(-predicted_mean);

    let observed_std = (obs_centered.norm_squared() / (n - 1.0)).sqrt();
    let predicted_std = (pred_centered.norm_squared() / (n - 1.0)).sqrt();
    let correlation =
        obs_centered.dot(&pred_centered) / (obs_centered.norm() * pred_centered.norm());

    ColumnAgreement {
        name: name.to_string(),
        observed_mean,
        predicted_mean,
        observed_std,
        predicted_std,
        correlation,
        mspe: mspe(predicted_mean, observed_mean, predicted_std, observed_std, correlation),
        ccc: ccc(predicted_mean, observed_mean, predicted_std, observed_std, correlation),
    }
}
