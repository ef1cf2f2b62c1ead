//! Pipeline strategies, one per task kind.

mod anomaly;
mod clustering;
mod forecasting;
mod supervised;

pub use anomaly::AnomalyStrategy;
pub use clustering::ClusteringStrategy;
pub use forecasting::ForecastingStrategy;
pub use supervised::{MAX_CLASSES, MAX_UNIQUENESS_RATIO, SupervisedStrategy, detect_problem_type};

use crate::error::{OrchestratorError, Result};
use std::collections::BTreeMap;
use strata_training::Frame;
use strata_training::native::mean_std;

/// Numeric columns scaled to zero mean and unit variance.
#[derive(Debug, Clone)]
pub(crate) struct Standardized {
    pub columns: Vec<String>,
    /// Row-major; missing cells are 0 (the column mean).
    pub rows: Vec<Vec<f64>>,
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl Standardized {
    /// Maps a point in the scaled space back to original units.
    pub fn unscale(&self, point: &[f64]) -> Vec<f64> {
        point.iter().zip(self.means.iter().zip(&self.stds)).map(|(v, (m, s))| v * s + m).collect()
    }
}

/// Numeric columns of `frame` other than the target.
pub(crate) fn numeric_features(frame: &Frame, target: Option<&str>) -> Vec<String> {
    let skip: Vec<&str> = target.into_iter().collect();
    frame.numeric_column_names(&skip)
}

pub(crate) fn standardize(frame: &Frame, columns: Vec<String>) -> Result<Standardized> {
    if columns.is_empty() {
        return Err(OrchestratorError::Configuration("dataset has no numeric feature columns".to_string()));
    }
    let raw = frame.numeric_rows(&columns)?;
    let (means, stds): (Vec<f64>, Vec<f64>) = (0..columns.len())
        .map(|j| {
            let present: Vec<f64> = raw.iter().filter_map(|r| r[j]).filter(|v| v.is_finite()).collect();
            mean_std(&present)
        })
        .unzip();
    let rows = raw
        .iter()
        .map(|r| {
            r.iter()
                .enumerate()
                .map(|(j, v)| v.filter(|x| x.is_finite()).map_or(0.0, |x| (x - means[j]) / stds[j]))
                .collect()
        })
        .collect();
    Ok(Standardized { columns, rows, means, stds })
}

/// Scales importances so they sum to one. All-zero maps are returned unchanged.
pub(crate) fn normalize_importance(raw: BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    let total: f64 = raw.values().filter(|v| v.is_finite()).sum();
    if total <= 0.0 {
        return raw;
    }
    raw.into_iter().map(|(k, v)| (k, if v.is_finite() { v / total } else { 0.0 })).collect()
}

pub(crate) fn finite(score: f64) -> Option<f64> {
    score.is_finite().then_some(score)
}
