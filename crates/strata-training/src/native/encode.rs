use crate::dataset::{ColumnKind, Frame};
use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::Range;

/// Text columns with more distinct values than this are dropped rather than one-hot encoded.
const MAX_CATEGORY_LEVELS: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum EncodedFeature {
    /// Numeric and timestamp columns: mean-imputed, standardized.
    Scaled { column: String, mean: f64, std: f64 },
    /// Text columns: one indicator per level; unseen levels encode as all zeros.
    OneHot { column: String, levels: Vec<String> },
}

impl EncodedFeature {
    fn column(&self) -> &str {
        match self {
            Self::Scaled { column, .. } | Self::OneHot { column, .. } => column,
        }
    }

    fn width(&self) -> usize {
        match self {
            Self::Scaled { .. } => 1,
            Self::OneHot { levels, .. } => levels.len(),
        }
    }
}

/// Turns frame columns into a dense standardized matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEncoder {
    features: Vec<EncodedFeature>,
}

impl FeatureEncoder {
    pub fn fit(frame: &Frame, columns: &[String]) -> TrainingResult<Self> {
        let mut features = Vec::new();
        for name in columns {
            let col = frame.require_column(name)?;
            match col.kind() {
                ColumnKind::Numeric | ColumnKind::Timestamp => {
                    let values: Vec<f64> = (0..col.len()).filter_map(|i| col.as_f64(i)).collect();
                    if values.is_empty() {
                        continue;
                    }
                    let (mean, std) = mean_std(&values);
                    features.push(EncodedFeature::Scaled { column: name.clone(), mean, std });
                }
                ColumnKind::Text => {
                    let levels: BTreeSet<String> = (0..col.len()).filter_map(|i| col.value_key(i)).collect();
                    if levels.is_empty() || levels.len() > MAX_CATEGORY_LEVELS {
                        continue;
                    }
                    features.push(EncodedFeature::OneHot {
                        column: name.clone(),
                        levels: levels.into_iter().collect(),
                    });
                }
            }
        }

        if features.is_empty() {
            return Err(TrainingError::Trainer("no usable feature columns".to_string()));
        }
        Ok(Self { features })
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.features.iter().map(EncodedFeature::width).sum()
    }

    /// Source columns that survived encoding.
    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        self.features.iter().map(|f| f.column().to_string()).collect()
    }

    /// Output column range produced by each source column.
    #[must_use]
    pub fn groups(&self) -> Vec<(String, Range<usize>)> {
        let mut offset = 0;
        self.features
            .iter()
            .map(|f| {
                let range = offset..offset + f.width();
                offset = range.end;
                (f.column().to_string(), range)
            })
            .collect()
    }

    pub fn transform(&self, frame: &Frame) -> TrainingResult<Vec<Vec<f64>>> {
        let width = self.width();
        let mut rows = vec![vec![0.0; width]; frame.n_rows()];
        let mut offset = 0;
        for feature in &self.features {
            let col = frame.require_column(feature.column())?;
            match feature {
                EncodedFeature::Scaled { mean, std, .. } => {
                    for (i, row) in rows.iter_mut().enumerate() {
                        row[offset] = col.as_f64(i).map_or(0.0, |v| (v - mean) / std);
                    }
                }
                EncodedFeature::OneHot { levels, .. } => {
                    for (i, row) in rows.iter_mut().enumerate() {
                        if let Some(key) = col.value_key(i) {
                            if let Ok(pos) = levels.binary_search(&key) {
                                row[offset + pos] = 1.0;
                            }
                        }
                    }
                }
            }
            offset += feature.width();
        }
        Ok(rows)
    }
}

/// Mean and standard deviation; a zero deviation is reported as 1 so scaling is a no-op.
#[must_use]
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 1.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    (mean, if std > 1e-12 { std } else { 1.0 })
}
