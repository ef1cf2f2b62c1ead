use super::SavedModel;
use crate::artifacts::write_json;
use crate::error::{TrainingError, TrainingResult};
use crate::layout::ArtifactLayout;
use crate::trainer::{OutlierFit, OutlierRequest};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;

const N_TREES: usize = 100;
const SUBSAMPLE: usize = 256;
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
enum Node {
    Leaf { size: usize },
    Split { feature: usize, threshold: f64, left: Box<Node>, right: Box<Node> },
}

impl Node {
    fn build(rows: &[&[f64]], depth: usize, max_depth: usize, rng: &mut StdRng) -> Self {
        if depth >= max_depth || rows.len() <= 1 {
            return Self::Leaf { size: rows.len() };
        }
        let width = rows[0].len();
        let spreads: Vec<(usize, f64, f64)> = (0..width)
            .filter_map(|f| {
                let lo = rows.iter().map(|r| r[f]).fold(f64::INFINITY, f64::min);
                let hi = rows.iter().map(|r| r[f]).fold(f64::NEG_INFINITY, f64::max);
                (hi > lo).then_some((f, lo, hi))
            })
            .collect();
        if spreads.is_empty() {
            return Self::Leaf { size: rows.len() };
        }

        let (feature, lo, hi) = spreads[rng.gen_range(0..spreads.len())];
        let threshold = rng.gen_range(lo..hi);
        let (left, right): (Vec<&[f64]>, Vec<&[f64]>) = rows.iter().partition(|r| r[feature] < threshold);
        Self::Split {
            feature,
            threshold,
            left: Box::new(Self::build(&left, depth + 1, max_depth, rng)),
            right: Box::new(Self::build(&right, depth + 1, max_depth, rng)),
        }
    }

    fn path_length(&self, row: &[f64]) -> f64 {
        let mut node = self;
        let mut depth = 0.0;
        loop {
            match node {
                Self::Leaf { size } => return depth + average_path(*size),
                Self::Split { feature, threshold, left, right } => {
                    node = if row[*feature] < *threshold { left } else { right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// Average unsuccessful-search path length in a binary search tree of `n` nodes.
fn average_path(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Isolation forest over a standardized matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct IsolationForest {
    subsample: usize,
    trees: Vec<Node>,
}

impl IsolationForest {
    fn fit(rows: &[Vec<f64>], seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let subsample = SUBSAMPLE.min(rows.len());
        let max_depth = (subsample.max(2) as f64).log2().ceil() as usize;
        let trees = (0..N_TREES)
            .map(|_| {
                let picked: Vec<&[f64]> =
                    sample(&mut rng, rows.len(), subsample).iter().map(|i| rows[i].as_slice()).collect();
                Node::build(&picked, 0, max_depth, &mut rng)
            })
            .collect();
        Self { subsample, trees }
    }

    /// Anomaly score in (0, 1]; higher is more anomalous.
    fn score(&self, row: &[f64]) -> f64 {
        let mean_path = self.trees.iter().map(|t| t.path_length(row)).sum::<f64>() / self.trees.len() as f64;
        let norm = average_path(self.subsample);
        if norm <= 0.0 { 0.5 } else { 2f64.powf(-mean_path / norm) }
    }
}

pub(crate) fn fit(request: OutlierRequest, workdir: &Path) -> TrainingResult<OutlierFit> {
    if request.rows.len() < 2 {
        return Err(TrainingError::Trainer("anomaly detection needs at least two rows".to_string()));
    }
    if request.rows[0].is_empty() {
        return Err(TrainingError::Trainer("anomaly detection needs at least one feature".to_string()));
    }

    let forest = IsolationForest::fit(&request.rows, request.seed);
    let scores = request.rows.iter().map(|r| forest.score(r)).collect();

    let model_path = ArtifactLayout::model_path(workdir);
    write_json(&model_path, &SavedModel::Outliers(forest))?;
    Ok(OutlierFit { model: "IsolationForest".to_string(), scores, model_path })
}
