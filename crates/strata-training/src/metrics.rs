//! Evaluation metric names and scoring.
//!
//! User-facing metric names are normalized through a fixed alias table. Canonical names
//! map to themselves, so resolution is idempotent; unknown names pass through untouched
//! and are accepted or rejected by the backend.

use crate::dataset::shuffled_indices;
use crate::job::ProblemType;
use std::collections::HashMap;
use std::hash::Hash;

/// `(alias, canonical)` pairs. Lookup is case-insensitive.
const METRIC_ALIASES: &[(&str, &str)] = &[
    ("accuracy", "accuracy"),
    ("acc", "accuracy"),
    ("balanced_accuracy", "balanced_accuracy"),
    ("bacc", "balanced_accuracy"),
    ("f1", "f1"),
    ("f1_score", "f1"),
    ("f1_macro", "f1_macro"),
    ("roc_auc", "roc_auc"),
    ("auc", "roc_auc"),
    ("roc-auc", "roc_auc"),
    ("log_loss", "log_loss"),
    ("logloss", "log_loss"),
    ("cross_entropy", "log_loss"),
    ("precision", "precision"),
    ("recall", "recall"),
    ("root_mean_squared_error", "root_mean_squared_error"),
    ("rmse", "root_mean_squared_error"),
    ("mean_squared_error", "mean_squared_error"),
    ("mse", "mean_squared_error"),
    ("mean_absolute_error", "mean_absolute_error"),
    ("mae", "mean_absolute_error"),
    ("r2", "r2"),
    ("r_squared", "r2"),
    ("r2_score", "r2"),
    ("mean_absolute_percentage_error", "mean_absolute_percentage_error"),
    ("mape", "mean_absolute_percentage_error"),
];

/// Default metric for forecasting jobs.
pub const DEFAULT_FORECAST_METRIC: &str = "mean_absolute_error";

/// Normalizes a metric name through the alias table.
#[must_use]
pub fn resolve_metric(name: &str) -> String {
    let key = name.trim().to_ascii_lowercase();
    METRIC_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map_or_else(|| name.to_string(), |(_, canonical)| (*canonical).to_string())
}

#[must_use]
pub fn default_metric(problem: ProblemType) -> &'static str {
    match problem {
        ProblemType::Binary | ProblemType::Multiclass => "accuracy",
        ProblemType::Regression => "root_mean_squared_error",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Accuracy,
    BalancedAccuracy,
    F1,
    F1Macro,
    RocAuc,
    LogLoss,
    Precision,
    Recall,
    Rmse,
    Mse,
    Mae,
    R2,
    Mape,
}

impl Metric {
    /// Parses a canonical (already resolved) metric name.
    #[must_use]
    pub fn from_canonical(name: &str) -> Option<Self> {
        Some(match name {
            "accuracy" => Self::Accuracy,
            "balanced_accuracy" => Self::BalancedAccuracy,
            "f1" => Self::F1,
            "f1_macro" => Self::F1Macro,
            "roc_auc" => Self::RocAuc,
            "log_loss" => Self::LogLoss,
            "precision" => Self::Precision,
            "recall" => Self::Recall,
            "root_mean_squared_error" => Self::Rmse,
            "mean_squared_error" => Self::Mse,
            "mean_absolute_error" => Self::Mae,
            "r2" => Self::R2,
            "mean_absolute_percentage_error" => Self::Mape,
            _ => return None,
        })
    }

    #[must_use]
    pub fn greater_is_better(self) -> bool {
        !matches!(self, Self::LogLoss | Self::Rmse | Self::Mse | Self::Mae | Self::Mape)
    }

    #[must_use]
    pub fn is_classification(self) -> bool {
        matches!(
            self,
            Self::Accuracy
                | Self::BalancedAccuracy
                | Self::F1
                | Self::F1Macro
                | Self::RocAuc
                | Self::LogLoss
                | Self::Precision
                | Self::Recall
        )
    }

    /// Metrics defined only for two classes.
    #[must_use]
    pub fn binary_only(self) -> bool {
        matches!(self, Self::F1 | Self::RocAuc | Self::Precision | Self::Recall)
    }

    #[must_use]
    pub fn supports(self, problem: ProblemType) -> bool {
        match problem {
            ProblemType::Binary => self.is_classification(),
            ProblemType::Multiclass => self.is_classification() && !self.binary_only(),
            ProblemType::Regression => !self.is_classification(),
        }
    }

    /// `true` when `a` is a better score than `b`.
    #[must_use]
    pub fn is_better(self, a: f64, b: f64) -> bool {
        if self.greater_is_better() { a > b } else { a < b }
    }
}

/// Scores class-index predictions. `proba` is row-major `[row][class]`.
///
/// For binary metrics the positive class is index 1.
#[must_use]
pub fn classification_score(
    metric: Metric,
    actual: &[usize],
    predicted: &[usize],
    proba: &[Vec<f64>],
    n_classes: usize,
) -> f64 {
    if actual.is_empty() {
        return f64::NAN;
    }
    match metric {
        Metric::Accuracy => accuracy(actual, predicted),
        Metric::BalancedAccuracy => {
            let recalls: Vec<f64> =
                (0..n_classes).filter_map(|c| class_recall(actual, predicted, c)).collect();
            mean(&recalls)
        }
        Metric::F1 => f1_for_class(actual, predicted, 1),
        Metric::F1Macro => {
            let scores: Vec<f64> = (0..n_classes).map(|c| f1_for_class(actual, predicted, c)).collect();
            mean(&scores)
        }
        Metric::Precision => {
            let (tp, fp, _) = counts_for_class(actual, predicted, 1);
            ratio(tp, tp + fp)
        }
        Metric::Recall => class_recall(actual, predicted, 1).unwrap_or(0.0),
        Metric::RocAuc => {
            let labels: Vec<bool> = actual.iter().map(|&a| a == 1).collect();
            let scores: Vec<f64> = proba.iter().map(|p| p.get(1).copied().unwrap_or(0.0)).collect();
            roc_auc(&labels, &scores).unwrap_or(0.5)
        }
        Metric::LogLoss => {
            let eps = 1e-15;
            let total: f64 = actual
                .iter()
                .zip(proba)
                .map(|(&a, p)| -(p.get(a).copied().unwrap_or(0.0).clamp(eps, 1.0 - eps)).ln())
                .sum();
            total / actual.len() as f64
        }
        Metric::Rmse | Metric::Mse | Metric::Mae | Metric::R2 | Metric::Mape => f64::NAN,
    }
}

#[must_use]
pub fn regression_score(metric: Metric, actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return f64::NAN;
    }
    let n = actual.len() as f64;
    let errors = actual.iter().zip(predicted).map(|(a, p)| a - p);
    match metric {
        Metric::Mse => errors.map(|e| e * e).sum::<f64>() / n,
        Metric::Rmse => (errors.map(|e| e * e).sum::<f64>() / n).sqrt(),
        Metric::Mae => errors.map(f64::abs).sum::<f64>() / n,
        Metric::Mape => {
            let terms: Vec<f64> = actual
                .iter()
                .zip(predicted)
                .filter(|(a, _)| a.abs() > f64::EPSILON)
                .map(|(a, p)| ((a - p) / a).abs())
                .collect();
            mean(&terms)
        }
        Metric::R2 => {
            let avg = actual.iter().sum::<f64>() / n;
            let ss_tot: f64 = actual.iter().map(|a| (a - avg).powi(2)).sum();
            let ss_res: f64 = errors.map(|e| e * e).sum();
            if ss_tot <= f64::EPSILON { 0.0 } else { 1.0 - ss_res / ss_tot }
        }
        _ => f64::NAN,
    }
}

/// Area under the ROC curve via the rank-sum statistic. `None` when only one class is present.
#[must_use]
pub fn roc_auc(labels: &[bool], scores: &[f64]) -> Option<f64> {
    let n_pos = labels.iter().filter(|&&l| l).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    // Average ranks across ties.
    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = avg_rank;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = labels.iter().zip(&ranks).filter(|(l, _)| **l).map(|(_, r)| r).sum();
    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Some((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// `matrix[actual][predicted]` counts.
#[must_use]
pub fn confusion_matrix(actual: &[usize], predicted: &[usize], n_classes: usize) -> Vec<Vec<u64>> {
    let mut matrix = vec![vec![0u64; n_classes]; n_classes];
    for (&a, &p) in actual.iter().zip(predicted) {
        if a < n_classes && p < n_classes {
            matrix[a][p] += 1;
        }
    }
    matrix
}

fn accuracy(actual: &[usize], predicted: &[usize]) -> f64 {
    let hits = actual.iter().zip(predicted).filter(|(a, p)| a == p).count();
    hits as f64 / actual.len() as f64
}

fn counts_for_class(actual: &[usize], predicted: &[usize], class: usize) -> (usize, usize, usize) {
    let mut tp = 0;
    let mut fp = 0;
    let mut fn_ = 0;
    for (&a, &p) in actual.iter().zip(predicted) {
        match (a == class, p == class) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            (false, false) => {}
        }
    }
    (tp, fp, fn_)
}

fn class_recall(actual: &[usize], predicted: &[usize], class: usize) -> Option<f64> {
    let (tp, _, fn_) = counts_for_class(actual, predicted, class);
    (tp + fn_ > 0).then(|| ratio(tp, tp + fn_))
}

fn f1_for_class(actual: &[usize], predicted: &[usize], class: usize) -> f64 {
    let (tp, fp, fn_) = counts_for_class(actual, predicted, class);
    ratio(2 * tp, 2 * tp + fp + fn_)
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() { 0.0 } else { values.iter().sum::<f64>() / values.len() as f64 }
}

/// Rows sampled when computing a silhouette score.
const SILHOUETTE_SAMPLE: usize = 1000;

/// Mean silhouette coefficient over a seeded sample of non-noise rows.
///
/// Rows labelled `-1` are ignored. `None` when fewer than two clusters remain.
#[must_use]
pub fn silhouette_score(rows: &[Vec<f64>], labels: &[i64], seed: u64) -> Option<f64> {
    let members: Vec<usize> = (0..rows.len().min(labels.len())).filter(|&i| labels[i] >= 0).collect();
    let sample: Vec<usize> = shuffled_indices(members.len(), seed)
        .into_iter()
        .take(SILHOUETTE_SAMPLE)
        .map(|i| members[i])
        .collect();

    let mut clusters: HashMap<i64, Vec<usize>> = HashMap::new();
    for &i in &sample {
        clusters.entry(labels[i]).or_default().push(i);
    }
    if clusters.len() < 2 {
        return None;
    }

    let distance = |a: usize, b: usize| -> f64 {
        rows[a].iter().zip(&rows[b]).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
    };
    let mean_distance = |i: usize, group: &[usize]| -> f64 {
        let others: Vec<f64> = group.iter().filter(|&&j| j != i).map(|&j| distance(i, j)).collect();
        mean(&others)
    };

    let scores: Vec<f64> = sample
        .iter()
        .map(|&i| {
            let own = &clusters[&labels[i]];
            if own.len() < 2 {
                return 0.0;
            }
            let a = mean_distance(i, own);
            let b = clusters
                .iter()
                .filter(|(label, _)| **label != labels[i])
                .map(|(_, group)| mean_distance(i, group))
                .fold(f64::INFINITY, f64::min);
            let denom = a.max(b);
            if denom > 0.0 { (b - a) / denom } else { 0.0 }
        })
        .collect();
    Some(mean(&scores))
}

/// Adjusted Rand index between two labelings of the same rows.
#[must_use]
pub fn adjusted_rand_index<A: Hash + Eq, B: Hash + Eq>(truth: &[A], predicted: &[B]) -> f64 {
    let n = truth.len().min(predicted.len());
    if n < 2 {
        return 1.0;
    }
    let pairs = |c: usize| (c * c.saturating_sub(1)) as f64 / 2.0;

    let mut table: HashMap<(&A, &B), usize> = HashMap::new();
    let mut rows: HashMap<&A, usize> = HashMap::new();
    let mut cols: HashMap<&B, usize> = HashMap::new();
    for (a, b) in truth.iter().zip(predicted).take(n) {
        *table.entry((a, b)).or_default() += 1;
        *rows.entry(a).or_default() += 1;
        *cols.entry(b).or_default() += 1;
    }

    let index: f64 = table.values().map(|&c| pairs(c)).sum();
    let sum_rows: f64 = rows.values().map(|&c| pairs(c)).sum();
    let sum_cols: f64 = cols.values().map(|&c| pairs(c)).sum();
    let expected = sum_rows * sum_cols / pairs(n);
    let max_index = (sum_rows + sum_cols) / 2.0;
    if (max_index - expected).abs() < f64::EPSILON {
        return if (index - expected).abs() < f64::EPSILON { 1.0 } else { 0.0 };
    }
    (index - expected) / (max_index - expected)
}
