use super::encode::FeatureEncoder;
use super::{SavedModel, squared_distance};
use crate::artifacts::write_json;
use crate::dataset::{ColumnKind, Frame, holdout_split, shuffled_indices};
use crate::error::{TrainingError, TrainingResult};
use crate::job::ProblemType;
use crate::layout::ArtifactLayout;
use crate::metrics::{Metric, classification_score, regression_score};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::trainer::{LeaderboardEntry, Predictor, SupervisedFit, SupervisedRequest, TargetValue};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Instant;
use tracing::debug;

const KNN_NEIGHBORS: usize = 7;
/// Reference rows kept by the nearest-neighbour models.
const KNN_MAX_ROWS: usize = 2000;
const LOGISTIC_EPOCHS: usize = 200;
const LOGISTIC_LEARNING_RATE: f64 = 0.5;
const LOGISTIC_L2: f64 = 1e-3;
const RIDGE_LAMBDA: f64 = 1e-3;
/// Share of the training rows held back to rank candidates.
const VALIDATION_FRACTION: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    LogisticRegression,
    KNearestNeighbors,
    NearestCentroid,
    MajorityClass,
    RidgeRegression,
    MeanBaseline,
}

impl Family {
    fn name(self) -> &'static str {
        match self {
            Self::LogisticRegression => "LogisticRegression",
            Self::KNearestNeighbors => "KNearestNeighbors",
            Self::NearestCentroid => "NearestCentroid",
            Self::MajorityClass => "MajorityClass",
            Self::RidgeRegression => "RidgeRegression",
            Self::MeanBaseline => "MeanBaseline",
        }
    }

    /// Candidates in search order, strongest first.
    fn candidates(problem: ProblemType) -> &'static [Self] {
        if problem.is_classification() {
            &[Self::LogisticRegression, Self::KNearestNeighbors, Self::NearestCentroid, Self::MajorityClass]
        } else {
            &[Self::RidgeRegression, Self::KNearestNeighbors, Self::MeanBaseline]
        }
    }
}

/// Encoded training targets.
#[derive(Debug, Clone)]
enum Targets {
    Classes { labels: Vec<String>, idx: Vec<usize> },
    Values(Vec<f64>),
}

impl Targets {
    fn take(&self, rows: &[usize]) -> Self {
        match self {
            Self::Classes { labels, idx } => {
                Self::Classes { labels: labels.clone(), idx: rows.iter().map(|&r| idx[r]).collect() }
            }
            Self::Values(v) => Self::Values(rows.iter().map(|&r| v[r]).collect()),
        }
    }

    fn n_classes(&self) -> usize {
        match self {
            Self::Classes { labels, .. } => labels.len(),
            Self::Values(_) => 0,
        }
    }
}

/// Raw model output for a batch of rows.
#[derive(Debug, Clone, PartialEq)]
enum Output {
    Proba(Vec<Vec<f64>>),
    Values(Vec<f64>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
enum Estimator {
    MajorityClass { probabilities: Vec<f64> },
    NearestCentroid { centroids: Vec<Vec<f64>> },
    KNearestNeighbors { k: usize, n_classes: usize, rows: Vec<Vec<f64>>, targets: Vec<f64> },
    /// One `[bias, weights..]` row per class.
    LogisticRegression { weights: Vec<Vec<f64>> },
    RidgeRegression { intercept: f64, coefficients: Vec<f64> },
    MeanBaseline { mean: f64 },
}

impl Estimator {
    fn fit(family: Family, x: &[Vec<f64>], y: &Targets, seed: u64) -> TrainingResult<Self> {
        if x.is_empty() {
            return Err(TrainingError::Trainer("no training rows".to_string()));
        }
        let width = x[0].len();
        let estimator = match (family, y) {
            (Family::MajorityClass, Targets::Classes { labels, idx }) => {
                let mut counts = vec![0.0; labels.len()];
                for &c in idx {
                    counts[c] += 1.0;
                }
                let total = idx.len() as f64;
                Self::MajorityClass { probabilities: counts.iter().map(|c| c / total).collect() }
            }
            (Family::NearestCentroid, Targets::Classes { labels, idx }) => {
                let mut sums = vec![vec![0.0; width]; labels.len()];
                let mut counts = vec![0usize; labels.len()];
                for (row, &c) in x.iter().zip(idx) {
                    counts[c] += 1;
                    for (s, v) in sums[c].iter_mut().zip(row) {
                        *s += v;
                    }
                }
                for (sum, &count) in sums.iter_mut().zip(&counts) {
                    if count > 0 {
                        sum.iter_mut().for_each(|s| *s /= count as f64);
                    }
                }
                Self::NearestCentroid { centroids: sums }
            }
            (Family::KNearestNeighbors, _) => {
                let keep: Vec<usize> =
                    shuffled_indices(x.len(), seed).into_iter().take(KNN_MAX_ROWS).collect();
                let targets = match y {
                    Targets::Classes { idx, .. } => keep.iter().map(|&i| idx[i] as f64).collect(),
                    Targets::Values(v) => keep.iter().map(|&i| v[i]).collect(),
                };
                Self::KNearestNeighbors {
                    k: KNN_NEIGHBORS.min(keep.len()),
                    n_classes: y.n_classes(),
                    rows: keep.iter().map(|&i| x[i].clone()).collect(),
                    targets,
                }
            }
            (Family::LogisticRegression, Targets::Classes { labels, idx }) => {
                Self::LogisticRegression { weights: fit_softmax(x, idx, labels.len()) }
            }
            (Family::RidgeRegression, Targets::Values(v)) => {
                let (intercept, coefficients) = fit_ridge(x, v);
                Self::RidgeRegression { intercept, coefficients }
            }
            (Family::MeanBaseline, Targets::Values(v)) => {
                Self::MeanBaseline { mean: v.iter().sum::<f64>() / v.len() as f64 }
            }
            (family, _) => {
                return Err(TrainingError::Trainer(format!(
                    "{} does not apply to this target",
                    family.name()
                )));
            }
        };
        Ok(estimator)
    }

    fn predict(&self, x: &[Vec<f64>]) -> Output {
        match self {
            Self::MajorityClass { probabilities } => {
                Output::Proba(vec![probabilities.clone(); x.len()])
            }
            Self::NearestCentroid { centroids } => Output::Proba(
                x.iter()
                    .map(|row| {
                        let neg: Vec<f64> = centroids.iter().map(|c| -squared_distance(row, c)).collect();
                        softmax(&neg)
                    })
                    .collect(),
            ),
            Self::KNearestNeighbors { k, n_classes, rows, targets } => {
                let neighbours: Vec<Vec<usize>> = x.iter().map(|q| nearest(rows, q, *k)).collect();
                if *n_classes > 0 {
                    Output::Proba(
                        neighbours
                            .iter()
                            .map(|nn| {
                                let mut p = vec![0.0; *n_classes];
                                for &i in nn {
                                    p[targets[i] as usize] += 1.0 / nn.len() as f64;
                                }
                                p
                            })
                            .collect(),
                    )
                } else {
                    Output::Values(
                        neighbours
                            .iter()
                            .map(|nn| nn.iter().map(|&i| targets[i]).sum::<f64>() / nn.len() as f64)
                            .collect(),
                    )
                }
            }
            Self::LogisticRegression { weights } => {
                Output::Proba(x.iter().map(|row| softmax(&linear_scores(weights, row))).collect())
            }
            Self::RidgeRegression { intercept, coefficients } => Output::Values(
                x.iter()
                    .map(|row| intercept + row.iter().zip(coefficients).map(|(a, b)| a * b).sum::<f64>())
                    .collect(),
            ),
            Self::MeanBaseline { mean } => Output::Values(vec![*mean; x.len()]),
        }
    }
}

fn linear_scores(weights: &[Vec<f64>], row: &[f64]) -> Vec<f64> {
    weights
        .iter()
        .map(|w| w[0] + w[1..].iter().zip(row).map(|(a, b)| a * b).sum::<f64>())
        .collect()
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exp.iter().sum();
    exp.iter().map(|e| e / total).collect()
}

fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map_or(0, |(i, _)| i)
}

fn nearest(rows: &[Vec<f64>], query: &[f64], k: usize) -> Vec<usize> {
    let mut dist: Vec<(f64, usize)> =
        rows.iter().enumerate().map(|(i, r)| (squared_distance(r, query), i)).collect();
    let k = k.min(dist.len());
    if k == 0 {
        return Vec::new();
    }
    dist.select_nth_unstable_by(k - 1, |a, b| a.0.total_cmp(&b.0));
    dist[..k].iter().map(|(_, i)| *i).collect()
}

/// Full-batch gradient descent on the multinomial log-loss.
fn fit_softmax(x: &[Vec<f64>], y: &[usize], n_classes: usize) -> Vec<Vec<f64>> {
    let width = x[0].len();
    let n = x.len() as f64;
    let mut weights = vec![vec![0.0; width + 1]; n_classes];
    for _ in 0..LOGISTIC_EPOCHS {
        let mut grad = vec![vec![0.0; width + 1]; n_classes];
        for (row, &class) in x.iter().zip(y) {
            let p = softmax(&linear_scores(&weights, row));
            for (c, g_row) in grad.iter_mut().enumerate() {
                let g = p[c] - if c == class { 1.0 } else { 0.0 };
                g_row[0] += g;
                for (gj, xj) in g_row[1..].iter_mut().zip(row) {
                    *gj += g * xj;
                }
            }
        }
        for (w_row, g_row) in weights.iter_mut().zip(&grad) {
            w_row[0] -= LOGISTIC_LEARNING_RATE * g_row[0] / n;
            for (wj, gj) in w_row[1..].iter_mut().zip(&g_row[1..]) {
                *wj -= LOGISTIC_LEARNING_RATE * (gj / n + LOGISTIC_L2 * *wj);
            }
        }
    }
    weights
}

/// Closed-form ridge regression on centered inputs. Returns `(intercept, coefficients)`.
fn fit_ridge(x: &[Vec<f64>], y: &[f64]) -> (f64, Vec<f64>) {
    let width = x[0].len();
    let n = x.len() as f64;
    let x_mean: Vec<f64> = (0..width).map(|j| x.iter().map(|r| r[j]).sum::<f64>() / n).collect();
    let y_mean = y.iter().sum::<f64>() / n;

    let mut a = vec![vec![0.0; width]; width];
    let mut b = vec![0.0; width];
    for (row, &target) in x.iter().zip(y) {
        let centered: Vec<f64> = row.iter().zip(&x_mean).map(|(v, m)| v - m).collect();
        for i in 0..width {
            b[i] += centered[i] * (target - y_mean);
            for j in 0..width {
                a[i][j] += centered[i] * centered[j];
            }
        }
    }
    for (i, a_row) in a.iter_mut().enumerate() {
        a_row[i] += RIDGE_LAMBDA;
    }

    let coefficients = solve_linear(a, b);
    let intercept = y_mean - coefficients.iter().zip(&x_mean).map(|(w, m)| w * m).sum::<f64>();
    (intercept, coefficients)
}

/// Gaussian elimination with partial pivoting. Singular directions get a zero coefficient.
fn solve_linear(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Vec<f64> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs())).unwrap_or(col);
        if a[pivot][col].abs() < 1e-12 {
            continue;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        if a[row][row].abs() < 1e-12 {
            continue;
        }
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    x
}

fn score_output(metric: Metric, output: &Output, y: &Targets) -> f64 {
    match (output, y) {
        (Output::Proba(proba), Targets::Classes { labels, idx }) => {
            let predicted: Vec<usize> = proba.iter().map(|p| argmax(p)).collect();
            classification_score(metric, idx, &predicted, proba, labels.len())
        }
        (Output::Values(values), Targets::Values(actual)) => regression_score(metric, actual, values),
        _ => f64::NAN,
    }
}

/// Best-first ordering; non-finite scores sink to the bottom.
fn compare_scores(metric: Metric, a: f64, b: f64) -> Ordering {
    match (a.is_finite(), b.is_finite()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => Ordering::Equal,
        (true, true) if metric.greater_is_better() => b.total_cmp(&a),
        (true, true) => a.total_cmp(&b),
    }
}

fn encode_targets(frame: &Frame, target: &str, problem: ProblemType) -> TrainingResult<(Vec<usize>, Targets)> {
    let column = frame.require_column(target)?;
    let rows: Vec<usize> = (0..frame.n_rows()).filter(|&i| !column.is_missing(i)).collect();
    if problem.is_classification() {
        let labels: Vec<String> =
            rows.iter().filter_map(|&i| column.value_key(i)).collect::<BTreeSet<_>>().into_iter().collect();
        if labels.len() < 2 {
            return Err(TrainingError::Trainer(format!(
                "target '{target}' needs at least two classes, found {}",
                labels.len()
            )));
        }
        let idx = rows
            .iter()
            .filter_map(|&i| column.value_key(i))
            .map(|key| labels.binary_search(&key).unwrap_or(0))
            .collect();
        Ok((rows, Targets::Classes { labels, idx }))
    } else {
        if column.kind() == ColumnKind::Text {
            return Err(TrainingError::Trainer(format!("regression target '{target}' must be numeric")));
        }
        let values = rows.iter().filter_map(|&i| column.as_f64(i)).collect();
        Ok((rows, Targets::Values(values)))
    }
}

/// Searches the candidate families, ranks them on a validation split and refits the winner.
pub(crate) fn search(
    request: SupervisedRequest,
    progress: &dyn ProgressSink,
    workdir: &Path,
) -> TrainingResult<SupervisedFit> {
    let started = Instant::now();
    let metric = Metric::from_canonical(&request.eval_metric).ok_or_else(|| {
        TrainingError::Trainer(format!("unsupported evaluation metric '{}'", request.eval_metric))
    })?;
    if !metric.supports(request.problem_type) {
        return Err(TrainingError::Trainer(format!(
            "metric '{}' is not valid for {} problems",
            request.eval_metric, request.problem_type
        )));
    }

    let (rows, targets) = encode_targets(&request.frame, &request.target, request.problem_type)?;
    let frame = request.frame.take_rows(&rows);
    let feature_columns: Vec<String> = frame
        .column_names()
        .into_iter()
        .filter(|c| *c != request.target && !request.excluded_columns.contains(c))
        .collect();
    let encoder = FeatureEncoder::fit(&frame, &feature_columns)?;
    let x = encoder.transform(&frame)?;

    let (train_idx, valid_idx) = holdout_split(x.len(), VALIDATION_FRACTION, request.seed);
    let x_train: Vec<Vec<f64>> = train_idx.iter().map(|&i| x[i].clone()).collect();
    let x_valid: Vec<Vec<f64>> = valid_idx.iter().map(|&i| x[i].clone()).collect();
    let y_train = targets.take(&train_idx);
    let y_valid = targets.take(&valid_idx);

    let mut candidates = Family::candidates(request.problem_type).to_vec();
    if let Some(max) = request.budget.max_models {
        candidates.truncate(max.max(1));
    }
    let planned = candidates.len();

    let mut leaderboard = Vec::with_capacity(planned);
    let mut fitted: Vec<(Family, Estimator, f64)> = Vec::with_capacity(planned);
    let mut best: Option<(String, f64)> = None;

    for family in candidates {
        if !fitted.is_empty() && started.elapsed() >= request.budget.time_limit {
            progress.on_event(ProgressEvent::Message {
                message: format!("time limit reached after {} of {planned} models", fitted.len()),
            });
            break;
        }

        let fit_start = Instant::now();
        let estimator = Estimator::fit(family, &x_train, &y_train, request.seed)?;
        let fit_seconds = fit_start.elapsed().as_secs_f64();

        let predict_start = Instant::now();
        let output = estimator.predict(&x_valid);
        let predict_seconds = predict_start.elapsed().as_secs_f64();
        let score = score_output(metric, &output, &y_valid);
        debug!(model = family.name(), score, fit_seconds, "Candidate fitted");

        let improves = best.as_ref().is_none_or(|(_, b)| compare_scores(metric, score, *b) == Ordering::Less);
        if improves {
            best = Some((family.name().to_string(), score));
        }
        leaderboard.push(LeaderboardEntry { model: family.name().to_string(), score, fit_seconds, predict_seconds });
        fitted.push((family, estimator, score));

        if let Some((best_model, best_score)) = &best {
            progress.on_event(ProgressEvent::ModelTrained {
                model: family.name().to_string(),
                score,
                completed: fitted.len(),
                planned,
                best_model: best_model.clone(),
                best_score: *best_score,
            });
        }
    }

    leaderboard.sort_by(|a, b| compare_scores(metric, a.score, b.score));
    fitted.sort_by(|a, b| compare_scores(metric, a.2, b.2));
    let (best_family, best_estimator, best_score) = fitted
        .into_iter()
        .next()
        .ok_or_else(|| TrainingError::Trainer("no candidate model could be fitted".to_string()))?;

    let importance = permutation_importance(&encoder, &best_estimator, metric, &x_valid, &y_valid, request.seed);

    let estimator = Estimator::fit(best_family, &x, &targets, request.seed)?;
    let labels = match &targets {
        Targets::Classes { labels, .. } => labels.clone(),
        Targets::Values(_) => Vec::new(),
    };
    let predictor = NativePredictor {
        model_name: best_family.name().to_string(),
        problem_type: request.problem_type,
        labels,
        encoder: encoder.clone(),
        estimator,
    };

    let model_path = ArtifactLayout::model_path(workdir);
    write_json(&model_path, &SavedModel::Supervised(predictor.clone()))?;

    Ok(SupervisedFit {
        leaderboard,
        best_model: best_family.name().to_string(),
        best_score,
        feature_importance: importance,
        features: encoder.columns(),
        predictor: Box::new(predictor),
        model_path,
    })
}

/// Score drop when one source column is shuffled across the validation rows.
fn permutation_importance(
    encoder: &FeatureEncoder,
    estimator: &Estimator,
    metric: Metric,
    x: &[Vec<f64>],
    y: &Targets,
    seed: u64,
) -> BTreeMap<String, f64> {
    let baseline = score_output(metric, &estimator.predict(x), y);
    let order = shuffled_indices(x.len(), seed.wrapping_add(1));
    encoder
        .groups()
        .into_iter()
        .map(|(column, range)| {
            let permuted: Vec<Vec<f64>> = x
                .iter()
                .zip(&order)
                .map(|(row, &src)| {
                    let mut row = row.clone();
                    row[range.clone()].copy_from_slice(&x[src][range.clone()]);
                    row
                })
                .collect();
            let score = score_output(metric, &estimator.predict(&permuted), y);
            let drop = if metric.greater_is_better() { baseline - score } else { score - baseline };
            (column, if drop.is_finite() { drop } else { 0.0 })
        })
        .collect()
}

/// A fitted supervised model as persisted in `model.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativePredictor {
    model_name: String,
    problem_type: ProblemType,
    /// Class labels in probability order; empty for regression.
    labels: Vec<String>,
    encoder: FeatureEncoder,
    estimator: Estimator,
}

impl Predictor for NativePredictor {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn problem_type(&self) -> ProblemType {
        self.problem_type
    }

    fn class_labels(&self) -> Option<&[String]> {
        self.problem_type.is_classification().then_some(self.labels.as_slice())
    }

    fn predict(&self, frame: &Frame) -> TrainingResult<Vec<TargetValue>> {
        let x = self.encoder.transform(frame)?;
        Ok(match self.estimator.predict(&x) {
            Output::Proba(proba) => proba
                .iter()
                .map(|p| TargetValue::Label(self.labels.get(argmax(p)).cloned().unwrap_or_default()))
                .collect(),
            Output::Values(values) => values.into_iter().map(TargetValue::Value).collect(),
        })
    }

    fn predict_proba(&self, frame: &Frame) -> TrainingResult<Option<Vec<Vec<f64>>>> {
        let x = self.encoder.transform(frame)?;
        Ok(match self.estimator.predict(&x) {
            Output::Proba(proba) => Some(proba),
            Output::Values(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Column;
    use crate::job::SearchBudget;
    use crate::progress::NullProgressSink;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<ProgressEvent>>);

    impl ProgressSink for RecordingSink {
        fn on_event(&self, event: ProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn separable_frame(n: usize) -> Frame {
        let x: Vec<Option<f64>> = (0..n).map(|i| Some(i as f64)).collect();
        let noise: Vec<Option<f64>> = (0..n).map(|i| Some(((i * 7) % 5) as f64)).collect();
        let label: Vec<Option<String>> =
            (0..n).map(|i| Some(if i < n / 2 { "no" } else { "yes" }.to_string())).collect();
        Frame::new(vec![Column::numeric("x", x), Column::numeric("noise", noise), Column::text("label", label)])
            .unwrap()
    }

    fn budget(max_models: Option<usize>) -> SearchBudget {
        SearchBudget { time_limit: Duration::from_secs(60), max_models }
    }

    #[test]
    fn test_classification_search_ranks_best_first() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::default();
        let fit = search(
            SupervisedRequest {
                frame: separable_frame(60),
                target: "label".to_string(),
                problem_type: ProblemType::Binary,
                eval_metric: "accuracy".to_string(),
                budget: budget(None),
                excluded_columns: vec![],
                seed: 42,
            },
            &sink,
            dir.path(),
        )
        .unwrap();

        assert_eq!(fit.leaderboard.len(), 4);
        assert_eq!(fit.best_model, fit.leaderboard[0].model);
        assert!(fit.leaderboard.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(fit.best_score > 0.9);
        assert!(fit.feature_importance["x"] > fit.feature_importance["noise"]);
        assert!(fit.model_path.exists());
        assert_eq!(sink.0.lock().unwrap().len(), 4);
    }

    #[test]
    fn test_max_models_limits_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let fit = search(
            SupervisedRequest {
                frame: separable_frame(40),
                target: "label".to_string(),
                problem_type: ProblemType::Binary,
                eval_metric: "accuracy".to_string(),
                budget: budget(Some(2)),
                excluded_columns: vec!["noise".to_string()],
                seed: 1,
            },
            &NullProgressSink,
            dir.path(),
        )
        .unwrap();
        assert_eq!(fit.leaderboard.len(), 2);
        assert_eq!(fit.features, vec!["x".to_string()]);
    }

    #[test]
    fn test_regression_recovers_linear_relation() {
        let dir = tempfile::tempdir().unwrap();
        let x: Vec<Option<f64>> = (0..50).map(|i| Some(f64::from(i))).collect();
        let y: Vec<Option<f64>> = (0..50).map(|i| Some(3.0 * f64::from(i) + 2.0)).collect();
        let frame = Frame::new(vec![Column::numeric("x", x), Column::numeric("y", y)]).unwrap();

        let fit = search(
            SupervisedRequest {
                frame: frame.clone(),
                target: "y".to_string(),
                problem_type: ProblemType::Regression,
                eval_metric: "root_mean_squared_error".to_string(),
                budget: budget(None),
                excluded_columns: vec![],
                seed: 3,
            },
            &NullProgressSink,
            dir.path(),
        )
        .unwrap();

        assert_eq!(fit.best_model, "RidgeRegression");
        assert!(fit.leaderboard.windows(2).all(|w| w[0].score <= w[1].score));
        let predicted = fit.predictor.predict(&frame).unwrap();
        let TargetValue::Value(v) = predicted[10] else { panic!("expected numeric prediction") };
        assert!((v - 32.0).abs() < 2.0);
        assert!(fit.predictor.predict_proba(&frame).unwrap().is_none());
    }

    #[test]
    fn test_metric_must_match_problem() {
        let dir = tempfile::tempdir().unwrap();
        let err = search(
            SupervisedRequest {
                frame: separable_frame(20),
                target: "label".to_string(),
                problem_type: ProblemType::Binary,
                eval_metric: "r2".to_string(),
                budget: budget(None),
                excluded_columns: vec![],
                seed: 1,
            },
            &NullProgressSink,
            dir.path(),
        );
        assert!(matches!(err, Err(TrainingError::Trainer(_))));
    }

    #[test]
    fn test_solve_linear() {
        let a = vec![vec![2.0, 1.0], vec![1.0, 3.0]];
        let x = solve_linear(a, vec![3.0, 5.0]);
        assert!((x[0] - 0.8).abs() < 1e-9);
        assert!((x[1] - 1.4).abs() < 1e-9);
    }
}
