//! Classification and regression share one strategy.

use super::finite;
use crate::error::{OrchestratorError, Result};
use crate::lifecycle::JobStatus;
use crate::result::{PredictionRecord, TaskExtras};
use crate::router::{PipelineStrategy, StrategyContext, StrategyOutcome};
use async_trait::async_trait;
use std::collections::BTreeMap;
use strata_training::metrics::{classification_score, confusion_matrix, regression_score};
use strata_training::{
    Column, ColumnKind, Metric, PredictionTable, Predictor, ProblemType, SupervisedRequest, TargetValue, TaskSpec,
    TrainingError, default_metric, format_number, holdout_split, resolve_metric,
};
use tracing::info;

/// Upper bound on distinct values for a numeric target to count as multiclass.
pub const MAX_CLASSES: usize = 100;

/// Upper bound on distinct/non-missing values for a numeric target to count as multiclass.
pub const MAX_UNIQUENESS_RATIO: f64 = 0.1;

/// Infers the problem type from the target column's cardinality.
///
/// Text targets are always classification. Numeric targets with exactly two values are
/// binary, with 3 to [`MAX_CLASSES`] values and a uniqueness ratio of at most
/// [`MAX_UNIQUENESS_RATIO`] multiclass, and regression otherwise.
///
/// # Errors
/// Returns a configuration error if the column has fewer than two distinct values.
pub fn detect_problem_type(target: &Column) -> Result<ProblemType> {
    let distinct = target.distinct_count();
    if distinct < 2 {
        return Err(OrchestratorError::Configuration(format!(
            "target column '{}' needs at least two distinct values, found {distinct}",
            target.name
        )));
    }
    if target.kind() != ColumnKind::Numeric {
        return Ok(if distinct == 2 { ProblemType::Binary } else { ProblemType::Multiclass });
    }
    if distinct == 2 {
        return Ok(ProblemType::Binary);
    }
    let ratio = distinct as f64 / target.non_missing_count().max(1) as f64;
    if distinct <= MAX_CLASSES && ratio <= MAX_UNIQUENESS_RATIO {
        Ok(ProblemType::Multiclass)
    } else {
        Ok(ProblemType::Regression)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SupervisedStrategy;

#[async_trait]
impl PipelineStrategy for SupervisedStrategy {
    fn name(&self) -> &'static str {
        "supervised"
    }

    async fn run(&self, ctx: &StrategyContext<'_>) -> Result<StrategyOutcome> {
        let config = ctx.config;
        let pinned = match &config.task {
            TaskSpec::Classification(p) | TaskSpec::Regression(p) => p.problem_type,
            other => {
                return Err(OrchestratorError::Configuration(format!(
                    "supervised pipeline cannot run a {} job",
                    other.task_type()
                )));
            }
        };
        let target = config
            .target()
            .ok_or_else(|| OrchestratorError::Configuration("target_column is required".to_string()))?;

        // Rows without a label can be neither trained on nor scored.
        let target_column = ctx.frame.require_column(target)?;
        let labelled: Vec<usize> = (0..ctx.frame.n_rows()).filter(|&i| !target_column.is_missing(i)).collect();
        if labelled.is_empty() {
            return Err(TrainingError::Trainer(format!("target column '{target}' has no values")).into());
        }
        let frame = ctx.frame.take_rows(&labelled);
        let target_column = frame.require_column(target)?;

        let problem_type = match pinned {
            Some(p) => p,
            None => detect_problem_type(target_column)?,
        };
        let eval_metric = resolve_metric(config.eval_metric.as_deref().unwrap_or(default_metric(problem_type)));
        ctx.tracker
            .checkpoint(15.0, &format!("Problem type {problem_type}, metric {eval_metric}"))
            .await?;

        let (train_idx, holdout_idx) = holdout_split(frame.n_rows(), ctx.engine.holdout_fraction, ctx.engine.seed);
        let train = frame.take_rows(&train_idx);
        let holdout = frame.take_rows(&holdout_idx);

        ctx.tracker
            .advance(
                JobStatus::Training,
                20.0,
                &format!("Training on {} rows, evaluating on {}", train.n_rows(), holdout.n_rows()),
            )
            .await?;

        let request = SupervisedRequest {
            frame: train,
            target: target.to_string(),
            problem_type,
            eval_metric: eval_metric.clone(),
            budget: config.budget(),
            excluded_columns: config.excluded_columns.clone(),
            seed: ctx.engine.seed,
        };
        let forwarder = ctx.tracker.progress_forwarder(20.0, 70.0);
        let fit = ctx.session.fit_supervised(request, forwarder.sink()).await;
        forwarder.finish().await;
        let fit = fit?;

        ctx.tracker
            .advance(JobStatus::Evaluating, 75.0, &format!("Evaluating {} on holdout", fit.best_model))
            .await?;
        info!(job_id = %ctx.job_id, best_model = %fit.best_model, score = fit.best_score, "Model search finished");

        let metric = Metric::from_canonical(&eval_metric);
        let rows: Vec<usize> = holdout_idx.iter().map(|&i| labelled[i]).collect();
        let target_column = holdout.require_column(target)?;
        let evaluation = if problem_type.is_classification() {
            evaluate_classification(fit.predictor.as_ref(), &holdout, target_column, &rows, metric)?
        } else {
            evaluate_regression(fit.predictor.as_ref(), &holdout, target_column, &rows, metric)?
        };

        let sample = evaluation.records.into_iter().take(ctx.engine.prediction_sample_size).collect();
        ctx.tracker.checkpoint(85.0, "Predictions assembled").await?;

        Ok(StrategyOutcome {
            problem_type: Some(problem_type),
            leaderboard: fit.leaderboard,
            best_model: fit.best_model,
            best_score: finite(fit.best_score),
            eval_metric,
            feature_importance: fit.feature_importance,
            features: fit.features,
            n_rows: frame.n_rows(),
            model_path: fit.model_path,
            predictions: evaluation.table,
            sample,
            extras: evaluation.extras,
        })
    }
}

struct Evaluation {
    table: PredictionTable,
    records: Vec<PredictionRecord>,
    extras: TaskExtras,
}

fn label_of(value: &TargetValue) -> String {
    match value {
        TargetValue::Label(label) => label.clone(),
        TargetValue::Value(v) => format_number(*v),
    }
}

fn value_of(value: &TargetValue) -> f64 {
    match value {
        TargetValue::Value(v) => *v,
        TargetValue::Label(label) => label.parse().unwrap_or(f64::NAN),
    }
}

fn evaluate_classification(
    predictor: &dyn Predictor,
    holdout: &strata_training::Frame,
    target: &Column,
    rows: &[usize],
    metric: Option<Metric>,
) -> Result<Evaluation> {
    let predicted: Vec<String> = predictor.predict(holdout)?.iter().map(label_of).collect();
    let proba = predictor.predict_proba(holdout)?.unwrap_or_default();
    let actual: Vec<String> = (0..holdout.n_rows()).map(|i| target.value_key(i).unwrap_or_default()).collect();

    // Labels the model knows, then any holdout label it never saw.
    let mut labels: Vec<String> = predictor.class_labels().map(<[String]>::to_vec).unwrap_or_default();
    for label in actual.iter().chain(&predicted) {
        if !labels.contains(label) {
            labels.push(label.clone());
        }
    }
    let index_of = |label: &str| labels.iter().position(|l| l == label).unwrap_or(0);
    let actual_idx: Vec<usize> = actual.iter().map(|l| index_of(l)).collect();
    let predicted_idx: Vec<usize> = predicted.iter().map(|l| index_of(l)).collect();
    let matrix = confusion_matrix(&actual_idx, &predicted_idx, labels.len());
    let holdout_score = metric
        .map(|m| classification_score(m, &actual_idx, &predicted_idx, &proba, labels.len()))
        .and_then(finite);

    let proba_labels: Vec<String> = predictor.class_labels().map(<[String]>::to_vec).unwrap_or_default();
    let mut columns = vec!["row".to_string(), "actual".to_string(), "predicted".to_string()];
    columns.extend(proba_labels.iter().map(|l| format!("proba_{l}")));
    let mut table = PredictionTable::new(columns);
    let mut records = Vec::with_capacity(rows.len());

    for (i, &row) in rows.iter().enumerate() {
        let probs = proba.get(i).cloned().unwrap_or_default();
        let mut line = vec![row.to_string(), actual[i].clone(), predicted[i].clone()];
        line.extend(probs.iter().map(|p| format!("{p:.6}")));
        table.push(line);
        records.push(PredictionRecord::Classification {
            row,
            actual: Some(actual[i].clone()),
            predicted: predicted[i].clone(),
            probabilities: proba_labels.iter().cloned().zip(probs).collect::<BTreeMap<_, _>>(),
        });
    }

    Ok(Evaluation {
        table,
        records,
        extras: TaskExtras::Classification { class_labels: labels, confusion_matrix: matrix, holdout_score },
    })
}

/// z-value of a two-sided 95% interval.
const INTERVAL_Z: f64 = 1.96;

fn evaluate_regression(
    predictor: &dyn Predictor,
    holdout: &strata_training::Frame,
    target: &Column,
    rows: &[usize],
    metric: Option<Metric>,
) -> Result<Evaluation> {
    let predicted: Vec<f64> = predictor.predict(holdout)?.iter().map(value_of).collect();
    let actual: Vec<f64> = (0..holdout.n_rows()).map(|i| target.as_f64(i).unwrap_or(f64::NAN)).collect();

    let residual_sq: Vec<f64> = actual
        .iter()
        .zip(&predicted)
        .map(|(a, p)| (a - p).powi(2))
        .filter(|r| r.is_finite())
        .collect();
    let sigma = if residual_sq.is_empty() {
        0.0
    } else {
        (residual_sq.iter().sum::<f64>() / residual_sq.len() as f64).sqrt()
    };
    let half_width = INTERVAL_Z * sigma;
    let holdout_score = metric.map(|m| regression_score(m, &actual, &predicted)).and_then(finite);

    let mut table = PredictionTable::new(
        ["row", "actual", "predicted", "lower", "upper"].iter().map(ToString::to_string).collect(),
    );
    let mut records = Vec::with_capacity(rows.len());
    for (i, &row) in rows.iter().enumerate() {
        let (a, p) = (actual[i], predicted[i]);
        table.push(vec![
            row.to_string(),
            format_number(a),
            format_number(p),
            format_number(p - half_width),
            format_number(p + half_width),
        ]);
        records.push(PredictionRecord::Regression {
            row,
            actual: a.is_finite().then_some(a),
            predicted: p,
            lower: p - half_width,
            upper: p + half_width,
        });
    }

    Ok(Evaluation {
        table,
        records,
        extras: TaskExtras::Regression { interval_half_width: half_width, holdout_score },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(values: impl IntoIterator<Item = f64>) -> Column {
        Column::numeric("y", values.into_iter().map(Some).collect())
    }

    #[test]
    fn test_two_values_is_binary() {
        let col = numeric((0..50).map(|i| f64::from(i % 2)));
        assert_eq!(detect_problem_type(&col).unwrap(), ProblemType::Binary);

        let text = Column::text("y", vec![Some("yes".to_string()), Some("no".to_string())]);
        assert_eq!(detect_problem_type(&text).unwrap(), ProblemType::Binary);
    }

    #[test]
    fn test_low_uniqueness_is_multiclass() {
        // 5 classes over 100 rows: ratio 0.05
        let col = numeric((0..100).map(|i| f64::from(i % 5)));
        assert_eq!(detect_problem_type(&col).unwrap(), ProblemType::Multiclass);

        let text = Column::text("y", ["a", "b", "c"].iter().map(|s| Some((*s).to_string())).collect());
        assert_eq!(detect_problem_type(&text).unwrap(), ProblemType::Multiclass);
    }

    #[test]
    fn test_high_uniqueness_is_regression() {
        // 3 classes over 10 rows: ratio 0.3
        let col = numeric((0..10).map(|i| f64::from(i % 3)));
        assert_eq!(detect_problem_type(&col).unwrap(), ProblemType::Regression);

        // 101 classes with a low ratio still exceed the class cap
        let col = numeric((0..2020).map(|i| f64::from(i % 101)));
        assert_eq!(detect_problem_type(&col).unwrap(), ProblemType::Regression);

        let col = numeric((0..100).map(|i| f64::from(i) * 0.37));
        assert_eq!(detect_problem_type(&col).unwrap(), ProblemType::Regression);
    }

    #[test]
    fn test_boundary_at_class_cap() {
        // exactly 100 classes, ratio exactly 0.1
        let col = numeric((0..1000).map(|i| f64::from(i % 100)));
        assert_eq!(detect_problem_type(&col).unwrap(), ProblemType::Multiclass);
    }

    #[test]
    fn test_constant_target_rejected() {
        let col = numeric(std::iter::repeat_n(1.0, 10));
        assert!(matches!(detect_problem_type(&col), Err(OrchestratorError::Configuration(_))));
    }
}
