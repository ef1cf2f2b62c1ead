//! Anomaly detection strategy.

use super::{normalize_importance, numeric_features, standardize};
use crate::error::{OrchestratorError, Result};
use crate::lifecycle::JobStatus;
use crate::result::{PredictionRecord, TaskExtras};
use crate::router::{PipelineStrategy, StrategyContext, StrategyOutcome};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use strata_training::metrics::roc_auc;
use strata_training::{Column, LeaderboardEntry, OutlierRequest, PredictionTable, TaskSpec, format_number};

const SEPARATION_METRIC: &str = "score_separation";

#[derive(Debug, Default, Clone, Copy)]
pub struct AnomalyStrategy;

/// Min-max scales raw scores into [0, 1]. A constant score vector maps to zeros.
fn normalize_scores(raw: &[f64]) -> Vec<f64> {
    let min = raw.iter().copied().fold(f64::INFINITY, f64::min);
    let max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    if !span.is_finite() || span < 1e-12 {
        return vec![0.0; raw.len()];
    }
    raw.iter().map(|s| ((s - min) / span).clamp(0.0, 1.0)).collect()
}

/// Score of the `round(contamination * n)`-th most anomalous row, at least the top one.
fn threshold_for(scores: &[f64], contamination: f64) -> f64 {
    if scores.is_empty() {
        return 1.0;
    }
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    let k = ((contamination * scores.len() as f64).round() as usize).clamp(1, scores.len());
    sorted[k - 1]
}

/// Ranking quality against a two-valued label column; the later label in sort order
/// counts as the anomalous class.
fn label_auc(labels: &Column, scores: &[f64]) -> Option<f64> {
    let keys: Vec<Option<String>> = (0..scores.len()).map(|i| labels.value_key(i)).collect();
    let distinct: BTreeSet<&String> = keys.iter().flatten().collect();
    if distinct.len() != 2 {
        return None;
    }
    let positive = distinct.iter().next_back()?.to_string();
    let (flags, ranked): (Vec<bool>, Vec<f64>) = keys
        .iter()
        .zip(scores)
        .filter_map(|(k, &s)| k.as_ref().map(|k| (*k == positive, s)))
        .unzip();
    roc_auc(&flags, &ranked)
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

#[async_trait]
impl PipelineStrategy for AnomalyStrategy {
    fn name(&self) -> &'static str {
        "anomaly"
    }

    async fn run(&self, ctx: &StrategyContext<'_>) -> Result<StrategyOutcome> {
        let TaskSpec::Anomaly(params) = &ctx.config.task else {
            return Err(OrchestratorError::Configuration(format!(
                "anomaly pipeline cannot run a {} job",
                ctx.config.task_type()
            )));
        };
        let target = ctx.config.target();
        let data = standardize(ctx.frame, numeric_features(ctx.frame, target))?;
        let n = data.rows.len();
        ctx.tracker
            .checkpoint(15.0, &format!("Standardized {} numeric columns", data.columns.len()))
            .await?;

        ctx.tracker
            .advance(JobStatus::Training, 20.0, &format!("Fitting outlier detector on {n} rows"))
            .await?;
        let started = Instant::now();
        let fit = ctx
            .session
            .fit_outliers(OutlierRequest {
                rows: data.rows.clone(),
                contamination: params.contamination,
                seed: ctx.engine.seed,
            })
            .await?;
        let fit_seconds = started.elapsed().as_secs_f64();

        ctx.tracker
            .advance(JobStatus::Evaluating, 75.0, &format!("Scoring rows with {}", fit.model))
            .await?;

        let scores = normalize_scores(&fit.scores);
        let threshold = threshold_for(&scores, params.contamination);
        let flags: Vec<bool> = scores.iter().map(|&s| s >= threshold).collect();
        let n_anomalies = flags.iter().filter(|&&f| f).count();

        let roc_auc = target.and_then(|t| ctx.frame.column(t)).and_then(|labels| label_auc(labels, &scores));
        let separation = mean(scores.iter().zip(&flags).filter(|(_, f)| **f).map(|(s, _)| *s)).unwrap_or(0.0)
            - mean(scores.iter().zip(&flags).filter(|(_, f)| !**f).map(|(s, _)| *s)).unwrap_or(0.0);

        // Columns where flagged rows sit furthest from the center matter most.
        let raw_importance: BTreeMap<String, f64> = data
            .columns
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let flagged = mean(data.rows.iter().zip(&flags).filter(|(_, f)| **f).map(|(r, _)| r[j].abs()));
                let normal = mean(data.rows.iter().zip(&flags).filter(|(_, f)| !**f).map(|(r, _)| r[j].abs()));
                (name.clone(), (flagged.unwrap_or(0.0) - normal.unwrap_or(0.0)).max(0.0))
            })
            .collect();

        let mut table =
            PredictionTable::new(["row", "score", "is_anomaly"].iter().map(ToString::to_string).collect());
        for (row, (score, flag)) in scores.iter().zip(&flags).enumerate() {
            table.push(vec![row.to_string(), format_number(*score), flag.to_string()]);
        }
        let sample = scores
            .iter()
            .zip(&flags)
            .enumerate()
            .take(ctx.engine.prediction_sample_size)
            .map(|(row, (&score, &is_anomaly))| PredictionRecord::Anomaly { row, score, is_anomaly })
            .collect();
        ctx.tracker
            .checkpoint(85.0, &format!("Flagged {n_anomalies} of {n} rows at threshold {threshold:.4}"))
            .await?;

        Ok(StrategyOutcome {
            problem_type: None,
            leaderboard: vec![LeaderboardEntry {
                model: fit.model.clone(),
                score: separation,
                fit_seconds,
                predict_seconds: 0.0,
            }],
            best_model: fit.model,
            best_score: Some(separation),
            eval_metric: SEPARATION_METRIC.to_string(),
            feature_importance: normalize_importance(raw_importance),
            features: data.columns,
            n_rows: n,
            model_path: fit.model_path,
            predictions: table,
            sample,
            extras: TaskExtras::Anomaly { contamination: params.contamination, threshold, n_anomalies, roc_auc },
        })
    }
}
