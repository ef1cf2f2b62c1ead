//! Clustering strategy.

use super::{Standardized, normalize_importance, numeric_features, standardize};
use crate::error::{OrchestratorError, Result};
use crate::lifecycle::JobStatus;
use crate::result::{PredictionRecord, TaskExtras};
use crate::router::{PipelineStrategy, StrategyContext, StrategyOutcome};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Instant;
use strata_training::{
    ClusterAlgorithm, ClusterFit, ClusterRequest, LeaderboardEntry, PredictionTable, TaskSpec, adjusted_rand_index,
    silhouette_score,
};
use tracing::debug;

/// Largest k tried when the job does not fix one.
const MAX_AUTO_CLUSTERS: usize = 8;
const SEPARATION_METRIC: &str = "silhouette";
const NOISE: i64 = -1;

#[derive(Debug, Default, Clone, Copy)]
pub struct ClusteringStrategy;

fn model_label(fit: &ClusterFit, k: usize) -> String {
    if fit.model == "KMeans" { format!("KMeans(k={k})") } else { fit.model.clone() }
}

/// Members per cluster id and the number of noise rows.
fn cluster_sizes(labels: &[i64], n_clusters: usize) -> (Vec<usize>, usize) {
    let mut sizes = vec![0; n_clusters];
    let mut noise = 0;
    for &label in labels {
        if label == NOISE {
            noise += 1;
        } else if let Some(size) = usize::try_from(label).ok().and_then(|c| sizes.get_mut(c)) {
            *size += 1;
        }
    }
    (sizes, noise)
}

/// Between-cluster over within-cluster variance per column, noise rows excluded.
fn variance_ratio(data: &Standardized, labels: &[i64], n_clusters: usize) -> BTreeMap<String, f64> {
    let members: Vec<(usize, &Vec<f64>)> = labels
        .iter()
        .zip(&data.rows)
        .filter_map(|(&l, row)| usize::try_from(l).ok().filter(|&c| c < n_clusters).map(|c| (c, row)))
        .collect();
    let mut out = BTreeMap::new();
    if members.is_empty() {
        return out;
    }
    for (j, name) in data.columns.iter().enumerate() {
        let overall = members.iter().map(|(_, r)| r[j]).sum::<f64>() / members.len() as f64;
        let mut sums = vec![0.0; n_clusters];
        let mut counts = vec![0usize; n_clusters];
        for (c, row) in &members {
            sums[*c] += row[j];
            counts[*c] += 1;
        }
        let means: Vec<f64> =
            sums.iter().zip(&counts).map(|(s, &n)| if n == 0 { 0.0 } else { s / n as f64 }).collect();
        let between: f64 = means.iter().zip(&counts).map(|(m, &n)| n as f64 * (m - overall).powi(2)).sum();
        let within: f64 = members.iter().map(|(c, row)| (row[j] - means[*c]).powi(2)).sum();
        out.insert(name.clone(), between / within.max(1e-12));
    }
    normalize_importance(out)
}

#[async_trait]
impl PipelineStrategy for ClusteringStrategy {
    fn name(&self) -> &'static str {
        "clustering"
    }

    async fn run(&self, ctx: &StrategyContext<'_>) -> Result<StrategyOutcome> {
        let TaskSpec::Clustering(params) = &ctx.config.task else {
            return Err(OrchestratorError::Configuration(format!(
                "clustering pipeline cannot run a {} job",
                ctx.config.task_type()
            )));
        };
        let target = ctx.config.target();
        let data = standardize(ctx.frame, numeric_features(ctx.frame, target))?;
        let n = data.rows.len();
        ctx.tracker
            .checkpoint(15.0, &format!("Standardized {} numeric columns", data.columns.len()))
            .await?;

        let candidates: Vec<usize> = match (&params.algorithm, params.n_clusters) {
            (ClusterAlgorithm::Dbscan { .. }, _) => vec![0],
            (ClusterAlgorithm::KMeans, Some(k)) => vec![k],
            (ClusterAlgorithm::KMeans, None) => (2..=MAX_AUTO_CLUSTERS.min(n.saturating_sub(1)).max(2)).collect(),
        };
        ctx.tracker
            .advance(JobStatus::Training, 20.0, &format!("Fitting {} clustering candidate(s)", candidates.len()))
            .await?;

        let mut leaderboard = Vec::with_capacity(candidates.len());
        let mut best: Option<(usize, f64)> = None;
        let mut last: Option<(usize, ClusterFit, Option<f64>)> = None;
        for (i, &k) in candidates.iter().enumerate() {
            let started = Instant::now();
            let fit = ctx
                .session
                .fit_clusters(ClusterRequest {
                    rows: data.rows.clone(),
                    n_clusters: k,
                    algorithm: params.algorithm.clone(),
                    seed: ctx.engine.seed,
                })
                .await?;
            let fit_seconds = started.elapsed().as_secs_f64();
            let silhouette = silhouette_score(&data.rows, &fit.labels, ctx.engine.seed);
            let score = silhouette.unwrap_or(0.0);
            debug!(job_id = %ctx.job_id, k, score, "Clustering candidate fitted");

            leaderboard.push(LeaderboardEntry { model: model_label(&fit, k), score, fit_seconds, predict_seconds: 0.0 });
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((k, score));
            }
            last = Some((k, fit, silhouette));

            let pct = 20.0 + 50.0 * (i + 1) as f64 / candidates.len() as f64;
            ctx.tracker.checkpoint(pct, &format!("Fitted {}", leaderboard[i].model)).await?;
        }
        let (best_k, _) = best.ok_or_else(|| OrchestratorError::Configuration("no clustering candidates".to_string()))?;
        let (last_k, mut fit, mut silhouette) =
            last.ok_or_else(|| OrchestratorError::Configuration("no clustering candidates".to_string()))?;

        // The session keeps only the most recent model on disk.
        if last_k != best_k {
            fit = ctx
                .session
                .fit_clusters(ClusterRequest {
                    rows: data.rows.clone(),
                    n_clusters: best_k,
                    algorithm: params.algorithm.clone(),
                    seed: ctx.engine.seed,
                })
                .await?;
            silhouette = silhouette_score(&data.rows, &fit.labels, ctx.engine.seed);
        }
        leaderboard.sort_by(|a, b| b.score.total_cmp(&a.score));

        ctx.tracker
            .advance(JobStatus::Evaluating, 75.0, &format!("Summarizing {}", model_label(&fit, best_k)))
            .await?;

        let n_clusters = fit.centers.len();
        let (cluster_sizes, noise_points) = cluster_sizes(&fit.labels, n_clusters);
        let centers: Vec<Vec<f64>> = fit.centers.iter().map(|c| data.unscale(c)).collect();
        let adjusted_rand_index = target.and_then(|t| ctx.frame.column(t)).map(|truth| {
            let (keys, labels): (Vec<String>, Vec<i64>) = fit
                .labels
                .iter()
                .enumerate()
                .filter_map(|(i, &l)| truth.value_key(i).map(|k| (k, l)))
                .unzip();
            adjusted_rand_index(&keys, &labels)
        });
        let feature_importance = variance_ratio(&data, &fit.labels, n_clusters);

        let mut table = PredictionTable::new(vec!["row".to_string(), "cluster".to_string()]);
        for (row, label) in fit.labels.iter().enumerate() {
            table.push(vec![row.to_string(), label.to_string()]);
        }
        let sample = fit
            .labels
            .iter()
            .enumerate()
            .take(ctx.engine.prediction_sample_size)
            .map(|(row, &cluster)| PredictionRecord::Cluster { row, cluster })
            .collect();
        ctx.tracker.checkpoint(85.0, &format!("{n_clusters} clusters, {noise_points} noise rows")).await?;

        let algorithm = fit.model.clone();
        Ok(StrategyOutcome {
            problem_type: None,
            leaderboard,
            best_model: model_label(&fit, best_k),
            best_score: silhouette,
            eval_metric: SEPARATION_METRIC.to_string(),
            feature_importance,
            features: data.columns.clone(),
            n_rows: n,
            model_path: fit.model_path,
            predictions: table,
            sample,
            extras: TaskExtras::Clustering {
                algorithm,
                n_clusters,
                cluster_sizes,
                noise_points,
                centers,
                center_columns: data.columns,
                silhouette,
                adjusted_rand_index,
            },
        })
    }
}
