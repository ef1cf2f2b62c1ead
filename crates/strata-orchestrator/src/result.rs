//! Job results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use strata_training::{ForecastPoint, JobArtifact, JobId, LeaderboardEntry, ProblemType, TaskType};

/// One evaluated row in a job's bounded prediction sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredictionRecord {
    Classification {
        row: usize,
        actual: Option<String>,
        predicted: String,
        /// Class label to probability.
        probabilities: BTreeMap<String, f64>,
    },
    Regression {
        row: usize,
        actual: Option<f64>,
        predicted: f64,
        lower: f64,
        upper: f64,
    },
    Cluster {
        row: usize,
        /// `-1` marks noise.
        cluster: i64,
    },
    Anomaly {
        row: usize,
        /// Normalized to [0, 1]; higher is more anomalous.
        score: f64,
        is_anomaly: bool,
    },
}

/// Task-specific result fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum TaskExtras {
    Classification {
        class_labels: Vec<String>,
        /// `confusion_matrix[actual][predicted]`, indexed like `class_labels`.
        confusion_matrix: Vec<Vec<u64>>,
        holdout_score: Option<f64>,
    },
    Regression {
        /// Half-width of the 95% prediction interval.
        interval_half_width: f64,
        holdout_score: Option<f64>,
    },
    Forecasting {
        horizon: usize,
        time_column: String,
        id_column: Option<String>,
        n_series: usize,
        /// Bounded list of forecast points.
        forecast: Vec<ForecastPoint>,
        /// Total points produced before truncation.
        total_points: usize,
    },
    Clustering {
        algorithm: String,
        n_clusters: usize,
        /// Members per cluster id.
        cluster_sizes: Vec<usize>,
        noise_points: usize,
        /// Centers in original feature units, indexed by cluster id.
        centers: Vec<Vec<f64>>,
        center_columns: Vec<String>,
        silhouette: Option<f64>,
        /// Agreement with the target column, when one is present.
        adjusted_rand_index: Option<f64>,
    },
    Anomaly {
        contamination: f64,
        /// Normalized score at or above which a row is flagged.
        threshold: f64,
        n_anomalies: usize,
        /// Ranking quality against a binary label column, informational only.
        roc_auc: Option<f64>,
    },
}

/// Outcome of a completed job. Created once, never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: JobId,
    pub task_type: TaskType,
    pub problem_type: Option<ProblemType>,
    pub target_column: Option<String>,
    /// Ordered best first.
    pub leaderboard: Vec<LeaderboardEntry>,
    pub best_model: String,
    pub best_score: Option<f64>,
    pub eval_metric: String,
    pub feature_importance: BTreeMap<String, f64>,
    pub features: Vec<String>,
    pub training_seconds: f64,
    pub n_rows: usize,
    pub n_features: usize,
    pub model_path: PathBuf,
    pub artifacts: Vec<JobArtifact>,
    pub predictions: Vec<PredictionRecord>,
    pub extras: TaskExtras,
    pub completed_at: DateTime<Utc>,
}

impl JobResult {
    /// Confusion matrix and labels for classification results.
    #[must_use]
    pub fn confusion_matrix(&self) -> Option<(&[String], &[Vec<u64>])> {
        match &self.extras {
            TaskExtras::Classification { class_labels, confusion_matrix, .. } => {
                Some((class_labels.as_slice(), confusion_matrix.as_slice()))
            }
            _ => None,
        }
    }

    /// Number of flagged rows for anomaly results.
    #[must_use]
    pub fn n_anomalies(&self) -> Option<usize> {
        match &self.extras {
            TaskExtras::Anomaly { n_anomalies, .. } => Some(*n_anomalies),
            _ => None,
        }
    }
}
