use crate::dataset::Frame;
use crate::error::TrainingResult;
use crate::job::{ClusterAlgorithm, ProblemType, SearchBudget};
use crate::progress::ProgressSink;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One fitted candidate in a model search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub model: String,
    /// Validation score in the job's evaluation metric.
    pub score: f64,
    pub fit_seconds: f64,
    pub predict_seconds: f64,
}

/// A predicted target value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetValue {
    Label(String),
    Value(f64),
}

/// A fitted supervised model that can score new rows.
pub trait Predictor: Send + Sync {
    fn model_name(&self) -> &str;

    fn problem_type(&self) -> ProblemType;

    /// Class labels in probability-column order; `None` for regression.
    fn class_labels(&self) -> Option<&[String]>;

    fn predict(&self, frame: &Frame) -> TrainingResult<Vec<TargetValue>>;

    /// Row-major class probabilities; `None` for regression.
    fn predict_proba(&self, frame: &Frame) -> TrainingResult<Option<Vec<Vec<f64>>>>;
}

pub struct SupervisedRequest {
    /// Training rows: feature columns plus the target.
    pub frame: Frame,
    pub target: String,
    pub problem_type: ProblemType,
    /// Canonical metric name; the backend rejects names it cannot compute.
    pub eval_metric: String,
    pub budget: SearchBudget,
    pub excluded_columns: Vec<String>,
    pub seed: u64,
}

pub struct SupervisedFit {
    /// Ordered best first.
    pub leaderboard: Vec<LeaderboardEntry>,
    pub best_model: String,
    pub best_score: f64,
    pub feature_importance: BTreeMap<String, f64>,
    pub features: Vec<String>,
    pub predictor: Box<dyn Predictor>,
    /// Where the session saved the fitted model.
    pub model_path: PathBuf,
}

/// A single time series, sorted by time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub id: String,
    pub timestamps: Vec<DateTime<Utc>>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub series_id: String,
    pub timestamp: DateTime<Utc>,
    pub mean: f64,
    pub lower: f64,
    pub upper: f64,
}

pub struct ForecastRequest {
    pub series: Vec<Series>,
    pub horizon: usize,
    pub eval_metric: String,
    pub budget: SearchBudget,
}

pub struct ForecastFit {
    pub leaderboard: Vec<LeaderboardEntry>,
    pub best_model: String,
    pub best_score: f64,
    pub forecast: Vec<ForecastPoint>,
    pub model_path: PathBuf,
}

pub struct ClusterRequest {
    /// Standardized row-major matrix.
    pub rows: Vec<Vec<f64>>,
    pub n_clusters: usize,
    pub algorithm: ClusterAlgorithm,
    pub seed: u64,
}

pub struct ClusterFit {
    pub model: String,
    /// Cluster id per row; `-1` marks noise.
    pub labels: Vec<i64>,
    /// Centers in the standardized space, indexed by cluster id.
    pub centers: Vec<Vec<f64>>,
    pub model_path: PathBuf,
}

pub struct OutlierRequest {
    /// Standardized row-major matrix.
    pub rows: Vec<Vec<f64>>,
    pub contamination: f64,
    pub seed: u64,
}

pub struct OutlierFit {
    pub model: String,
    /// Raw outlier score per row; higher means more anomalous.
    pub scores: Vec<f64>,
    pub model_path: PathBuf,
}

/// A training backend. Each job opens its own session.
pub trait TrainingBackend: Send + Sync {
    fn id(&self) -> &'static str;

    /// Fails when the backend cannot train at all (not installed, misconfigured).
    fn check_available(&self) -> TrainingResult<()>;

    /// Opens an isolated session whose artifacts land in `workdir`.
    fn open_session(&self, workdir: &Path) -> TrainingResult<Box<dyn BackendSession>>;

    /// Reloads a supervised model saved by a session.
    fn load_predictor(&self, model_path: &Path) -> TrainingResult<Box<dyn Predictor>>;
}

/// A per-job handle onto a backend. Calls are not preemptible.
#[async_trait]
pub trait BackendSession: Send + Sync {
    fn workdir(&self) -> &Path;

    async fn fit_supervised(
        &self,
        request: SupervisedRequest,
        progress: Arc<dyn ProgressSink>,
    ) -> TrainingResult<SupervisedFit>;

    async fn fit_forecast(
        &self,
        request: ForecastRequest,
        progress: Arc<dyn ProgressSink>,
    ) -> TrainingResult<ForecastFit>;

    async fn fit_clusters(&self, request: ClusterRequest) -> TrainingResult<ClusterFit>;

    async fn fit_outliers(&self, request: OutlierRequest) -> TrainingResult<OutlierFit>;
}
