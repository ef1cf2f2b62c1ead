//! In-process training backend.
//!
//! Every fit runs on the blocking thread pool. A session writes its fitted model to
//! `model.json` inside the job's working directory; supervised models can be reloaded
//! with [`NativeBackend::load_predictor`].

mod cluster;
mod encode;
mod forecast;
mod isolation;
mod supervised;

pub use encode::{FeatureEncoder, mean_std};
pub use supervised::NativePredictor;

use crate::error::{TrainingError, TrainingResult};
use crate::progress::ProgressSink;
use crate::trainer::{
    BackendSession, ClusterFit, ClusterRequest, ForecastFit, ForecastRequest, OutlierFit, OutlierRequest, Predictor,
    SupervisedFit, SupervisedRequest, TrainingBackend,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Contents of a saved `model.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum SavedModel {
    Supervised(NativePredictor),
    Forecast(forecast::ForecastModel),
    Clusters(cluster::ClusterModel),
    Outliers(isolation::IsolationForest),
}

pub(crate) fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

async fn run_blocking<T, F>(task: F) -> TrainingResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> TrainingResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| TrainingError::Trainer(format!("training task aborted: {e}")))?
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

impl NativeBackend {
    pub fn new() -> Self {
        Self
    }
}

impl TrainingBackend for NativeBackend {
    fn id(&self) -> &'static str {
        "native"
    }

    fn check_available(&self) -> TrainingResult<()> {
        Ok(())
    }

    fn open_session(&self, workdir: &Path) -> TrainingResult<Box<dyn BackendSession>> {
        std::fs::create_dir_all(workdir)?;
        debug!(workdir = %workdir.display(), "Opened native training session");
        Ok(Box::new(NativeSession { workdir: workdir.to_path_buf() }))
    }

    fn load_predictor(&self, model_path: &Path) -> TrainingResult<Box<dyn Predictor>> {
        let content = std::fs::read_to_string(model_path).map_err(|e| {
            TrainingError::Artifact(format!("failed to read model {}: {e}", model_path.display()))
        })?;
        match serde_json::from_str::<SavedModel>(&content)? {
            SavedModel::Supervised(predictor) => Ok(Box::new(predictor)),
            _ => Err(TrainingError::Artifact(format!(
                "model at {} is not a supervised predictor",
                model_path.display()
            ))),
        }
    }
}

/// A single job's view of the native backend.
#[derive(Debug)]
pub struct NativeSession {
    workdir: PathBuf,
}

#[async_trait]
impl BackendSession for NativeSession {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    async fn fit_supervised(
        &self,
        request: SupervisedRequest,
        progress: Arc<dyn ProgressSink>,
    ) -> TrainingResult<SupervisedFit> {
        info!(target_column = %request.target, problem_type = %request.problem_type, rows = request.frame.n_rows(), "Fitting supervised models");
        let workdir = self.workdir.clone();
        run_blocking(move || supervised::search(request, progress.as_ref(), &workdir)).await
    }

    async fn fit_forecast(
        &self,
        request: ForecastRequest,
        progress: Arc<dyn ProgressSink>,
    ) -> TrainingResult<ForecastFit> {
        info!(series = request.series.len(), horizon = request.horizon, "Fitting forecast models");
        let workdir = self.workdir.clone();
        run_blocking(move || forecast::search(request, progress.as_ref(), &workdir)).await
    }

    async fn fit_clusters(&self, request: ClusterRequest) -> TrainingResult<ClusterFit> {
        debug!(rows = request.rows.len(), n_clusters = request.n_clusters, "Fitting clusters");
        let workdir = self.workdir.clone();
        run_blocking(move || cluster::fit(request, &workdir)).await
    }

    async fn fit_outliers(&self, request: OutlierRequest) -> TrainingResult<OutlierFit> {
        debug!(rows = request.rows.len(), "Fitting isolation forest");
        let workdir = self.workdir.clone();
        run_blocking(move || isolation::fit(request, &workdir)).await
    }
}
