//! Job executor.
//!
//! One executor runs per submitted job, on its own tokio task. It owns every write to
//! its job's progress record and is the only place a job changes status. Cancellation
//! is cooperative: the token is checked at each checkpoint, never during a backend call.

use crate::config::EngineConfig;
use crate::error::{OrchestratorError, Result};
use crate::lifecycle::JobStatus;
use crate::registry::JobEntry;
use crate::result::JobResult;
use crate::router::{StrategyContext, StrategyOutcome, TaskRouter};
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use strata_training::artifacts::{make_artifact, write_metadata, write_predictions};
use strata_training::{
    ArtifactKind, ArtifactLayout, DataLoader, JobArtifact, JobMetadata, ProgressEvent, ProgressSink,
    TrainingBackend, TrainingError,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Write handle onto one job's progress record.
///
/// Strategies receive a tracker through their context; it is the only way they touch
/// shared state.
#[derive(Clone)]
pub struct JobTracker {
    entry: Arc<JobEntry>,
}

impl fmt::Debug for JobTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobTracker").field("job_id", self.entry.id()).finish()
    }
}

impl JobTracker {
    #[must_use]
    pub fn new(entry: Arc<JobEntry>) -> Self {
        Self { entry }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.entry.cancel_token().is_cancelled()
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }
        Ok(())
    }

    /// Checks for cancellation, then raises progress to `pct` with a step label.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::Cancelled`] if cancellation was requested.
    pub async fn checkpoint(&self, pct: f64, step: &str) -> Result<()> {
        self.ensure_live()?;
        let mut progress = self.entry.progress().write().await;
        progress.advance(pct, step);
        progress.log(step);
        debug!(job_id = %self.entry.id(), pct, step, "Checkpoint");
        Ok(())
    }

    /// Checks for cancellation, moves to `status` and records progress.
    pub async fn advance(&self, status: JobStatus, pct: f64, step: &str) -> Result<()> {
        self.ensure_live()?;
        {
            let mut progress = self.entry.progress().write().await;
            progress
                .transition(status)
                .map_err(|from| OrchestratorError::InvalidTransition { from, to: status })?;
            progress.advance(pct, step);
            progress.log(step);
        }
        self.entry.publish_status(status);
        info!(job_id = %self.entry.id(), status = %status, pct, "Job status changed");
        Ok(())
    }

    pub async fn log(&self, message: impl AsRef<str>) {
        self.entry.progress().write().await.log(message);
    }

    /// Starts a task that folds backend progress events into this job's record.
    ///
    /// Percent complete moves linearly from `start` to `end` as candidates finish.
    #[must_use]
    pub fn progress_forwarder(&self, start: f64, end: f64) -> ProgressForwarder {
        let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
        let entry = Arc::clone(&self.entry);
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let mut progress = entry.progress().write().await;
                match event {
                    ProgressEvent::Message { message } => progress.log(message),
                    ProgressEvent::ModelTrained { model, score, completed, planned, best_model, best_score } => {
                        progress.record_models(completed, &best_model, best_score);
                        let share = completed as f64 / planned.max(1) as f64;
                        progress.advance(start + (end - start) * share.min(1.0), format!("Trained {completed}/{planned} models"));
                        progress.log(format!("{model} scored {score:.4}"));
                    }
                }
            }
        });
        ProgressForwarder { sink: Arc::new(ChannelSink { tx }), task }
    }

    /// Marks the job COMPLETED and stores its result under the same progress lock.
    ///
    /// A cancel that lands first wins; once the lock is held the result and the
    /// status move together.
    pub(crate) async fn complete(&self, result: JobResult) -> Result<()> {
        let mut progress = self.entry.progress().write().await;
        self.ensure_live()?;
        progress
            .transition(JobStatus::Completed)
            .map_err(|from| OrchestratorError::InvalidTransition { from, to: JobStatus::Completed })?;
        progress.advance(100.0, "Completed");
        progress.log("Completed");
        self.entry.store_result(result).await;
        self.entry.publish_status(JobStatus::Completed);
        drop(progress);
        info!(job_id = %self.entry.id(), status = %JobStatus::Completed, pct = 100.0, "Job status changed");
        Ok(())
    }

    pub(crate) async fn finish_cancelled(&self) {
        let moved = {
            let mut progress = self.entry.progress().write().await;
            progress.log("Cancelled at checkpoint");
            progress.transition(JobStatus::Cancelled)
        };
        if moved.is_ok() {
            self.entry.publish_status(JobStatus::Cancelled);
            info!(job_id = %self.entry.id(), "Job cancelled");
        }
    }

    pub(crate) async fn finish_failed(&self, err: &OrchestratorError) {
        let moved = self.entry.progress().write().await.fail(err.to_string());
        if moved.is_ok() {
            self.entry.publish_status(JobStatus::Failed);
            error!(job_id = %self.entry.id(), error = %err, "Job failed");
        }
    }
}

struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressSink for ChannelSink {
    fn on_event(&self, event: ProgressEvent) {
        // The receiver only goes away once the job is finished.
        let _ = self.tx.send(event);
    }
}

/// Sink handed to the backend plus the task draining it.
pub struct ProgressForwarder {
    sink: Arc<dyn ProgressSink>,
    task: JoinHandle<()>,
}

impl ProgressForwarder {
    #[must_use]
    pub fn sink(&self) -> Arc<dyn ProgressSink> {
        Arc::clone(&self.sink)
    }

    /// Closes the channel and waits until every event has been applied.
    ///
    /// The backend must have dropped its clones of the sink by now.
    pub async fn finish(self) {
        drop(self.sink);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Progress forwarder task failed");
        }
    }
}

/// Runs one job from PENDING to a terminal state.
pub struct JobExecutor {
    entry: Arc<JobEntry>,
    backend: Arc<dyn TrainingBackend>,
    loader: Arc<dyn DataLoader>,
    router: Arc<TaskRouter>,
    engine: Arc<EngineConfig>,
}

impl fmt::Debug for JobExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobExecutor")
            .field("job_id", self.entry.id())
            .field("backend", &self.backend.id())
            .finish_non_exhaustive()
    }
}

impl JobExecutor {
    #[must_use]
    pub fn new(
        entry: Arc<JobEntry>,
        backend: Arc<dyn TrainingBackend>,
        loader: Arc<dyn DataLoader>,
        router: Arc<TaskRouter>,
        engine: Arc<EngineConfig>,
    ) -> Self {
        Self { entry, backend, loader, router, engine }
    }

    /// Drives the job to a terminal state. Never returns an error: failures end up in
    /// the job's progress record. A panic in a strategy or loader fails the job.
    pub async fn run(self) {
        let _exit = ExitGuard(Arc::clone(&self.entry));
        let tracker = JobTracker::new(Arc::clone(&self.entry));
        let started = Instant::now();
        match AssertUnwindSafe(self.execute(&tracker, started)).catch_unwind().await {
            Ok(Ok(())) => {
                info!(
                    job_id = %self.entry.id(),
                    seconds = started.elapsed().as_secs_f64(),
                    "Job completed"
                );
            }
            Ok(Err(OrchestratorError::Cancelled)) => tracker.finish_cancelled().await,
            Ok(Err(e)) => tracker.finish_failed(&e).await,
            Err(payload) => {
                let err = TrainingError::Trainer(format!("job panicked: {}", panic_message(payload.as_ref())));
                tracker.finish_failed(&OrchestratorError::Training(err)).await;
            }
        }
    }

    async fn execute(&self, tracker: &JobTracker, started: Instant) -> Result<()> {
        let config = self.entry.config();
        let job_id = self.entry.id();

        tracker.advance(JobStatus::Preparing, 0.0, "Preparing").await?;
        let workdir = self.engine.layout().ensure_job_dir(job_id).map_err(persistence)?;

        let frame = self.loader.load(&config.data).await?;
        tracker
            .checkpoint(5.0, &format!("Loaded {} rows x {} columns from {}", frame.n_rows(), frame.n_cols(), config.data))
            .await?;

        if frame.n_rows() == 0 {
            return Err(OrchestratorError::Configuration("dataset has no rows".to_string()));
        }
        for column in config.protected_columns() {
            frame.require_column(column)?;
        }
        let columns = config.select_columns(&frame.column_names());
        let frame = frame.select(&columns)?;
        tracker.checkpoint(10.0, &format!("Selected {} columns", frame.n_cols())).await?;

        let session = self.backend.open_session(&workdir)?;
        let ctx = StrategyContext {
            job_id,
            config,
            frame: &frame,
            session: session.as_ref(),
            tracker,
            engine: &self.engine,
        };
        let outcome = self.router.run(&ctx).await?;

        // Anything the backend finished after a cancel request is dropped here.
        tracker.checkpoint(95.0, "Writing artifacts").await?;
        let artifacts = self.persist(&workdir, &outcome).await?;

        let result = JobResult {
            job_id: job_id.clone(),
            task_type: config.task_type(),
            problem_type: outcome.problem_type,
            target_column: config.target_column.clone(),
            leaderboard: outcome.leaderboard,
            best_model: outcome.best_model,
            best_score: outcome.best_score,
            eval_metric: outcome.eval_metric,
            feature_importance: outcome.feature_importance,
            n_features: outcome.features.len(),
            features: outcome.features,
            training_seconds: started.elapsed().as_secs_f64(),
            n_rows: outcome.n_rows,
            model_path: outcome.model_path,
            artifacts,
            predictions: outcome.sample,
            extras: outcome.extras,
            completed_at: Utc::now(),
        };
        tracker.complete(result).await
    }

    async fn persist(&self, workdir: &Path, outcome: &StrategyOutcome) -> Result<Vec<JobArtifact>> {
        let config = self.entry.config();

        let predictions_path = ArtifactLayout::predictions_path(workdir);
        write_predictions(&predictions_path, &outcome.predictions).map_err(persistence)?;
        let mut artifacts = vec![
            make_artifact(ArtifactKind::Model, outcome.model_path.clone()).map_err(persistence)?,
            make_artifact(ArtifactKind::Predictions, predictions_path).map_err(persistence)?,
        ];

        let metadata = JobMetadata {
            job_id: self.entry.id().clone(),
            created_at: self.entry.snapshot().await.created_at,
            task_type: config.task_type(),
            problem_type: outcome.problem_type,
            target_column: config.target_column.clone(),
            features: outcome.features.clone(),
            eval_metric: Some(outcome.eval_metric.clone()),
            best_model: outcome.best_model.clone(),
            best_score: outcome.best_score,
            n_rows: outcome.n_rows,
            tags: config.tags.clone(),
            artifacts: artifacts.clone(),
        };
        let metadata_path = ArtifactLayout::metadata_path(workdir);
        write_metadata(&metadata_path, &metadata).map_err(persistence)?;
        artifacts.push(make_artifact(ArtifactKind::Metadata, metadata_path).map_err(persistence)?);

        debug!(job_id = %self.entry.id(), count = artifacts.len(), "Artifacts written");
        Ok(artifacts)
    }
}

/// Flags the entry as exited when the executor future is dropped, however it ends.
struct ExitGuard(Arc<JobEntry>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.mark_exited();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn persistence(err: TrainingError) -> OrchestratorError {
    OrchestratorError::Persistence(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use strata_training::{DataReference, JobConfig, JobId, TaskSpec, TaskType};

    fn entry() -> Arc<JobEntry> {
        let config = JobConfig::builder(TaskSpec::for_task(TaskType::Regression), DataReference::named("d"))
            .target("y")
            .build()
            .unwrap();
        Arc::new(JobEntry::new(JobId::from("job"), config, PathBuf::from("job"), 20))
    }

    #[tokio::test]
    async fn test_checkpoint_observes_cancellation() {
        let entry = entry();
        let tracker = JobTracker::new(Arc::clone(&entry));
        tracker.advance(JobStatus::Preparing, 0.0, "Preparing").await.unwrap();
        tracker.checkpoint(5.0, "loaded").await.unwrap();

        entry.cancel_token().cancel();
        assert!(matches!(tracker.checkpoint(10.0, "late").await, Err(OrchestratorError::Cancelled)));
        assert_eq!(entry.snapshot().await.progress_pct, 5.0);

        tracker.finish_cancelled().await;
        assert_eq!(entry.status(), JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_invalid_transition_is_an_error() {
        let tracker = JobTracker::new(entry());
        let err = tracker.advance(JobStatus::Evaluating, 50.0, "skip").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidTransition { from: JobStatus::Pending, .. }));
    }

    #[tokio::test]
    async fn test_forwarder_applies_events_before_finish_returns() {
        let entry = entry();
        let tracker = JobTracker::new(Arc::clone(&entry));
        tracker.advance(JobStatus::Preparing, 0.0, "Preparing").await.unwrap();
        tracker.advance(JobStatus::Training, 20.0, "Training").await.unwrap();

        let forwarder = tracker.progress_forwarder(20.0, 70.0);
        let sink = forwarder.sink();
        sink.on_event(ProgressEvent::Message { message: "searching".to_string() });
        sink.on_event(ProgressEvent::ModelTrained {
            model: "RidgeRegression".to_string(),
            score: 1.5,
            completed: 1,
            planned: 2,
            best_model: "RidgeRegression".to_string(),
            best_score: 1.5,
        });
        drop(sink);
        forwarder.finish().await;

        let snap = entry.snapshot().await;
        assert_eq!(snap.models_trained, 1);
        assert_eq!(snap.best_model.as_deref(), Some("RidgeRegression"));
        assert!((snap.progress_pct - 45.0).abs() < 1e-9);
        assert!(snap.recent_log_lines.iter().any(|l| l.ends_with("searching")));
    }

    #[tokio::test]
    async fn test_complete_after_cancel_stores_no_result() {
        let entry = entry();
        let tracker = JobTracker::new(Arc::clone(&entry));
        tracker.advance(JobStatus::Preparing, 0.0, "Preparing").await.unwrap();
        tracker.advance(JobStatus::Training, 20.0, "Training").await.unwrap();
        tracker.advance(JobStatus::Evaluating, 90.0, "Evaluating").await.unwrap();

        entry.cancel_token().cancel();
        let result = JobResult {
            job_id: entry.id().clone(),
            task_type: TaskType::Regression,
            problem_type: None,
            target_column: Some("y".to_string()),
            leaderboard: Vec::new(),
            best_model: "RidgeRegression".to_string(),
            best_score: None,
            eval_metric: "root_mean_squared_error".to_string(),
            feature_importance: std::collections::BTreeMap::new(),
            features: Vec::new(),
            training_seconds: 0.0,
            n_rows: 0,
            n_features: 0,
            model_path: PathBuf::from("job/model.json"),
            artifacts: Vec::new(),
            predictions: Vec::new(),
            extras: crate::result::TaskExtras::Regression { interval_half_width: 0.0, holdout_score: None },
            completed_at: Utc::now(),
        };
        assert!(matches!(tracker.complete(result).await, Err(OrchestratorError::Cancelled)));
        tracker.finish_cancelled().await;

        assert_eq!(entry.status(), JobStatus::Cancelled);
        assert!(entry.result().await.is_none());
    }

    #[test]
    fn test_panic_message_reads_str_and_string_payloads() {
        let fixed: Box<dyn Any + Send> = Box::new("index out of bounds");
        let owned: Box<dyn Any + Send> = Box::new(String::from("bad state"));
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(fixed.as_ref()), "index out of bounds");
        assert_eq!(panic_message(owned.as_ref()), "bad state");
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }

    #[tokio::test]
    async fn test_failure_preserves_percent() {
        let entry = entry();
        let tracker = JobTracker::new(Arc::clone(&entry));
        tracker.advance(JobStatus::Preparing, 0.0, "Preparing").await.unwrap();
        tracker.checkpoint(10.0, "selected").await.unwrap();
        tracker.finish_failed(&OrchestratorError::Persistence("disk full".to_string())).await;

        let snap = entry.snapshot().await;
        assert_eq!(snap.status, JobStatus::Failed);
        assert_eq!(snap.progress_pct, 10.0);
        assert_eq!(snap.error.as_deref(), Some("persistence error: disk full"));
    }
}
