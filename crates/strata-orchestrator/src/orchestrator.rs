//! Job orchestrator façade.
//!
//! Every public operation returns without waiting on training work. Jobs run on their
//! own tokio tasks, started by [`Orchestrator::submit`].

use crate::config::EngineConfig;
use crate::error::{OrchestratorError, Result};
use crate::executor::JobExecutor;
use crate::lifecycle::JobStatus;
use crate::progress::JobProgress;
use crate::registry::{JobEntry, JobRegistry, JobSummary};
use crate::result::JobResult;
use crate::router::TaskRouter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use strata_training::{ArtifactLayout, DataLoader, JobConfig, JobId, TaskSpec, TrainingBackend, TrainingError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Returned by [`Orchestrator::submit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// Returned by [`Orchestrator::cancel`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelAck {
    pub job_id: JobId,
    /// Status when the request was handled.
    pub status: JobStatus,
    /// `false` when the job had already finished.
    pub accepted: bool,
    pub message: String,
}

/// Returned by [`Orchestrator::delete`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub job_id: JobId,
    /// Status when the entry was removed.
    pub status: JobStatus,
    /// Artifacts are removed once the executor exits.
    pub cleanup_deferred: bool,
}

/// Public entry point of the engine.
pub struct Orchestrator {
    engine: Arc<EngineConfig>,
    layout: ArtifactLayout,
    backend: Arc<dyn TrainingBackend>,
    loader: Arc<dyn DataLoader>,
    router: Arc<TaskRouter>,
    registry: JobRegistry,
    cleanups: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("backend", &self.backend.id())
            .field("artifacts_root", &self.engine.artifacts_root)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator with the default task router.
    #[must_use]
    pub fn new(engine: EngineConfig, backend: Arc<dyn TrainingBackend>, loader: Arc<dyn DataLoader>) -> Self {
        Self::with_router(engine, backend, loader, TaskRouter::default())
    }

    #[must_use]
    pub fn with_router(
        engine: EngineConfig,
        backend: Arc<dyn TrainingBackend>,
        loader: Arc<dyn DataLoader>,
        router: TaskRouter,
    ) -> Self {
        Self {
            layout: engine.layout(),
            engine: Arc::new(engine),
            backend,
            loader,
            router: Arc::new(router),
            registry: JobRegistry::new(),
            cleanups: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    #[must_use]
    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Validates `config`, registers a PENDING job and starts its executor.
    ///
    /// # Errors
    /// * [`OrchestratorError::BackendUnavailable`] - the backend cannot train
    /// * [`OrchestratorError::Configuration`] - invalid config, unknown column or duplicate name
    pub async fn submit(&self, config: JobConfig) -> Result<SubmitResponse> {
        self.backend.check_available().map_err(|e| match e {
            TrainingError::BackendUnavailable(msg) => OrchestratorError::BackendUnavailable(msg),
            other => OrchestratorError::BackendUnavailable(other.to_string()),
        })?;
        config.validate()?;
        self.check_columns(&config).await?;

        let job_id = config.job_name.clone().map_or_else(|| JobId::generate(config.task_type()), JobId);
        let entry = Arc::new(JobEntry::new(
            job_id.clone(),
            config,
            self.layout.job_dir(&job_id),
            self.engine.log_capacity,
        ));
        if !self.registry.insert(Arc::clone(&entry)).await {
            return Err(OrchestratorError::Configuration(format!("job '{job_id}' already exists")));
        }

        let executor = JobExecutor::new(
            Arc::clone(&entry),
            Arc::clone(&self.backend),
            Arc::clone(&self.loader),
            Arc::clone(&self.router),
            Arc::clone(&self.engine),
        );
        entry.attach(tokio::spawn(executor.run())).await;

        info!(
            job_id = %job_id,
            task_type = %entry.config().task_type(),
            backend = self.backend.id(),
            "Job submitted"
        );
        Ok(SubmitResponse { job_id, status: entry.status() })
    }

    /// Rejects references to columns the dataset does not have.
    ///
    /// When the loader cannot describe the data, submission goes ahead and the executor
    /// reports the data access error.
    async fn check_columns(&self, config: &JobConfig) -> Result<()> {
        let schema = match self.loader.schema(&config.data).await {
            Ok(schema) => schema,
            Err(e) => {
                warn!(data = %config.data, error = %e, "Could not read dataset schema; deferring checks");
                return Ok(());
            }
        };
        let has = |name: &str| schema.iter().any(|c| c.name == name);

        let mut required: Vec<(&str, &str)> = config.target().map(|t| ("target column", t)).into_iter().collect();
        if let TaskSpec::Forecasting(p) = &config.task {
            required.extend(p.time_column.as_deref().map(|c| ("time column", c)));
            required.extend(p.id_column.as_deref().map(|c| ("id column", c)));
        }
        for (role, name) in required {
            if !has(name) {
                return Err(OrchestratorError::Configuration(format!(
                    "{role} '{name}' not found in {}",
                    config.data
                )));
            }
        }
        debug!(data = %config.data, columns = schema.len(), "Dataset schema checked");
        Ok(())
    }

    async fn entry(&self, job_id: &JobId) -> Result<Arc<JobEntry>> {
        self.registry.get(job_id).await.ok_or_else(|| OrchestratorError::NotFound(job_id.clone()))
    }

    /// Snapshot of a job's progress with elapsed time and ETA derived now.
    pub async fn get_status(&self, job_id: &JobId) -> Result<JobProgress> {
        Ok(self.entry(job_id).await?.snapshot().await)
    }

    /// The job's result, once it has COMPLETED.
    ///
    /// # Errors
    /// [`OrchestratorError::NotReady`] carries the current status for any other state.
    pub async fn get_results(&self, job_id: &JobId) -> Result<Arc<JobResult>> {
        let entry = self.entry(job_id).await?;
        let status = entry.status();
        if status != JobStatus::Completed {
            return Err(OrchestratorError::NotReady { job_id: job_id.clone(), status });
        }
        entry.result().await.ok_or(OrchestratorError::NotReady { job_id: job_id.clone(), status })
    }

    /// Requests cooperative cancellation. The executor stops at its next checkpoint.
    pub async fn cancel(&self, job_id: &JobId) -> Result<CancelAck> {
        let entry = self.entry(job_id).await?;
        let status = entry.status();
        if status.is_terminal() {
            return Ok(CancelAck {
                job_id: job_id.clone(),
                status,
                accepted: false,
                message: format!("job already finished with status {status}"),
            });
        }
        entry.cancel_token().cancel();
        entry.progress().write().await.log("Cancellation requested");
        info!(job_id = %job_id, status = %status, "Cancellation requested");
        Ok(CancelAck {
            job_id: job_id.clone(),
            status,
            accepted: true,
            message: "cancellation requested; the job stops at its next checkpoint".to_string(),
        })
    }

    /// Summaries of every registered job, oldest first.
    pub async fn list(&self) -> Vec<JobSummary> {
        self.registry.summaries().await
    }

    /// Removes a job and its artifacts.
    ///
    /// A job that is still running is cancelled; its directory is removed once the
    /// executor exits.
    pub async fn delete(&self, job_id: &JobId) -> Result<DeleteOutcome> {
        let entry = self.registry.remove(job_id).await.ok_or_else(|| OrchestratorError::NotFound(job_id.clone()))?;
        let status = entry.status();
        entry.cancel_token().cancel();

        let cleanup_deferred = entry.is_running();
        if cleanup_deferred {
            let layout = self.layout.clone();
            let id = job_id.clone();
            let cleanup = tokio::spawn(async move {
                entry.exited().await;
                remove_artifacts(&layout, &id);
            });
            self.cleanups.lock().await.push(cleanup);
        } else {
            remove_artifacts(&self.layout, job_id);
        }

        info!(job_id = %job_id, status = %status, cleanup_deferred, "Job deleted");
        Ok(DeleteOutcome { job_id: job_id.clone(), status, cleanup_deferred })
    }

    /// Waits until the job reaches a terminal state and its executor has exited.
    pub async fn wait(&self, job_id: &JobId) -> Result<JobProgress> {
        let entry = self.entry(job_id).await?;
        entry.exited().await;
        Ok(entry.snapshot().await)
    }

    /// Cancels every live job and waits for all executors and pending cleanups.
    pub async fn shutdown(&self) {
        let entries = self.registry.entries().await;
        for entry in &entries {
            if !entry.status().is_terminal() {
                entry.cancel_token().cancel();
            }
        }
        for entry in &entries {
            entry.exited().await;
            if let Some(handle) = entry.take_handle().await {
                if let Err(e) = handle.await {
                    warn!(job_id = %entry.id(), error = %e, "Executor task ended abnormally");
                }
            }
        }
        let cleanups: Vec<JoinHandle<()>> = self.cleanups.lock().await.drain(..).collect();
        for cleanup in cleanups {
            let _ = cleanup.await;
        }
        info!(jobs = entries.len(), "Orchestrator shut down");
    }
}

fn remove_artifacts(layout: &ArtifactLayout, job_id: &JobId) {
    match layout.remove_job_dir(job_id) {
        Ok(removed) => debug!(job_id = %job_id, removed, "Artifacts removed"),
        Err(e) => warn!(job_id = %job_id, error = %e, "Failed to remove job artifacts"),
    }
}
