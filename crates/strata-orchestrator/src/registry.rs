//! Job registry.
//!
//! The only shared mutable structure in the engine. The map itself sits behind one
//! lock; each entry carries its own locks so status polling on one job never waits
//! on another job's executor.

use crate::lifecycle::JobStatus;
use crate::progress::JobProgress;
use crate::result::JobResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use strata_training::{JobConfig, JobId, TaskType};
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Everything the engine holds for one job.
pub struct JobEntry {
    id: JobId,
    config: Arc<JobConfig>,
    workdir: PathBuf,
    progress: RwLock<JobProgress>,
    result: RwLock<Option<Arc<JobResult>>>,
    cancel: CancellationToken,
    status_tx: watch::Sender<JobStatus>,
    exited_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for JobEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobEntry")
            .field("id", &self.id)
            .field("task_type", &self.config.task_type())
            .field("status", &*self.status_tx.borrow())
            .finish_non_exhaustive()
    }
}

impl JobEntry {
    #[must_use]
    pub fn new(id: JobId, config: JobConfig, workdir: PathBuf, log_capacity: usize) -> Self {
        let (status_tx, _) = watch::channel(JobStatus::Pending);
        let (exited_tx, _) = watch::channel(false);
        Self {
            progress: RwLock::new(JobProgress::new(id.clone(), log_capacity)),
            id,
            config: Arc::new(config),
            workdir,
            result: RwLock::new(None),
            cancel: CancellationToken::new(),
            status_tx,
            exited_tx,
            handle: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn id(&self) -> &JobId {
        &self.id
    }

    #[must_use]
    pub fn config(&self) -> &Arc<JobConfig> {
        &self.config
    }

    #[must_use]
    pub fn workdir(&self) -> &PathBuf {
        &self.workdir
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Latest status without taking the progress lock.
    #[must_use]
    pub fn status(&self) -> JobStatus {
        *self.status_tx.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<JobStatus> {
        self.status_tx.subscribe()
    }

    pub(crate) fn publish_status(&self, status: JobStatus) {
        self.status_tx.send_replace(status);
    }

    pub(crate) fn progress(&self) -> &RwLock<JobProgress> {
        &self.progress
    }

    /// Progress snapshot with derived elapsed time and ETA.
    pub async fn snapshot(&self) -> JobProgress {
        self.progress.read().await.snapshot()
    }

    pub async fn result(&self) -> Option<Arc<JobResult>> {
        self.result.read().await.clone()
    }

    pub(crate) async fn store_result(&self, result: JobResult) {
        *self.result.write().await = Some(Arc::new(result));
    }

    pub(crate) async fn attach(&self, handle: JoinHandle<()>) {
        *self.handle.lock().await = Some(handle);
    }

    /// Whether the executor has not exited yet.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !*self.exited_tx.borrow()
    }

    /// Set once by the executor as it exits, including by unwinding.
    pub(crate) fn mark_exited(&self) {
        self.exited_tx.send_replace(true);
    }

    /// Resolves once the executor has exited. Any number of callers may wait.
    pub async fn exited(&self) {
        let mut exited = self.exited_tx.subscribe();
        // The sender lives in this entry, so the channel cannot close while we borrow it.
        let _ = exited.wait_for(|done| *done).await;
    }

    /// Takes the executor handle, leaving `None` behind.
    pub(crate) async fn take_handle(&self) -> Option<JoinHandle<()>> {
        self.handle.lock().await.take()
    }
}

/// Summary row returned by `list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: JobId,
    pub task_type: TaskType,
    pub status: JobStatus,
    pub progress_pct: f64,
    pub current_step: String,
    pub created_at: DateTime<Utc>,
    pub best_model: Option<String>,
    pub best_score: Option<f64>,
    /// The executor has not exited yet.
    pub running: bool,
}

/// Process-wide table of jobs, owned by the orchestrator.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<JobEntry>>>,
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("job_count", &self.jobs.try_read().map(|j| j.len()).unwrap_or(0))
            .finish_non_exhaustive()
    }
}

impl JobRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new entry.
    ///
    /// # Returns
    /// Returns `false` without replacing anything if the id is already taken.
    pub async fn insert(&self, entry: Arc<JobEntry>) -> bool {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(entry.id()) {
            return false;
        }
        jobs.insert(entry.id().clone(), entry);
        true
    }

    pub async fn get(&self, id: &JobId) -> Option<Arc<JobEntry>> {
        self.jobs.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &JobId) -> Option<Arc<JobEntry>> {
        self.jobs.write().await.remove(id)
    }

    /// All entries, ordered by id.
    pub async fn entries(&self) -> Vec<Arc<JobEntry>> {
        let mut entries: Vec<Arc<JobEntry>> = self.jobs.read().await.values().cloned().collect();
        entries.sort_by(|a, b| a.id().cmp(b.id()));
        entries
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    pub async fn summaries(&self) -> Vec<JobSummary> {
        let mut out = Vec::new();
        for entry in self.entries().await {
            let progress = entry.snapshot().await;
            out.push(JobSummary {
                job_id: entry.id().clone(),
                task_type: entry.config().task_type(),
                status: progress.status,
                progress_pct: progress.progress_pct,
                current_step: progress.current_step,
                created_at: progress.created_at,
                best_model: progress.best_model,
                best_score: progress.best_score,
                running: entry.is_running(),
            });
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.job_id.cmp(&b.job_id)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_training::{DataReference, TaskSpec};

    fn entry(id: &str) -> Arc<JobEntry> {
        let config = JobConfig::builder(TaskSpec::for_task(TaskType::Regression), DataReference::named("d"))
            .target("y")
            .build()
            .unwrap();
        Arc::new(JobEntry::new(JobId(id.to_string()), config, PathBuf::from(id), 10))
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_ids() {
        let registry = JobRegistry::new();
        assert!(registry.insert(entry("a")).await);
        assert!(!registry.insert(entry("a")).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_and_get() {
        let registry = JobRegistry::new();
        registry.insert(entry("a")).await;
        registry.insert(entry("b")).await;
        assert!(registry.get(&JobId("a".to_string())).await.is_some());
        assert!(registry.remove(&JobId("a".to_string())).await.is_some());
        assert!(registry.get(&JobId("a".to_string())).await.is_none());
        assert!(registry.remove(&JobId("a".to_string())).await.is_none());
    }

    #[tokio::test]
    async fn test_summaries_report_running_executor() {
        let registry = JobRegistry::new();
        let job = entry("a");
        registry.insert(job.clone()).await;

        let gate = CancellationToken::new();
        let waiter = gate.clone();
        let running = Arc::clone(&job);
        job.attach(tokio::spawn(async move {
            waiter.cancelled().await;
            running.mark_exited();
        }))
        .await;

        let summaries = registry.summaries().await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].status, JobStatus::Pending);
        assert!(summaries[0].running);

        gate.cancel();
        job.exited().await;
        assert!(!job.is_running());
        assert!(!registry.summaries().await[0].running);
        // The handle stays in place for whoever joins the task last.
        job.take_handle().await.unwrap().await.unwrap();
    }

    #[tokio::test]
    async fn test_exited_wakes_every_waiter() {
        let job = entry("a");
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let job = Arc::clone(&job);
                tokio::spawn(async move { job.exited().await })
            })
            .collect();
        job.mark_exited();
        for waiter in waiters {
            waiter.await.unwrap();
        }
        job.exited().await;
    }
}
