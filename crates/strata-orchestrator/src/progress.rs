//! Per-job progress record.
//!
//! A `JobProgress` is written only by its job's executor and read by any caller
//! through [`JobProgress::snapshot`]. Once the job reaches a terminal state every
//! mutator is a no-op; only the derived elapsed time is recomputed on read.

use crate::lifecycle::JobStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use strata_training::JobId;

/// Progress and status of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Percent complete, 0-100. Never decreases.
    pub progress_pct: f64,
    pub current_step: String,
    pub models_trained: usize,
    pub best_model: Option<String>,
    pub best_score: Option<f64>,
    pub elapsed_seconds: f64,
    /// Linear extrapolation from elapsed time and percent complete; `None` when unknown.
    pub estimated_remaining_seconds: Option<f64>,
    /// Most recent log lines, oldest first.
    pub recent_log_lines: VecDeque<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    log_capacity: usize,
}

impl JobProgress {
    /// Creates a PENDING record.
    #[must_use]
    pub fn new(job_id: JobId, log_capacity: usize) -> Self {
        let mut progress = Self {
            job_id,
            status: JobStatus::Pending,
            progress_pct: 0.0,
            current_step: "Queued".to_string(),
            models_trained: 0,
            best_model: None,
            best_score: None,
            elapsed_seconds: 0.0,
            estimated_remaining_seconds: None,
            recent_log_lines: VecDeque::with_capacity(log_capacity.max(1)),
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            log_capacity: log_capacity.max(1),
        };
        progress.log("Job submitted");
        progress
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves to `to` if the state machine allows it.
    ///
    /// # Returns
    /// Returns `Ok(previous)` on success, or `Err(current)` if the transition is invalid.
    pub fn transition(&mut self, to: JobStatus) -> Result<JobStatus, JobStatus> {
        let from = self.status;
        if !from.can_transition_to(to) {
            return Err(from);
        }
        let now = Utc::now();
        if from == JobStatus::Pending {
            self.started_at = Some(now);
        }
        if to == JobStatus::Completed {
            self.progress_pct = 100.0;
        }
        self.log(format!("{from} -> {to}"));
        self.status = to;
        if to.is_terminal() {
            self.completed_at = Some(now);
            self.estimated_remaining_seconds = None;
            self.elapsed_seconds = self.elapsed_at(now);
        }
        Ok(from)
    }

    /// Raises percent complete and sets the step label. Lower percentages are ignored.
    pub fn advance(&mut self, pct: f64, step: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.progress_pct = self.progress_pct.max(pct.clamp(0.0, 100.0));
        self.current_step = step.into();
    }

    /// Appends a timestamped log line, evicting the oldest beyond capacity.
    pub fn log(&mut self, message: impl AsRef<str>) {
        if self.is_terminal() {
            return;
        }
        while self.recent_log_lines.len() >= self.log_capacity {
            self.recent_log_lines.pop_front();
        }
        self.recent_log_lines.push_back(format!("[{}] {}", Utc::now().format("%H:%M:%S"), message.as_ref()));
    }

    /// Records the model-search counters reported by the backend.
    pub fn record_models(&mut self, models_trained: usize, best_model: &str, best_score: f64) {
        if self.is_terminal() {
            return;
        }
        self.models_trained = self.models_trained.max(models_trained);
        self.best_model = Some(best_model.to_string());
        self.best_score = best_score.is_finite().then_some(best_score);
    }

    /// Records the error and moves to FAILED. Percent complete is preserved.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<JobStatus, JobStatus> {
        if self.is_terminal() {
            return Err(self.status);
        }
        let error = error.into();
        self.log(format!("Error: {error}"));
        self.error = Some(error);
        self.transition(JobStatus::Failed)
    }

    fn elapsed_at(&self, now: DateTime<Utc>) -> f64 {
        let Some(started) = self.started_at else {
            return 0.0;
        };
        let end = self.completed_at.unwrap_or(now);
        ((end - started).num_milliseconds() as f64 / 1000.0).max(0.0)
    }

    /// Read-only copy with elapsed time and ETA derived at `now`.
    ///
    /// ETA = `elapsed * 100 / pct - elapsed`, floored at zero, for live jobs with
    /// non-zero progress.
    #[must_use]
    pub fn snapshot_at(&self, now: DateTime<Utc>) -> Self {
        let mut snapshot = self.clone();
        snapshot.elapsed_seconds = self.elapsed_at(now);
        snapshot.estimated_remaining_seconds = if self.is_terminal() || self.progress_pct <= 0.0 {
            None
        } else {
            let elapsed = snapshot.elapsed_seconds;
            Some((elapsed * 100.0 / self.progress_pct - elapsed).max(0.0))
        };
        snapshot
    }

    #[must_use]
    pub fn snapshot(&self) -> Self {
        self.snapshot_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn progress() -> JobProgress {
        JobProgress::new(JobId("job".to_string()), 3)
    }

    #[test]
    fn test_percent_never_decreases() {
        let mut p = progress();
        p.transition(JobStatus::Preparing).unwrap();
        p.advance(10.0, "ten");
        p.advance(5.0, "five");
        assert_eq!(p.progress_pct, 10.0);
        assert_eq!(p.current_step, "five");
        p.advance(150.0, "over");
        assert_eq!(p.progress_pct, 100.0);
    }

    #[test]
    fn test_log_is_capped() {
        let mut p = progress();
        for i in 0..10 {
            p.log(format!("line {i}"));
        }
        assert_eq!(p.recent_log_lines.len(), 3);
        assert!(p.recent_log_lines.back().unwrap().ends_with("line 9"));
        assert!(p.recent_log_lines.front().unwrap().ends_with("line 7"));
    }

    #[test]
    fn test_terminal_state_freezes_fields() {
        let mut p = progress();
        p.transition(JobStatus::Preparing).unwrap();
        p.advance(40.0, "training");
        p.fail("boom").unwrap();
        let frozen = p.clone();

        p.advance(90.0, "late");
        p.log("late");
        p.record_models(3, "Late", 1.0);
        assert_eq!(p.transition(JobStatus::Completed), Err(JobStatus::Failed));
        assert!(p.fail("again").is_err());
        assert_eq!(p, frozen);
        assert_eq!(p.progress_pct, 40.0);
        assert_eq!(p.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_completion_sets_full_progress() {
        let mut p = progress();
        for status in [JobStatus::Preparing, JobStatus::Training, JobStatus::Evaluating, JobStatus::Completed] {
            p.transition(status).unwrap();
        }
        assert_eq!(p.progress_pct, 100.0);
        assert!(p.completed_at.is_some());
    }

    #[test]
    fn test_eta_linear_extrapolation() {
        let mut p = progress();
        p.transition(JobStatus::Preparing).unwrap();
        p.advance(25.0, "quarter");
        let started = p.started_at.unwrap();

        let snap = p.snapshot_at(started + Duration::seconds(10));
        assert!((snap.elapsed_seconds - 10.0).abs() < 1e-9);
        assert!((snap.estimated_remaining_seconds.unwrap() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_eta_unknown_without_progress() {
        let p = progress();
        let snap = p.snapshot();
        assert_eq!(snap.elapsed_seconds, 0.0);
        assert!(snap.estimated_remaining_seconds.is_none());
    }

    #[test]
    fn test_terminal_elapsed_is_stable() {
        let mut p = progress();
        p.transition(JobStatus::Preparing).unwrap();
        p.transition(JobStatus::Cancelled).unwrap();
        let now = Utc::now();
        let a = p.snapshot_at(now);
        let b = p.snapshot_at(now + Duration::seconds(100));
        assert_eq!(a.elapsed_seconds, b.elapsed_seconds);
        assert!(b.estimated_remaining_seconds.is_none());
    }
}
