//! Error types for job orchestration.

use crate::lifecycle::JobStatus;
use strata_training::{JobId, TrainingError};
use thiserror::Error;

/// Result type for orchestration operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Orchestration errors.
///
/// Submission-time failures (`Configuration`, `BackendUnavailable`) are returned to the
/// caller directly. Everything raised inside a running job ends up as the job's `error`
/// string instead.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The job configuration is structurally invalid or references unknown columns.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The training backend cannot accept work.
    #[error("training backend unavailable: {0}")]
    BackendUnavailable(String),

    /// No job with this id is registered.
    #[error("job not found: {0}")]
    NotFound(JobId),

    /// The job exists but has no result (yet).
    #[error("job {job_id} is not ready (status: {status})")]
    NotReady {
        /// Job id.
        job_id: JobId,
        /// Status at the time of the request.
        status: JobStatus,
    },

    /// Loading data, fitting or predicting failed.
    #[error("{0}")]
    Training(TrainingError),

    /// Writing job artifacts failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Engine configuration could not be loaded.
    #[error("engine configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    /// The executor attempted a transition the state machine forbids.
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition {
        /// Status the job was in.
        from: JobStatus,
        /// Requested status.
        to: JobStatus,
    },

    /// Cancellation was observed at a checkpoint.
    #[error("job cancelled")]
    Cancelled,
}

impl From<TrainingError> for OrchestratorError {
    fn from(err: TrainingError) -> Self {
        match err {
            TrainingError::InvalidConfig(msg) => Self::Configuration(msg),
            TrainingError::BackendUnavailable(msg) => Self::BackendUnavailable(msg),
            err if err.is_persistence() => Self::Persistence(err.to_string()),
            err => Self::Training(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_errors_map_to_taxonomy() {
        let err: OrchestratorError = TrainingError::InvalidConfig("bad".to_string()).into();
        assert!(matches!(err, OrchestratorError::Configuration(_)));

        let err: OrchestratorError = TrainingError::Artifact("disk full".to_string()).into();
        assert!(matches!(err, OrchestratorError::Persistence(_)));

        let err: OrchestratorError = TrainingError::DataAccess("no file".to_string()).into();
        assert_eq!(err.to_string(), "data access error: no file");
    }
}
