//! Job orchestration engine for Strata.
//!
//! Accepts training jobs, runs each on its own task, tracks progress and lifecycle
//! state, supports cooperative cancellation and persists results under a per-job
//! artifact directory.

pub mod config;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod orchestrator;
pub mod pipelines;
pub mod progress;
pub mod registry;
pub mod result;
pub mod router;

pub use config::EngineConfig;
pub use error::{OrchestratorError, Result};
pub use executor::{JobExecutor, JobTracker, ProgressForwarder};
pub use lifecycle::JobStatus;
pub use orchestrator::{CancelAck, DeleteOutcome, Orchestrator, SubmitResponse};
pub use pipelines::{
    AnomalyStrategy, ClusteringStrategy, ForecastingStrategy, SupervisedStrategy, detect_problem_type,
};
pub use progress::JobProgress;
pub use registry::{JobEntry, JobRegistry, JobSummary};
pub use result::{JobResult, PredictionRecord, TaskExtras};
pub use router::{PipelineStrategy, StrategyContext, StrategyOutcome, TaskRouter};
