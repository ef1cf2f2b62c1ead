//! Strata Training
//!
//! Backend-agnostic training primitives for:
//! - Describing jobs (`JobConfig`, `TaskSpec`)
//! - Loading tabular data into a `Frame`
//! - Resolving and computing evaluation metrics
//! - Implementing training backends (`TrainingBackend`, `BackendSession`)
//! - Writing job artifacts and metadata

pub mod artifacts;
pub mod dataset;
pub mod error;
pub mod job;
pub mod layout;
pub mod loader;
pub mod metrics;
pub mod native;
pub mod progress;
pub mod registry;
pub mod trainer;

pub use artifacts::{ArtifactKind, JobArtifact, JobMetadata, PredictionTable, read_metadata};
pub use dataset::{Column, ColumnData, ColumnKind, ColumnSchema, Frame, format_number, holdout_split};
pub use error::{TrainingError, TrainingResult};
pub use job::{
    AnomalyParams, ClusterAlgorithm, ClusteringParams, ForecastParams, JobConfig, JobConfigBuilder, JobId, Preset,
    ProblemType, SearchBudget, SupervisedParams, TaskSpec, TaskType,
};
pub use layout::ArtifactLayout;
pub use loader::{CsvLoader, DataLoader, DataReference, InMemoryLoader};
pub use metrics::{Metric, adjusted_rand_index, default_metric, resolve_metric, silhouette_score};
pub use native::NativeBackend;
pub use progress::{NullProgressSink, ProgressEvent, ProgressSink};
pub use registry::{PersistedJob, discover_jobs, find_job};
pub use trainer::{
    BackendSession, ClusterFit, ClusterRequest, ForecastFit, ForecastPoint, ForecastRequest, LeaderboardEntry,
    OutlierFit, OutlierRequest, Predictor, Series, SupervisedFit, SupervisedRequest, TargetValue, TrainingBackend,
};
