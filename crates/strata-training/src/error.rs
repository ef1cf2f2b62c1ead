use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("invalid job configuration: {0}")]
    InvalidConfig(String),

    #[error("data access error: {0}")]
    DataAccess(String),

    #[error("training backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("trainer error: {0}")]
    Trainer(String),

    #[error("artifact error: {0}")]
    Artifact(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TrainingError {
    /// Whether the error came from writing or reading job artifacts on disk.
    #[must_use]
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Artifact(_) | Self::Io(_))
    }
}
