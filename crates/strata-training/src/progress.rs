use serde::{Deserialize, Serialize};

/// Events a backend emits while it searches for a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Message {
        message: String,
    },
    ModelTrained {
        model: String,
        score: f64,
        /// Candidates fitted so far, including this one.
        completed: usize,
        /// Candidates the search intends to fit.
        planned: usize,
        best_model: String,
        best_score: f64,
    },
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn on_event(&self, _event: ProgressEvent) {}
}
