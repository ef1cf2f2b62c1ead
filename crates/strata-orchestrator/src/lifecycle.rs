//! Job lifecycle state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Job execution state.
///
/// Success path: `Pending → Preparing → Training → Evaluating → Completed`.
/// `Failed` and `Cancelled` are reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Submitted; the executor has not started work.
    Pending,
    /// Loading data and applying column rules.
    Preparing,
    /// The training backend is fitting candidates.
    Training,
    /// Scoring the best model and assembling the result.
    Evaluating,
    /// Finished with a result.
    Completed,
    /// Finished with an error.
    Failed,
    /// Stopped at a checkpoint after a cancellation request.
    Cancelled,
}

impl JobStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Preparing => "PREPARING",
            Self::Training => "TRAINING",
            Self::Evaluating => "EVALUATING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Terminal states never change again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Checks if the job can transition to the given state.
    ///
    /// # Arguments
    /// * `to` - The target state
    ///
    /// # Returns
    /// Returns `true` if the transition is valid, `false` otherwise.
    #[must_use]
    #[allow(clippy::match_same_arms)] // Each arm represents a distinct state transition rule
    pub fn can_transition_to(self, to: Self) -> bool {
        match (self, to) {
            (Self::Pending, Self::Preparing) => true,
            (Self::Preparing, Self::Training) => true,
            (Self::Training, Self::Evaluating) => true,
            (Self::Evaluating, Self::Completed) => true,
            // Any live state may fail or be cancelled
            (from, Self::Failed | Self::Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
