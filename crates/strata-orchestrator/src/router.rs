//! Task routing.
//!
//! The router is an exhaustive match from task type to a [`PipelineStrategy`]. Strategies
//! share nothing but the job's tracker, so any of them can be swapped out without
//! touching the executor.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::executor::JobTracker;
use crate::pipelines::{AnomalyStrategy, ClusteringStrategy, ForecastingStrategy, SupervisedStrategy};
use crate::result::{PredictionRecord, TaskExtras};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use strata_training::{BackendSession, Frame, JobConfig, JobId, LeaderboardEntry, PredictionTable, ProblemType, TaskType};
use tracing::debug;

/// Everything a strategy may read while it runs.
pub struct StrategyContext<'a> {
    pub job_id: &'a JobId,
    pub config: &'a JobConfig,
    /// Dataset after column selection.
    pub frame: &'a Frame,
    /// This job's backend session.
    pub session: &'a dyn BackendSession,
    pub tracker: &'a JobTracker,
    pub engine: &'a EngineConfig,
}

/// What a strategy hands back to the executor.
#[derive(Debug, Clone)]
pub struct StrategyOutcome {
    pub problem_type: Option<ProblemType>,
    /// Ordered best first.
    pub leaderboard: Vec<LeaderboardEntry>,
    pub best_model: String,
    pub best_score: Option<f64>,
    pub eval_metric: String,
    pub feature_importance: BTreeMap<String, f64>,
    pub features: Vec<String>,
    pub n_rows: usize,
    pub model_path: PathBuf,
    /// Full evaluation-set predictions, written to disk.
    pub predictions: PredictionTable,
    /// Bounded sample copied into the result.
    pub sample: Vec<PredictionRecord>,
    pub extras: TaskExtras,
}

/// One pipeline per task kind.
#[async_trait]
pub trait PipelineStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs the pipeline. Progress must stay within 15-90%.
    async fn run(&self, ctx: &StrategyContext<'_>) -> Result<StrategyOutcome>;
}

/// Selects the strategy for a job's task type.
#[derive(Clone)]
pub struct TaskRouter {
    classification: Arc<dyn PipelineStrategy>,
    regression: Arc<dyn PipelineStrategy>,
    forecasting: Arc<dyn PipelineStrategy>,
    clustering: Arc<dyn PipelineStrategy>,
    anomaly: Arc<dyn PipelineStrategy>,
}

impl fmt::Debug for TaskRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRouter")
            .field("classification", &self.classification.name())
            .field("regression", &self.regression.name())
            .field("forecasting", &self.forecasting.name())
            .field("clustering", &self.clustering.name())
            .field("anomaly", &self.anomaly.name())
            .finish()
    }
}

impl Default for TaskRouter {
    fn default() -> Self {
        let supervised: Arc<dyn PipelineStrategy> = Arc::new(SupervisedStrategy);
        Self {
            classification: Arc::clone(&supervised),
            regression: supervised,
            forecasting: Arc::new(ForecastingStrategy),
            clustering: Arc::new(ClusteringStrategy),
            anomaly: Arc::new(AnomalyStrategy),
        }
    }
}

impl TaskRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the strategy used for `task`.
    #[must_use]
    pub fn with_strategy(mut self, task: TaskType, strategy: Arc<dyn PipelineStrategy>) -> Self {
        match task {
            TaskType::Classification => self.classification = strategy,
            TaskType::Regression => self.regression = strategy,
            TaskType::Forecasting => self.forecasting = strategy,
            TaskType::Clustering => self.clustering = strategy,
            TaskType::Anomaly => self.anomaly = strategy,
        }
        self
    }

    #[must_use]
    pub fn strategy_for(&self, task: TaskType) -> &Arc<dyn PipelineStrategy> {
        match task {
            TaskType::Classification => &self.classification,
            TaskType::Regression => &self.regression,
            TaskType::Forecasting => &self.forecasting,
            TaskType::Clustering => &self.clustering,
            TaskType::Anomaly => &self.anomaly,
        }
    }

    pub async fn run(&self, ctx: &StrategyContext<'_>) -> Result<StrategyOutcome> {
        let strategy = self.strategy_for(ctx.config.task_type());
        debug!(job_id = %ctx.job_id, strategy = strategy.name(), "Dispatching job");
        strategy.run(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    #[async_trait]
    impl PipelineStrategy for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn run(&self, _ctx: &StrategyContext<'_>) -> Result<StrategyOutcome> {
            Err(crate::error::OrchestratorError::Cancelled)
        }
    }

    #[test]
    fn test_default_routes_supervised_tasks_together() {
        let router = TaskRouter::new();
        assert_eq!(router.strategy_for(TaskType::Classification).name(), "supervised");
        assert_eq!(router.strategy_for(TaskType::Regression).name(), "supervised");
        assert_eq!(router.strategy_for(TaskType::Forecasting).name(), "forecasting");
        assert_eq!(router.strategy_for(TaskType::Clustering).name(), "clustering");
        assert_eq!(router.strategy_for(TaskType::Anomaly).name(), "anomaly");
    }

    #[test]
    fn test_with_strategy_replaces_one_slot() {
        let router = TaskRouter::new().with_strategy(TaskType::Clustering, Arc::new(Fixed));
        assert_eq!(router.strategy_for(TaskType::Clustering).name(), "fixed");
        assert_eq!(router.strategy_for(TaskType::Anomaly).name(), "anomaly");
    }
}
