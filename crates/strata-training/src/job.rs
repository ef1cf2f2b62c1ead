use crate::error::{TrainingError, TrainingResult};
use crate::loader::DataReference;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Identifier for a training job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    /// Generates `<task>_<YYYYMMDD_HHMMSS>_<8 hex>`.
    #[must_use]
    pub fn generate(task: TaskType) -> Self {
        let token = Uuid::new_v4().simple().to_string();
        Self(format!("{}_{}_{}", task.as_str(), Utc::now().format("%Y%m%d_%H%M%S"), &token[..8]))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Classification,
    Regression,
    Forecasting,
    Clustering,
    Anomaly,
}

impl TaskType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::Regression => "regression",
            Self::Forecasting => "forecasting",
            Self::Clustering => "clustering",
            Self::Anomaly => "anomaly",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classification" => Ok(Self::Classification),
            "regression" => Ok(Self::Regression),
            "forecasting" | "forecast" => Ok(Self::Forecasting),
            "clustering" => Ok(Self::Clustering),
            "anomaly" | "anomaly_detection" => Ok(Self::Anomaly),
            other => Err(TrainingError::InvalidConfig(format!("unsupported task type '{other}'"))),
        }
    }
}

/// Concrete supervised problem handed to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemType {
    Binary,
    Multiclass,
    Regression,
}

impl ProblemType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Multiclass => "multiclass",
            Self::Regression => "regression",
        }
    }

    #[must_use]
    pub fn is_classification(self) -> bool {
        !matches!(self, Self::Regression)
    }
}

impl std::fmt::Display for ProblemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named time/quality budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Quick,
    #[default]
    Balanced,
    Thorough,
}

impl Preset {
    #[must_use]
    pub fn time_limit(self) -> Duration {
        match self {
            Self::Quick => Duration::from_secs(60),
            Self::Balanced => Duration::from_secs(300),
            Self::Thorough => Duration::from_secs(1800),
        }
    }

    /// Maximum number of candidate models searched; `None` means every family.
    #[must_use]
    pub fn max_models(self) -> Option<usize> {
        match self {
            Self::Quick => Some(2),
            Self::Balanced => Some(4),
            Self::Thorough => None,
        }
    }
}

impl FromStr for Preset {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quick" => Ok(Self::Quick),
            "balanced" => Ok(Self::Balanced),
            "thorough" => Ok(Self::Thorough),
            other => Err(TrainingError::InvalidConfig(format!("unknown preset '{other}'"))),
        }
    }
}

/// Resolved search budget passed to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchBudget {
    pub time_limit: Duration,
    pub max_models: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupervisedParams {
    /// Pins the problem type; `None` auto-detects from the target column.
    #[serde(default)]
    pub problem_type: Option<ProblemType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastParams {
    #[serde(default = "default_horizon")]
    pub horizon: usize,
    #[serde(default)]
    pub time_column: Option<String>,
    #[serde(default)]
    pub id_column: Option<String>,
}

fn default_horizon() -> usize {
    10
}

impl Default for ForecastParams {
    fn default() -> Self {
        Self { horizon: default_horizon(), time_column: None, id_column: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ClusterAlgorithm {
    #[default]
    KMeans,
    Dbscan { eps: f64, min_samples: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusteringParams {
    /// Fixed cluster count; `None` selects one by silhouette.
    #[serde(default)]
    pub n_clusters: Option<usize>,
    #[serde(default)]
    pub algorithm: ClusterAlgorithm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyParams {
    #[serde(default = "default_contamination")]
    pub contamination: f64,
}

fn default_contamination() -> f64 {
    0.1
}

impl Default for AnomalyParams {
    fn default() -> Self {
        Self { contamination: default_contamination() }
    }
}

/// Task kind plus the parameters only that kind uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task_type", rename_all = "snake_case")]
pub enum TaskSpec {
    Classification(SupervisedParams),
    Regression(SupervisedParams),
    Forecasting(ForecastParams),
    Clustering(ClusteringParams),
    Anomaly(AnomalyParams),
}

impl TaskSpec {
    #[must_use]
    pub fn task_type(&self) -> TaskType {
        match self {
            Self::Classification(_) => TaskType::Classification,
            Self::Regression(_) => TaskType::Regression,
            Self::Forecasting(_) => TaskType::Forecasting,
            Self::Clustering(_) => TaskType::Clustering,
            Self::Anomaly(_) => TaskType::Anomaly,
        }
    }

    /// Default parameters for a task type.
    #[must_use]
    pub fn for_task(task: TaskType) -> Self {
        match task {
            TaskType::Classification => Self::Classification(SupervisedParams::default()),
            TaskType::Regression => Self::Regression(SupervisedParams::default()),
            TaskType::Forecasting => Self::Forecasting(ForecastParams::default()),
            TaskType::Clustering => Self::Clustering(ClusteringParams::default()),
            TaskType::Anomaly => Self::Anomaly(AnomalyParams::default()),
        }
    }

    fn validate(&self) -> TrainingResult<()> {
        match self {
            Self::Classification(p) => {
                if p.problem_type == Some(ProblemType::Regression) {
                    return Err(TrainingError::InvalidConfig(
                        "classification task cannot pin problem_type=regression".to_string(),
                    ));
                }
            }
            Self::Regression(p) => {
                if p.problem_type.is_some_and(ProblemType::is_classification) {
                    return Err(TrainingError::InvalidConfig(
                        "regression task can only pin problem_type=regression".to_string(),
                    ));
                }
            }
            Self::Forecasting(p) => {
                if p.horizon == 0 {
                    return Err(TrainingError::InvalidConfig("forecast horizon must be >= 1".to_string()));
                }
            }
            Self::Clustering(p) => {
                if let Some(k) = p.n_clusters {
                    if !(2..=50).contains(&k) {
                        return Err(TrainingError::InvalidConfig(format!(
                            "n_clusters must be between 2 and 50, got {k}"
                        )));
                    }
                }
                if let ClusterAlgorithm::Dbscan { eps, min_samples } = p.algorithm {
                    if !eps.is_finite() || eps <= 0.0 {
                        return Err(TrainingError::InvalidConfig("dbscan eps must be > 0".to_string()));
                    }
                    if min_samples == 0 {
                        return Err(TrainingError::InvalidConfig("dbscan min_samples must be >= 1".to_string()));
                    }
                }
            }
            Self::Anomaly(p) => {
                if !(p.contamination > 0.0 && p.contamination <= 0.5) {
                    return Err(TrainingError::InvalidConfig(format!(
                        "contamination must be in (0, 0.5], got {}",
                        p.contamination
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Immutable description of what to train.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub job_name: Option<String>,
    pub task: TaskSpec,
    #[serde(default)]
    pub target_column: Option<String>,
    pub data: DataReference,
    #[serde(default)]
    pub preset: Preset,
    #[serde(default)]
    pub time_limit_secs: Option<u64>,
    #[serde(default)]
    pub excluded_columns: Vec<String>,
    #[serde(default)]
    pub allowed_features: Option<Vec<String>>,
    #[serde(default)]
    pub eval_metric: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl JobConfig {
    #[must_use]
    pub fn builder(task: TaskSpec, data: DataReference) -> JobConfigBuilder {
        JobConfigBuilder::new(task, data)
    }

    #[must_use]
    pub fn task_type(&self) -> TaskType {
        self.task.task_type()
    }

    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.target_column.as_deref()
    }

    #[must_use]
    pub fn budget(&self) -> SearchBudget {
        SearchBudget {
            time_limit: self
                .time_limit_secs
                .map_or_else(|| self.preset.time_limit(), Duration::from_secs),
            max_models: self.preset.max_models(),
        }
    }

    /// Columns that always survive feature selection: target, time and series id.
    #[must_use]
    pub fn protected_columns(&self) -> Vec<&str> {
        let mut cols: Vec<&str> = self.target().into_iter().collect();
        if let TaskSpec::Forecasting(p) = &self.task {
            cols.extend(p.time_column.as_deref());
            cols.extend(p.id_column.as_deref());
        }
        cols
    }

    /// Applies the inclusion rules to `columns`, preserving order.
    ///
    /// Protected columns are always kept; any other column is kept only if it is in the
    /// allow-list (when one is given) and not excluded.
    #[must_use]
    pub fn select_columns(&self, columns: &[String]) -> Vec<String> {
        let protected = self.protected_columns();
        columns
            .iter()
            .filter(|c| {
                if protected.contains(&c.as_str()) {
                    return true;
                }
                let allowed = self.allowed_features.as_ref().is_none_or(|list| list.contains(*c));
                allowed && !self.excluded_columns.contains(*c)
            })
            .cloned()
            .collect()
    }

    pub fn validate(&self) -> TrainingResult<()> {
        self.task.validate()?;

        if self.data.is_blank() {
            return Err(TrainingError::InvalidConfig("data reference is required".to_string()));
        }

        match self.target() {
            Some(t) if t.trim().is_empty() => {
                return Err(TrainingError::InvalidConfig("target_column must not be blank".to_string()));
            }
            None if self.task_type() != TaskType::Clustering => {
                return Err(TrainingError::InvalidConfig(format!(
                    "target_column is required for {} jobs",
                    self.task_type()
                )));
            }
            _ => {}
        }

        if let Some(name) = &self.job_name {
            let valid = !name.is_empty()
                && name.len() <= 64
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !valid {
                return Err(TrainingError::InvalidConfig(format!(
                    "job_name '{name}' must be 1-64 characters of [A-Za-z0-9_-]"
                )));
            }
        }

        if self.time_limit_secs == Some(0) {
            return Err(TrainingError::InvalidConfig("time_limit_secs must be > 0".to_string()));
        }

        if let Some(allowed) = &self.allowed_features {
            if allowed.is_empty() {
                return Err(TrainingError::InvalidConfig(
                    "allowed_features must not be empty when provided".to_string(),
                ));
            }
        }

        if let Some(target) = self.target() {
            if self.excluded_columns.iter().any(|c| c == target) {
                return Err(TrainingError::InvalidConfig(format!(
                    "target column '{target}' cannot be excluded"
                )));
            }
        }

        Ok(())
    }
}

/// Fluent builder that validates on [`JobConfigBuilder::build`].
#[derive(Debug, Clone)]
pub struct JobConfigBuilder {
    config: JobConfig,
}

impl JobConfigBuilder {
    #[must_use]
    pub fn new(task: TaskSpec, data: DataReference) -> Self {
        Self {
            config: JobConfig {
                job_name: None,
                task,
                target_column: None,
                data,
                preset: Preset::default(),
                time_limit_secs: None,
                excluded_columns: Vec::new(),
                allowed_features: None,
                eval_metric: None,
                tags: BTreeMap::new(),
            },
        }
    }

    #[must_use]
    pub fn target(mut self, column: impl Into<String>) -> Self {
        self.config.target_column = Some(column.into());
        self
    }

    #[must_use]
    pub fn preset(mut self, preset: Preset) -> Self {
        self.config.preset = preset;
        self
    }

    #[must_use]
    pub fn time_limit_secs(mut self, secs: u64) -> Self {
        self.config.time_limit_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn exclude(mut self, column: impl Into<String>) -> Self {
        self.config.excluded_columns.push(column.into());
        self
    }

    #[must_use]
    pub fn allowed_features<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allowed_features = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn eval_metric(mut self, metric: impl Into<String>) -> Self {
        self.config.eval_metric = Some(metric.into());
        self
    }

    #[must_use]
    pub fn job_name(mut self, name: impl Into<String>) -> Self {
        self.config.job_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.tags.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> TrainingResult<JobConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> DataReference {
        DataReference::named("frame")
    }

    #[test]
    fn test_target_required_except_clustering() {
        let err = JobConfig::builder(TaskSpec::for_task(TaskType::Classification), data()).build();
        assert!(matches!(err, Err(TrainingError::InvalidConfig(_))));

        let ok = JobConfig::builder(TaskSpec::for_task(TaskType::Clustering), data()).build();
        assert!(ok.is_ok());

        let err = JobConfig::builder(TaskSpec::for_task(TaskType::Anomaly), data()).build();
        assert!(err.is_err());
    }

    #[test]
    fn test_task_params_validated() {
        let bad_horizon = TaskSpec::Forecasting(ForecastParams { horizon: 0, ..Default::default() });
        assert!(JobConfig::builder(bad_horizon, data()).target("y").build().is_err());

        let bad_k = TaskSpec::Clustering(ClusteringParams { n_clusters: Some(1), ..Default::default() });
        assert!(JobConfig::builder(bad_k, data()).build().is_err());

        let bad_contamination = TaskSpec::Anomaly(AnomalyParams { contamination: 0.9 });
        assert!(JobConfig::builder(bad_contamination, data()).target("y").build().is_err());

        let pinned = TaskSpec::Regression(SupervisedParams { problem_type: Some(ProblemType::Binary) });
        assert!(JobConfig::builder(pinned, data()).target("y").build().is_err());
    }

    #[test]
    fn test_job_name_charset() {
        let cfg = JobConfig::builder(TaskSpec::for_task(TaskType::Regression), data())
            .target("y")
            .job_name("../escape")
            .build();
        assert!(cfg.is_err());

        let cfg = JobConfig::builder(TaskSpec::for_task(TaskType::Regression), data())
            .target("y")
            .job_name("churn-v2_final")
            .build();
        assert!(cfg.is_ok());
    }

    #[test]
    fn test_select_columns_applies_rules() {
        let cfg = JobConfig::builder(
            TaskSpec::Forecasting(ForecastParams {
                horizon: 3,
                time_column: Some("ts".to_string()),
                id_column: Some("store".to_string()),
            }),
            data(),
        )
        .target("sales")
        .allowed_features(["price", "promo", "ts"])
        .exclude("promo")
        .exclude("store")
        .build()
        .unwrap();

        let columns: Vec<String> =
            ["ts", "store", "sales", "price", "promo", "weather"].iter().map(ToString::to_string).collect();
        assert_eq!(cfg.select_columns(&columns), vec!["ts", "store", "sales", "price"]);
    }

    #[test]
    fn test_budget_uses_override() {
        let cfg = JobConfig::builder(TaskSpec::for_task(TaskType::Regression), data())
            .target("y")
            .preset(Preset::Quick)
            .time_limit_secs(5)
            .build()
            .unwrap();
        let budget = cfg.budget();
        assert_eq!(budget.time_limit, Duration::from_secs(5));
        assert_eq!(budget.max_models, Some(2));
    }

    #[test]
    fn test_generated_job_id_shape() {
        let id = JobId::generate(TaskType::Anomaly);
        assert!(id.as_str().starts_with("anomaly_"));
        assert_eq!(id.as_str().rsplit('_').next().unwrap().len(), 8);
    }

    #[test]
    fn test_task_spec_serde_tagging() {
        let json = r#"{"task_type":"anomaly","contamination":0.05}"#;
        let spec: TaskSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec, TaskSpec::Anomaly(AnomalyParams { contamination: 0.05 }));
    }
}
