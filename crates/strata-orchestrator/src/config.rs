//! Engine configuration.
//!
//! Loaded from an optional TOML file, then overridden by `STRATA_*` environment
//! variables (e.g. `STRATA_LOG_CAPACITY=100`).

use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strata_training::ArtifactLayout;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "STRATA";

/// Process-wide settings for the orchestration engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root directory of per-job artifact directories.
    pub artifacts_root: PathBuf,
    /// Number of log lines kept per job.
    pub log_capacity: usize,
    /// Prediction rows copied into a job result.
    pub prediction_sample_size: usize,
    /// Forecast points copied into a job result.
    pub forecast_points_limit: usize,
    /// Share of rows held out to evaluate supervised models.
    pub holdout_fraction: f64,
    /// Seed for splits and model randomness.
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            artifacts_root: PathBuf::from(".strata").join("artifacts").join("jobs"),
            log_capacity: 50,
            prediction_sample_size: 100,
            forecast_points_limit: 500,
            holdout_fraction: 0.2,
            seed: 42,
        }
    }
}

impl EngineConfig {
    /// Default settings with artifacts under `root`.
    #[must_use]
    pub fn with_artifacts_root(root: impl Into<PathBuf>) -> Self {
        Self { artifacts_root: root.into(), ..Self::default() }
    }

    /// Load configuration from an optional TOML file and the environment.
    ///
    /// # Arguments
    /// * `path` - Config file; when `None` only defaults and environment apply
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder
                .add_source(::config::File::from(path).format(::config::FileFormat::Toml).required(true));
        }
        let settings = builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text, without environment overrides.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| OrchestratorError::Configuration(format!("invalid engine config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.log_capacity == 0 {
            return Err(OrchestratorError::Configuration("log_capacity must be at least 1".to_string()));
        }
        if !(self.holdout_fraction > 0.0 && self.holdout_fraction < 1.0) {
            return Err(OrchestratorError::Configuration(format!(
                "holdout_fraction must be in (0, 1), got {}",
                self.holdout_fraction
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn layout(&self) -> ArtifactLayout {
        ArtifactLayout::new(self.artifacts_root.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.log_capacity, 50);
        assert_eq!(config.prediction_sample_size, 100);
        assert!(config.artifacts_root.ends_with("jobs"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str("log_capacity = 5\nseed = 7\n").unwrap();
        assert_eq!(config.log_capacity, 5);
        assert_eq!(config.seed, 7);
        assert_eq!(config.forecast_points_limit, 500);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(EngineConfig::from_toml_str("log_capacity = 0").is_err());
        assert!(EngineConfig::from_toml_str("holdout_fraction = 1.5").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("strata.toml");
        std::fs::write(&path, "prediction_sample_size = 10\nartifacts_root = \"/tmp/strata-jobs\"\n").unwrap();

        let config = EngineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.prediction_sample_size, 10);
        assert_eq!(config.artifacts_root, PathBuf::from("/tmp/strata-jobs"));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let temp = TempDir::new().unwrap();
        let err = EngineConfig::load(Some(&temp.path().join("absent.toml")));
        assert!(matches!(err, Err(OrchestratorError::Config(_))));
    }
}
