use crate::error::{TrainingError, TrainingResult};
use crate::job::{JobId, ProblemType, TaskType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Model,
    Predictions,
    Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub sha256: String,
}

/// Audit record written next to a job's artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub job_id: JobId,
    pub created_at: DateTime<Utc>,
    pub task_type: TaskType,
    #[serde(default)]
    pub problem_type: Option<ProblemType>,
    #[serde(default)]
    pub target_column: Option<String>,
    pub features: Vec<String>,
    #[serde(default)]
    pub eval_metric: Option<String>,
    pub best_model: String,
    #[serde(default)]
    pub best_score: Option<f64>,
    pub n_rows: usize,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    pub artifacts: Vec<JobArtifact>,
}

/// Column-oriented prediction output written as CSV.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl PredictionTable {
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    pub fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn sha256_file(path: &Path) -> TrainingResult<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

pub fn make_artifact(kind: ArtifactKind, path: PathBuf) -> TrainingResult<JobArtifact> {
    if !path.exists() {
        return Err(TrainingError::Artifact(format!(
            "artifact path does not exist: {}",
            path.display()
        )));
    }

    let hash = sha256_file(&path)?;
    Ok(JobArtifact { kind, path, sha256: hash })
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> TrainingResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)
        .map_err(|e| TrainingError::Artifact(format!("failed to write {}: {e}", path.display())))
}

pub fn write_predictions(path: &Path, table: &PredictionTable) -> TrainingResult<()> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| TrainingError::Artifact(format!("failed to create {}: {e}", path.display())))?;
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_metadata(path: &Path, metadata: &JobMetadata) -> TrainingResult<()> {
    write_json(path, metadata)
}

pub fn read_metadata(path: &Path) -> TrainingResult<JobMetadata> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice::<JobMetadata>(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_make_artifact_requires_existing_file() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing.json");
        assert!(matches!(
            make_artifact(ArtifactKind::Model, missing),
            Err(TrainingError::Artifact(_))
        ));
    }

    #[test]
    fn test_metadata_round_trip_with_hashes() {
        let temp = TempDir::new().unwrap();
        let preds = temp.path().join("predictions.csv");
        let mut table = PredictionTable::new(vec!["row".to_string(), "prediction".to_string()]);
        table.push(vec!["0".to_string(), "yes".to_string()]);
        write_predictions(&preds, &table).unwrap();

        let artifact = make_artifact(ArtifactKind::Predictions, preds.clone()).unwrap();
        assert_eq!(artifact.sha256.len(), 64);
        assert_eq!(std::fs::read_to_string(&preds).unwrap(), "row,prediction\n0,yes\n");

        let meta = JobMetadata {
            job_id: JobId("job-1".to_string()),
            created_at: Utc::now(),
            task_type: TaskType::Classification,
            problem_type: Some(ProblemType::Binary),
            target_column: Some("churn".to_string()),
            features: vec!["tenure".to_string()],
            eval_metric: Some("accuracy".to_string()),
            best_model: "LogisticRegression".to_string(),
            best_score: Some(0.9),
            n_rows: 10,
            tags: BTreeMap::new(),
            artifacts: vec![artifact],
        };
        let path = temp.path().join("metadata.json");
        write_metadata(&path, &meta).unwrap();
        assert_eq!(read_metadata(&path).unwrap(), meta);
    }
}
