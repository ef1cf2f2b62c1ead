use crate::artifacts::{ArtifactKind, JobMetadata, read_metadata};
use crate::error::{TrainingError, TrainingResult};
use crate::job::JobId;
use crate::layout::ArtifactLayout;
use std::path::PathBuf;

/// A job whose artifacts survive on disk.
#[derive(Debug, Clone)]
pub struct PersistedJob {
    pub job_dir: PathBuf,
    pub metadata: JobMetadata,
}

impl PersistedJob {
    /// Path of the saved model, if the job recorded one.
    #[must_use]
    pub fn model_path(&self) -> Option<PathBuf> {
        self.metadata
            .artifacts
            .iter()
            .find(|a| a.kind == ArtifactKind::Model)
            .map(|a| a.path.clone())
    }
}

/// Discover persisted jobs by scanning `<root>/*/metadata.json`, newest first.
pub fn discover_jobs(layout: &ArtifactLayout) -> TrainingResult<Vec<PersistedJob>> {
    let mut out = Vec::new();

    let dir = match std::fs::read_dir(layout.root()) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(e.into()),
    };

    for entry in dir {
        let job_dir = entry?.path();
        if !job_dir.is_dir() {
            continue;
        }
        let metadata_path = ArtifactLayout::metadata_path(&job_dir);
        if !metadata_path.exists() {
            continue;
        }
        let metadata = read_metadata(&metadata_path)?;
        out.push(PersistedJob { job_dir, metadata });
    }

    out.sort_by(|a, b| b.metadata.created_at.cmp(&a.metadata.created_at));
    Ok(out)
}

/// Load one persisted job by id.
pub fn find_job(layout: &ArtifactLayout, job_id: &JobId) -> TrainingResult<PersistedJob> {
    let job_dir = layout.job_dir(job_id);
    let metadata_path = ArtifactLayout::metadata_path(&job_dir);
    if !metadata_path.exists() {
        return Err(TrainingError::Artifact(format!("no persisted job '{job_id}' under {}", layout.root().display())));
    }
    Ok(PersistedJob { metadata: read_metadata(&metadata_path)?, job_dir })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{make_artifact, write_metadata};
    use crate::job::TaskType;
    use chrono::{Duration, Utc};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn persist(layout: &ArtifactLayout, id: &str, age_minutes: i64) {
        let job_id = JobId(id.to_string());
        let dir = layout.ensure_job_dir(&job_id).unwrap();
        let model = ArtifactLayout::model_path(&dir);
        std::fs::write(&model, "{}").unwrap();
        let metadata = JobMetadata {
            job_id,
            created_at: Utc::now() - Duration::minutes(age_minutes),
            task_type: TaskType::Regression,
            problem_type: None,
            target_column: Some("y".to_string()),
            features: vec!["x".to_string()],
            eval_metric: Some("r2".to_string()),
            best_model: "RidgeRegression".to_string(),
            best_score: Some(0.9),
            n_rows: 10,
            tags: BTreeMap::new(),
            artifacts: vec![make_artifact(ArtifactKind::Model, model).unwrap()],
        };
        write_metadata(&ArtifactLayout::metadata_path(&dir), &metadata).unwrap();
    }

    #[test]
    fn test_discover_missing_root_is_empty() {
        let temp = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(temp.path().join("nope"));
        assert!(discover_jobs(&layout).unwrap().is_empty());
    }

    #[test]
    fn test_discover_orders_newest_first_and_skips_bare_dirs() {
        let temp = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(temp.path().to_path_buf());
        persist(&layout, "old", 30);
        persist(&layout, "new", 1);
        std::fs::create_dir_all(temp.path().join("in-progress")).unwrap();

        let jobs = discover_jobs(&layout).unwrap();
        let ids: Vec<&str> = jobs.iter().map(|j| j.metadata.job_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert!(jobs[0].model_path().unwrap().ends_with("model.json"));
    }

    #[test]
    fn test_find_job() {
        let temp = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(temp.path().to_path_buf());
        persist(&layout, "present", 0);
        assert!(find_job(&layout, &JobId("present".to_string())).is_ok());
        assert!(matches!(
            find_job(&layout, &JobId("absent".to_string())),
            Err(TrainingError::Artifact(_))
        ));
    }
}
