use crate::error::TrainingResult;
use crate::job::JobId;
use std::path::{Path, PathBuf};

/// Filesystem layout for job artifacts.
///
/// Default layout is under `.strata/artifacts/jobs/<job_id>/...`
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create a layout rooted in a workspace directory.
    #[must_use]
    pub fn for_workspace_root(workspace_root: &Path) -> Self {
        Self::new(workspace_root.join(".strata").join("artifacts").join("jobs"))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn job_dir(&self, job_id: &JobId) -> PathBuf {
        self.root.join(job_id.as_str())
    }

    #[must_use]
    pub fn model_path(workdir: &Path) -> PathBuf {
        workdir.join("model.json")
    }

    #[must_use]
    pub fn predictions_path(workdir: &Path) -> PathBuf {
        workdir.join("predictions.csv")
    }

    #[must_use]
    pub fn metadata_path(workdir: &Path) -> PathBuf {
        workdir.join("metadata.json")
    }

    pub fn ensure_job_dir(&self, job_id: &JobId) -> TrainingResult<PathBuf> {
        let dir = self.job_dir(job_id);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Removes a job directory. Missing directories are not an error.
    pub fn remove_job_dir(&self, job_id: &JobId) -> TrainingResult<bool> {
        match std::fs::remove_dir_all(self.job_dir(job_id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let temp = TempDir::new().unwrap();
        let layout = ArtifactLayout::for_workspace_root(temp.path());
        let id = JobId("job-1".to_string());

        assert!(layout.root().to_string_lossy().contains(".strata"));
        assert!(layout.job_dir(&id).ends_with("job-1"));
        assert!(ArtifactLayout::model_path(&layout.job_dir(&id)).ends_with("job-1/model.json"));
    }

    #[test]
    fn test_ensure_and_remove_job_dir() {
        let temp = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(temp.path().to_path_buf());
        let id = JobId("job-2".to_string());

        let dir = layout.ensure_job_dir(&id).unwrap();
        assert!(dir.is_dir());
        assert!(layout.remove_job_dir(&id).unwrap());
        assert!(!dir.exists());
        assert!(!layout.remove_job_dir(&id).unwrap());
    }
}
