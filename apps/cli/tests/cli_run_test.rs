//! Integration tests for running jobs and working with their artifacts.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Writes an engine config that keeps artifacts inside the temp dir.
fn write_config(dir: &Path) -> PathBuf {
    let path = dir.join("strata.toml");
    let jobs = dir.join("jobs");
    std::fs::write(&path, format!("artifacts_root = \"{}\"\nlog_capacity = 20\n", jobs.display())).unwrap();
    path
}

/// Two numeric features, a noise column and a yes/no label driven by the first two.
fn write_churn_csv(dir: &Path) -> PathBuf {
    let mut csv = String::from("customer_id,tenure,charges,noise,churn\n");
    for i in 0..200 {
        let tenure = f64::from(i % 20);
        let charges = f64::from((i * 7) % 13) * 10.0;
        let noise = f64::from((i * 31) % 17);
        let churn = if tenure * 5.0 + charges < 90.0 { "yes" } else { "no" };
        writeln!(csv, "c{i},{tenure},{charges},{noise},{churn}").unwrap();
    }
    let path = dir.join("churn.csv");
    std::fs::write(&path, csv).unwrap();
    path
}

/// Three well separated blobs with a label column.
fn write_blobs_csv(dir: &Path) -> PathBuf {
    let mut csv = String::from("x,y,group\n");
    let centers = [(0.0, 0.0), (20.0, 20.0), (-20.0, 20.0)];
    for i in 0..150 {
        let (cx, cy) = centers[i % 3];
        let jitter = (i / 3) as f64 % 5.0 * 0.2;
        writeln!(csv, "{},{},g{}", cx + jitter, cy - jitter, i % 3).unwrap();
    }
    let path = dir.join("blobs.csv");
    std::fs::write(&path, csv).unwrap();
    path
}

fn strata() -> Command {
    let mut cmd = Command::cargo_bin("strata").unwrap();
    cmd.env_remove("STRATA_ARTIFACTS_ROOT").env_remove("CLICOLOR_FORCE").env("CLICOLOR", "0");
    cmd
}

fn run_churn(dir: &Path, config: &Path, name: &str) {
    let data = write_churn_csv(dir);
    strata()
        .arg("run")
        .arg(&data)
        .args(["--task", "classification", "--target", "churn", "--exclude", "customer_id"])
        .args(["--preset", "quick", "--name", name, "--json"])
        .arg("--config")
        .arg(config)
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("\"job_id\": \"{name}\"")))
        .stdout(predicate::str::contains("\"confusion_matrix\""));
}

#[test]
fn test_run_classification_json() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());
    run_churn(temp.path(), &config, "churn_cli");

    let job_dir = temp.path().join("jobs").join("churn_cli");
    assert!(job_dir.join("metadata.json").exists());
    assert!(job_dir.join("predictions.csv").exists());
}

#[test]
fn test_run_prints_progress_and_summary() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());
    let data = write_churn_csv(temp.path());

    strata()
        .arg("run")
        .arg(&data)
        .args(["--task", "classification", "--target", "churn", "--preset", "quick"])
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Submitted job classification_"))
        .stdout(predicate::str::contains("Job completed"))
        .stdout(predicate::str::contains("Confusion matrix"))
        .stdout(predicate::str::contains("100.0%"));
}

#[test]
fn test_jobs_lists_persisted_job() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());
    run_churn(temp.path(), &config, "listed_job");

    strata()
        .arg("jobs")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("listed_job"))
        .stdout(predicate::str::contains("classification"));
}

#[test]
fn test_jobs_empty_root() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());

    strata()
        .args(["jobs", "--json", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn test_inspect_verifies_checksums() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());
    run_churn(temp.path(), &config, "inspected");

    strata()
        .args(["inspect", "inspected", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Job inspected"))
        .stdout(predicate::str::contains("Target:      churn"))
        .stdout(predicate::str::contains("modified").not());

    // Tampering with the predictions file is detected.
    let predictions = temp.path().join("jobs").join("inspected").join("predictions.csv");
    std::fs::write(&predictions, "row\n0\n").unwrap();
    strata()
        .args(["inspect", "inspected", "--json", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"state\": \"modified\""));
}

#[test]
fn test_inspect_unknown_job_fails() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());

    strata()
        .args(["inspect", "nope", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Job 'nope' not found"));
}

#[test]
fn test_predict_with_saved_model() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());
    run_churn(temp.path(), &config, "scorer");

    let fresh = temp.path().join("fresh.csv");
    std::fs::write(&fresh, "customer_id,tenure,charges,noise\nn1,1,10,3\nn2,19,120,5\n").unwrap();

    let output = strata()
        .args(["predict", "scorer"])
        .arg(&fresh)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("row,prediction,proba_"));
    assert!(lines[1].starts_with("0,yes"));
    assert!(lines[2].starts_with("1,no"));
}

#[test]
fn test_run_clustering_recovers_blobs() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());
    let data = write_blobs_csv(temp.path());

    strata()
        .arg("run")
        .arg(&data)
        .args(["--task", "clustering", "--target", "group", "--clusters", "3", "--json"])
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"n_clusters\": 3"))
        .stdout(predicate::str::contains("KMeans(k=3)"));
}

#[test]
fn test_unknown_target_rejected_at_submit() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());
    let data = write_churn_csv(temp.path());

    strata()
        .arg("run")
        .arg(&data)
        .args(["--task", "classification", "--target", "missing"])
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("target column 'missing' not found"));
    assert!(!temp.path().join("jobs").exists() || std::fs::read_dir(temp.path().join("jobs")).unwrap().count() == 0);
}

#[test]
fn test_failed_job_exits_nonzero() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());
    let data = temp.path().join("constant.csv");
    let mut csv = String::from("x,label\n");
    for i in 0..20 {
        writeln!(csv, "{i},same").unwrap();
    }
    std::fs::write(&data, csv).unwrap();

    strata()
        .arg("run")
        .arg(&data)
        .args(["--task", "classification", "--target", "label"])
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("finished with status FAILED"));
}

#[test]
fn test_invalid_contamination_rejected() {
    let temp = TempDir::new().unwrap();
    let data = write_churn_csv(temp.path());

    strata()
        .arg("run")
        .arg(&data)
        .args(["--task", "anomaly", "--target", "churn", "--contamination", "0.9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("contamination"));
}
