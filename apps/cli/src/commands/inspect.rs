//! Inspect command implementation.

use anyhow::Context;
use colored::Colorize;
use serde_json::json;
use std::path::Path;
use strata_training::artifacts::sha256_file;
use strata_training::{JobId, find_job};

/// Checksum state of one artifact on disk.
fn verify(path: &Path, expected: &str) -> &'static str {
    match sha256_file(path) {
        Ok(actual) if actual == expected => "ok",
        Ok(_) => "modified",
        Err(_) => "missing",
    }
}

/// Execute the inspect command.
///
/// Prints the job's metadata and re-hashes each recorded artifact.
pub fn execute(job_id: &str, config: Option<&Path>, json_output: bool) -> anyhow::Result<()> {
    let engine = super::load_engine(config)?;
    let job = find_job(&engine.layout(), &JobId::from(job_id)).with_context(|| format!("Job '{job_id}' not found"))?;
    let meta = &job.metadata;

    if json_output {
        let artifacts: Vec<_> = meta
            .artifacts
            .iter()
            .map(|a| {
                json!({
                    "kind": a.kind,
                    "path": a.path,
                    "sha256": a.sha256,
                    "state": verify(&a.path, &a.sha256),
                })
            })
            .collect();
        let mut out = serde_json::to_value(meta)?;
        out["artifacts"] = json!(artifacts);
        out["job_dir"] = json!(job.job_dir);
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{}", format!("Job {}", meta.job_id).bold().cyan());
    println!("  Directory:   {}", job.job_dir.display());
    println!("  Created:     {}", meta.created_at.to_rfc3339());
    println!("  Task:        {}", meta.task_type);
    if let Some(problem) = meta.problem_type {
        println!("  Problem:     {problem}");
    }
    if let Some(target) = &meta.target_column {
        println!("  Target:      {target}");
    }
    println!("  Rows:        {}", meta.n_rows);
    println!("  Features:    {}", meta.features.join(", "));
    println!("  Best model:  {}", meta.best_model.bold());
    if let Some(metric) = &meta.eval_metric {
        println!("  {:<12} {}", format!("{metric}:"), super::format_score(meta.best_score).green());
    }
    if !meta.tags.is_empty() {
        println!("  Tags:        {}", meta.tags.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(", "));
    }

    println!();
    println!("{}", "Artifacts:".bold());
    for artifact in &meta.artifacts {
        let state = match verify(&artifact.path, &artifact.sha256) {
            "ok" => "✓".green(),
            other => other.red(),
        };
        println!(
            "  {:<12} {}  {}",
            format!("{:?}", artifact.kind).to_lowercase(),
            artifact.path.display(),
            state
        );
        println!("  {:<12} sha256 {}", "", artifact.sha256.dimmed());
    }
    Ok(())
}
