//! Jobs command implementation.

use anyhow::Context;
use chrono::{DateTime, Local, Utc};
use colored::Colorize;
use serde::Serialize;
use std::path::Path;
use strata_training::discover_jobs;

/// One line of the job listing.
#[derive(Debug, Serialize)]
struct JobRow {
    job_id: String,
    task_type: String,
    best_model: String,
    eval_metric: Option<String>,
    best_score: Option<f64>,
    n_rows: usize,
    created_at: DateTime<Utc>,
}

/// Execute the jobs command.
///
/// Lists every job with a `metadata.json` under the artifacts root, newest first.
pub fn execute(config: Option<&Path>, json_output: bool) -> anyhow::Result<()> {
    let engine = super::load_engine(config)?;
    let layout = engine.layout();
    let jobs = discover_jobs(&layout)
        .with_context(|| format!("Failed to scan jobs under {}", layout.root().display()))?;

    let rows: Vec<JobRow> = jobs
        .into_iter()
        .map(|job| JobRow {
            job_id: job.metadata.job_id.to_string(),
            task_type: job.metadata.task_type.to_string(),
            best_model: job.metadata.best_model,
            eval_metric: job.metadata.eval_metric,
            best_score: job.metadata.best_score,
            n_rows: job.metadata.n_rows,
            created_at: job.metadata.created_at,
        })
        .collect();

    if json_output {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("{}", format!("No jobs found under {}", layout.root().display()).yellow());
        return Ok(());
    }

    println!("{}", format!("Jobs ({})", rows.len()).bold().cyan());
    println!();
    println!(
        "  {:<44} {:<15} {:<24} {:>10}  {}",
        "ID".bold(),
        "TASK".bold(),
        "BEST MODEL".bold(),
        "SCORE".bold(),
        "CREATED".bold()
    );
    for row in &rows {
        println!(
            "  {:<44} {:<15} {:<24} {:>10}  {}",
            row.job_id.cyan(),
            row.task_type,
            row.best_model,
            super::format_score(row.best_score),
            row.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
    }
    Ok(())
}
