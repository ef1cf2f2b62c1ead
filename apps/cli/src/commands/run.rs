//! Run command implementation.
//!
//! Submits a single job to an in-process orchestrator and follows it to a
//! terminal state. Ctrl-C requests cancellation instead of killing the process.

use anyhow::{Context, bail};
use clap::ValueEnum;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use strata_orchestrator::{JobProgress, JobResult, JobStatus, Orchestrator, PredictionRecord, TaskExtras};
use strata_training::{
    AnomalyParams, ClusterAlgorithm, ClusteringParams, CsvLoader, DataReference, ForecastParams, JobConfig, JobId,
    NativeBackend, Preset, TaskSpec, TaskType,
};

/// Rows of leaderboard, importance and prediction output shown in human mode.
const DISPLAY_ROWS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Algorithm {
    Kmeans,
    Dbscan,
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// CSV file with the training data
    pub data: PathBuf,

    /// Task type (classification, regression, forecasting, clustering, anomaly)
    #[arg(long)]
    pub task: TaskType,

    /// Column to predict; for clustering an optional label column to compare against
    #[arg(long)]
    pub target: Option<String>,

    /// Search budget preset (quick, balanced, thorough)
    #[arg(long)]
    pub preset: Option<Preset>,

    /// Evaluation metric or alias
    #[arg(long)]
    pub metric: Option<String>,

    /// Column to leave out of training (repeatable)
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Only train on these columns (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub features: Option<Vec<String>>,

    /// Forecast horizon in periods
    #[arg(long)]
    pub horizon: Option<usize>,

    /// Timestamp column for forecasting
    #[arg(long)]
    pub time_column: Option<String>,

    /// Series id column for forecasting several series
    #[arg(long)]
    pub id_column: Option<String>,

    /// Fixed number of clusters (selected automatically when omitted)
    #[arg(long)]
    pub clusters: Option<usize>,

    /// Clustering algorithm
    #[arg(long, value_enum, default_value = "kmeans")]
    pub algorithm: Algorithm,

    /// DBSCAN neighbourhood radius in standardized units
    #[arg(long, default_value_t = 0.5)]
    pub eps: f64,

    /// DBSCAN core point threshold
    #[arg(long, default_value_t = 5)]
    pub min_samples: usize,

    /// Expected share of anomalous rows
    #[arg(long)]
    pub contamination: Option<f64>,

    /// Job name, used as the job id
    #[arg(long)]
    pub name: Option<String>,

    /// Training time limit in seconds (overrides the preset)
    #[arg(long)]
    pub time_limit: Option<u64>,

    /// Engine config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print the final result as JSON
    #[arg(long)]
    pub json: bool,

    /// Status polling interval in milliseconds
    #[arg(long, default_value_t = 200)]
    pub poll_ms: u64,
}

impl RunArgs {
    fn task_spec(&self) -> TaskSpec {
        match self.task {
            TaskType::Forecasting => TaskSpec::Forecasting(ForecastParams {
                horizon: self.horizon.unwrap_or_else(|| ForecastParams::default().horizon),
                time_column: self.time_column.clone(),
                id_column: self.id_column.clone(),
            }),
            TaskType::Clustering => TaskSpec::Clustering(ClusteringParams {
                n_clusters: self.clusters,
                algorithm: match self.algorithm {
                    Algorithm::Kmeans => ClusterAlgorithm::KMeans,
                    Algorithm::Dbscan => ClusterAlgorithm::Dbscan { eps: self.eps, min_samples: self.min_samples },
                },
            }),
            TaskType::Anomaly => TaskSpec::Anomaly(AnomalyParams {
                contamination: self.contamination.unwrap_or_else(|| AnomalyParams::default().contamination),
            }),
            other => TaskSpec::for_task(other),
        }
    }

    fn job_config(&self) -> anyhow::Result<JobConfig> {
        let mut builder = JobConfig::builder(self.task_spec(), DataReference::file(&self.data))
            .tag("source", "cli");
        if let Some(target) = &self.target {
            builder = builder.target(target);
        }
        if let Some(preset) = self.preset {
            builder = builder.preset(preset);
        }
        if let Some(metric) = &self.metric {
            builder = builder.eval_metric(metric);
        }
        for column in &self.exclude {
            builder = builder.exclude(column);
        }
        if let Some(features) = &self.features {
            builder = builder.allowed_features(features.iter().map(|f| f.trim()).filter(|f| !f.is_empty()));
        }
        if let Some(name) = &self.name {
            builder = builder.job_name(name);
        }
        if let Some(secs) = self.time_limit {
            builder = builder.time_limit_secs(secs);
        }
        builder.build().context("Invalid job configuration")
    }
}

/// Execute the run command.
pub async fn execute(args: RunArgs) -> anyhow::Result<()> {
    let engine = super::load_engine(args.config.as_deref())?;
    let config = args.job_config()?;
    let orchestrator = Orchestrator::new(engine, Arc::new(NativeBackend::new()), Arc::new(CsvLoader));

    let submitted = orchestrator.submit(config).await.context("Failed to submit job")?;
    let job_id = submitted.job_id;
    if !args.json {
        println!("{} {}", "Submitted job".bold(), job_id.to_string().cyan());
    }

    let outcome = follow(&orchestrator, &job_id, args.json, Duration::from_millis(args.poll_ms.max(10))).await;
    let finished = match outcome {
        Ok(progress) => progress,
        Err(e) => {
            orchestrator.shutdown().await;
            return Err(e);
        }
    };

    let result = if finished.status == JobStatus::Completed {
        Some(orchestrator.get_results(&job_id).await.context("Failed to read job result")?)
    } else {
        None
    };
    orchestrator.shutdown().await;

    match result {
        Some(result) if args.json => println!("{}", serde_json::to_string_pretty(&*result)?),
        Some(result) => print_result(&result),
        None => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&finished)?);
            }
            bail!(
                "job {} finished with status {}{}",
                job_id,
                finished.status,
                finished.error.map(|e| format!(": {e}")).unwrap_or_default()
            );
        }
    }
    Ok(())
}

/// Polls the job until it is terminal, printing each change of step.
async fn follow(
    orchestrator: &Orchestrator,
    job_id: &JobId,
    quiet: bool,
    interval: Duration,
) -> anyhow::Result<JobProgress> {
    let mut last_step = String::new();
    let mut cancel_sent = false;
    loop {
        let progress = orchestrator.get_status(job_id).await.context("Failed to read job status")?;
        if !quiet && progress.current_step != last_step {
            println!(
                "  [{:>5.1}%] {:<10} {}",
                progress.progress_pct,
                progress.status.to_string().dimmed(),
                progress.current_step
            );
            last_step.clone_from(&progress.current_step);
        }
        if progress.status.is_terminal() {
            return Ok(progress);
        }

        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            signal = tokio::signal::ctrl_c(), if !cancel_sent => {
                signal.context("Failed to listen for Ctrl-C")?;
                let ack = orchestrator.cancel(job_id).await?;
                eprintln!("{}", ack.message.yellow());
                cancel_sent = true;
            }
        }
    }
}

fn print_result(result: &JobResult) {
    println!();
    println!("{}", "Job completed".bold().green());
    println!("  Job:          {}", result.job_id.to_string().cyan());
    println!("  Task:         {}", result.task_type);
    if let Some(problem) = result.problem_type {
        println!("  Problem:      {problem}");
    }
    if let Some(target) = &result.target_column {
        println!("  Target:       {target}");
    }
    println!("  Rows:         {}  Features: {}", result.n_rows, result.n_features);
    println!("  Best model:   {}", result.best_model.bold());
    println!("  {:<13} {}", format!("{}:", result.eval_metric), super::format_score(result.best_score).green());
    println!("  Training:     {:.2}s", result.training_seconds);

    if result.leaderboard.len() > 1 {
        println!();
        println!("{}", "Leaderboard:".bold());
        for (rank, entry) in result.leaderboard.iter().take(DISPLAY_ROWS).enumerate() {
            println!("  {:>2}. {:<32} {:>10.4}  ({:.2}s)", rank + 1, entry.model, entry.score, entry.fit_seconds);
        }
    }

    if !result.feature_importance.is_empty() {
        let mut ranked: Vec<(&String, &f64)> = result.feature_importance.iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(a.1));
        println!();
        println!("{}", "Feature importance:".bold());
        for (name, weight) in ranked.into_iter().take(DISPLAY_ROWS) {
            println!("  {:<24} {:>6.3}", name, weight);
        }
    }

    println!();
    print_extras(&result.extras);

    if !result.predictions.is_empty() {
        println!();
        println!("{}", "Predictions (first rows):".bold());
        for record in result.predictions.iter().take(DISPLAY_ROWS) {
            println!("  {}", describe_record(record));
        }
    }

    println!();
    println!("{}", "Artifacts:".bold());
    for artifact in &result.artifacts {
        println!("  {:<12} {}", format!("{:?}", artifact.kind).to_lowercase(), artifact.path.display());
    }
}

fn print_extras(extras: &TaskExtras) {
    match extras {
        TaskExtras::Classification { class_labels, confusion_matrix, .. } => {
            println!("{}", "Confusion matrix (rows = actual):".bold());
            println!("  {:<12} {}", "", class_labels.iter().map(|l| format!("{l:>8}")).collect::<String>());
            for (label, row) in class_labels.iter().zip(confusion_matrix) {
                println!("  {:<12} {}", label, row.iter().map(|c| format!("{c:>8}")).collect::<String>());
            }
        }
        TaskExtras::Regression { interval_half_width, .. } => {
            println!("  95% interval: ±{interval_half_width:.4}");
        }
        TaskExtras::Forecasting { horizon, n_series, forecast, total_points, .. } => {
            println!("{}", format!("Forecast ({n_series} series, horizon {horizon}, {total_points} points):").bold());
            for point in forecast.iter().take(DISPLAY_ROWS) {
                println!(
                    "  {:<12} {}  {:>10.3}  [{:.3}, {:.3}]",
                    point.series_id,
                    point.timestamp.format("%Y-%m-%d %H:%M"),
                    point.mean,
                    point.lower,
                    point.upper
                );
            }
        }
        TaskExtras::Clustering { algorithm, n_clusters, cluster_sizes, noise_points, adjusted_rand_index, .. } => {
            println!("{}", format!("{algorithm}: {n_clusters} clusters").bold());
            for (id, size) in cluster_sizes.iter().enumerate() {
                println!("  cluster {id:<4} {size} rows");
            }
            if *noise_points > 0 {
                println!("  noise        {noise_points} rows");
            }
            if let Some(ari) = adjusted_rand_index {
                println!("  Adjusted Rand index: {ari:.4}");
            }
        }
        TaskExtras::Anomaly { contamination, threshold, n_anomalies, roc_auc } => {
            println!(
                "{}",
                format!("{n_anomalies} anomalies at threshold {threshold:.4} (contamination {contamination})").bold()
            );
            if let Some(auc) = roc_auc {
                println!("  ROC AUC against labels: {auc:.4}");
            }
        }
    }
}

fn describe_record(record: &PredictionRecord) -> String {
    match record {
        PredictionRecord::Classification { row, actual, predicted, .. } => {
            format!("row {row:<5} actual={:<12} predicted={predicted}", actual.as_deref().unwrap_or("?"))
        }
        PredictionRecord::Regression { row, actual, predicted, lower, upper } => {
            let actual = actual.map_or_else(|| "?".to_string(), |a| format!("{a:.3}"));
            format!("row {row:<5} actual={actual:<10} predicted={predicted:.3} [{lower:.3}, {upper:.3}]")
        }
        PredictionRecord::Cluster { row, cluster } => format!("row {row:<5} cluster={cluster}"),
        PredictionRecord::Anomaly { row, score, is_anomaly } => {
            let flag = if *is_anomaly { "anomaly".red().to_string() } else { "normal".to_string() };
            format!("row {row:<5} score={score:.4} {flag}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        run: RunArgs,
    }

    fn parse(args: &[&str]) -> RunArgs {
        Harness::parse_from(std::iter::once("strata").chain(args.iter().copied())).run
    }

    #[test]
    fn test_dbscan_flags_build_params() {
        let args = parse(&["data.csv", "--task", "clustering", "--algorithm", "dbscan", "--eps", "0.8"]);
        let TaskSpec::Clustering(params) = args.task_spec() else { panic!("expected clustering") };
        assert_eq!(params.algorithm, ClusterAlgorithm::Dbscan { eps: 0.8, min_samples: 5 });
        assert_eq!(params.n_clusters, None);
    }

    #[test]
    fn test_features_split_on_commas() {
        let args = parse(&["data.csv", "--task", "regression", "--target", "y", "--features", "a,b", "--exclude", "id"]);
        let config = args.job_config().unwrap();
        assert_eq!(config.allowed_features, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(config.excluded_columns, vec!["id".to_string()]);
        assert_eq!(config.tags.get("source").map(String::as_str), Some("cli"));
    }

    #[test]
    fn test_missing_target_rejected_before_submit() {
        let args = parse(&["data.csv", "--task", "classification"]);
        assert!(args.job_config().is_err());
    }

    #[test]
    fn test_forecast_defaults_horizon() {
        let args = parse(&["sales.csv", "--task", "forecasting", "--target", "sales", "--id-column", "store"]);
        let TaskSpec::Forecasting(params) = args.task_spec() else { panic!("expected forecasting") };
        assert_eq!(params.horizon, ForecastParams::default().horizon);
        assert_eq!(params.id_column.as_deref(), Some("store"));
    }
}
