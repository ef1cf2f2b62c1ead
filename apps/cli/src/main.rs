//! Strata CLI - Command-line interface for the Strata job orchestration engine
//!
//! This CLI provides a `strata` command that trains models through an in-process
//! orchestrator and inspects the artifacts finished jobs leave on disk.

mod commands;

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use commands::{inspect, jobs, metric, predict, run};

/// Strata CLI - AutoML job orchestration
///
/// Submits training jobs for classification, regression, forecasting,
/// clustering and anomaly detection, follows their progress, and works with
/// the models they persist.
#[derive(Parser, Debug)]
#[command(name = "strata", author, version, about = "Strata - AutoML job orchestration")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a model on a CSV file
    ///
    /// Submits one job, prints progress until it finishes and then prints the
    /// result. Exits with an error when the job fails or is cancelled.
    Run(run::RunArgs),

    /// Print the canonical name of a metric alias
    Metric {
        /// Metric name or alias (e.g. "auc", "rmse")
        name: String,
    },

    /// List persisted jobs under the artifacts root
    Jobs {
        /// Engine config file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a persisted job's metadata and verify its artifacts
    Inspect {
        /// Job ID
        job_id: String,

        /// Engine config file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Score a CSV file with a persisted supervised model
    Predict {
        /// Job ID
        job_id: String,

        /// CSV file with the feature columns the model was trained on
        data: PathBuf,

        /// Engine config file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so `--json` output stays parseable.
    if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .without_time()
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .without_time()
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    let Some(command) = args.command else {
        Args::command().print_help()?;
        return Ok(());
    };

    match command {
        Command::Run(run_args) => run::execute(run_args).await?,
        Command::Metric { name } => metric::execute(&name),
        Command::Jobs { config, json } => jobs::execute(config.as_deref(), json)?,
        Command::Inspect { job_id, config, json } => inspect::execute(&job_id, config.as_deref(), json)?,
        Command::Predict { job_id, data, config } => predict::execute(&job_id, &data, config.as_deref())?,
    }

    Ok(())
}
