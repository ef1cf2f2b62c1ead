//! Predict command implementation.
//!
//! Prints CSV to stdout: `row,prediction` followed by one `proba_<label>` column per
//! class for classifiers.

use anyhow::{Context, bail};
use std::path::Path;
use strata_training::loader::read_csv;
use strata_training::{JobId, NativeBackend, TargetValue, TrainingBackend, find_job, format_number};
use tracing::info;

/// Execute the predict command.
pub fn execute(job_id: &str, data: &Path, config: Option<&Path>) -> anyhow::Result<()> {
    let engine = super::load_engine(config)?;
    let job = find_job(&engine.layout(), &JobId::from(job_id)).with_context(|| format!("Job '{job_id}' not found"))?;
    let Some(model_path) = job.model_path() else {
        bail!("Job '{job_id}' has no saved model");
    };

    let backend = NativeBackend::new();
    let predictor = backend
        .load_predictor(&model_path)
        .with_context(|| format!("Failed to load model for job '{job_id}'"))?;
    let frame = read_csv(data).with_context(|| format!("Failed to read {}", data.display()))?;
    info!(job_id, model = predictor.model_name(), rows = frame.n_rows(), "Scoring rows");

    let predictions = predictor.predict(&frame).context("Prediction failed")?;
    let probabilities = predictor.predict_proba(&frame).context("Prediction failed")?;
    let labels = predictor.class_labels().unwrap_or_default();

    let mut header = vec!["row".to_string(), "prediction".to_string()];
    if probabilities.is_some() {
        header.extend(labels.iter().map(|l| format!("proba_{l}")));
    }
    println!("{}", header.join(","));

    for (row, prediction) in predictions.iter().enumerate() {
        let mut line = vec![
            row.to_string(),
            match prediction {
                TargetValue::Label(label) => label.clone(),
                TargetValue::Value(value) => format_number(*value),
            },
        ];
        if let Some(proba) = probabilities.as_ref().and_then(|p| p.get(row)) {
            line.extend(proba.iter().map(|p| format_number(*p)));
        }
        println!("{}", line.join(","));
    }
    Ok(())
}
