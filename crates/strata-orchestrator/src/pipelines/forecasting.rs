//! Forecasting strategy.

use super::finite;
use crate::error::{OrchestratorError, Result};
use crate::lifecycle::JobStatus;
use crate::result::TaskExtras;
use crate::router::{PipelineStrategy, StrategyContext, StrategyOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use strata_training::metrics::DEFAULT_FORECAST_METRIC;
use strata_training::{
    Column, ColumnKind, ForecastRequest, Frame, PredictionTable, Series, TaskSpec, format_number, resolve_metric,
};

/// Series id used when the job names no id column.
const SINGLE_SERIES_ID: &str = "series";

#[derive(Debug, Default, Clone, Copy)]
pub struct ForecastingStrategy;

/// Explicit time column, else the first timestamp-typed column.
fn resolve_time_column(frame: &Frame, explicit: Option<&str>) -> Result<String> {
    if let Some(name) = explicit {
        return Ok(name.to_string());
    }
    frame
        .columns()
        .iter()
        .find(|c| c.kind() == ColumnKind::Timestamp)
        .map(|c| c.name.clone())
        .ok_or_else(|| {
            OrchestratorError::Configuration(
                "forecasting needs a time column; none was given and no timestamp column was found".to_string(),
            )
        })
}

/// Numeric time values are read as Unix seconds.
fn time_at(column: &Column, row: usize) -> Option<DateTime<Utc>> {
    match column.kind() {
        ColumnKind::Timestamp => column.as_timestamp(row),
        ColumnKind::Numeric => column.as_f64(row).and_then(|secs| DateTime::from_timestamp(secs as i64, 0)),
        ColumnKind::Text => None,
    }
}

/// Groups rows into series sorted by time. Rows missing a time, value or id are skipped.
fn build_series(frame: &Frame, time: &str, target: &str, id: Option<&str>) -> Result<(Vec<Series>, usize)> {
    let time_column = frame.require_column(time)?;
    let target_column = frame.require_column(target)?;
    if target_column.kind() != ColumnKind::Numeric {
        return Err(OrchestratorError::Configuration(format!(
            "forecast target '{target}' must be numeric"
        )));
    }
    let id_column = id.map(|name| frame.require_column(name)).transpose()?;

    let mut groups: BTreeMap<String, Vec<(DateTime<Utc>, f64)>> = BTreeMap::new();
    let mut used = 0;
    for row in 0..frame.n_rows() {
        let Some(at) = time_at(time_column, row) else { continue };
        let Some(value) = target_column.as_f64(row).filter(|v| v.is_finite()) else { continue };
        let key = match id_column {
            Some(col) => match col.value_key(row) {
                Some(key) => key,
                None => continue,
            },
            None => SINGLE_SERIES_ID.to_string(),
        };
        groups.entry(key).or_default().push((at, value));
        used += 1;
    }

    let series = groups
        .into_iter()
        .map(|(id, mut points)| {
            points.sort_by_key(|(at, _)| *at);
            let (timestamps, values) = points.into_iter().unzip();
            Series { id, timestamps, values }
        })
        .collect();
    Ok((series, used))
}

#[async_trait]
impl PipelineStrategy for ForecastingStrategy {
    fn name(&self) -> &'static str {
        "forecasting"
    }

    async fn run(&self, ctx: &StrategyContext<'_>) -> Result<StrategyOutcome> {
        let TaskSpec::Forecasting(params) = &ctx.config.task else {
            return Err(OrchestratorError::Configuration(format!(
                "forecasting pipeline cannot run a {} job",
                ctx.config.task_type()
            )));
        };
        let target = ctx
            .config
            .target()
            .ok_or_else(|| OrchestratorError::Configuration("target_column is required".to_string()))?;

        let time_column = resolve_time_column(ctx.frame, params.time_column.as_deref())?;
        let (series, n_rows) = build_series(ctx.frame, &time_column, target, params.id_column.as_deref())?;
        if series.is_empty() {
            return Err(OrchestratorError::Configuration(format!(
                "no rows with both '{time_column}' and '{target}' present"
            )));
        }
        let n_series = series.len();
        ctx.tracker
            .checkpoint(15.0, &format!("Built {n_series} series from {n_rows} rows on '{time_column}'"))
            .await?;

        let eval_metric = resolve_metric(ctx.config.eval_metric.as_deref().unwrap_or(DEFAULT_FORECAST_METRIC));
        ctx.tracker
            .advance(JobStatus::Training, 20.0, &format!("Forecasting {} steps ahead", params.horizon))
            .await?;

        let request = ForecastRequest {
            series,
            horizon: params.horizon,
            eval_metric: eval_metric.clone(),
            budget: ctx.config.budget(),
        };
        let forwarder = ctx.tracker.progress_forwarder(20.0, 70.0);
        let fit = ctx.session.fit_forecast(request, forwarder.sink()).await;
        forwarder.finish().await;
        let fit = fit?;

        ctx.tracker
            .advance(JobStatus::Evaluating, 75.0, &format!("Collecting forecast from {}", fit.best_model))
            .await?;

        let mut table = PredictionTable::new(
            ["series_id", "timestamp", "mean", "lower", "upper"].iter().map(ToString::to_string).collect(),
        );
        for point in &fit.forecast {
            table.push(vec![
                point.series_id.clone(),
                point.timestamp.to_rfc3339(),
                format_number(point.mean),
                format_number(point.lower),
                format_number(point.upper),
            ]);
        }
        let total_points = fit.forecast.len();
        let forecast = fit.forecast.into_iter().take(ctx.engine.forecast_points_limit).collect();
        ctx.tracker.checkpoint(85.0, &format!("{total_points} forecast points")).await?;

        let mut features = vec![time_column.clone()];
        features.extend(params.id_column.clone());

        Ok(StrategyOutcome {
            problem_type: None,
            leaderboard: fit.leaderboard,
            best_model: fit.best_model,
            best_score: finite(fit.best_score),
            eval_metric,
            feature_importance: BTreeMap::new(),
            features,
            n_rows,
            model_path: fit.model_path,
            predictions: table,
            sample: Vec::new(),
            extras: TaskExtras::Forecasting {
                horizon: params.horizon,
                time_column,
                id_column: params.id_column.clone(),
                n_series,
                forecast,
                total_points,
            },
        })
    }
}
