use super::SavedModel;
use crate::artifacts::write_json;
use crate::error::{TrainingError, TrainingResult};
use crate::job::ProblemType;
use crate::layout::ArtifactLayout;
use crate::metrics::{Metric, regression_score};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::trainer::{ForecastFit, ForecastPoint, ForecastRequest, LeaderboardEntry, Series};
use chrono::{DateTime, Duration as TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tracing::debug;

const SEASON_LENGTH: usize = 7;
/// Two-sided 95% normal quantile.
const Z_95: f64 = 1.96;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ForecastMethod {
    Naive,
    Drift,
    SeasonalNaive,
    LinearTrend,
}

impl ForecastMethod {
    const ALL: [Self; 4] = [Self::LinearTrend, Self::SeasonalNaive, Self::Drift, Self::Naive];

    fn name(self) -> &'static str {
        match self {
            Self::Naive => "Naive",
            Self::Drift => "Drift",
            Self::SeasonalNaive => "SeasonalNaive",
            Self::LinearTrend => "LinearTrend",
        }
    }

    /// Point forecasts for the `steps` values after `history`.
    fn project(self, history: &[f64], steps: usize) -> Vec<f64> {
        let n = history.len();
        let Some(&last) = history.last() else {
            return vec![0.0; steps];
        };
        match self {
            Self::Naive => vec![last; steps],
            Self::Drift if n >= 2 => {
                let slope = (last - history[0]) / (n - 1) as f64;
                (1..=steps).map(|k| last + slope * k as f64).collect()
            }
            Self::SeasonalNaive if n >= SEASON_LENGTH => {
                (0..steps).map(|k| history[n - SEASON_LENGTH + k % SEASON_LENGTH]).collect()
            }
            Self::LinearTrend if n >= 2 => {
                let (intercept, slope) = least_squares_line(history);
                (1..=steps).map(|k| intercept + slope * (n - 1 + k) as f64).collect()
            }
            Self::Drift | Self::SeasonalNaive | Self::LinearTrend => vec![last; steps],
        }
    }
}

fn least_squares_line(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let t_mean = (n - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var = 0.0;
    for (t, y) in values.iter().enumerate() {
        let dt = t as f64 - t_mean;
        cov += dt * (y - y_mean);
        var += dt * dt;
    }
    let slope = if var > 0.0 { cov / var } else { 0.0 };
    (y_mean - slope * t_mean, slope)
}

/// Length of the validation tail carved from each series.
fn validation_len(series_len: usize, horizon: usize) -> usize {
    horizon.min(series_len / 2).max(1)
}

/// Median spacing between consecutive timestamps; one day when undetermined.
fn step_of(timestamps: &[DateTime<Utc>]) -> TimeDelta {
    let mut deltas: Vec<TimeDelta> = timestamps.windows(2).map(|w| w[1] - w[0]).filter(|d| *d > TimeDelta::zero()).collect();
    if deltas.is_empty() {
        return TimeDelta::days(1);
    }
    deltas.sort();
    deltas[deltas.len() / 2]
}

/// Holdout errors of one method: `(actual, predicted)` per series.
fn backtest(method: ForecastMethod, series: &[Series], horizon: usize) -> Vec<(Vec<f64>, Vec<f64>)> {
    series
        .iter()
        .map(|s| {
            let v = validation_len(s.values.len(), horizon);
            let split = s.values.len() - v;
            (s.values[split..].to_vec(), method.project(&s.values[..split], v))
        })
        .collect()
}

fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    regression_score(Metric::Rmse, actual, predicted)
}

/// Saved forecasting model: the winning method plus the horizon it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ForecastModel {
    method: ForecastMethod,
    horizon: usize,
    season_length: usize,
    forecast: Vec<ForecastPoint>,
}

pub(crate) fn search(
    request: ForecastRequest,
    progress: &dyn ProgressSink,
    workdir: &Path,
) -> TrainingResult<ForecastFit> {
    let started = Instant::now();
    let metric = Metric::from_canonical(&request.eval_metric)
        .filter(|m| m.supports(ProblemType::Regression))
        .ok_or_else(|| {
            TrainingError::Trainer(format!("metric '{}' is not valid for forecasting", request.eval_metric))
        })?;
    if request.horizon == 0 {
        return Err(TrainingError::Trainer("forecast horizon must be positive".to_string()));
    }
    if request.series.is_empty() {
        return Err(TrainingError::Trainer("no time series to forecast".to_string()));
    }
    if let Some(short) = request.series.iter().find(|s| s.values.len() < 2) {
        return Err(TrainingError::Trainer(format!(
            "series '{}' has fewer than two observations",
            short.id
        )));
    }

    let mut candidates = ForecastMethod::ALL.to_vec();
    if let Some(max) = request.budget.max_models {
        candidates.truncate(max.max(1));
    }
    let planned = candidates.len();

    let mut leaderboard: Vec<LeaderboardEntry> = Vec::with_capacity(planned);
    let mut scored: Vec<(ForecastMethod, f64)> = Vec::with_capacity(planned);
    for method in candidates {
        if !scored.is_empty() && started.elapsed() >= request.budget.time_limit {
            progress.on_event(ProgressEvent::Message {
                message: format!("time limit reached after {} of {planned} models", scored.len()),
            });
            break;
        }
        let fit_start = Instant::now();
        let (actual, predicted): (Vec<f64>, Vec<f64>) = backtest(method, &request.series, request.horizon)
            .into_iter()
            .fold((Vec::new(), Vec::new()), |(mut a, mut p), (sa, sp)| {
                a.extend(sa);
                p.extend(sp);
                (a, p)
            });
        let score = regression_score(metric, &actual, &predicted);
        let fit_seconds = fit_start.elapsed().as_secs_f64();
        debug!(model = method.name(), score, "Forecast candidate scored");

        scored.push((method, score));
        leaderboard.push(LeaderboardEntry {
            model: method.name().to_string(),
            score,
            fit_seconds,
            predict_seconds: 0.0,
        });

        let (best_method, best_score) = best_of(metric, &scored);
        progress.on_event(ProgressEvent::ModelTrained {
            model: method.name().to_string(),
            score,
            completed: scored.len(),
            planned,
            best_model: best_method.name().to_string(),
            best_score,
        });
    }

    let (best, best_score) = best_of(metric, &scored);
    leaderboard.sort_by(|a, b| rank(metric, a.score, b.score));

    let sigmas: Vec<f64> = backtest(best, &request.series, request.horizon)
        .iter()
        .map(|(actual, predicted)| rmse(actual, predicted))
        .collect();

    let mut forecast = Vec::with_capacity(request.series.len() * request.horizon);
    for (series, sigma) in request.series.iter().zip(&sigmas) {
        let step = step_of(&series.timestamps);
        let Some(&last_ts) = series.timestamps.last() else {
            continue;
        };
        let sigma = if sigma.is_finite() { *sigma } else { 0.0 };
        for (k, mean) in best.project(&series.values, request.horizon).into_iter().enumerate() {
            let offset = step * i32::try_from(k + 1).unwrap_or(i32::MAX);
            forecast.push(ForecastPoint {
                series_id: series.id.clone(),
                timestamp: last_ts + offset,
                mean,
                lower: Z_95.mul_add(-sigma, mean),
                upper: Z_95.mul_add(sigma, mean),
            });
        }
    }

    let model_path = ArtifactLayout::model_path(workdir);
    write_json(
        &model_path,
        &SavedModel::Forecast(ForecastModel {
            method: best,
            horizon: request.horizon,
            season_length: SEASON_LENGTH,
            forecast: forecast.clone(),
        }),
    )?;

    Ok(ForecastFit { leaderboard, best_model: best.name().to_string(), best_score, forecast, model_path })
}

fn rank(metric: Metric, a: f64, b: f64) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a.is_finite(), b.is_finite()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => Ordering::Equal,
        (true, true) if metric.greater_is_better() => b.total_cmp(&a),
        (true, true) => a.total_cmp(&b),
    }
}

fn best_of(metric: Metric, scored: &[(ForecastMethod, f64)]) -> (ForecastMethod, f64) {
    scored
        .iter()
        .copied()
        .min_by(|a, b| rank(metric, a.1, b.1))
        .unwrap_or((ForecastMethod::Naive, f64::NAN))
}
