//! Command implementations for the Strata CLI.

pub mod inspect;
pub mod jobs;
pub mod metric;
pub mod predict;
pub mod run;

use anyhow::Context;
use std::path::Path;
use strata_orchestrator::EngineConfig;

/// Loads engine settings from `path` (if given) and `STRATA_*` environment variables.
pub(crate) fn load_engine(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    EngineConfig::load(path).with_context(|| match path {
        Some(p) => format!("Failed to load engine config from {}", p.display()),
        None => "Failed to load engine config".to_string(),
    })
}

/// Formats an optional score for display.
pub(crate) fn format_score(score: Option<f64>) -> String {
    score.map_or_else(|| "-".to_string(), |s| format!("{s:.4}"))
}
