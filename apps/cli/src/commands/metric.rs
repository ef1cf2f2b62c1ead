//! Metric command implementation.

use colored::Colorize;
use strata_training::{Metric, resolve_metric};

/// Prints the canonical name for `name`.
///
/// Unknown names are printed unchanged, the same way a job would pass them to the
/// backend, with a note on stderr.
pub fn execute(name: &str) {
    let canonical = resolve_metric(name);
    println!("{canonical}");
    if Metric::from_canonical(&canonical).is_none() {
        eprintln!("{}", format!("note: '{canonical}' is not a built-in metric; the backend decides").yellow());
    }
}
