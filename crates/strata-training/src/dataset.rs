use crate::error::{TrainingError, TrainingResult};
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Logical type of a frame column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Text,
    Timestamp,
}

/// Typed storage for a single column. Missing cells are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
    Timestamp(Vec<Option<DateTime<Utc>>>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

/// Name and type of a column, as reported by a loader without materializing rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub kind: ColumnKind,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self { name: name.into(), data: ColumnData::Numeric(values) }
    }

    pub fn text(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self { name: name.into(), data: ColumnData::Text(values) }
    }

    pub fn timestamp(name: impl Into<String>, values: Vec<Option<DateTime<Utc>>>) -> Self {
        Self { name: name.into(), data: ColumnData::Timestamp(values) }
    }

    #[must_use]
    pub fn kind(&self) -> ColumnKind {
        match &self.data {
            ColumnData::Numeric(_) => ColumnKind::Numeric,
            ColumnData::Text(_) => ColumnKind::Text,
            ColumnData::Timestamp(_) => ColumnKind::Timestamp,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match &self.data {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Text(v) => v.len(),
            ColumnData::Timestamp(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_missing(&self, row: usize) -> bool {
        match &self.data {
            ColumnData::Numeric(v) => v.get(row).copied().flatten().is_none_or(f64::is_nan),
            ColumnData::Text(v) => v.get(row).is_none_or(Option::is_none),
            ColumnData::Timestamp(v) => v.get(row).is_none_or(Option::is_none),
        }
    }

    /// Numeric view of a cell. Timestamps map to epoch seconds; text has no numeric view.
    #[must_use]
    pub fn as_f64(&self, row: usize) -> Option<f64> {
        match &self.data {
            ColumnData::Numeric(v) => v.get(row).copied().flatten().filter(|x| !x.is_nan()),
            ColumnData::Timestamp(v) => v.get(row).copied().flatten().map(|t| t.timestamp() as f64),
            ColumnData::Text(_) => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self, row: usize) -> Option<DateTime<Utc>> {
        match &self.data {
            ColumnData::Timestamp(v) => v.get(row).copied().flatten(),
            _ => None,
        }
    }

    /// Canonical string form of a cell, used for labels, grouping and cardinality.
    #[must_use]
    pub fn value_key(&self, row: usize) -> Option<String> {
        match &self.data {
            ColumnData::Numeric(v) => {
                v.get(row).copied().flatten().filter(|x| !x.is_nan()).map(format_number)
            }
            ColumnData::Text(v) => v.get(row).cloned().flatten(),
            ColumnData::Timestamp(v) => v.get(row).copied().flatten().map(|t| t.to_rfc3339()),
        }
    }

    /// Number of distinct non-missing values.
    #[must_use]
    pub fn distinct_count(&self) -> usize {
        (0..self.len()).filter_map(|i| self.value_key(i)).collect::<BTreeSet<_>>().len()
    }

    #[must_use]
    pub fn non_missing_count(&self) -> usize {
        (0..self.len()).filter(|&i| !self.is_missing(i)).count()
    }

    #[must_use]
    pub fn take(&self, rows: &[usize]) -> Self {
        let data = match &self.data {
            ColumnData::Numeric(v) => {
                ColumnData::Numeric(rows.iter().map(|&i| v.get(i).copied().flatten()).collect())
            }
            ColumnData::Text(v) => {
                ColumnData::Text(rows.iter().map(|&i| v.get(i).cloned().flatten()).collect())
            }
            ColumnData::Timestamp(v) => {
                ColumnData::Timestamp(rows.iter().map(|&i| v.get(i).copied().flatten()).collect())
            }
        };
        Self { name: self.name.clone(), data }
    }
}

/// Formats a float so integral values print without a trailing `.0`.
#[must_use]
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// In-memory tabular dataset with named, typed columns of equal length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    columns: Vec<Column>,
    n_rows: usize,
}

impl Frame {
    pub fn new(columns: Vec<Column>) -> TrainingResult<Self> {
        let n_rows = columns.first().map_or(0, Column::len);
        let mut seen = HashMap::new();
        for (idx, col) in columns.iter().enumerate() {
            if col.len() != n_rows {
                return Err(TrainingError::DataAccess(format!(
                    "column '{}' has {} rows, expected {}",
                    col.name,
                    col.len(),
                    n_rows
                )));
            }
            if seen.insert(col.name.clone(), idx).is_some() {
                return Err(TrainingError::DataAccess(format!("duplicate column name '{}'", col.name)));
            }
        }
        Ok(Self { columns, n_rows })
    }

    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    #[must_use]
    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn require_column(&self, name: &str) -> TrainingResult<&Column> {
        self.column(name)
            .ok_or_else(|| TrainingError::DataAccess(format!("column '{name}' not found in dataset")))
    }

    #[must_use]
    pub fn schema(&self) -> Vec<ColumnSchema> {
        self.columns
            .iter()
            .map(|c| ColumnSchema { name: c.name.clone(), kind: c.kind() })
            .collect()
    }

    /// Keeps the named columns, in the order given.
    pub fn select(&self, names: &[String]) -> TrainingResult<Self> {
        let columns = names
            .iter()
            .map(|n| self.require_column(n).cloned())
            .collect::<TrainingResult<Vec<_>>>()?;
        Ok(Self { columns, n_rows: self.n_rows })
    }

    #[must_use]
    pub fn take_rows(&self, rows: &[usize]) -> Self {
        Self { columns: self.columns.iter().map(|c| c.take(rows)).collect(), n_rows: rows.len() }
    }

    /// Names of numeric columns, excluding any listed in `skip`.
    #[must_use]
    pub fn numeric_column_names(&self, skip: &[&str]) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.kind() == ColumnKind::Numeric && !skip.contains(&c.name.as_str()))
            .map(|c| c.name.clone())
            .collect()
    }

    /// Row-major numeric matrix over `names`; missing cells stay `None`.
    pub fn numeric_rows(&self, names: &[String]) -> TrainingResult<Vec<Vec<Option<f64>>>> {
        let cols = names.iter().map(|n| self.require_column(n)).collect::<TrainingResult<Vec<_>>>()?;
        Ok((0..self.n_rows).map(|i| cols.iter().map(|c| c.as_f64(i)).collect()).collect())
    }
}

/// Row indices `0..n` in a seeded random order.
#[must_use]
pub fn shuffled_indices(n: usize, seed: u64) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..n).collect();
    idx.shuffle(&mut StdRng::seed_from_u64(seed));
    idx
}

/// Seeded `(train, holdout)` row split.
///
/// The holdout holds `fraction` of the rows (at least one); with fewer than ten rows
/// both halves are the full set so tiny datasets still train and score.
#[must_use]
pub fn holdout_split(n: usize, fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    if n < 10 {
        let all: Vec<usize> = (0..n).collect();
        return (all.clone(), all);
    }
    let idx = shuffled_indices(n, seed);
    let n_holdout = ((n as f64 * fraction).round() as usize).clamp(1, n - 1);
    let (holdout, train) = idx.split_at(n_holdout);
    (train.to_vec(), holdout.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Frame {
        Frame::new(vec![
            Column::numeric("x", vec![Some(1.0), None, Some(3.5)]),
            Column::text("label", vec![Some("a".to_string()), Some("b".to_string()), Some("a".to_string())]),
        ])
        .unwrap()
    }

    #[test]
    fn test_frame_rejects_ragged_columns() {
        let err = Frame::new(vec![
            Column::numeric("x", vec![Some(1.0)]),
            Column::numeric("y", vec![Some(1.0), Some(2.0)]),
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn test_frame_rejects_duplicate_names() {
        let err = Frame::new(vec![
            Column::numeric("x", vec![Some(1.0)]),
            Column::numeric("x", vec![Some(2.0)]),
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn test_distinct_and_missing() {
        let frame = sample();
        assert_eq!(frame.column("label").unwrap().distinct_count(), 2);
        assert!(frame.column("x").unwrap().is_missing(1));
        assert_eq!(frame.column("x").unwrap().non_missing_count(), 2);
    }

    #[test]
    fn test_take_rows_and_select() {
        let frame = sample();
        let picked = frame.take_rows(&[2, 0]);
        assert_eq!(picked.n_rows(), 2);
        assert_eq!(picked.column("x").unwrap().as_f64(0), Some(3.5));

        let selected = frame.select(&["label".to_string()]).unwrap();
        assert_eq!(selected.column_names(), vec!["label".to_string()]);
        assert!(frame.select(&["missing".to_string()]).is_err());
    }

    #[test]
    fn test_holdout_split_is_disjoint_and_seeded() {
        let (train, holdout) = holdout_split(100, 0.2, 7);
        assert_eq!(holdout.len(), 20);
        assert_eq!(train.len(), 80);
        assert!(holdout.iter().all(|i| !train.contains(i)));
        assert_eq!(holdout_split(100, 0.2, 7), (train, holdout));

        let (train, holdout) = holdout_split(4, 0.2, 7);
        assert_eq!(train, holdout);
    }

    #[test]
    fn test_format_number_drops_integral_fraction() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(2.5), "2.5");
    }
}
