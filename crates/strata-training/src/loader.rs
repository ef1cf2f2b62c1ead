use crate::dataset::{Column, ColumnSchema, Frame};
use crate::error::{TrainingError, TrainingResult};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Opaque handle to a dataset, resolved by a [`DataLoader`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataReference {
    /// A CSV file on the local filesystem.
    File { path: PathBuf },
    /// A frame registered with an in-process loader under a name.
    Named { name: String },
}

impl DataReference {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File { path: path.into() }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::Named { name: name.into() }
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::File { path } => path.as_os_str().is_empty(),
            Self::Named { name } => name.trim().is_empty(),
        }
    }
}

impl std::fmt::Display for DataReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File { path } => write!(f, "file:{}", path.display()),
            Self::Named { name } => write!(f, "named:{name}"),
        }
    }
}

/// Resolves a [`DataReference`] into an in-memory [`Frame`].
#[async_trait]
pub trait DataLoader: Send + Sync {
    async fn load(&self, reference: &DataReference) -> TrainingResult<Frame>;

    /// Column names and types without handing the rows to the caller.
    async fn schema(&self, reference: &DataReference) -> TrainingResult<Vec<ColumnSchema>> {
        Ok(self.load(reference).await?.schema())
    }
}

/// Loads `DataReference::File` references as CSV.
#[derive(Debug, Default, Clone)]
pub struct CsvLoader;

#[async_trait]
impl DataLoader for CsvLoader {
    async fn load(&self, reference: &DataReference) -> TrainingResult<Frame> {
        match reference {
            DataReference::File { path } => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || read_csv(&path))
                    .await
                    .map_err(|e| TrainingError::DataAccess(format!("csv loader task failed: {e}")))?
            }
            DataReference::Named { name } => Err(TrainingError::DataAccess(format!(
                "csv loader cannot resolve named dataset '{name}'"
            ))),
        }
    }
}

/// Serves frames registered by name, and CSV files for file references.
#[derive(Debug, Default)]
pub struct InMemoryLoader {
    frames: RwLock<HashMap<String, Arc<Frame>>>,
    csv: CsvLoader,
}

impl InMemoryLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, name: impl Into<String>, frame: Frame) {
        let name = name.into();
        debug!(dataset = %name, rows = frame.n_rows(), cols = frame.n_cols(), "Registered in-memory dataset");
        self.frames.write().await.insert(name, Arc::new(frame));
    }

    pub async fn unregister(&self, name: &str) -> bool {
        self.frames.write().await.remove(name).is_some()
    }
}

#[async_trait]
impl DataLoader for InMemoryLoader {
    async fn load(&self, reference: &DataReference) -> TrainingResult<Frame> {
        match reference {
            DataReference::Named { name } => self
                .frames
                .read()
                .await
                .get(name)
                .map(|f| f.as_ref().clone())
                .ok_or_else(|| TrainingError::DataAccess(format!("no dataset registered as '{name}'"))),
            DataReference::File { .. } => self.csv.load(reference).await,
        }
    }

    async fn schema(&self, reference: &DataReference) -> TrainingResult<Vec<ColumnSchema>> {
        match reference {
            DataReference::Named { name } => self
                .frames
                .read()
                .await
                .get(name)
                .map(|f| f.schema())
                .ok_or_else(|| TrainingError::DataAccess(format!("no dataset registered as '{name}'"))),
            DataReference::File { .. } => self.csv.schema(reference).await,
        }
    }
}

pub fn read_csv(path: &Path) -> TrainingResult<Frame> {
    let file = std::fs::File::open(path)
        .map_err(|e| TrainingError::DataAccess(format!("failed to open {}: {e}", path.display())))?;
    parse_csv(file).map_err(|e| match e {
        TrainingError::DataAccess(_) => e,
        other => TrainingError::DataAccess(format!("failed to read {}: {other}", path.display())),
    })
}

/// Parses CSV with a header row, inferring a type per column.
///
/// A column is numeric when every non-empty cell parses as a float, a timestamp when every
/// non-empty cell parses as a date/time, and text otherwise.
pub fn parse_csv<R: Read>(reader: R) -> TrainingResult<Frame> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).trim(csv::Trim::All).from_reader(reader);
    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    if headers.is_empty() {
        return Err(TrainingError::DataAccess("csv has no header row".to_string()));
    }

    let mut raw: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        if record.len() != headers.len() {
            return Err(TrainingError::DataAccess(format!(
                "csv row {} has {} fields, expected {}",
                line + 2,
                record.len(),
                headers.len()
            )));
        }
        for (idx, cell) in record.iter().enumerate() {
            raw[idx].push(normalize_cell(cell));
        }
    }

    let columns = headers.into_iter().zip(raw).map(|(name, cells)| infer_column(name, cells)).collect();
    Frame::new(columns)
}

fn normalize_cell(cell: &str) -> Option<String> {
    let cell = cell.trim();
    if cell.is_empty() || matches!(cell, "NA" | "N/A" | "null" | "NULL" | "NaN" | "nan") {
        None
    } else {
        Some(cell.to_string())
    }
}

fn infer_column(name: String, cells: Vec<Option<String>>) -> Column {
    let present: Vec<&String> = cells.iter().flatten().collect();
    if present.is_empty() {
        return Column::text(name, cells);
    }

    if present.iter().all(|c| c.parse::<f64>().is_ok()) {
        let values = cells.iter().map(|c| c.as_ref().and_then(|s| s.parse::<f64>().ok())).collect();
        return Column::numeric(name, values);
    }

    if present.iter().all(|c| parse_timestamp(c).is_some()) {
        let values = cells.iter().map(|c| c.as_deref().and_then(parse_timestamp)).collect();
        return Column::timestamp(name, values);
    }

    Column::text(name, cells)
}

#[must_use]
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ColumnKind;
    use tempfile::TempDir;

    const CSV: &str = "id,amount,city,day\n1,10.5,Oslo,2024-01-01\n2,,Bergen,2024-01-02\n3,7,NA,2024-01-03\n";

    #[test]
    fn test_parse_csv_infers_column_types() {
        let frame = parse_csv(CSV.as_bytes()).unwrap();
        assert_eq!(frame.n_rows(), 3);
        assert_eq!(frame.column("amount").unwrap().kind(), ColumnKind::Numeric);
        assert_eq!(frame.column("city").unwrap().kind(), ColumnKind::Text);
        assert_eq!(frame.column("day").unwrap().kind(), ColumnKind::Timestamp);
        assert!(frame.column("amount").unwrap().is_missing(1));
        assert!(frame.column("city").unwrap().is_missing(2));
    }

    #[test]
    fn test_parse_csv_rejects_ragged_rows() {
        let err = parse_csv("a,b\n1,2\n3\n".as_bytes());
        assert!(err.is_err());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2024-03-01T12:00:00Z").is_some());
        assert!(parse_timestamp("2024-03-01 12:00:00").is_some());
        assert!(parse_timestamp("2024-03-01").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[tokio::test]
    async fn test_in_memory_loader_named_and_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data.csv");
        std::fs::write(&path, CSV).unwrap();

        let loader = InMemoryLoader::new();
        loader.register("sales", parse_csv(CSV.as_bytes()).unwrap()).await;

        let named = loader.load(&DataReference::named("sales")).await.unwrap();
        assert_eq!(named.n_cols(), 4);

        let schema = loader.schema(&DataReference::file(&path)).await.unwrap();
        assert_eq!(schema.len(), 4);

        let missing = loader.load(&DataReference::named("nope")).await;
        assert!(matches!(missing, Err(TrainingError::DataAccess(_))));
    }

    #[tokio::test]
    async fn test_csv_loader_missing_file_is_data_access_error() {
        let loader = CsvLoader;
        let err = loader.load(&DataReference::file("/definitely/not/here.csv")).await;
        assert!(matches!(err, Err(TrainingError::DataAccess(_))));
    }
}
