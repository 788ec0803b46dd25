use crate::error::{DashboardError, Result};
use polars::prelude::*;
use std::path::Path;

/// Rows sampled for schema inference.
const INFER_SCHEMA_ROWS: usize = 1000;

/// Read a CSV file with a header row. Date columns are left as text and
/// parsed during record extraction.
pub fn read_csv(path: &Path) -> Result<DataFrame> {
    LazyCsvReader::new(path)
        .with_has_header(true)
        .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
        .finish()
        .map_err(|e| DashboardError::Polars(format!("Failed to scan CSV {}: {}", path.display(), e)))?
        .collect()
        .map_err(|e| DashboardError::Polars(format!("Failed to collect CSV {}: {}", path.display(), e)))
}
