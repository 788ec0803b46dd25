//! Dataset loading from CSV and spreadsheet files.

pub mod csv_source;
pub mod excel_source;
pub mod schema;

pub use schema::{normalize_header, ColumnMap};

use crate::config::{ColumnAliases, DashboardConfig};
use crate::dataset::Dataset;
use crate::error::{DashboardError, Result};
use polars::prelude::DataFrame;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Spreadsheet,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => Ok(SourceFormat::Csv),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(SourceFormat::Spreadsheet),
            _ => Err(DashboardError::UnsupportedFormat(format!(
                "{} (expected csv, xlsx, xlsm, xlsb, xls or ods)",
                path.display()
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DatasetLoader {
    aliases: ColumnAliases,
    sheet: Option<String>,
}

impl DatasetLoader {
    pub fn new(aliases: ColumnAliases) -> Self {
        Self {
            aliases,
            sheet: None,
        }
    }

    pub fn from_config(config: &DashboardConfig) -> Self {
        Self {
            aliases: config.columns.clone(),
            sheet: config.sheet.clone(),
        }
    }

    pub fn with_sheet(mut self, sheet: Option<String>) -> Self {
        self.sheet = sheet;
        self
    }

    /// Load and derive a dataset from a file.
    pub fn load(&self, path: &Path) -> Result<Dataset> {
        let frame = match SourceFormat::from_path(path)? {
            SourceFormat::Csv => csv_source::read_csv(path)?,
            SourceFormat::Spreadsheet => excel_source::read_workbook(path, self.sheet.as_deref())?,
        };
        let dataset = self.load_frame(frame)?;
        info!(
            path = %path.display(),
            records = dataset.len(),
            "dataset loaded"
        );
        Ok(dataset)
    }

    /// Normalize headers, validate the schema and extract records.
    pub fn load_frame(&self, mut frame: DataFrame) -> Result<Dataset> {
        schema::normalize_headers(&mut frame)?;
        let headers: Vec<String> = frame.get_column_names().iter().map(|s| s.to_string()).collect();
        let map = ColumnMap::resolve(&headers, &self.aliases)?;
        let records = schema::extract_records(&frame, &map)?;
        Ok(Dataset::from_records(records))
    }
}
