use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Schema error: required column '{column}' not found{}", hint_suffix(.hint))]
    Schema {
        column: String,
        hint: Option<String>,
    },

    #[error("Malformed date in column '{column}' at row {row}: '{value}'")]
    MalformedDate {
        column: String,
        row: usize,
        value: String,
    },

    #[error("Invalid value in column '{column}' at row {row}: {reason}")]
    InvalidValue {
        column: String,
        row: usize,
        reason: String,
    },

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Unsupported input format: {0}")]
    UnsupportedFormat(String),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

fn hint_suffix(hint: &Option<String>) -> String {
    match hint {
        Some(h) => format!(" (closest header: '{}')", h),
        None => String::new(),
    }
}

impl From<polars::error::PolarsError> for DashboardError {
    fn from(err: polars::error::PolarsError) -> Self {
        DashboardError::Polars(err.to_string())
    }
}

impl From<calamine::Error> for DashboardError {
    fn from(err: calamine::Error) -> Self {
        DashboardError::Spreadsheet(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DashboardError>;
