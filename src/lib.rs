pub mod aggregation;
pub mod config;
pub mod dashboard;
pub mod dataset;
pub mod error;
pub mod filter;
pub mod ingestion;
pub mod metrics;
pub mod report;
pub mod risk;

pub use config::{DashboardConfig, RiskThresholds};
pub use dashboard::{DashboardEngine, DashboardSnapshot};
pub use dataset::{Dataset, Ratio, SalesRecord};
pub use error::{DashboardError, Result};
pub use filter::{FilterSpec, FilteredView, RecordPredicate};
pub use ingestion::DatasetLoader;
