use crate::error::{DashboardError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_DATA: &str = "DASHBOARD_DATA";
pub const ENV_SHEET: &str = "DASHBOARD_SHEET";
pub const ENV_TOP_N: &str = "DASHBOARD_TOP_N";
pub const ENV_BIND: &str = "DASHBOARD_BIND";

/// Business-rule thresholds used by the risk and Pareto views.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    /// Cumulative fraction that bounds the Pareto contributor list (inclusive).
    pub pareto_cutoff: f64,
    pub product_dependency: f64,
    pub region_dependency: f64,
    /// Cost-to-sales ratio above which cost is considered excessive.
    pub cost_to_sales: f64,
    /// Margin below which an excessive-cost record is flagged.
    pub cost_risk_margin: f64,
    pub margin_risk: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            pareto_cutoff: 0.80,
            product_dependency: 0.10,
            region_dependency: 0.25,
            cost_to_sales: 0.8,
            cost_risk_margin: 0.20,
            margin_risk: 0.15,
        }
    }
}

/// Accepted source headers for each canonical field, after whitespace
/// normalization. Matching is case-sensitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnAliases {
    pub product_name: Vec<String>,
    pub division: Vec<String>,
    pub region: Vec<String>,
    pub order_date: Vec<String>,
    pub ship_date: Vec<String>,
    pub sales: Vec<String>,
    pub cost: Vec<String>,
    pub units: Vec<String>,
    pub gross_profit: Vec<String>,
}

fn aliases(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

impl Default for ColumnAliases {
    fn default() -> Self {
        Self {
            product_name: aliases(&["product_name", "Product Name"]),
            division: aliases(&["division", "Division"]),
            region: aliases(&["region", "Region"]),
            order_date: aliases(&["order_date", "Order Date"]),
            ship_date: aliases(&["ship_date", "Ship Date"]),
            sales: aliases(&["sales", "Sales"]),
            cost: aliases(&["cost", "Cost"]),
            units: aliases(&["units", "Units"]),
            gross_profit: aliases(&["gross_profit", "Gross Profit"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Source table (csv, xlsx, xls, xlsb, ods).
    pub data_path: Option<PathBuf>,
    /// Sheet name or 0-based index for spreadsheet sources.
    pub sheet: Option<String>,
    pub top_n: usize,
    pub bind_addr: String,
    pub thresholds: RiskThresholds,
    pub columns: ColumnAliases,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            data_path: None,
            sheet: None,
            top_n: 10,
            bind_addr: "127.0.0.1:8080".to_string(),
            thresholds: RiskThresholds::default(),
            columns: ColumnAliases::default(),
        }
    }
}

impl DashboardConfig {
    /// Read a JSON config file. Missing keys fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DashboardError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| DashboardError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, or the given file, with process environment overrides.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields from `DASHBOARD_*` variables resolved through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DATA) {
            self.data_path = Some(PathBuf::from(path));
        }
        if let Some(sheet) = lookup(ENV_SHEET) {
            self.sheet = Some(sheet);
        }
        if let Some(top_n) = lookup(ENV_TOP_N) {
            self.top_n = top_n.trim().parse().map_err(|_| {
                DashboardError::Config(format!("{} must be a positive integer, got '{}'", ENV_TOP_N, top_n))
            })?;
        }
        if let Some(bind) = lookup(ENV_BIND) {
            self.bind_addr = bind;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_n == 0 {
            return Err(DashboardError::Config("top_n must be at least 1".to_string()));
        }
        let t = &self.thresholds;
        for (name, value) in [
            ("pareto_cutoff", t.pareto_cutoff),
            ("product_dependency", t.product_dependency),
            ("region_dependency", t.region_dependency),
            ("cost_risk_margin", t.cost_risk_margin),
            ("margin_risk", t.margin_risk),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(DashboardError::Config(format!(
                    "threshold {} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if !(t.cost_to_sales.is_finite() && t.cost_to_sales >= 0.0) {
            return Err(DashboardError::Config(format!(
                "threshold cost_to_sales must be non-negative, got {}",
                t.cost_to_sales
            )));
        }
        Ok(())
    }
}
