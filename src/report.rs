use crate::dashboard::DashboardSnapshot;
use crate::dataset::{Ratio, SalesRecord};
use crate::error::Result;
use crate::filter::records_frame;
use itertools::Itertools;
use polars::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};

/// Rows printed per list in the text report.
const TEXT_ROWS: usize = 10;

fn ratio(r: Ratio) -> String {
    match r.value() {
        Some(v) => format!("{:.2}", v),
        None => "n/a".to_string(),
    }
}

fn record_line(r: &SalesRecord) -> String {
    format!(
        "{} [{}] sales {:.2} | cost {:.2} | profit {:.2} | margin {}",
        r.product_name,
        r.division,
        r.sales,
        r.cost,
        r.gross_profit,
        ratio(r.margin)
    )
}

impl fmt::Display for DashboardSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== KPIs ===")?;
        writeln!(f, "Records: {}", self.kpis.record_count)?;
        writeln!(f, "Total Sales: {:.0}", self.kpis.total_sales)?;
        writeln!(f, "Total Profit: {:.0}", self.kpis.total_profit)?;
        writeln!(f, "Avg Margin: {}", ratio(self.kpis.mean_margin))?;

        writeln!(f, "\n=== Top Profit Products ===")?;
        for (idx, row) in self.top_profit_products.rows.iter().enumerate() {
            writeln!(f, "{:>2}. {} ({:.2})", idx + 1, row.key, row.value)?;
        }

        writeln!(f, "\n=== Top Margin Products ===")?;
        for (idx, row) in self.top_margin_products.rows.iter().enumerate() {
            writeln!(f, "{:>2}. {} ({:.2})", idx + 1, row.key, row.value)?;
        }

        writeln!(f, "\n=== Division Performance ===")?;
        for row in &self.division_performance.rows {
            writeln!(f, "{}: sales {:.2} | profit {:.2}", row.key, row.sales, row.gross_profit)?;
        }

        writeln!(f, "\n=== Margin by Division ===")?;
        for b in &self.margin_distribution {
            writeln!(
                f,
                "{}: min {:.2} | q1 {:.2} | median {:.2} | q3 {:.2} | max {:.2} (n={})",
                b.division, b.min, b.q1, b.median, b.q3, b.max, b.count
            )?;
        }

        let contributors = &self.profit_pareto.contributors;
        writeln!(f, "\n=== Pareto Profit ===")?;
        writeln!(
            f,
            "{} of {} products carry the leading share of profit",
            contributors.len(),
            self.profit_pareto.curve.points.len()
        )?;
        if !contributors.is_empty() {
            writeln!(f, "{}", contributors.iter().map(|p| p.key.as_str()).join(", "))?;
        }

        writeln!(f, "\n=== High Sales / Low Margin ===")?;
        for r in self.quadrants.high_sales_low_margin.iter().take(TEXT_ROWS) {
            writeln!(f, "- {}", record_line(r))?;
        }

        writeln!(f, "\n=== Low Sales / Low Profit ===")?;
        for r in self.quadrants.low_sales_low_profit.iter().take(TEXT_ROWS) {
            writeln!(f, "- {}", record_line(r))?;
        }

        writeln!(f, "\n=== Dependency Risk ===")?;
        for share in self.product_dependency.iter().chain(&self.region_dependency).filter(|s| s.flagged) {
            writeln!(f, "! {} ({:.1}% of sales)", share.key, share.share * 100.0)?;
        }

        writeln!(f, "\n=== Risk Products (Low Margin + High Cost) ===")?;
        for r in self.cost_margin_risk.iter().take(TEXT_ROWS) {
            writeln!(f, "- {}", record_line(r))?;
        }
        if self.cost_margin_risk.len() > TEXT_ROWS {
            writeln!(f, "  ... and {} more", self.cost_margin_risk.len() - TEXT_ROWS)?;
        }

        writeln!(f, "\n=== Margin Risk ===")?;
        for r in self.margin_risk.iter().take(TEXT_ROWS) {
            writeln!(f, "- {}", record_line(r))?;
        }

        Ok(())
    }
}

fn write_csv(dir: &Path, name: &str, mut df: DataFrame) -> Result<PathBuf> {
    let path = dir.join(format!("{}.csv", name));
    let mut file = std::fs::File::create(&path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .finish(&mut df)?;
    Ok(path)
}

/// Write every result table of the snapshot as CSV into `dir`.
pub fn export_csv(snapshot: &DashboardSnapshot, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    Ok(vec![
        write_csv(dir, "top_profit_products", snapshot.top_profit_products.to_frame()?)?,
        write_csv(dir, "top_margin_products", snapshot.top_margin_products.to_frame()?)?,
        write_csv(dir, "division_performance", snapshot.division_performance.to_frame()?)?,
        write_csv(dir, "region_performance", snapshot.region_performance.to_frame()?)?,
        write_csv(dir, "profit_pareto", snapshot.profit_pareto.curve.to_frame()?)?,
        write_csv(dir, "sales_pareto", snapshot.sales_pareto.curve.to_frame()?)?,
        write_csv(dir, "high_sales_low_margin", records_frame(&snapshot.quadrants.high_sales_low_margin)?)?,
        write_csv(dir, "low_sales_low_profit", records_frame(&snapshot.quadrants.low_sales_low_profit)?)?,
        write_csv(dir, "cost_margin_risk", records_frame(&snapshot.cost_margin_risk)?)?,
        write_csv(dir, "margin_risk", records_frame(&snapshot.margin_risk)?)?,
    ])
}
