use crate::dataset::Ratio;
use crate::error::Result;
use crate::filter::FilteredView;
use itertools::izip;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    Product,
    Division,
    Region,
}

impl GroupKey {
    pub fn column_name(&self) -> &'static str {
        match self {
            GroupKey::Product => "product_name",
            GroupKey::Division => "division",
            GroupKey::Region => "region",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Sales,
    GrossProfit,
    Margin,
}

impl Metric {
    pub fn column_name(&self) -> &'static str {
        match self {
            Metric::Sales => "sales",
            Metric::GrossProfit => "gross_profit",
            Metric::Margin => "margin",
        }
    }

    /// Additive metrics are summed, rate metrics are averaged.
    pub fn is_additive(&self) -> bool {
        !matches!(self, Metric::Margin)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub key: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationResult {
    pub group_key: GroupKey,
    pub metric: Metric,
    pub rows: Vec<AggregateRow>,
}

impl AggregationResult {
    /// First `n` groups after sorting; all of them if there are fewer.
    pub fn top(mut self, n: usize) -> Self {
        self.rows.truncate(n);
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.rows.iter().find(|r| r.key == key).map(|r| r.value)
    }

    pub fn keys(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.key.as_str()).collect()
    }

    pub fn to_frame(&self) -> Result<DataFrame> {
        let keys: Vec<String> = self.rows.iter().map(|r| r.key.clone()).collect();
        let values: Vec<f64> = self.rows.iter().map(|r| r.value).collect();
        Ok(DataFrame::new(vec![
            Series::new(self.group_key.column_name(), keys),
            Series::new(self.metric.column_name(), values),
        ])?)
    }
}

fn descending() -> SortMultipleOptions {
    SortMultipleOptions::default()
        .with_order_descending(true)
        .with_maintain_order(true)
}

pub(crate) fn keyed_values(df: &DataFrame, key: &str, value: &str) -> Result<Vec<(String, f64)>> {
    let keys = df.column(key)?.str()?;
    let values = df.column(value)?.f64()?;
    Ok(keys
        .into_iter()
        .zip(values)
        .filter_map(|(k, v)| Some((k?.to_string(), v?)))
        .collect())
}

pub(crate) fn scalar(df: &DataFrame, name: &str) -> Result<Option<f64>> {
    Ok(df.column(name)?.f64()?.get(0))
}

/// Group the view frame by `group_key` and summarize `metric`. Rows without a
/// grouping value are skipped.
pub fn aggregate(frame: &DataFrame, group_key: GroupKey, metric: Metric) -> Result<AggregationResult> {
    let key = group_key.column_name();
    let value = metric.column_name();
    let summary = if metric.is_additive() {
        col(value).sum()
    } else {
        col(value).mean()
    };

    let ranked = frame
        .clone()
        .lazy()
        .filter(col(key).is_not_null().and(col(value).is_not_null()))
        .group_by_stable([col(key)])
        .agg([summary])
        .sort([value], descending())
        .collect()?;

    let rows = keyed_values(&ranked, key, value)?
        .into_iter()
        .map(|(key, value)| AggregateRow { key, value })
        .collect();

    Ok(AggregationResult {
        group_key,
        metric,
        rows,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceRow {
    pub key: String,
    pub sales: f64,
    pub gross_profit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceTable {
    pub group_key: GroupKey,
    pub rows: Vec<PerformanceRow>,
}

impl PerformanceTable {
    pub fn total_sales(&self) -> f64 {
        self.rows.iter().map(|r| r.sales).sum()
    }

    pub fn to_frame(&self) -> Result<DataFrame> {
        let keys: Vec<String> = self.rows.iter().map(|r| r.key.clone()).collect();
        let sales: Vec<f64> = self.rows.iter().map(|r| r.sales).collect();
        let profit: Vec<f64> = self.rows.iter().map(|r| r.gross_profit).collect();
        Ok(DataFrame::new(vec![
            Series::new(self.group_key.column_name(), keys),
            Series::new("sales", sales),
            Series::new("gross_profit", profit),
        ])?)
    }
}

/// Sum sales and gross profit per key, ranked by sales.
pub fn performance(frame: &DataFrame, group_key: GroupKey) -> Result<PerformanceTable> {
    let key = group_key.column_name();
    let grouped = frame
        .clone()
        .lazy()
        .filter(col(key).is_not_null())
        .group_by_stable([col(key)])
        .agg([col("sales").sum(), col("gross_profit").sum()])
        .sort(["sales"], descending())
        .collect()?;

    let profit = keyed_values(&grouped, key, "gross_profit")?;
    let rows = keyed_values(&grouped, key, "sales")?
        .into_iter()
        .zip(profit)
        .map(|((key, sales), (_, gross_profit))| PerformanceRow {
            key,
            sales,
            gross_profit,
        })
        .collect();

    Ok(PerformanceTable { group_key, rows })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpis {
    pub record_count: usize,
    pub total_sales: f64,
    pub total_profit: f64,
    pub mean_margin: Ratio,
}

pub fn kpis(frame: &DataFrame) -> Result<Kpis> {
    let totals = frame
        .clone()
        .lazy()
        .select([
            col("sales").sum(),
            col("gross_profit").sum(),
            col("margin").mean(),
        ])
        .collect()?;

    Ok(Kpis {
        record_count: frame.height(),
        total_sales: scalar(&totals, "sales")?.unwrap_or(0.0),
        total_profit: scalar(&totals, "gross_profit")?.unwrap_or(0.0),
        mean_margin: scalar(&totals, "margin")?.into(),
    })
}

/// Five-number summary of margins within one division.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarginBox {
    pub division: String,
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// Margin spread per division, in first-seen division order. Divisions
/// without any defined margin are omitted. Quantiles interpolate linearly.
pub fn margin_distribution(frame: &DataFrame) -> Result<Vec<MarginBox>> {
    let margin_quantile = |q: f64, name: &str| {
        col("margin")
            .quantile(lit(q), QuantileInterpolOptions::Linear)
            .alias(name)
    };

    let summary = frame
        .clone()
        .lazy()
        .filter(col("margin").is_not_null())
        .group_by_stable([col("division")])
        .agg([
            len().alias("count"),
            col("margin").min().alias("min"),
            margin_quantile(0.25, "q1"),
            col("margin").median().alias("median"),
            margin_quantile(0.75, "q3"),
            col("margin").max().alias("max"),
        ])
        .collect()?;

    let divisions = summary.column("division")?.str()?;
    let counts = summary.column("count")?.cast(&DataType::UInt64)?;
    let stat = |name: &str| -> Result<Vec<Option<f64>>> {
        Ok(summary.column(name)?.f64()?.into_iter().collect())
    };

    Ok(izip!(
        divisions,
        counts.u64()?,
        stat("min")?,
        stat("q1")?,
        stat("median")?,
        stat("q3")?,
        stat("max")?
    )
    .filter_map(|(division, count, min, q1, median, q3, max)| {
        Some(MarginBox {
            division: division?.to_string(),
            count: count? as usize,
            min: min?,
            q1: q1?,
            median: median?,
            q3: q3?,
            max: max?,
        })
    })
    .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub product_name: String,
    pub sales: f64,
    pub cost: f64,
    pub gross_profit: f64,
    pub margin: Ratio,
}

pub fn cost_sales_points(view: &FilteredView<'_>) -> Vec<ScatterPoint> {
    view.iter()
        .map(|r| ScatterPoint {
            product_name: r.product_name.clone(),
            sales: r.sales,
            cost: r.cost,
            gross_profit: r.gross_profit,
            margin: r.margin,
        })
        .collect()
}
