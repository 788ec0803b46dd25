use crate::dataset::{Dataset, SalesRecord};
use crate::error::{DashboardError, Result};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Anything that can accept or reject a record.
pub trait RecordPredicate {
    fn matches(&self, record: &SalesRecord) -> bool;

    fn apply<'a>(&self, dataset: &'a Dataset) -> FilteredView<'a> {
        FilteredView {
            records: dataset.records().iter().filter(|r| self.matches(r)).collect(),
        }
    }

    fn apply_view<'a>(&self, view: &FilteredView<'a>) -> FilteredView<'a> {
        FilteredView {
            records: view.records.iter().copied().filter(|r| self.matches(r)).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Active filter controls. Absent or empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    #[serde(default)]
    pub divisions: BTreeSet<String>,

    #[serde(default)]
    pub regions: BTreeSet<String>,

    #[serde(default)]
    pub date_range: Option<DateRange>,

    /// Case-insensitive substring of `product_name`.
    #[serde(default)]
    pub product_query: Option<String>,

    /// Minimum margin in [0, 1]; undefined margins never pass.
    #[serde(default)]
    pub min_margin: Option<f64>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_divisions<I, S>(mut self, divisions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.divisions = divisions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.regions = regions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_date_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.date_range = Some(DateRange::new(start, end));
        self
    }

    pub fn with_product_query(mut self, query: impl Into<String>) -> Self {
        self.product_query = Some(query.into());
        self
    }

    pub fn with_min_margin(mut self, min_margin: f64) -> Self {
        self.min_margin = Some(min_margin);
        self
    }

    /// Reject control values the UI should never produce.
    pub fn validate(&self) -> Result<()> {
        if let Some(m) = self.min_margin {
            if !(0.0..=1.0).contains(&m) {
                return Err(DashboardError::InvalidFilter(format!(
                    "min_margin must be within [0, 1], got {}",
                    m
                )));
            }
        }
        if let Some(range) = &self.date_range {
            if range.start > range.end {
                return Err(DashboardError::InvalidFilter(format!(
                    "date range start {} is after end {}",
                    range.start, range.end
                )));
            }
        }
        Ok(())
    }

    pub fn and(&self, other: &FilterSpec) -> AllOf {
        AllOf(vec![self.clone(), other.clone()])
    }

    pub fn is_unconstrained(&self) -> bool {
        self.divisions.is_empty()
            && self.regions.is_empty()
            && self.date_range.is_none()
            && self.normalized_query().is_none()
            && self.min_margin.is_none()
    }

    // matched as typed, whitespace included; only "" is a no-op
    fn normalized_query(&self) -> Option<String> {
        self.product_query
            .as_deref()
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase)
    }
}

impl RecordPredicate for FilterSpec {
    fn matches(&self, record: &SalesRecord) -> bool {
        if !self.divisions.is_empty() && !self.divisions.contains(&record.division) {
            return false;
        }

        if !self.regions.is_empty() {
            match &record.region {
                Some(region) if self.regions.contains(region) => {}
                _ => return false,
            }
        }

        if let Some(range) = &self.date_range {
            match record.order_date {
                Some(date) if range.contains(date) => {}
                _ => return false,
            }
        }

        if let Some(query) = self.normalized_query() {
            if !record.product_name.to_lowercase().contains(&query) {
                return false;
            }
        }

        if let Some(min_margin) = self.min_margin {
            if !record.margin.ge(min_margin) {
                return false;
            }
        }

        true
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllOf(pub Vec<FilterSpec>);

impl AllOf {
    pub fn and(mut self, other: &FilterSpec) -> Self {
        self.0.push(other.clone());
        self
    }
}

impl RecordPredicate for AllOf {
    fn matches(&self, record: &SalesRecord) -> bool {
        self.0.iter().all(|spec| spec.matches(record))
    }
}

/// Ordered subsequence of a dataset. Borrowed, never cached.
#[derive(Debug, Clone, Default)]
pub struct FilteredView<'a> {
    records: Vec<&'a SalesRecord>,
}

impl<'a> FilteredView<'a> {
    pub fn all(dataset: &'a Dataset) -> Self {
        Self::from_records(dataset.records())
    }

    pub fn from_records(records: &'a [SalesRecord]) -> Self {
        Self {
            records: records.iter().collect(),
        }
    }

    pub fn records(&self) -> &[&'a SalesRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a SalesRecord> + '_ {
        self.records.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_frame(&self) -> Result<DataFrame> {
        records_frame(self.iter())
    }
}

/// Flat table of records in their given order; undefined ratios become nulls.
pub fn records_frame<'a>(records: impl IntoIterator<Item = &'a SalesRecord>) -> Result<DataFrame> {
    let records: Vec<&SalesRecord> = records.into_iter().collect();
    let product: Vec<&str> = records.iter().map(|r| r.product_name.as_str()).collect();
    let division: Vec<&str> = records.iter().map(|r| r.division.as_str()).collect();
    let region: Vec<Option<&str>> = records.iter().map(|r| r.region.as_deref()).collect();
    let sales: Vec<f64> = records.iter().map(|r| r.sales).collect();
    let cost: Vec<f64> = records.iter().map(|r| r.cost).collect();
    let units: Vec<f64> = records.iter().map(|r| r.units).collect();
    let profit: Vec<f64> = records.iter().map(|r| r.gross_profit).collect();
    let margin: Vec<Option<f64>> = records.iter().map(|r| r.margin.value()).collect();
    let per_unit: Vec<Option<f64>> = records.iter().map(|r| r.profit_per_unit.value()).collect();

    Ok(DataFrame::new(vec![
        Series::new("product_name", product),
        Series::new("division", division),
        Series::new("region", region),
        Series::new("sales", sales),
        Series::new("cost", cost),
        Series::new("units", units),
        Series::new("gross_profit", profit),
        Series::new("margin", margin),
        Series::new("profit_per_unit", per_unit),
    ])?)
}
