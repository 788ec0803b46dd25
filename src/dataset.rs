//! Typed, immutable sales records.

use chrono::NaiveDate;
use serde::{Serialize, Serializer};

/// A ratio that may be undefined (zero or non-finite denominator).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Ratio {
    Defined(f64),
    #[default]
    Undefined,
}

impl Ratio {
    pub fn divide(numerator: f64, denominator: f64) -> Self {
        if denominator == 0.0 || !denominator.is_finite() || !numerator.is_finite() {
            return Ratio::Undefined;
        }
        let value = numerator / denominator;
        if value.is_finite() {
            Ratio::Defined(value)
        } else {
            Ratio::Undefined
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Ratio::Defined(v) => Some(*v),
            Ratio::Undefined => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Ratio::Defined(_))
    }

    /// `self < threshold`; false when undefined.
    pub fn lt(&self, threshold: f64) -> bool {
        self.value().is_some_and(|v| v < threshold)
    }

    pub fn gt(&self, threshold: f64) -> bool {
        self.value().is_some_and(|v| v > threshold)
    }

    pub fn ge(&self, threshold: f64) -> bool {
        self.value().is_some_and(|v| v >= threshold)
    }
}

impl From<Option<f64>> for Ratio {
    fn from(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => Ratio::Defined(v),
            _ => Ratio::Undefined,
        }
    }
}

impl Serialize for Ratio {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value().serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesRecord {
    pub product_name: String,
    pub division: String,
    pub region: Option<String>,
    pub order_date: Option<NaiveDate>,
    pub ship_date: Option<NaiveDate>,
    pub sales: f64,
    pub cost: f64,
    pub units: f64,
    pub gross_profit: f64,

    /// gross_profit / sales
    pub margin: Ratio,

    /// gross_profit / units
    pub profit_per_unit: Ratio,
}

impl SalesRecord {
    pub fn new(
        product_name: impl Into<String>,
        division: impl Into<String>,
        sales: f64,
        cost: f64,
        units: f64,
        gross_profit: f64,
    ) -> Self {
        Self {
            product_name: product_name.into(),
            division: division.into(),
            region: None,
            order_date: None,
            ship_date: None,
            sales,
            cost,
            units,
            gross_profit,
            margin: Ratio::Undefined,
            profit_per_unit: Ratio::Undefined,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_order_date(mut self, date: NaiveDate) -> Self {
        self.order_date = Some(date);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    records: Vec<SalesRecord>,
}

impl Dataset {
    /// Derives `margin` and `profit_per_unit` for every row.
    pub fn from_records(mut records: Vec<SalesRecord>) -> Self {
        crate::metrics::derive_metrics(&mut records);
        Self { records }
    }

    pub fn records(&self) -> &[SalesRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct divisions in first-seen order (feeds the division multi-select).
    pub fn divisions(&self) -> Vec<String> {
        distinct(self.records.iter().map(|r| r.division.as_str()))
    }

    pub fn regions(&self) -> Vec<String> {
        distinct(self.records.iter().filter_map(|r| r.region.as_deref()))
    }

    /// Earliest and latest order date, if any record carries one.
    pub fn order_date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        use itertools::{Itertools, MinMaxResult};

        match self.records.iter().filter_map(|r| r.order_date).minmax() {
            MinMaxResult::NoElements => None,
            MinMaxResult::OneElement(d) => Some((d, d)),
            MinMaxResult::MinMax(lo, hi) => Some((lo, hi)),
        }
    }
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    use itertools::Itertools;

    values.unique().map(str::to_string).collect()
}
