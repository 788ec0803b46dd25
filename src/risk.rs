use crate::aggregation::{aggregate, keyed_values, scalar, GroupKey, Metric};
use crate::config::RiskThresholds;
use crate::dataset::SalesRecord;
use crate::error::Result;
use crate::filter::FilteredView;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Absorbs float error when comparing cumulative fractions to the cutoff.
const CUTOFF_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParetoMetric {
    Sales,
    GrossProfit,
}

impl From<ParetoMetric> for Metric {
    fn from(m: ParetoMetric) -> Self {
        match m {
            ParetoMetric::Sales => Metric::Sales,
            ParetoMetric::GrossProfit => Metric::GrossProfit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParetoPoint {
    pub key: String,
    pub contribution: f64,
    pub cumulative_fraction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParetoCurve {
    pub metric: ParetoMetric,
    pub points: Vec<ParetoPoint>,
}

impl ParetoCurve {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Leading products whose cumulative fraction is at most `cutoff`.
    /// The product that pushes the curve past the cutoff is not included.
    pub fn contributors(&self, cutoff: f64) -> Vec<&ParetoPoint> {
        self.points
            .iter()
            .take_while(|p| p.cumulative_fraction <= cutoff + CUTOFF_EPSILON)
            .collect()
    }

    pub fn to_frame(&self) -> Result<DataFrame> {
        let keys: Vec<String> = self.points.iter().map(|p| p.key.clone()).collect();
        let contribution: Vec<f64> = self.points.iter().map(|p| p.contribution).collect();
        let cumulative: Vec<f64> = self.points.iter().map(|p| p.cumulative_fraction).collect();
        Ok(DataFrame::new(vec![
            Series::new("product_name", keys),
            Series::new(Metric::from(self.metric).column_name(), contribution),
            Series::new("cumulative_fraction", cumulative),
        ])?)
    }
}

/// Cumulative contribution per product, largest first.
pub fn pareto_curve(frame: &DataFrame, metric: ParetoMetric) -> Result<ParetoCurve> {
    let value = Metric::from(metric).column_name();
    let ranked = aggregate(frame, GroupKey::Product, metric.into())?.to_frame()?;
    let total = ranked.column(value)?.f64()?.sum().unwrap_or(0.0);
    if ranked.height() == 0 || total == 0.0 || !total.is_finite() {
        return Ok(ParetoCurve {
            metric,
            points: Vec::new(),
        });
    }

    // last running total as denominator: the final point is exactly 1.0
    let running = col(value).cum_sum(false);
    let curve = ranked
        .lazy()
        .with_column((running.clone() / running.last()).alias("cumulative_fraction"))
        .collect()?;

    let fractions = keyed_values(&curve, "product_name", "cumulative_fraction")?;
    let points = keyed_values(&curve, "product_name", value)?
        .into_iter()
        .zip(fractions)
        .map(|((key, contribution), (_, cumulative_fraction))| ParetoPoint {
            key,
            contribution,
            cumulative_fraction,
        })
        .collect();

    Ok(ParetoCurve { metric, points })
}

/// Medians over the view; `None` where no value is available.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Medians {
    pub sales: Option<f64>,
    pub margin: Option<f64>,
    pub gross_profit: Option<f64>,
}

impl Medians {
    pub fn of(frame: &DataFrame) -> Result<Self> {
        let medians = frame
            .clone()
            .lazy()
            .select([
                col("sales").median(),
                col("margin").median(),
                col("gross_profit").median(),
            ])
            .collect()?;

        Ok(Self {
            sales: scalar(&medians, "sales")?,
            margin: scalar(&medians, "margin")?,
            gross_profit: scalar(&medians, "gross_profit")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quadrants<'a> {
    pub medians: Medians,
    pub high_sales_low_margin: Vec<&'a SalesRecord>,
    pub low_sales_low_profit: Vec<&'a SalesRecord>,
}

/// Split records around the view medians. Comparisons are strict, so a
/// record sitting on a median lands in neither bucket.
pub fn median_quadrants<'a>(view: &FilteredView<'a>, medians: Medians) -> Quadrants<'a> {
    let mut high_sales_low_margin = Vec::new();
    let mut low_sales_low_profit = Vec::new();

    if let Some(med_sales) = medians.sales {
        for record in view.iter() {
            if record.sales > med_sales
                && medians.margin.is_some_and(|m| record.margin.lt(m))
            {
                high_sales_low_margin.push(record);
            }
            if record.sales < med_sales
                && medians.gross_profit.is_some_and(|p| record.gross_profit < p)
            {
                low_sales_low_profit.push(record);
            }
        }
    }

    Quadrants {
        medians,
        high_sales_low_margin,
        low_sales_low_profit,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependencyShare {
    pub key: String,
    pub sales: f64,
    pub share: f64,
    pub flagged: bool,
}

/// Share of total view sales per key, largest first; `flagged` when the
/// share is strictly above `threshold`. Empty when total sales are zero.
pub fn dependency_risk(
    frame: &DataFrame,
    group_key: GroupKey,
    threshold: f64,
) -> Result<Vec<DependencyShare>> {
    let total = frame.column("sales")?.f64()?.sum().unwrap_or(0.0);
    if total == 0.0 || !total.is_finite() {
        return Ok(Vec::new());
    }

    let shares = aggregate(frame, group_key, Metric::Sales)?
        .to_frame()?
        .lazy()
        .with_column((col("sales") / lit(total)).alias("share"))
        .collect()?;

    let key = group_key.column_name();
    let share = keyed_values(&shares, key, "share")?;
    Ok(keyed_values(&shares, key, "sales")?
        .into_iter()
        .zip(share)
        .map(|((key, sales), (_, share))| DependencyShare {
            key,
            sales,
            share,
            flagged: share > threshold,
        })
        .collect())
}

pub fn product_dependency_risk(
    frame: &DataFrame,
    thresholds: &RiskThresholds,
) -> Result<Vec<DependencyShare>> {
    dependency_risk(frame, GroupKey::Product, thresholds.product_dependency)
}

pub fn region_dependency_risk(
    frame: &DataFrame,
    thresholds: &RiskThresholds,
) -> Result<Vec<DependencyShare>> {
    dependency_risk(frame, GroupKey::Region, thresholds.region_dependency)
}

pub fn cost_margin_risk<'a>(
    view: &FilteredView<'a>,
    thresholds: &RiskThresholds,
) -> Vec<&'a SalesRecord> {
    view.iter()
        .filter(|r| {
            r.cost > thresholds.cost_to_sales * r.sales && r.margin.lt(thresholds.cost_risk_margin)
        })
        .collect()
}

/// Low-margin records selling above the view's median sales.
pub fn margin_risk<'a>(
    view: &FilteredView<'a>,
    medians: &Medians,
    thresholds: &RiskThresholds,
) -> Vec<&'a SalesRecord> {
    let Some(med_sales) = medians.sales else {
        return Vec::new();
    };
    view.iter()
        .filter(|r| r.margin.lt(thresholds.margin_risk) && r.sales > med_sales)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;

    fn frame(ds: &Dataset) -> DataFrame {
        FilteredView::all(ds).to_frame().unwrap()
    }

    fn profits(values: &[(&str, f64)]) -> Dataset {
        Dataset::from_records(
            values
                .iter()
                .map(|&(name, gp)| SalesRecord::new(name, "Chocolate", gp * 2.0, gp, 1.0, gp))
                .collect(),
        )
    }

    #[test]
    fn test_pareto_boundary_is_inclusive() {
        let ds = profits(&[("a", 50.0), ("b", 30.0), ("c", 15.0), ("d", 5.0)]);
        let curve = pareto_curve(&frame(&ds), ParetoMetric::GrossProfit).unwrap();

        let fractions: Vec<f64> = curve.points.iter().map(|p| p.cumulative_fraction).collect();
        let expected = [0.50, 0.80, 0.95, 1.00];
        for (got, want) in fractions.iter().zip(expected) {
            assert!((got - want).abs() < 1e-12);
        }

        let names: Vec<&str> = curve
            .contributors(RiskThresholds::default().pareto_cutoff)
            .iter()
            .map(|p| p.key.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_pareto_is_monotonic_and_ends_at_one() {
        let ds = profits(&[("x", 3.0), ("y", 11.0), ("x", 4.0), ("z", 0.5), ("w", 9.0)]);
        let curve = pareto_curve(&frame(&ds), ParetoMetric::Sales).unwrap();

        assert!(curve
            .points
            .windows(2)
            .all(|w| w[0].cumulative_fraction <= w[1].cumulative_fraction));
        assert_eq!(curve.points.len(), 4);
        assert_eq!(curve.points[0].key, "y");
        assert_eq!(curve.points.last().unwrap().cumulative_fraction, 1.0);
    }

    #[test]
    fn test_pareto_empty_view() {
        let ds = Dataset::default();
        let curve = pareto_curve(&frame(&ds), ParetoMetric::GrossProfit).unwrap();
        assert!(curve.is_empty());
        assert!(curve.contributors(0.8).is_empty());
    }

    #[test]
    fn test_medians_skip_undefined_margin() {
        let ds = Dataset::from_records(vec![
            SalesRecord::new("a", "Sugar", 10.0, 9.0, 1.0, 1.0),
            SalesRecord::new("b", "Sugar", 20.0, 15.0, 1.0, 5.0),
            SalesRecord::new("free", "Sugar", 0.0, 2.0, 1.0, -2.0),
            SalesRecord::new("d", "Sugar", 40.0, 10.0, 1.0, 30.0),
        ]);
        let medians = Medians::of(&frame(&ds)).unwrap();
        // even count: mean of the middle pair
        assert_eq!(medians.sales, Some(15.0));
        assert_eq!(medians.gross_profit, Some(3.0));
        // margins 0.1, 0.25, 0.75; "free" has none
        assert_eq!(medians.margin, Some(0.25));

        let empty = Medians::of(&frame(&Dataset::default())).unwrap();
        assert_eq!(empty.sales, None);
        assert!(median_quadrants(&FilteredView::all(&Dataset::default()), empty)
            .high_sales_low_margin
            .is_empty());
    }

    #[test]
    fn test_dependency_risk_is_strict() {
        let ds = Dataset::from_records(vec![
            SalesRecord::new("big", "Sugar", 101.0, 50.0, 1.0, 51.0),
            SalesRecord::new("exact", "Sugar", 100.0, 50.0, 1.0, 50.0),
            SalesRecord::new("rest", "Sugar", 799.0, 400.0, 1.0, 399.0),
        ]);
        let shares = product_dependency_risk(&frame(&ds), &RiskThresholds::default()).unwrap();

        let flag = |k: &str| shares.iter().find(|s| s.key == k).unwrap().flagged;
        assert!(flag("big"));
        assert!(!flag("exact"));
        assert!(flag("rest"));
    }

    #[test]
    fn test_region_dependency_threshold() {
        let ds = Dataset::from_records(vec![
            SalesRecord::new("a", "Sugar", 25.0, 1.0, 1.0, 24.0).with_region("Gulf"),
            SalesRecord::new("b", "Sugar", 75.0, 1.0, 1.0, 74.0).with_region("Pacific"),
        ]);
        let shares = region_dependency_risk(&frame(&ds), &RiskThresholds::default()).unwrap();
        assert_eq!(shares[0].key, "Pacific");
        assert!(shares[0].flagged);
        assert!(!shares[1].flagged);
    }

    #[test]
    fn test_quadrants_are_disjoint_and_strict() {
        let ds = Dataset::from_records(vec![
            SalesRecord::new("a", "Sugar", 10.0, 9.0, 1.0, 1.0),
            SalesRecord::new("b", "Sugar", 20.0, 10.0, 1.0, 10.0),
            SalesRecord::new("c", "Sugar", 30.0, 27.0, 1.0, 3.0),
            SalesRecord::new("d", "Sugar", 40.0, 8.0, 1.0, 32.0),
            SalesRecord::new("e", "Sugar", 50.0, 46.0, 1.0, 4.0),
        ]);
        let medians = Medians::of(&frame(&ds)).unwrap();
        let q = median_quadrants(&FilteredView::all(&ds), medians);
        assert_eq!(q.medians.sales, Some(30.0));

        let hslm: Vec<&str> = q.high_sales_low_margin.iter().map(|r| r.product_name.as_str()).collect();
        let lslp: Vec<&str> = q.low_sales_low_profit.iter().map(|r| r.product_name.as_str()).collect();
        assert_eq!(hslm, vec!["e"]);
        assert_eq!(lslp, vec!["a"]);
        // "c" sits exactly on the sales median
        assert!(!hslm.contains(&"c") && !lslp.contains(&"c"));
        assert!(hslm.iter().all(|k| !lslp.contains(k)));
    }

    #[test]
    fn test_cost_margin_risk() {
        let ds = Dataset::from_records(vec![
            SalesRecord::new("thin", "Sugar", 100.0, 90.0, 1.0, 10.0),
            SalesRecord::new("healthy", "Sugar", 100.0, 50.0, 1.0, 50.0),
            SalesRecord::new("free", "Sugar", 0.0, 5.0, 1.0, -5.0),
        ]);
        let flagged = cost_margin_risk(&FilteredView::all(&ds), &RiskThresholds::default());
        let names: Vec<&str> = flagged.iter().map(|r| r.product_name.as_str()).collect();
        // undefined margin never qualifies
        assert_eq!(names, vec!["thin"]);
    }

    #[test]
    fn test_margin_risk_uses_sales_median() {
        let ds = Dataset::from_records(vec![
            SalesRecord::new("small thin", "Sugar", 10.0, 9.5, 1.0, 0.5),
            SalesRecord::new("mid", "Sugar", 20.0, 10.0, 1.0, 10.0),
            SalesRecord::new("big thin", "Sugar", 30.0, 28.0, 1.0, 2.0),
        ]);
        let medians = Medians::of(&frame(&ds)).unwrap();
        assert_eq!(medians.sales, Some(20.0));
        let flagged = margin_risk(&FilteredView::all(&ds), &medians, &RiskThresholds::default());
        let names: Vec<&str> = flagged.iter().map(|r| r.product_name.as_str()).collect();
        assert_eq!(names, vec!["big thin"]);
    }

    #[test]
    fn test_thresholds_can_be_varied() {
        let ds = Dataset::from_records(vec![
            SalesRecord::new("a", "Sugar", 60.0, 30.0, 1.0, 30.0),
            SalesRecord::new("b", "Sugar", 40.0, 20.0, 1.0, 20.0),
        ]);
        let strict = RiskThresholds {
            product_dependency: 0.5,
            ..RiskThresholds::default()
        };
        let shares = product_dependency_risk(&frame(&ds), &strict).unwrap();
        assert!(shares[0].flagged);
        assert!(!shares[1].flagged);
    }
}
