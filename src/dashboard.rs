use crate::aggregation::{
    self, AggregationResult, GroupKey, Kpis, MarginBox, Metric, PerformanceTable, ScatterPoint,
};
use crate::config::{DashboardConfig, RiskThresholds};
use crate::dataset::{Dataset, SalesRecord};
use crate::error::Result;
use crate::filter::{FilterSpec, FilteredView, RecordPredicate};
use crate::risk::{self, DependencyShare, Medians, ParetoCurve, ParetoMetric, ParetoPoint};
use chrono::NaiveDate;
use polars::prelude::DataFrame;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info_span};

#[derive(Debug, Clone, Serialize)]
pub struct ParetoView {
    pub curve: ParetoCurve,
    /// Leading products within the cutoff.
    pub contributors: Vec<ParetoPoint>,
}

impl ParetoView {
    fn build(frame: &DataFrame, metric: ParetoMetric, cutoff: f64) -> Result<Self> {
        let curve = risk::pareto_curve(frame, metric)?;
        let contributors = curve.contributors(cutoff).into_iter().cloned().collect();
        Ok(Self {
            curve,
            contributors,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuadrantView {
    pub medians: Medians,
    pub high_sales_low_margin: Vec<SalesRecord>,
    pub low_sales_low_profit: Vec<SalesRecord>,
}

/// Everything the rendering layer needs for one filter state.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub filter: FilterSpec,
    pub kpis: Kpis,
    pub top_profit_products: AggregationResult,
    pub top_margin_products: AggregationResult,
    pub division_performance: PerformanceTable,
    pub region_performance: PerformanceTable,
    pub margin_distribution: Vec<MarginBox>,
    pub cost_vs_sales: Vec<ScatterPoint>,
    pub profit_pareto: ParetoView,
    pub sales_pareto: ParetoView,
    pub quadrants: QuadrantView,
    pub product_dependency: Vec<DependencyShare>,
    pub region_dependency: Vec<DependencyShare>,
    pub cost_margin_risk: Vec<SalesRecord>,
    pub margin_risk: Vec<SalesRecord>,
}

/// Values for the filter controls, derived from the full dataset.
#[derive(Debug, Clone, Serialize)]
pub struct FilterOptions {
    pub divisions: Vec<String>,
    pub regions: Vec<String>,
    pub order_date_min: Option<NaiveDate>,
    pub order_date_max: Option<NaiveDate>,
}

pub struct DashboardEngine {
    dataset: Dataset,
    top_n: usize,
    thresholds: RiskThresholds,
}

impl DashboardEngine {
    pub fn new(dataset: Dataset, config: &DashboardConfig) -> Self {
        Self {
            dataset,
            top_n: config.top_n,
            thresholds: config.thresholds,
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn thresholds(&self) -> &RiskThresholds {
        &self.thresholds
    }

    /// Distinct divisions in first-seen order.
    pub fn divisions(&self) -> Vec<String> {
        self.dataset.divisions()
    }

    pub fn filter_options(&self) -> FilterOptions {
        let bounds = self.dataset.order_date_bounds();
        FilterOptions {
            divisions: self.dataset.divisions(),
            regions: self.dataset.regions(),
            order_date_min: bounds.map(|(lo, _)| lo),
            order_date_max: bounds.map(|(_, hi)| hi),
        }
    }

    /// Apply `spec` to the dataset.
    pub fn view(&self, spec: &FilterSpec) -> Result<FilteredView<'_>> {
        spec.validate()?;
        Ok(spec.apply(&self.dataset))
    }

    /// Recompute every dashboard view for `spec`.
    pub fn snapshot(&self, spec: &FilterSpec) -> Result<DashboardSnapshot> {
        let span = info_span!("snapshot", records = self.dataset.len());
        let _enter = span.enter();
        let started = Instant::now();

        let view = self.view(spec)?;
        let frame = view.to_frame()?;
        debug!(matched = view.len(), "filter applied");

        let t = &self.thresholds;
        let medians = Medians::of(&frame)?;
        let quadrants = risk::median_quadrants(&view, medians);
        let snapshot = DashboardSnapshot {
            filter: spec.clone(),
            kpis: aggregation::kpis(&frame)?,
            top_profit_products: aggregation::aggregate(&frame, GroupKey::Product, Metric::GrossProfit)?
                .top(self.top_n),
            top_margin_products: aggregation::aggregate(&frame, GroupKey::Product, Metric::Margin)?
                .top(self.top_n),
            division_performance: aggregation::performance(&frame, GroupKey::Division)?,
            region_performance: aggregation::performance(&frame, GroupKey::Region)?,
            margin_distribution: aggregation::margin_distribution(&frame)?,
            cost_vs_sales: aggregation::cost_sales_points(&view),
            profit_pareto: ParetoView::build(&frame, ParetoMetric::GrossProfit, t.pareto_cutoff)?,
            sales_pareto: ParetoView::build(&frame, ParetoMetric::Sales, t.pareto_cutoff)?,
            quadrants: QuadrantView {
                medians,
                high_sales_low_margin: owned(&quadrants.high_sales_low_margin),
                low_sales_low_profit: owned(&quadrants.low_sales_low_profit),
            },
            product_dependency: risk::product_dependency_risk(&frame, t)?,
            region_dependency: risk::region_dependency_risk(&frame, t)?,
            cost_margin_risk: owned(&risk::cost_margin_risk(&view, t)),
            margin_risk: owned(&risk::margin_risk(&view, &medians, t)),
        };

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            flagged = snapshot.cost_margin_risk.len(),
            "snapshot computed"
        );
        Ok(snapshot)
    }
}

fn owned(records: &[&SalesRecord]) -> Vec<SalesRecord> {
    records.iter().map(|r| (*r).clone()).collect()
}
