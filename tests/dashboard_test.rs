use chrono::NaiveDate;
use sales_dashboard::risk::{self, ParetoMetric};
use sales_dashboard::{
    DashboardConfig, DashboardEngine, DashboardError, Dataset, DatasetLoader, FilterSpec, FilteredView,
    RecordPredicate, SalesRecord,
};
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

const CANDY_CSV: &str = "\
  Product Name ,Division , Region,Order  Date,Sales,Cost,Units,Gross Profit
Wonka Bar,Chocolate,Pacific,2024-01-15,500.0,300.0,50,200.0
Laffy Taffy,Sugar,Atlantic,2024-02-10,300.0,270.0,30,30.0
Nerds,Sugar,Gulf,2024-03-05,150.0,100.0,15,50.0
Fizzy Lifting,Other,Pacific,,50.0,20.0,0,30.0
";

fn write_csv(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn load_candy() -> Dataset {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(&dir, "candy.csv", CANDY_CSV);
    DatasetLoader::default().load(&path).unwrap()
}

#[test]
fn test_load_csv_with_padded_headers() {
    let dataset = load_candy();
    assert_eq!(dataset.len(), 4);

    let wonka = &dataset.records()[0];
    assert_eq!(wonka.product_name, "Wonka Bar");
    assert_eq!(wonka.region.as_deref(), Some("Pacific"));
    assert_eq!(wonka.order_date, Some(date(2024, 1, 15)));
    assert_eq!(wonka.margin.value(), Some(0.4));
    assert_eq!(wonka.profit_per_unit.value(), Some(4.0));

    let fizzy = &dataset.records()[3];
    assert_eq!(fizzy.order_date, None);
    assert!(!fizzy.profit_per_unit.is_defined());
}

#[test]
fn test_missing_column_is_schema_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(
        &dir,
        "candy.csv",
        "Product Name,Division,Sales,Cost,Units,Gross Profitt\nWonka Bar,Chocolate,1,1,1,0\n",
    );

    match DatasetLoader::default().load(&path) {
        Err(DashboardError::Schema { column, hint }) => {
            assert_eq!(column, "gross_profit");
            assert_eq!(hint.as_deref(), Some("Gross Profitt"));
        }
        other => panic!("expected schema error, got {:?}", other.map(|d| d.len())),
    }
}

#[test]
fn test_malformed_order_date() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(
        &dir,
        "candy.csv",
        "Product Name,Division,Order Date,Sales,Cost,Units,Gross Profit\n\
         Wonka Bar,Chocolate,2024-01-15,10,5,1,5\n\
         Nerds,Sugar,someday,10,5,1,5\n",
    );

    match DatasetLoader::default().load(&path) {
        Err(DashboardError::MalformedDate { column, row, value }) => {
            assert_eq!(column, "Order Date");
            assert_eq!(row, 2);
            assert_eq!(value, "someday");
        }
        other => panic!("expected malformed date, got {:?}", other.map(|d| d.len())),
    }
}

#[test]
fn test_unsupported_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(&dir, "candy.txt", CANDY_CSV);
    assert!(matches!(
        DatasetLoader::default().load(&path),
        Err(DashboardError::UnsupportedFormat(_))
    ));
}

#[test]
fn test_snapshot_end_to_end() {
    let engine = DashboardEngine::new(load_candy(), &DashboardConfig::default());

    let all = engine.snapshot(&FilterSpec::new()).unwrap();
    let division_sales: f64 = all.division_performance.rows.iter().map(|r| r.sales).sum();
    assert_eq!(division_sales, all.kpis.total_sales);
    assert_eq!(all.top_profit_products.rows[0].key, "Wonka Bar");
    assert_eq!(all.profit_pareto.curve.points.last().unwrap().cumulative_fraction, 1.0);

    // the undated record drops out once a date range is set
    let q1 = engine
        .snapshot(&FilterSpec::new().with_date_range(date(2024, 1, 1), date(2024, 2, 28)))
        .unwrap();
    assert_eq!(q1.kpis.record_count, 2);
    assert_eq!(q1.kpis.total_sales, 800.0);

    let json = serde_json::to_value(&all).unwrap();
    assert_eq!(json["kpis"]["record_count"], 4);
    assert_eq!(json["division_performance"]["rows"][0]["key"], "Chocolate");
}

#[test]
fn test_snapshot_is_idempotent() {
    let engine = DashboardEngine::new(load_candy(), &DashboardConfig::default());
    let spec = FilterSpec::new().with_divisions(["Sugar"]).with_min_margin(0.05);
    let first = serde_json::to_value(engine.snapshot(&spec).unwrap()).unwrap();
    let second = serde_json::to_value(engine.snapshot(&spec).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_sequential_filters_equal_conjunction() {
    let dataset = load_candy();
    let by_division = FilterSpec::new().with_divisions(["Sugar", "Other"]);
    let by_margin = FilterSpec::new().with_min_margin(0.2);

    let sequential = by_margin.apply_view(&by_division.apply(&dataset));
    let combined = by_division.and(&by_margin).apply(&dataset);

    let names = |view: &FilteredView<'_>| view.iter().map(|r| r.product_name.clone()).collect::<Vec<_>>();
    assert_eq!(names(&sequential), names(&combined));
    assert_eq!(names(&combined), vec!["Nerds", "Fizzy Lifting"]);
}

#[test]
fn test_pareto_eighty_percent_boundary() {
    let dataset = Dataset::from_records(
        [("a", 50.0), ("b", 30.0), ("c", 15.0), ("d", 5.0)]
            .iter()
            .map(|&(name, gp)| SalesRecord::new(name, "Chocolate", gp * 2.0, gp, 1.0, gp))
            .collect(),
    );
    let frame = FilteredView::all(&dataset).to_frame().unwrap();
    let curve = risk::pareto_curve(&frame, ParetoMetric::GrossProfit).unwrap();
    let contributors: Vec<&str> = curve.contributors(0.8).iter().map(|p| p.key.as_str()).collect();
    assert_eq!(contributors, vec!["a", "b"]);
}

#[test]
fn test_dependency_threshold_is_strict() {
    let mut records = vec![
        SalesRecord::new("Big", "Chocolate", 101.0, 50.0, 1.0, 51.0),
        SalesRecord::new("Edge", "Chocolate", 100.0, 50.0, 1.0, 50.0),
    ];
    for i in 0..8 {
        records.push(SalesRecord::new(format!("Small {}", i), "Sugar", 99.875, 50.0, 1.0, 49.875));
    }
    let engine = DashboardEngine::new(Dataset::from_records(records), &DashboardConfig::default());
    let snap = engine.snapshot(&FilterSpec::new()).unwrap();

    let flagged: Vec<&str> = snap
        .product_dependency
        .iter()
        .filter(|s| s.flagged)
        .map(|s| s.key.as_str())
        .collect();
    assert_eq!(flagged, vec!["Big"]);
}

#[test]
fn test_config_file_and_env_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dashboard.json");
    std::fs::write(&path, r#"{ "top_n": 3, "thresholds": { "margin_risk": 0.3 } }"#).unwrap();

    let mut config = DashboardConfig::load(&path).unwrap();
    assert_eq!(config.top_n, 3);
    assert_eq!(config.thresholds.margin_risk, 0.3);
    assert_eq!(config.thresholds.pareto_cutoff, 0.8);

    config
        .apply_env(|key| match key {
            "DASHBOARD_TOP_N" => Some("5".to_string()),
            "DASHBOARD_DATA" => Some("sales.xlsx".to_string()),
            _ => None,
        })
        .unwrap();
    assert_eq!(config.top_n, 5);
    assert_eq!(config.data_path, Some(PathBuf::from("sales.xlsx")));
}
