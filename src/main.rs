use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use sales_dashboard::ingestion::DatasetLoader;
use sales_dashboard::{report, DashboardConfig, DashboardEngine, FilterSpec};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "sales-dashboard")]
#[command(about = "Profitability dashboard over a sales table")]
struct Args {
    /// Sales table (csv, xlsx, xls, xlsb, ods). Falls back to DASHBOARD_DATA.
    data: Option<PathBuf>,

    /// Optional JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Sheet name or 0-based index for spreadsheet input
    #[arg(long)]
    sheet: Option<String>,

    /// Division to include (repeatable)
    #[arg(short, long = "division")]
    divisions: Vec<String>,

    /// Region to include (repeatable)
    #[arg(short, long = "region")]
    regions: Vec<String>,

    /// Case-insensitive product name search
    #[arg(short, long)]
    product: Option<String>,

    /// Minimum margin in [0, 1]
    #[arg(short, long)]
    min_margin: Option<f64>,

    /// First order date (inclusive, YYYY-MM-DD)
    #[arg(long, requires = "to")]
    from: Option<NaiveDate>,

    /// Last order date (inclusive, YYYY-MM-DD)
    #[arg(long, requires = "from")]
    to: Option<NaiveDate>,

    /// Length of the ranking tables
    #[arg(long)]
    top: Option<usize>,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Also write every result table as CSV into this directory
    #[arg(long)]
    export_dir: Option<PathBuf>,
}

impl Args {
    fn filter_spec(&self) -> FilterSpec {
        let mut spec = FilterSpec::new()
            .with_divisions(self.divisions.iter().cloned())
            .with_regions(self.regions.iter().cloned());
        if let Some(query) = &self.product {
            spec = spec.with_product_query(query.clone());
        }
        if let Some(min_margin) = self.min_margin {
            spec = spec.with_min_margin(min_margin);
        }
        if let (Some(from), Some(to)) = (self.from, self.to) {
            spec = spec.with_date_range(from, to);
        }
        spec
    }
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = DashboardConfig::resolve(args.config.as_deref())?;
    if let Some(data) = &args.data {
        config.data_path = Some(data.clone());
    }
    if args.sheet.is_some() {
        config.sheet = args.sheet.clone();
    }
    if let Some(top) = args.top {
        config.top_n = top;
    }
    config.validate()?;

    let data_path = config
        .data_path
        .clone()
        .context("no input file given (pass a path or set DASHBOARD_DATA)")?;

    info!("Loading {}", data_path.display());
    let dataset = DatasetLoader::from_config(&config)
        .load(&data_path)
        .with_context(|| format!("failed to load {}", data_path.display()))?;

    let engine = DashboardEngine::new(dataset, &config);
    let snapshot = engine.snapshot(&args.filter_spec())?;

    match args.format {
        OutputFormat::Text => println!("{}", snapshot),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
    }

    if let Some(dir) = &args.export_dir {
        let written = report::export_csv(&snapshot, dir)
            .with_context(|| format!("failed to export to {}", dir.display()))?;
        info!("Wrote {} tables to {}", written.len(), dir.display());
    }

    Ok(())
}
