use crate::config::ColumnAliases;
use crate::dataset::SalesRecord;
use crate::error::{DashboardError, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use polars::prelude::*;
use regex::Regex;

lazy_static! {
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").expect("static regex");
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Minimum Jaro-Winkler score for a header to be offered as a hint.
const HINT_SIMILARITY: f64 = 0.8;

/// Trim a raw header and collapse internal whitespace runs to one space.
/// Case is preserved.
pub fn normalize_header(raw: &str) -> String {
    WHITESPACE_RUN.replace_all(raw.trim(), " ").into_owned()
}

/// Rename every column of `df` to its normalized header.
pub fn normalize_headers(df: &mut DataFrame) -> Result<()> {
    let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    for name in names {
        let normalized = normalize_header(&name);
        if normalized != name {
            df.rename(&name, &normalized)?;
        }
    }
    Ok(())
}

/// Source column chosen for each canonical field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub product_name: String,
    pub division: String,
    pub region: Option<String>,
    pub order_date: Option<String>,
    pub ship_date: Option<String>,
    pub sales: String,
    pub cost: String,
    pub units: String,
    pub gross_profit: String,
}

impl ColumnMap {
    /// Match normalized headers against the configured aliases.
    pub fn resolve(headers: &[String], aliases: &ColumnAliases) -> Result<Self> {
        let optional = |candidates: &[String]| -> Option<String> {
            candidates.iter().find(|c| headers.contains(c)).cloned()
        };
        let required = |field: &str, candidates: &[String]| -> Result<String> {
            optional(candidates).ok_or_else(|| DashboardError::Schema {
                column: field.to_string(),
                hint: closest_header(headers, field, candidates),
            })
        };

        Ok(Self {
            product_name: required("product_name", &aliases.product_name)?,
            division: required("division", &aliases.division)?,
            region: optional(&aliases.region),
            order_date: optional(&aliases.order_date),
            ship_date: optional(&aliases.ship_date),
            sales: required("sales", &aliases.sales)?,
            cost: required("cost", &aliases.cost)?,
            units: required("units", &aliases.units)?,
            gross_profit: required("gross_profit", &aliases.gross_profit)?,
        })
    }
}

fn closest_header(headers: &[String], field: &str, candidates: &[String]) -> Option<String> {
    let wanted: Vec<String> = std::iter::once(field.to_string())
        .chain(candidates.iter().cloned())
        .map(|s| s.to_lowercase().replace('_', " "))
        .collect();

    headers
        .iter()
        .map(|h| {
            let h_norm = h.to_lowercase().replace('_', " ");
            let score = wanted
                .iter()
                .map(|w| strsim::jaro_winkler(&h_norm, w))
                .fold(0.0, f64::max);
            (h, score)
        })
        .filter(|(_, score)| *score >= HINT_SIMILARITY)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(h, _)| h.clone())
}

/// Build base records from a frame whose headers are already normalized.
pub fn extract_records(df: &DataFrame, map: &ColumnMap) -> Result<Vec<SalesRecord>> {
    let products = text_column(df, &map.product_name)?;
    let divisions = text_column(df, &map.division)?;
    let regions = match &map.region {
        Some(c) => text_column(df, c)?,
        None => vec![None; df.height()],
    };
    let order_dates = match &map.order_date {
        Some(c) => date_column(df, c)?,
        None => vec![None; df.height()],
    };
    let ship_dates = match &map.ship_date {
        Some(c) => date_column(df, c)?,
        None => vec![None; df.height()],
    };
    let sales = numeric_column(df, &map.sales)?;
    let cost = numeric_column(df, &map.cost)?;
    let units = numeric_column(df, &map.units)?;
    let gross_profit = numeric_column(df, &map.gross_profit)?;

    let mut records = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        records.push(SalesRecord {
            product_name: required_text(&products[row], &map.product_name, row)?,
            division: required_text(&divisions[row], &map.division, row)?,
            region: regions[row].clone(),
            order_date: order_dates[row],
            ship_date: ship_dates[row],
            sales: required_number(sales[row], &map.sales, row)?,
            cost: required_number(cost[row], &map.cost, row)?,
            units: required_number(units[row], &map.units, row)?,
            gross_profit: required_number(gross_profit[row], &map.gross_profit, row)?,
            margin: Default::default(),
            profit_per_unit: Default::default(),
        });
    }
    Ok(records)
}

fn required_text(value: &Option<String>, column: &str, row: usize) -> Result<String> {
    value.clone().ok_or_else(|| DashboardError::InvalidValue {
        column: column.to_string(),
        row: row + 1,
        reason: "value is empty".to_string(),
    })
}

fn required_number(value: Option<f64>, column: &str, row: usize) -> Result<f64> {
    value.ok_or_else(|| DashboardError::InvalidValue {
        column: column.to_string(),
        row: row + 1,
        reason: "expected a number".to_string(),
    })
}

fn text_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let series = df.column(name)?;
    if series.dtype().is_float() {
        // spreadsheet codes like 1001 arrive as floats
        let values = series.cast(&DataType::Float64)?;
        return Ok(values.f64()?.into_iter().map(|v| v.map(float_text)).collect());
    }
    let series = series.cast(&DataType::String)?;
    Ok(series
        .str()?
        .into_iter()
        .map(|v| v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string))
        .collect())
}

fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = df.column(name)?;
    if matches!(series.dtype(), DataType::String) {
        return Ok(series.str()?.into_iter().map(|v| v.and_then(parse_number)).collect());
    }
    let series = series.cast(&DataType::Float64)?;
    Ok(series
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect())
}

/// Whole numbers without a trailing `.0`.
fn float_text(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Parse a numeric cell that may carry thousands separators or a currency sign.
fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | ' '))
        .collect();
    cleaned.parse::<f64>().ok().filter(|x| x.is_finite())
}

fn date_column(df: &DataFrame, name: &str) -> Result<Vec<Option<NaiveDate>>> {
    let series = df.column(name)?;
    match series.dtype() {
        DataType::Date => days_since_epoch(&series.cast(&DataType::Int32)?),
        DataType::Datetime(_, _) => {
            days_since_epoch(&series.cast(&DataType::Date)?.cast(&DataType::Int32)?)
        }
        DataType::String => series
            .str()?
            .into_iter()
            .enumerate()
            .map(|(row, value)| match value.map(str::trim) {
                None | Some("") => Ok(None),
                Some(text) => parse_date(text).map(Some).ok_or_else(|| {
                    DashboardError::MalformedDate {
                        column: name.to_string(),
                        row: row + 1,
                        value: text.to_string(),
                    }
                }),
            })
            .collect(),
        dtype if dtype.is_numeric() => {
            let series = series.cast(&DataType::Float64)?;
            series
                .f64()?
                .into_iter()
                .enumerate()
                .map(|(row, value)| match value {
                    None => Ok(None),
                    Some(serial) => excel_serial_to_date(serial).map(Some).ok_or_else(|| {
                        DashboardError::MalformedDate {
                            column: name.to_string(),
                            row: row + 1,
                            value: serial.to_string(),
                        }
                    }),
                })
                .collect()
        }
        other => Err(DashboardError::MalformedDate {
            column: name.to_string(),
            row: 0,
            value: format!("unsupported column type {:?}", other),
        }),
    }
}

fn days_since_epoch(series: &Series) -> Result<Vec<Option<NaiveDate>>> {
    // NaiveDate::default() is 1970-01-01
    let epoch = NaiveDate::default();
    Ok(series
        .i32()?
        .into_iter()
        .map(|v| v.and_then(|days| epoch.checked_add_signed(Duration::days(days as i64))))
        .collect())
}

/// Spreadsheet serial day number (1900 date system).
fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(Duration::days(serial.trunc() as i64))
}

/// Parse a date or timestamp string; the time of day is dropped.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|dt| dt.date())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("  Gross   Profit \t"), "Gross Profit");
        assert_eq!(normalize_header("Sales"), "Sales");
        assert_eq!(normalize_header(" product_name"), "product_name");
    }

    #[test]
    fn test_resolve_display_headers() {
        let h = headers(&["Product Name", "Division", "Sales", "Cost", "Units", "Gross Profit", "Order Date"]);
        let map = ColumnMap::resolve(&h, &ColumnAliases::default()).unwrap();
        assert_eq!(map.gross_profit, "Gross Profit");
        assert_eq!(map.order_date.as_deref(), Some("Order Date"));
        assert_eq!(map.region, None);
    }

    #[test]
    fn test_missing_required_column_is_schema_error() {
        let h = headers(&["Product Name", "Division", "Sales", "Cost", "Units", "Gross Proft"]);
        let err = ColumnMap::resolve(&h, &ColumnAliases::default()).unwrap_err();
        match err {
            DashboardError::Schema { column, hint } => {
                assert_eq!(column, "gross_profit");
                assert_eq!(hint.as_deref(), Some("Gross Proft"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let h = headers(&["PRODUCT NAME", "Division", "Sales", "Cost", "Units", "Gross Profit"]);
        assert!(matches!(
            ColumnMap::resolve(&h, &ColumnAliases::default()),
            Err(DashboardError::Schema { .. })
        ));
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(parse_date("2024-03-09"), Some(expected));
        assert_eq!(parse_date("2024-03-09 13:45:00"), Some(expected));
        assert_eq!(parse_date("2024-03-09T13:45:00"), Some(expected));
        assert_eq!(parse_date("03/09/2024"), Some(expected));
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn test_excel_serial() {
        assert_eq!(excel_serial_to_date(45000.0), NaiveDate::from_ymd_opt(2023, 3, 15));
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(" 1,234.50 "), Some(1234.5));
        assert_eq!(parse_number("$12"), Some(12.0));
        assert_eq!(parse_number("n/a"), None);
    }

    #[test]
    fn test_extract_records_from_frame() {
        let mut df = df! [
            " Product Name " => ["Wonka Bar", "Nerds"],
            "Division" => ["Chocolate", "Sugar"],
            "Sales" => [10.0, 20.0],
            "Cost" => [4.0, 15.0],
            "Units" => [2i64, 0],
            "Gross Profit" => [6.0, 5.0],
            "Order Date" => ["2024-01-02", ""]
        ]
        .unwrap();
        normalize_headers(&mut df).unwrap();
        let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
        let map = ColumnMap::resolve(&names, &ColumnAliases::default()).unwrap();
        let records = extract_records(&df, &map).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].product_name, "Wonka Bar");
        assert_eq!(records[0].order_date, NaiveDate::from_ymd_opt(2024, 1, 2));
        assert_eq!(records[1].order_date, None);
        assert_eq!(records[1].units, 0.0);
    }

    #[test]
    fn test_numeric_codes_in_text_columns() {
        let df = df! [
            "Product Name" => [1001.0, 1002.5],
            "Division" => ["Chocolate", "Sugar"],
            "Region" => [7.0, -3.0],
            "Sales" => [10.0, 20.0],
            "Cost" => [4.0, 15.0],
            "Units" => [2i64, 1],
            "Gross Profit" => [6.0, 5.0]
        ]
        .unwrap();
        let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
        let map = ColumnMap::resolve(&names, &ColumnAliases::default()).unwrap();
        let records = extract_records(&df, &map).unwrap();

        assert_eq!(records[0].product_name, "1001");
        assert_eq!(records[1].product_name, "1002.5");
        assert_eq!(records[0].region.as_deref(), Some("7"));
        assert_eq!(records[1].region.as_deref(), Some("-3"));
    }

    #[test]
    fn test_malformed_date() {
        let df = df! [
            "Product Name" => ["Wonka Bar"],
            "Division" => ["Chocolate"],
            "Sales" => [10.0],
            "Cost" => [4.0],
            "Units" => [2i64],
            "Gross Profit" => [6.0],
            "Order Date" => ["yesterday"]
        ]
        .unwrap();
        let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
        let map = ColumnMap::resolve(&names, &ColumnAliases::default()).unwrap();
        let err = extract_records(&df, &map).unwrap_err();
        assert!(matches!(err, DashboardError::MalformedDate { row: 1, .. }));
    }
}
