use crate::error::{DashboardError, Result};
use calamine::{open_workbook_auto, Data, DataType as CellType, Range, Reader};
use polars::prelude::{DataFrame, NamedFrom, Series};
use std::path::Path;
use tracing::debug;

/// Read one worksheet (xlsx, xlsm, xlsb, xls, ods) into a frame, using its
/// first row as headers.
pub fn read_workbook(path: &Path, sheet: Option<&str>) -> Result<DataFrame> {
    let mut workbook = open_workbook_auto(path)?;
    let sheet_names = workbook.sheet_names().to_vec();
    let name = select_sheet(&sheet_names, sheet)
        .map_err(|e| DashboardError::Spreadsheet(format!("{}: {}", path.display(), e)))?;
    let range = workbook.worksheet_range(name)?;

    debug!(sheet = name, rows = range.height(), cols = range.width(), "worksheet loaded");
    range_to_frame(&range)
}

/// Name first, then 0-based index; the first sheet when no selector is given.
fn select_sheet<'a>(names: &'a [String], selector: Option<&str>) -> std::result::Result<&'a str, String> {
    let Some(first) = names.first() else {
        return Err("workbook has no worksheets".to_string());
    };
    let Some(selector) = selector else {
        return Ok(first);
    };
    if let Some(name) = names.iter().find(|s| s.as_str() == selector) {
        return Ok(name);
    }
    match selector.parse::<usize>() {
        Ok(idx) => names
            .get(idx)
            .map(String::as_str)
            .ok_or_else(|| format!("no sheet at index {} ({} sheets)", idx, names.len())),
        Err(_) => Err(format!(
            "no sheet named '{}' (available: {})",
            selector,
            names.join(", ")
        )),
    }
}

fn range_to_frame(range: &Range<Data>) -> Result<DataFrame> {
    let rows: Vec<&[Data]> = range.rows().collect();
    let Some((header_row, body)) = rows.split_first() else {
        return Ok(DataFrame::empty());
    };

    let mut columns = Vec::with_capacity(header_row.len());
    for (idx, header) in header_row.iter().enumerate() {
        let name = match cell_text(header) {
            Some(h) => h,
            None => format!("column_{}", idx + 1),
        };
        let cells: Vec<Option<&Data>> = body.iter().map(|row| row.get(idx)).collect();
        columns.push(column_to_series(&name, &cells));
    }

    Ok(DataFrame::new(columns)?)
}

/// Numeric when every non-empty cell is a number; text otherwise.
fn column_to_series(name: &str, cells: &[Option<&Data>]) -> Series {
    let numeric = cells
        .iter()
        .flatten()
        .all(|c| matches!(c, Data::Float(_) | Data::Int(_) | Data::Empty));

    if numeric {
        let values: Vec<Option<f64>> = cells.iter().map(|c| c.and_then(|cell| cell.as_f64())).collect();
        Series::new(name, values)
    } else {
        let values: Vec<Option<String>> = cells.iter().map(|c| c.and_then(cell_text)).collect();
        Series::new(name, values)
    }
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => Some(s.clone()),
        Data::DateTime(_) => cell
            .as_datetime()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .or_else(|| Some(cell.to_string())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
        Data::Error(e) => Some(format!("{:?}", e)),
        other => Some(other.to_string()),
    }
}
