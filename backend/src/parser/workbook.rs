//! Workbooks (xlsx, xlsm, xls, xlsb, ods) through calamine.

use calamine::{open_workbook_auto, Data, Reader, Sheets};
use chrono::{Duration, NaiveDate};
use serde_json::{json, Value};
use std::path::Path;

use crate::error::{SheetError, SheetResult};

/// Read the first sheet as (0-based line, cells).
///
/// Leading empty rows and columns are kept so that line and column indices
/// match the sheet.
pub fn read_workbook(path: &Path) -> SheetResult<Vec<(usize, Vec<Value>)>> {
    let mut workbook: Sheets<_> =
        open_workbook_auto(path).map_err(|e| SheetError::WorkbookError(e.to_string()))?;

    let first = workbook.sheet_names().first().cloned().ok_or(SheetError::NoSheet)?;
    let range = workbook
        .worksheet_range(&first)
        .map_err(|e| SheetError::WorkbookError(format!("Failed to read sheet '{}': {}", first, e)))?;

    let (row_offset, col_offset) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let rows = range
        .rows()
        .enumerate()
        .map(|(i, row)| {
            let mut cells = vec![Value::Null; col_offset];
            cells.extend(row.iter().map(cell_to_value));
            (row_offset + i, cells)
        })
        .collect();

    Ok(rows)
}

/// Convert a calamine cell to JSON.
fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        Data::Int(i) => json!(*i),
        Data::Float(f) => {
            if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                json!(*f as i64)
            } else {
                json!(*f)
            }
        }
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => serial_to_iso(dt.as_f64()).map(Value::String).unwrap_or(Value::Null),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::String(s.clone()),
    }
}

/// Excel serial date (1900 system) to `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM:SS`.
fn serial_to_iso(serial: f64) -> Option<String> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let seconds = (serial * 86_400.0).round() as i64;
    let datetime = epoch.checked_add_signed(Duration::try_seconds(seconds)?)?;

    if seconds % 86_400 == 0 {
        Some(datetime.format("%Y-%m-%d").to_string())
    } else {
        Some(datetime.format("%Y-%m-%dT%H:%M:%S").to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_to_value() {
        assert_eq!(cell_to_value(&Data::Empty), Value::Null);
        assert_eq!(cell_to_value(&Data::Float(3.0)), json!(3));
        assert_eq!(cell_to_value(&Data::Float(2.5)), json!(2.5));
        assert_eq!(cell_to_value(&Data::Int(7)), json!(7));
        assert_eq!(cell_to_value(&Data::String("Ada".into())), json!("Ada"));
        assert_eq!(cell_to_value(&Data::Bool(true)), json!(true));
    }

    #[test]
    fn test_serial_to_iso() {
        assert_eq!(serial_to_iso(45292.0).as_deref(), Some("2024-01-01"));
        assert_eq!(serial_to_iso(45292.5).as_deref(), Some("2024-01-01T12:00:00"));
    }

    #[test]
    fn test_missing_workbook() {
        let err = read_workbook(Path::new("does/not/exist.xlsx")).unwrap_err();
        assert!(matches!(err, SheetError::WorkbookError(_)));
    }
}
