//! Spreadsheet reader.
//!
//! Reads a whole file into [`RawRow`]s. Delimited text goes through
//! [`delimited`] (encoding and delimiter auto-detection), workbooks through
//! [`workbook`] (first sheet only).
//!
//! Cells are keyed by column index (`"0"`, `"1"`, ...) unless
//! [`ColumnKeys::Heading`] is used, in which case the first row is consumed
//! as the header and names the columns.

pub mod delimited;
pub mod workbook;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::{SheetError, SheetResult};
use crate::models::RawRow;

pub use delimited::{decode_content, detect_delimiter, detect_encoding, parse_delimited, read_delimited};
pub use workbook::read_workbook;

/// How cells are keyed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKeys {
    /// `"0"`, `"1"`, ...; a header row is an ordinary row
    #[default]
    Index,
    /// Header text of the first row
    Heading,
}

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadsheetFormat {
    Delimited,
    Workbook,
}

impl SpreadsheetFormat {
    /// Pick the format from the file extension.
    pub fn from_path(path: &Path) -> SheetResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "csv" | "tsv" | "txt" => Ok(Self::Delimited),
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Ok(Self::Workbook),
            _ => Err(SheetError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// A read sheet with what was detected along the way.
#[derive(Debug, Clone)]
pub struct ParsedSheet {
    pub rows: Vec<RawRow>,
    /// Header row in heading mode
    pub headers: Option<Vec<String>>,
    pub encoding: Option<String>,
    pub delimiter: Option<char>,
}

/// Read a spreadsheet into rows.
pub fn read_spreadsheet(path: &Path, keys: ColumnKeys) -> SheetResult<Vec<RawRow>> {
    Ok(read_sheet(path, keys)?.rows)
}

/// Read a spreadsheet and keep the detection metadata.
pub fn read_sheet(path: &Path, keys: ColumnKeys) -> SheetResult<ParsedSheet> {
    let (lines, encoding, delimiter) = match SpreadsheetFormat::from_path(path)? {
        SpreadsheetFormat::Delimited => {
            let bytes = std::fs::read(path)?;
            let sheet = read_delimited(&bytes)?;
            (sheet.rows, Some(sheet.encoding), Some(sheet.delimiter))
        }
        SpreadsheetFormat::Workbook => (read_workbook(path)?, None, None),
    };

    let (rows, headers) = key_rows(lines, keys);
    Ok(ParsedSheet { rows, headers, encoding, delimiter })
}

/// Turn (line, cells) pairs into keyed rows.
pub fn key_rows(lines: Vec<(usize, Vec<Value>)>, keys: ColumnKeys) -> (Vec<RawRow>, Option<Vec<String>>) {
    match keys {
        ColumnKeys::Index => {
            let rows = lines.into_iter().map(|(line, cells)| RawRow::from_values(line, cells)).collect();
            (rows, None)
        }
        ColumnKeys::Heading => {
            let mut lines = lines.into_iter();
            let Some((_, header)) = lines.next() else {
                return (Vec::new(), Some(Vec::new()));
            };
            let headers = column_names(&header);
            let rows = lines
                .map(|(line, cells)| {
                    let mut map = Map::new();
                    for (i, cell) in cells.into_iter().enumerate() {
                        let key = headers.get(i).cloned().unwrap_or_else(|| i.to_string());
                        map.insert(key, cell);
                    }
                    RawRow::new(line, map)
                })
                .collect();
            (rows, Some(headers))
        }
    }
}

/// Header texts; empty or repeated headers fall back to the column index.
fn column_names(header: &[Value]) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(header.len());
    for (i, cell) in header.iter().enumerate() {
        let text = match cell {
            Value::String(s) => s.trim().to_string(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        if text.is_empty() || names.contains(&text) {
            names.push(i.to_string());
        } else {
            names.push(text);
        }
    }
    names
}
