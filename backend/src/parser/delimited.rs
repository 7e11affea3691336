//! Delimited text (CSV/TSV) with encoding and delimiter auto-detection.

use serde_json::Value;

use crate::error::{SheetError, SheetResult};

/// Rows of a delimited file with the settings used to read it.
#[derive(Debug, Clone)]
pub struct DelimitedSheet {
    /// (0-based line, cells)
    pub rows: Vec<(usize, Vec<Value>)>,
    pub encoding: String,
    pub delimiter: char,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let charset = chardet::detect(bytes).0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes with the given encoding. Unknown encodings fall back to
/// lossy UTF-8.
pub fn decode_content(bytes: &[u8], encoding: &str) -> SheetResult<String> {
    let content = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => String::from_utf8_lossy(bytes).into_owned(),
        },
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        other => match encoding_rs::Encoding::for_label(other.as_bytes()) {
            Some(enc) => enc.decode(bytes).0.into_owned(),
            None => String::from_utf8_lossy(bytes).into_owned(),
        },
    };

    // Excel writes a BOM in front of UTF-8 exports
    Ok(content.trim_start_matches('\u{feff}').to_string())
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let mut best = (',', 0);
    for sep in [';', ',', '\t', '|'] {
        let count = first_line.matches(sep).count();
        if count > best.1 {
            best = (sep, count);
        }
    }
    best.0
}

/// Split decoded content into rows.
///
/// Cells are kept as strings. Line indices follow the file. The csv reader
/// skips empty lines, so each one comes back as a row of nulls as wide as the
/// row before it.
pub fn parse_delimited(content: &str, delimiter: char) -> SheetResult<Vec<(usize, Vec<Value>)>> {
    let delimiter = u8::try_from(delimiter)
        .map_err(|_| SheetError::EncodingError(format!("Delimiter '{}' is not ASCII", delimiter)))?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let bytes = content.as_bytes();
    let mut rows: Vec<(usize, Vec<Value>)> = Vec::new();
    // Newlines counted up to `scanned`
    let (mut scanned, mut newlines) = (0usize, 0usize);
    // First line after the previous record
    let mut next_line = 0usize;

    for (index, result) in reader.records().enumerate() {
        let record = result.map_err(|e| SheetError::CsvError {
            line: e.position().map(|p| p.line() as usize).unwrap_or(index + 1),
            message: e.to_string(),
        })?;

        let line = match record.position() {
            Some(position) => {
                // The reported offset may sit before the skipped empty lines
                let mut start = (position.byte() as usize).min(bytes.len()).max(scanned);
                while matches!(bytes.get(start), Some(b'\r' | b'\n')) {
                    start += 1;
                }
                newlines += bytes[scanned..start].iter().filter(|b| **b == b'\n').count();
                scanned = start;
                newlines
            }
            None => next_line,
        };

        let width = rows.last().map(|(_, cells)| cells.len()).unwrap_or(0);
        for blank in next_line..line {
            rows.push((blank, vec![Value::Null; width]));
        }

        // Quoted cells may span lines
        let spanned: usize = record.iter().map(|c| c.matches('\n').count()).sum();
        next_line = line + spanned + 1;

        let cells = record.iter().map(|c| Value::String(c.to_string())).collect();
        rows.push((line, cells));
    }

    Ok(rows)
}

/// Decode and parse raw bytes.
pub fn read_delimited(bytes: &[u8]) -> SheetResult<DelimitedSheet> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = detect_delimiter(&content);
    let rows = parse_delimited(&content, delimiter)?;

    Ok(DelimitedSheet { rows, encoding, delimiter })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_simple_rows() {
        let rows = parse_delimited("name;age\nAlice;30\nBob;25", ';').unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], (1, vec![json!("Alice"), json!("30")]));
        assert_eq!(rows[2].0, 2);
    }

    #[test]
    fn test_quoted_values() {
        let rows = parse_delimited("name,quote\n\"Doe, Jane\",\"She said \"\"hi\"\"\"", ',').unwrap();

        assert_eq!(rows[1].1, vec![json!("Doe, Jane"), json!("She said \"hi\"")]);
    }

    #[test]
    fn test_blank_lines_keep_line_numbers() {
        let rows = parse_delimited("a;b\n1;2\n\n3;4\n", ';').unwrap();

        let lines: Vec<usize> = rows.iter().map(|(l, _)| *l).collect();
        assert_eq!(lines, vec![0, 1, 2, 3]);
        assert_eq!(rows[2].1, vec![Value::Null, Value::Null]);
        assert_eq!(rows[3].1, vec![json!("3"), json!("4")]);
    }

    #[test]
    fn test_multiline_cell_counts_physical_lines() {
        let rows = parse_delimited("a;b\n\"x\ny\";1\n\n\n2;3\r\n", ';').unwrap();

        let lines: Vec<usize> = rows.iter().map(|(l, _)| *l).collect();
        assert_eq!(lines, vec![0, 1, 3, 4, 5]);
        assert_eq!(rows[1].1[0], json!("x\ny"));
        assert_eq!(rows[4].1, vec![json!("2"), json!("3")]);
    }

    #[test]
    fn test_ragged_rows() {
        let rows = parse_delimited("a;b;c\n1;;3\n1;2;3;4", ';').unwrap();

        assert_eq!(rows[1].1, vec![json!("1"), json!(""), json!("3")]);
        assert_eq!(rows[2].1.len(), 4);
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), '\t');
        assert_eq!(detect_delimiter("a|b|c\n1|2|3"), '|');
        assert_eq!(detect_delimiter("single"), ',');
    }

    #[test]
    fn test_read_delimited() {
        let sheet = read_delimited("email;name\nada@example.com;Ada".as_bytes()).unwrap();

        assert_eq!(sheet.delimiter, ';');
        assert_eq!(sheet.encoding, "utf-8");
        assert_eq!(sheet.rows.len(), 2);
    }

    #[test]
    fn test_bom_is_stripped() {
        let content = decode_content("\u{feff}a;b".as_bytes(), "utf-8").unwrap();
        assert_eq!(content, "a;b");
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1").unwrap();
        assert_eq!(decoded, "Société");
    }
}
