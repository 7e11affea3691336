//! Domain models shared by the import pipeline.
//!
//! - [`RawRow`] - one spreadsheet row, keyed by column reference
//! - [`CandidateRecord`] - a row's values after materialization
//! - [`ImportBatch`] - every validated record, keyed by line index
//! - [`PersistenceOutcome`] - what the executor did with one row
//! - [`ImportSummary`] - aggregated counts for a committed import

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A record being imported: attribute name -> value, possibly nested.
pub type CandidateRecord = Map<String, Value>;

/// Validated records in spreadsheet order, keyed by 0-based line index.
pub type ImportBatch = BTreeMap<usize, CandidateRecord>;

// =============================================================================
// Raw rows
// =============================================================================

/// One row as produced by the spreadsheet reader.
///
/// Cells keep their column order. The line index is the 0-based position of
/// the row in the sheet and survives header skipping and blank-row filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub line: usize,
    pub cells: Map<String, Value>,
}

impl RawRow {
    pub fn new(line: usize, cells: Map<String, Value>) -> Self {
        Self { line, cells }
    }

    /// Build a row keyed by column index (`"0"`, `"1"`, ...).
    pub fn from_values(line: usize, values: impl IntoIterator<Item = Value>) -> Self {
        let cells = values
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect();
        Self { line, cells }
    }

    /// Look up a cell by column reference.
    ///
    /// String references are used as-is; integer references address the
    /// column by index.
    pub fn get(&self, reference: &Value) -> Option<&Value> {
        match reference {
            Value::String(s) => self.cells.get(s),
            Value::Number(n) => n.as_u64().and_then(|i| self.cells.get(&i.to_string())),
            _ => None,
        }
    }

    /// True when every cell is blank.
    pub fn is_blank(&self) -> bool {
        self.cells.values().all(is_blank)
    }
}

/// Whether a value counts as "not provided".
///
/// Null, whitespace-only strings and empty arrays/objects are blank.
/// `false` and `0` are values.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Blank check for an optional lookup result; absent is blank.
pub fn is_blank_opt(value: Option<&Value>) -> bool {
    value.map(is_blank).unwrap_or(true)
}

// =============================================================================
// Outcomes
// =============================================================================

/// What the persistence executor did with one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceOutcome {
    Created,
    Updated,
    SkippedDuplicate,
    /// The row stopped the import; its transaction was rolled back
    Aborted,
}

/// Counts reported after a committed import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    /// Rows read from the sheet (after header skip and blank-row filtering)
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Per-row outcomes in persistence order: (line index, outcome)
    pub outcomes: Vec<(usize, PersistenceOutcome)>,
}

impl ImportSummary {
    pub fn new(processed: usize) -> Self {
        Self { processed, ..Self::default() }
    }

    pub fn record(&mut self, line: usize, outcome: PersistenceOutcome) {
        match outcome {
            PersistenceOutcome::Created => self.created += 1,
            PersistenceOutcome::Updated => self.updated += 1,
            PersistenceOutcome::SkippedDuplicate => self.skipped += 1,
            PersistenceOutcome::Aborted => {}
        }
        self.outcomes.push((line, outcome));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blank_values() {
        assert!(is_blank(&Value::Null));
        assert!(is_blank(&json!("   ")));
        assert!(is_blank(&json!([])));
        assert!(!is_blank(&json!(0)));
        assert!(!is_blank(&json!(false)));
        assert!(!is_blank(&json!("0")));
        assert!(is_blank_opt(None));
    }

    #[test]
    fn test_row_lookup_by_index_and_name() {
        let row = RawRow::from_values(3, vec![json!("a@b.c"), json!(42)]);
        assert_eq!(row.get(&json!(0)), Some(&json!("a@b.c")));
        assert_eq!(row.get(&json!("1")), Some(&json!(42)));
        assert_eq!(row.get(&json!(5)), None);
        assert_eq!(row.get(&json!(true)), None);
    }

    #[test]
    fn test_blank_row() {
        let row = RawRow::from_values(0, vec![json!(""), Value::Null, json!(" ")]);
        assert!(row.is_blank());
        let row = RawRow::from_values(0, vec![json!(""), json!(0)]);
        assert!(!row.is_blank());
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = ImportSummary::new(3);
        summary.record(0, PersistenceOutcome::Created);
        summary.record(1, PersistenceOutcome::Updated);
        summary.record(2, PersistenceOutcome::SkippedDuplicate);
        assert_eq!((summary.created, summary.updated, summary.skipped), (1, 1, 1));
        assert_eq!(summary.outcomes.len(), 3);
    }
}
