//! Batch assembler: materialize and validate every row before anything is
//! persisted.

use crate::api::logs::{log_info, log_info_indent};
use crate::models::{ImportBatch, RawRow};
use crate::notify::NotificationSink;
use crate::validation::{validate_row, FaultPolicy, RowVerdict};

use super::materializer::Materializer;

/// Result of assembling a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Assembly {
    /// Every row validated.
    Ready {
        batch: ImportBatch,
        /// Rows left after header skip and blank-row filtering
        processed: usize,
    },
    /// A row failed validation; `line` is 1-based.
    Rejected { line: usize, message: String },
}

/// Drives the materializer and the row validator over a sheet.
pub struct BatchAssembler<'a> {
    materializer: Materializer<'a>,
    skip_header: bool,
    handle_blank_rows: bool,
    fault_policy: FaultPolicy,
}

impl<'a> BatchAssembler<'a> {
    pub fn new(materializer: Materializer<'a>) -> Self {
        Self {
            materializer,
            skip_header: false,
            handle_blank_rows: false,
            fault_policy: FaultPolicy::default(),
        }
    }

    pub fn skip_header(mut self, skip: bool) -> Self {
        self.skip_header = skip;
        self
    }

    /// Drop rows whose cells are all blank before validation.
    pub fn handle_blank_rows(mut self, handle: bool) -> Self {
        self.handle_blank_rows = handle;
        self
    }

    pub fn fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    /// Rows that will be processed, in sheet order.
    pub fn select(&self, rows: Vec<RawRow>) -> Vec<RawRow> {
        let skip = usize::from(self.skip_header);
        rows.into_iter()
            .skip(skip)
            .filter(|row| !(self.handle_blank_rows && row.is_blank()))
            .collect()
    }

    /// Assemble the batch, stopping at the first rejected row.
    pub fn assemble(&self, rows: Vec<RawRow>, sink: &dyn NotificationSink) -> Assembly {
        let rows = self.select(rows);
        let processed = rows.len();
        log_info(format!("Validating {} rows", processed));

        let mut batch = ImportBatch::new();
        for row in &rows {
            let materialized = self.materializer.materialize(row);
            let verdict = validate_row(
                materialized.record,
                &materialized.ruleset,
                &materialized.messages,
                row.line + 1,
                self.fault_policy,
                sink,
            );

            match verdict {
                RowVerdict::Accept(record) => {
                    batch.insert(row.line, record);
                }
                RowVerdict::Reject { line, message } => {
                    log_info_indent(format!("Stopped at line {}", line), 1);
                    return Assembly::Rejected { line, message };
                }
            }
        }

        Assembly::Ready { batch, processed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{CollectingSink, Severity};
    use crate::schema::{Descriptors, FieldDescriptor, FieldPath, FieldTree};
    use serde_json::{json, Value};
    use std::collections::HashSet;

    fn rows(values: Value) -> Vec<RawRow> {
        values
            .as_array()
            .unwrap()
            .iter()
            .enumerate()
            .map(|(i, r)| RawRow::from_values(i, r.as_array().cloned().unwrap()))
            .collect()
    }

    fn fixture() -> (FieldTree, Descriptors, HashSet<FieldPath>) {
        let tree = FieldTree::new().field("email", 0).field("name", 1);
        let descriptors = Descriptors::from([
            (FieldPath::from("email"), FieldDescriptor::new().required(true).rules("email")),
            (FieldPath::from("name"), FieldDescriptor::new()),
        ]);
        (tree, descriptors, HashSet::new())
    }

    #[test]
    fn test_all_rows_valid() {
        let (tree, descriptors, skip) = fixture();
        let assembler = BatchAssembler::new(Materializer::new(&tree, &descriptors, &skip)).skip_header(true);
        let sink = CollectingSink::new();

        let sheet = rows(json!([["Email", "Name"], ["a@b.c", "Ada"], ["d@e.f", "Grace"]]));
        let Assembly::Ready { batch, processed } = assembler.assemble(sheet, &sink) else {
            panic!("expected a ready batch");
        };

        assert_eq!(processed, 2);
        assert_eq!(batch.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(batch[&2].get("name"), Some(&json!("Grace")));
        assert!(sink.notifications().is_empty());
    }

    #[test]
    fn test_first_invalid_row_stops_assembly() {
        let (tree, descriptors, skip) = fixture();
        let assembler = BatchAssembler::new(Materializer::new(&tree, &descriptors, &skip));
        let sink = CollectingSink::new();

        let sheet = rows(json!([["a@b.c", "Ada"], ["", "Blank"], ["nope", "Bad"]]));
        let result = assembler.assemble(sheet, &sink);

        assert_eq!(
            result,
            Assembly::Rejected { line: 2, message: "The email field is required.".to_string() }
        );
        let notes = sink.notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].severity, Severity::Danger);
        assert!(notes[0].body.contains("line 2"));
    }

    #[test]
    fn test_blank_rows_filtered_before_validation() {
        let (tree, descriptors, skip) = fixture();
        let assembler = BatchAssembler::new(Materializer::new(&tree, &descriptors, &skip))
            .skip_header(true)
            .handle_blank_rows(true);
        let sink = CollectingSink::new();

        let sheet = rows(json!([["Email", "Name"], ["a@b.c", "Ada"], ["", " "], ["d@e.f", null]]));
        let Assembly::Ready { batch, processed } = assembler.assemble(sheet, &sink) else {
            panic!("expected a ready batch");
        };

        assert_eq!(processed, 2);
        assert_eq!(batch.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_blank_rows_kept_when_not_handled() {
        let (tree, descriptors, skip) = fixture();
        let assembler = BatchAssembler::new(Materializer::new(&tree, &descriptors, &skip));

        let sheet = rows(json!([["a@b.c", "Ada"], ["", ""]]));
        assert_eq!(assembler.select(sheet).len(), 2);
    }

    #[test]
    fn test_fault_policy() {
        let tree = FieldTree::new().field("code", 0);
        let descriptors = Descriptors::from([(FieldPath::from("code"), FieldDescriptor::new().rules("shiny"))]);
        let skip = HashSet::new();
        let sheet = || rows(json!([["x"]]));

        let open = BatchAssembler::new(Materializer::new(&tree, &descriptors, &skip));
        assert!(matches!(open.assemble(sheet(), &CollectingSink::new()), Assembly::Ready { .. }));

        let closed = BatchAssembler::new(Materializer::new(&tree, &descriptors, &skip))
            .fault_policy(FaultPolicy::FailClosed);
        assert!(matches!(closed.assemble(sheet(), &CollectingSink::new()), Assembly::Rejected { line: 1, .. }));
    }
}
