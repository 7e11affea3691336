//! The import pipeline.
//!
//! [`Import`] is configured through builder setters (in any order) and run
//! with [`Import::execute`]:
//!
//! ```text
//! spreadsheet ─▶ reader ─▶ materializer ─▶ validator ─▶ batch hook ─▶ executor
//!                          (per row)       (per row)     (once)       (one transaction)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use sheetload::{CollectingSink, FieldDescriptor, FieldPath, FieldTree, Import, RecordStore};
//!
//! let import = Import::new()
//!     .model("users")
//!     .spreadsheet("uploads/users.csv")
//!     .skip_header(true)
//!     .fields(FieldTree::new().field("email", 0).field("name", 1))
//!     .descriptor(FieldPath::from("email"), FieldDescriptor::new().required(true).rules("email"))
//!     .unique_field("email");
//!
//! let mut store = RecordStore::in_memory();
//! let outcome = import.execute(&mut store, &CollectingSink::new())?;
//! ```

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::api::logs::{log_info, log_warning};
use crate::error::{ImportError, ImportResult, StoreResult};
use crate::models::{CandidateRecord, ImportBatch, ImportSummary, RawRow};
use crate::notify::NotificationSink;
use crate::parser::{read_spreadsheet, ColumnKeys};
use crate::schema::{Descriptors, FieldDescriptor, FieldPath, FieldTree};
use crate::storage::{Disks, LOCAL_DISK};
use crate::store::{Model, ModelStore, Transaction};
use crate::validation::FaultPolicy;

use super::assembler::{Assembly, BatchAssembler};
use super::executor::{AbortReason, Persistence, PersistenceExecutor, UpdateExisting};
use super::hooks::{AfterCreateHook, BatchHook, CreationHandler, HookResult, RowHook};
use super::materializer::Materializer;

/// How an import ended.
///
/// Rejections and vetoes are outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImportOutcome {
    /// Transaction committed.
    Completed(ImportSummary),
    /// A row failed validation; nothing was persisted. `line` is 1-based.
    Rejected { line: usize, message: String },
    /// The batch hook vetoed the import before persistence.
    Cancelled,
    /// The transaction was rolled back.
    RolledBack(AbortReason),
}

impl ImportOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ImportOutcome::Completed(_))
    }
}

/// A configured spreadsheet import.
pub struct Import {
    spreadsheet: Option<String>,
    disk: String,
    storage: Disks,
    column_keys: ColumnKeys,
    model: Option<String>,
    fields: FieldTree,
    descriptors: Descriptors,
    skip_fields: HashSet<FieldPath>,
    skip_header: bool,
    mass_create: bool,
    handle_blank_rows: bool,
    unique_field: Option<String>,
    update_existing: Option<UpdateExisting>,
    fault_policy: FaultPolicy,
    rows_before_create: Option<BatchHook>,
    before_create: Option<RowHook>,
    after_create: Option<AfterCreateHook>,
    record_creation: Option<CreationHandler>,
}

impl Default for Import {
    fn default() -> Self {
        Self {
            spreadsheet: None,
            disk: LOCAL_DISK.to_string(),
            storage: Disks::default(),
            column_keys: ColumnKeys::default(),
            model: None,
            fields: FieldTree::new(),
            descriptors: Descriptors::new(),
            skip_fields: HashSet::new(),
            skip_header: false,
            mass_create: true,
            handle_blank_rows: false,
            unique_field: None,
            update_existing: None,
            fault_policy: FaultPolicy::default(),
            rows_before_create: None,
            before_create: None,
            after_create: None,
            record_creation: None,
        }
    }
}

impl Import {
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Source
    // -------------------------------------------------------------------------

    /// Path of the spreadsheet, relative to the disk root.
    pub fn spreadsheet(mut self, path: impl Into<String>) -> Self {
        self.spreadsheet = Some(path.into());
        self
    }

    /// Disk holding the spreadsheet (default `local`).
    pub fn disk(mut self, disk: impl Into<String>) -> Self {
        self.disk = disk.into();
        self
    }

    /// Disk roots used to locate the spreadsheet.
    pub fn storage(mut self, storage: Disks) -> Self {
        self.storage = storage;
        self
    }

    pub fn column_keys(mut self, keys: ColumnKeys) -> Self {
        self.column_keys = keys;
        self
    }

    // -------------------------------------------------------------------------
    // Schema
    // -------------------------------------------------------------------------

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn fields(mut self, fields: FieldTree) -> Self {
        self.fields = fields;
        self
    }

    pub fn descriptors(mut self, descriptors: Descriptors) -> Self {
        self.descriptors = descriptors;
        self
    }

    pub fn descriptor(mut self, path: FieldPath, descriptor: FieldDescriptor) -> Self {
        self.descriptors.insert(path, descriptor);
        self
    }

    /// Keys left out of the candidate records.
    pub fn skip_fields_in_execution<I>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = FieldPath>,
    {
        self.skip_fields.extend(paths);
        self
    }

    // -------------------------------------------------------------------------
    // Flags and policies
    // -------------------------------------------------------------------------

    /// Drop the first row of the sheet.
    pub fn skip_header(mut self, skip: bool) -> Self {
        self.skip_header = skip;
        self
    }

    /// Insert with `create` (no observers) instead of `save` (default true).
    pub fn mass_create(mut self, mass_create: bool) -> Self {
        self.mass_create = mass_create;
        self
    }

    pub fn handle_blank_rows(mut self, handle: bool) -> Self {
        self.handle_blank_rows = handle;
        self
    }

    /// Skip rows whose `attribute` value already exists.
    pub fn unique_field(mut self, attribute: impl Into<String>) -> Self {
        self.unique_field = Some(attribute.into());
        self
    }

    /// Update records matching `key` with `attributes` instead of creating.
    pub fn allow_updating_existing_model<I, S>(mut self, key: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.update_existing = Some(UpdateExisting {
            key: key.into(),
            attributes: attributes.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    // -------------------------------------------------------------------------
    // Hooks
    // -------------------------------------------------------------------------

    pub fn mutate_rows_before_create<F>(mut self, hook: F) -> Self
    where
        F: Fn(ImportBatch) -> HookResult<ImportBatch> + Send + Sync + 'static,
    {
        self.rows_before_create = Some(Arc::new(hook));
        self
    }

    pub fn mutate_before_create<F>(mut self, hook: F) -> Self
    where
        F: Fn(CandidateRecord) -> HookResult<CandidateRecord> + Send + Sync + 'static,
    {
        self.before_create = Some(Arc::new(hook));
        self
    }

    pub fn mutate_after_create<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Model, &CandidateRecord, bool) -> Option<Model> + Send + Sync + 'static,
    {
        self.after_create = Some(Arc::new(hook));
        self
    }

    pub fn handle_record_creation<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut dyn Transaction, &CandidateRecord) -> StoreResult<Model> + Send + Sync + 'static,
    {
        self.record_creation = Some(Arc::new(handler));
        self
    }

    // -------------------------------------------------------------------------
    // Execution
    // -------------------------------------------------------------------------

    /// Read the configured spreadsheet and import it.
    pub fn execute(&self, store: &mut dyn ModelStore, sink: &dyn NotificationSink) -> ImportResult<ImportOutcome> {
        let spreadsheet = self.spreadsheet.as_deref().ok_or(ImportError::MissingSpreadsheet)?;
        if self.model.is_none() {
            return Err(ImportError::MissingModel);
        }

        let path = self.storage.path(&self.disk, spreadsheet)?;
        log_info(format!("Reading {}", path.display()));
        let rows = read_spreadsheet(&path, self.column_keys)?;

        self.execute_rows(rows, store, sink)
    }

    /// Import rows that were already read.
    pub fn execute_rows(
        &self,
        rows: Vec<RawRow>,
        store: &mut dyn ModelStore,
        sink: &dyn NotificationSink,
    ) -> ImportResult<ImportOutcome> {
        let model = self.model.as_deref().ok_or(ImportError::MissingModel)?;
        log_info(format!("Importing {} rows into '{}'", rows.len(), model));

        // The heading row is consumed by the reader in heading mode.
        let skip_header = self.skip_header && self.column_keys == ColumnKeys::Index;

        let assembler = BatchAssembler::new(Materializer::new(&self.fields, &self.descriptors, &self.skip_fields))
            .skip_header(skip_header)
            .handle_blank_rows(self.handle_blank_rows)
            .fault_policy(self.fault_policy);

        let (batch, processed) = match assembler.assemble(rows, sink) {
            Assembly::Ready { batch, processed } => (batch, processed),
            Assembly::Rejected { line, message } => return Ok(ImportOutcome::Rejected { line, message }),
        };

        let batch = match &self.rows_before_create {
            Some(hook) => match hook(batch) {
                HookResult::Proceed(batch) => batch,
                HookResult::Reject => {
                    log_warning("Import cancelled before persistence");
                    return Ok(ImportOutcome::Cancelled);
                }
            },
            None => batch,
        };

        let executor = PersistenceExecutor {
            model: model.to_string(),
            mass_create: self.mass_create,
            unique_field: self.unique_field.clone(),
            update_existing: self.update_existing.clone(),
            before_create: self.before_create.clone(),
            after_create: self.after_create.clone(),
            creation: self.record_creation.clone(),
        };

        let outcome = match executor.persist(store, batch, processed, sink)? {
            Persistence::Committed(summary) => ImportOutcome::Completed(summary),
            Persistence::RolledBack { reason, .. } => ImportOutcome::RolledBack(reason),
        };
        Ok(outcome)
    }
}
