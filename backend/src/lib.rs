//! # Sheetload - bulk import of spreadsheet rows into a record store
//!
//! Sheetload reads a CSV or workbook, turns every row into a candidate record
//! through a declared field tree, validates it, lets hooks rewrite or veto the
//! batch, and persists everything inside one transaction.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌─────────────┐   ┌─────────────┐   ┌─────────────┐
//! │ Spreadsheet │──▶│   Parser    │──▶│ Materialize │──▶│  Assemble   │──▶│   Persist   │
//! │ (CSV/XLSX)  │   │ (auto-enc)  │   │ + validate  │   │  + hooks    │   │ (1 txn)     │
//! └─────────────┘   └─────────────┘   └─────────────┘   └─────────────┘   └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sheetload::{CollectingSink, FieldDescriptor, FieldTree, Import, RecordStore};
//!
//! let mut store = RecordStore::open(".sheetload/store")?;
//! let sink = CollectingSink::new();
//!
//! let outcome = Import::new()
//!     .spreadsheet("users.csv")
//!     .model("users")
//!     .fields(FieldTree::new().field("email", 0).field("name", 1))
//!     .descriptor("email".into(), FieldDescriptor::new().required(true).rules("email"))
//!     .skip_header(true)
//!     .unique_field("email")
//!     .execute(&mut store, &sink)?;
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Rows, candidate records, batches and summaries
//! - [`schema`] - Field trees and field descriptors
//! - [`validation`] - Row rules and import config schema validation
//! - [`parser`] - CSV and workbook reading with auto-detection
//! - [`storage`] - Named disks spreadsheets are read from
//! - [`store`] - Transactional record store
//! - [`transform`] - Materializer, assembler, hooks, executor and pipeline
//! - [`notify`] - User-facing notifications
//! - [`config`] - JSON import definitions and runtime settings
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;
pub mod notify;

// Declarations
pub mod config;
pub mod schema;

// Reading
pub mod parser;
pub mod storage;

// Validation
pub mod validation;

// Persistence
pub mod store;

// Pipeline
pub mod transform;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, ImportError, ImportResult, RuleError, ServerError, SheetError, StorageError,
    StoreError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{CandidateRecord, ImportBatch, ImportSummary, PersistenceOutcome, RawRow};

// =============================================================================
// Re-exports - Field declarations
// =============================================================================

pub use schema::{Descriptors, FieldDescriptor, FieldPath, FieldTree};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{validate_record, FaultPolicy, Rule, RowVerdict, ValidationFailure};

// =============================================================================
// Re-exports - Parsing & storage
// =============================================================================

pub use parser::{read_sheet, read_spreadsheet, ColumnKeys, ParsedSheet, SpreadsheetFormat};
pub use storage::{Disks, LOCAL_DISK};

// =============================================================================
// Re-exports - Store
// =============================================================================

pub use store::{Model, ModelStore, RecordStore, Transaction};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::{
    operations_description, AbortReason, HookResult, Import, ImportOutcome, Operation,
    PersistenceExecutor,
};

// =============================================================================
// Re-exports - Notifications & config
// =============================================================================

pub use config::{ImportConfig, Settings};
pub use notify::{CollectingSink, Notification, NotificationSink, Severity, NOTIFICATIONS};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
