//! Error types for the Sheetload import pipeline.
//!
//! One error type per layer:
//!
//! - [`SheetError`] - spreadsheet reading errors
//! - [`StorageError`] - disk / path resolution errors
//! - [`ConfigError`] - import definition errors
//! - [`RuleError`] - broken validation rules (internal validator faults)
//! - [`StoreError`] - model store errors
//! - [`ImportError`] - top-level pipeline errors
//! - [`ServerError`] - HTTP server errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.
//!
//! Note that a rejected row or a vetoed batch is *not* an error: those are
//! reported through [`crate::transform::ImportOutcome`].

use thiserror::Error;

// =============================================================================
// Spreadsheet Errors
// =============================================================================

/// Errors while reading a spreadsheet into rows.
#[derive(Debug, Error)]
pub enum SheetError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to decode the file content.
    #[error("Failed to decode content: {0}")]
    EncodingError(String),

    /// Invalid CSV content.
    #[error("Invalid CSV at line {line}: {message}")]
    CsvError { line: usize, message: String },

    /// Workbook could not be opened or read.
    #[error("Invalid workbook: {0}")]
    WorkbookError(String),

    /// File extension is not a known spreadsheet format.
    #[error("Unsupported spreadsheet format: {0}")]
    UnsupportedFormat(String),

    /// The workbook has no sheet.
    #[error("Spreadsheet has no sheet")]
    NoSheet,
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors while locating an uploaded file on a disk.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Disk identifier is not configured.
    #[error("Unknown disk: {0}")]
    UnknownDisk(String),

    /// Path escapes the disk root or is absolute.
    #[error("Invalid path on disk '{disk}': {path}")]
    InvalidPath { disk: String, path: String },

    /// File does not exist.
    #[error("File not found on disk '{disk}': {path}")]
    NotFound { disk: String, path: String },

    /// IO error.
    #[error("Storage IO error: {0}")]
    IoError(#[from] std::io::Error),
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors in an import definition.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the definition file.
    #[error("Failed to read config: {0}")]
    IoError(#[from] std::io::Error),

    /// Definition is not valid JSON or does not deserialize.
    #[error("Config JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Definition does not match the embedded JSON schema.
    #[error("Config does not match schema: {}", errors.join("; "))]
    SchemaError { errors: Vec<String> },

    /// Field path is empty or malformed.
    #[error("Invalid field path: '{0}'")]
    InvalidFieldPath(String),

    /// A descriptor points at a key missing from the field tree.
    #[error("Descriptor '{0}' has no matching field in the field tree")]
    UnknownField(String),

    /// A declared rule does not parse.
    #[error("Invalid rule for field '{field}': {source}")]
    InvalidRule {
        field: String,
        #[source]
        source: RuleError,
    },

    /// An operation's regex pattern does not compile.
    #[error("Invalid operation for field '{field}': {source}")]
    InvalidOperation {
        field: String,
        #[source]
        source: regex::Error,
    },
}

// =============================================================================
// Rule Errors
// =============================================================================

/// A validation rule that cannot be evaluated.
///
/// These are faults of the rule set itself, not of the validated data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
    /// Rule name is not known.
    #[error("Unknown validation rule: {0}")]
    UnknownRule(String),

    /// Rule parameter is missing or malformed.
    #[error("Invalid parameter for rule '{rule}': {message}")]
    InvalidParameter { rule: String, message: String },

    /// Regex rule pattern does not compile.
    #[error("Invalid pattern for rule '{rule}': {message}")]
    InvalidPattern { rule: String, message: String },
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors from the model store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record does not exist.
    #[error("Record not found: {model}#{id}")]
    NotFound { model: String, id: u64 },

    /// A saving observer refused the record.
    #[error("Save of '{model}' refused: {message}")]
    Refused { model: String, message: String },

    /// IO error.
    #[error("Store IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error.
    #[error("Store JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Import Errors (top-level)
// =============================================================================

/// Top-level import errors.
///
/// Returned by [`crate::transform::Import::execute`] for faults only: an
/// unreadable file, a misconfigured import or a failing store.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Spreadsheet error.
    #[error("Spreadsheet error: {0}")]
    Sheet(#[from] SheetError),

    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// No spreadsheet path configured.
    #[error("No spreadsheet configured")]
    MissingSpreadsheet,

    /// No target model configured.
    #[error("No target model configured")]
    MissingModel,
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Import error.
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for spreadsheet operations.
pub type SheetResult<T> = Result<T, SheetError>;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for rule parsing.
pub type RuleResult<T> = Result<T, RuleError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for import operations.
pub type ImportResult<T> = Result<T, ImportError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
