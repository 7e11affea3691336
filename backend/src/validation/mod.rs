//! Validation.
//!
//! - [`rules`] - rule parsing and evaluation (`"required|email|max:255"`)
//! - [`validator`] - the row validator used by the batch assembler
//! - [`schema`] - JSON Schema checks for import definition files

pub mod rules;
pub mod schema;
pub mod validator;

pub use rules::Rule;
pub use schema::{is_valid, validate, validate_import_config};
pub use validator::{
    validate_record, validate_row, CustomMessages, FaultPolicy, FieldError, RowVerdict,
    ValidationFailure, ValidationRuleset,
};
