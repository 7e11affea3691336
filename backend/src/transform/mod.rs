//! Row transformation and persistence.
//!
//! - [`materializer`] - raw row to candidate record
//! - [`assembler`] - materialize and validate every row into a batch
//! - [`hooks`] - mutation hook types
//! - [`executor`] - transactional persistence of a batch
//! - [`operations`] - declarative value operations for descriptor transforms
//! - [`pipeline`] - the [`Import`] builder tying it together

pub mod assembler;
pub mod executor;
pub mod hooks;
pub mod materializer;
pub mod operations;
pub mod pipeline;

pub use assembler::{Assembly, BatchAssembler};
pub use executor::{AbortReason, Persistence, PersistenceExecutor, UpdateExisting};
pub use hooks::{AfterCreateHook, BatchHook, CreationHandler, HookResult, RowHook};
pub use materializer::{MaterializedRow, Materializer};
pub use operations::{compose, operations_description, Operation};
pub use pipeline::{Import, ImportOutcome};
