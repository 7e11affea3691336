//! Model store: where imported records are persisted.
//!
//! The import pipeline only talks to the [`ModelStore`] and [`Transaction`]
//! traits. Every write goes through a transaction handle obtained from
//! [`ModelStore::begin`]; dropping the handle without committing discards
//! its writes.
//!
//! [`RecordStore`] is the bundled implementation: in-memory tables, optionally
//! persisted as one JSON file per model.

pub mod records;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreResult;
use crate::models::CandidateRecord;
use crate::validation::rules::scalar_string;

pub use records::{RecordStore, RecordTransaction, SavingObserver};

/// A persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: u64,
    /// Name of the model (table) the record belongs to
    pub model: String,
    pub attributes: Map<String, Value>,
    pub created_at: String,
    pub updated_at: String,
}

impl Model {
    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.attributes.get(attribute)
    }
}

/// A unit of work against the store.
pub trait Transaction {
    /// First record of `model` whose `attribute` matches `value`.
    fn find_by(&self, model: &str, attribute: &str, value: &Value) -> StoreResult<Option<Model>>;

    /// Insert directly, bypassing saving observers.
    fn create(&mut self, model: &str, attributes: CandidateRecord) -> StoreResult<Model>;

    /// Instantiate then save: saving observers run first and may rewrite or
    /// refuse the attributes.
    fn save(&mut self, model: &str, attributes: CandidateRecord) -> StoreResult<Model>;

    /// Overwrite the given attributes of an existing record.
    fn update(&mut self, existing: &Model, attributes: CandidateRecord) -> StoreResult<Model>;

    fn commit(self: Box<Self>) -> StoreResult<()>;

    fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// A store able to open transactions.
pub trait ModelStore {
    fn begin(&mut self) -> StoreResult<Box<dyn Transaction + '_>>;

    /// Committed records of a model, by id.
    fn all(&self, model: &str) -> Vec<Model>;
}

/// Loose equality used for attribute lookups: `"5"` matches `5`.
pub fn values_match(stored: &Value, wanted: &Value) -> bool {
    if stored == wanted {
        return true;
    }
    match (scalar_string(stored), scalar_string(wanted)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
