//! Mutation hooks.
//!
//! Hooks may rewrite data or veto it. A veto is a value, not an error:
//! hooks return [`HookResult::Reject`] and the pipeline decides what a
//! rejection means at that stage.

use std::sync::Arc;

use crate::error::StoreResult;
use crate::models::{CandidateRecord, ImportBatch};
use crate::store::{Model, Transaction};

/// Result of a hook that may veto.
#[derive(Debug, Clone, PartialEq)]
pub enum HookResult<T> {
    Proceed(T),
    Reject,
}

impl<T> HookResult<T> {
    pub fn is_reject(&self) -> bool {
        matches!(self, HookResult::Reject)
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            HookResult::Proceed(value) => Some(value),
            HookResult::Reject => None,
        }
    }
}

impl<T> From<Option<T>> for HookResult<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => HookResult::Proceed(value),
            None => HookResult::Reject,
        }
    }
}

/// Runs once over the whole validated batch, before persistence.
pub type BatchHook = Arc<dyn Fn(ImportBatch) -> HookResult<ImportBatch> + Send + Sync>;

/// Runs per row right before the existence checks.
pub type RowHook = Arc<dyn Fn(CandidateRecord) -> HookResult<CandidateRecord> + Send + Sync>;

/// Runs after a create or update: (model, original candidate, was_update).
/// A returned model replaces the persisted one in the executor's view.
pub type AfterCreateHook =
    Arc<dyn Fn(&Model, &CandidateRecord, bool) -> Option<Model> + Send + Sync>;

/// Replaces the default creation step. Receives the open transaction so the
/// created record joins it.
pub type CreationHandler =
    Arc<dyn Fn(&mut dyn Transaction, &CandidateRecord) -> StoreResult<Model> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_result_conversions() {
        let proceed: HookResult<u8> = Some(3).into();
        assert_eq!(proceed, HookResult::Proceed(3));
        assert!(!proceed.is_reject());
        assert_eq!(proceed.into_option(), Some(3));

        let reject: HookResult<u8> = None.into();
        assert!(reject.is_reject());
        assert_eq!(reject.into_option(), None);
    }
}
