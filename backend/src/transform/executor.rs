//! Persistence executor: writes a validated batch inside one transaction.
//!
//! Per row, in order:
//! 1. before-create hook (a veto aborts the import)
//! 2. update-existing policy: a matching record gets the configured subset
//!    of attributes, and the row is done
//! 3. unique-field policy: a matching record skips the row
//! 4. create (bulk `create`, observed `save`, or the custom handler)
//! 5. after-create hook
//!
//! Any abort rolls the whole transaction back.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::api::logs::{log_error, log_info, log_info_indent, log_success};
use crate::error::StoreResult;
use crate::models::{CandidateRecord, ImportBatch, ImportSummary, PersistenceOutcome};
use crate::notify::{messages, Notification, NotificationSink};
use crate::store::{Model, ModelStore, Transaction};

use super::hooks::{AfterCreateHook, CreationHandler, HookResult, RowHook};

/// Update matching records instead of creating new ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateExisting {
    /// Attribute used to find the existing record
    pub key: String,
    /// Attributes copied onto the existing record
    pub attributes: Vec<String>,
}

/// Why a transaction was rolled back. Lines are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbortReason {
    RowVetoed { line: usize },
    MissingKey { line: usize, attribute: String },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::RowVetoed { line } => write!(f, "row on line {} was vetoed", line),
            AbortReason::MissingKey { line, attribute } => {
                write!(f, "line {} has no value for key attribute '{}'", line, attribute)
            }
        }
    }
}

/// Result of a persistence run.
#[derive(Debug, Clone, PartialEq)]
pub enum Persistence {
    Committed(ImportSummary),
    /// `summary` holds the discarded outcomes, ending with the aborted row.
    RolledBack { reason: AbortReason, summary: ImportSummary },
}

enum Step {
    Done(PersistenceOutcome),
    Abort(AbortReason),
}

/// Writes batches to a model store.
#[derive(Clone, Default)]
pub struct PersistenceExecutor {
    pub model: String,
    pub mass_create: bool,
    pub unique_field: Option<String>,
    pub update_existing: Option<UpdateExisting>,
    pub before_create: Option<RowHook>,
    pub after_create: Option<AfterCreateHook>,
    pub creation: Option<CreationHandler>,
}

impl PersistenceExecutor {
    pub fn new(model: impl Into<String>) -> Self {
        Self { model: model.into(), mass_create: true, ..Self::default() }
    }

    /// Persist `batch` in one transaction and notify the outcome.
    ///
    /// `processed` is the row count reported on success. Store failures are
    /// returned as errors after the transaction is discarded.
    pub fn persist(
        &self,
        store: &mut dyn ModelStore,
        batch: ImportBatch,
        processed: usize,
        sink: &dyn NotificationSink,
    ) -> StoreResult<Persistence> {
        log_info(format!("Persisting {} records into '{}'", batch.len(), self.model));

        let mut tx = store.begin()?;
        let mut summary = ImportSummary::new(processed);

        let mut abort = None;
        for (line, record) in batch {
            let step = match self.persist_row(&mut *tx, line, record) {
                Ok(step) => step,
                Err(e) => {
                    log_error(format!("Line {}: {}", line + 1, e));
                    tx.rollback()?;
                    return Err(e);
                }
            };
            match step {
                Step::Done(outcome) => summary.record(line, outcome),
                Step::Abort(reason) => {
                    summary.record(line, PersistenceOutcome::Aborted);
                    abort = Some(reason);
                    break;
                }
            }
        }

        if let Some(reason) = abort {
            tx.rollback()?;
            log_error(format!(
                "Rolled back: {} ({} earlier rows discarded)",
                reason,
                summary.outcomes.len() - 1
            ));
            sink.send(
                Notification::danger(messages::IMPORT_FAILED_TITLE, messages::import_failed()).persistent(),
            );
            return Ok(Persistence::RolledBack { reason, summary });
        }

        tx.commit()?;
        log_success(format!(
            "Committed: {} created, {} updated, {} skipped",
            summary.created, summary.updated, summary.skipped
        ));
        sink.send(
            Notification::success(
                messages::IMPORT_SUCCEEDED_TITLE,
                messages::import_succeeded(summary.processed, summary.skipped),
            )
            .persistent(),
        );
        Ok(Persistence::Committed(summary))
    }

    fn persist_row(&self, tx: &mut dyn Transaction, line: usize, record: CandidateRecord) -> StoreResult<Step> {
        let shown = line + 1;

        let record = match &self.before_create {
            Some(hook) => match hook(record) {
                HookResult::Proceed(record) => record,
                HookResult::Reject => {
                    log_info_indent(format!("Line {}: vetoed", shown), 1);
                    return Ok(Step::Abort(AbortReason::RowVetoed { line: shown }));
                }
            },
            None => record,
        };

        if let Some(update) = &self.update_existing {
            let Some(key) = key_value(&record, &update.key) else {
                return Ok(Step::Abort(AbortReason::MissingKey { line: shown, attribute: update.key.clone() }));
            };
            if let Some(existing) = tx.find_by(&self.model, &update.key, key)? {
                let subset = only(&record, &update.attributes);
                let updated = tx.update(&existing, subset)?;
                log_info_indent(format!("Line {}: updated #{}", shown, updated.id), 1);
                self.after(&updated, &record, true);
                return Ok(Step::Done(PersistenceOutcome::Updated));
            }
        }

        if let Some(unique) = &self.unique_field {
            let Some(value) = key_value(&record, unique) else {
                return Ok(Step::Abort(AbortReason::MissingKey { line: shown, attribute: unique.clone() }));
            };
            if tx.find_by(&self.model, unique, value)?.is_some() {
                log_info_indent(format!("Line {}: '{}' already exists, skipped", shown, unique), 1);
                return Ok(Step::Done(PersistenceOutcome::SkippedDuplicate));
            }
        }

        let created = match &self.creation {
            Some(handler) => handler(tx, &record)?,
            None if self.mass_create => tx.create(&self.model, record.clone())?,
            None => tx.save(&self.model, record.clone())?,
        };
        log_info_indent(format!("Line {}: created #{}", shown, created.id), 1);
        self.after(&created, &record, false);

        Ok(Step::Done(PersistenceOutcome::Created))
    }

    fn after(&self, model: &Model, record: &CandidateRecord, was_update: bool) {
        if let Some(hook) = &self.after_create {
            if let Some(replacement) = hook(model, record, was_update) {
                log_info_indent(format!("after-create returned #{}", replacement.id), 2);
            }
        }
    }
}

fn key_value<'a>(record: &'a CandidateRecord, attribute: &str) -> Option<&'a Value> {
    record.get(attribute).filter(|v| !v.is_null())
}

fn only(record: &CandidateRecord, attributes: &[String]) -> CandidateRecord {
    attributes
        .iter()
        .filter_map(|a| record.get(a).map(|v| (a.clone(), v.clone())))
        .collect()
}
