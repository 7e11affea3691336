//! Record store - JSON-backed tables of imported records.
//!
//! Tables live in memory and, when the store was opened on a directory, are
//! written to one `<model>.json` file each on commit.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{values_match, Model, ModelStore, Transaction};
use crate::error::{StoreError, StoreResult};
use crate::models::CandidateRecord;

/// Runs before a record is saved. May rewrite the attributes or refuse the
/// save with a message.
pub type SavingObserver = Arc<dyn Fn(&mut CandidateRecord) -> Result<(), String> + Send + Sync>;

/// One model's records, as stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Table {
    model: String,
    next_id: u64,
    rows: Vec<Model>,
}

impl Table {
    fn new(model: &str) -> Self {
        Self { model: model.to_string(), next_id: 1, rows: Vec::new() }
    }

    fn insert(&mut self, attributes: CandidateRecord) -> Model {
        let now = Utc::now().to_rfc3339();
        let record = Model {
            id: self.next_id,
            model: self.model.clone(),
            attributes,
            created_at: now.clone(),
            updated_at: now,
        };
        self.next_id += 1;
        self.rows.push(record.clone());
        record
    }
}

/// Record store with optional on-disk persistence.
#[derive(Default)]
pub struct RecordStore {
    dir: Option<PathBuf>,
    tables: BTreeMap<String, Table>,
    observers: HashMap<String, Vec<SavingObserver>>,
}

impl RecordStore {
    /// A store that never touches the disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a store persisted under `dir`, loading existing tables.
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = PathBuf::from(dir.as_ref());
        let mut store = Self { dir: Some(dir.clone()), ..Self::default() };

        if !dir.exists() {
            return Ok(store);
        }

        for entry in fs::read_dir(&dir)?.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                let content = fs::read_to_string(&path)?;
                let table: Table = serde_json::from_str(&content)?;
                store.tables.insert(table.model.clone(), table);
            }
        }

        Ok(store)
    }

    /// Register a saving observer for a model.
    pub fn observe<F>(&mut self, model: &str, observer: F)
    where
        F: Fn(&mut CandidateRecord) -> Result<(), String> + Send + Sync + 'static,
    {
        self.observers.entry(model.to_string()).or_default().push(Arc::new(observer));
    }

    /// Insert a committed record outside of an import.
    pub fn seed(&mut self, model: &str, attributes: CandidateRecord) -> StoreResult<Model> {
        let mut tx = self.begin()?;
        let record = tx.create(model, attributes)?;
        tx.commit()?;
        Ok(record)
    }
}

/// Write the tables of `models` to `<dir>/<model>.json`.
fn write_tables(dir: &Path, tables: &BTreeMap<String, Table>, models: &BTreeSet<String>) -> StoreResult<()> {
    fs::create_dir_all(dir)?;

    for model in models {
        if let Some(table) = tables.get(model) {
            let path = dir.join(format!("{}.json", file_stem(model)));
            let tmp = path.with_extension("json.tmp");
            fs::write(&tmp, serde_json::to_string_pretty(table)?)?;
            fs::rename(&tmp, &path)?;
        }
    }
    Ok(())
}

impl ModelStore for RecordStore {
    fn begin(&mut self) -> StoreResult<Box<dyn Transaction + '_>> {
        let working = self.tables.clone();
        Ok(Box::new(RecordTransaction { store: self, working, dirty: BTreeSet::new() }))
    }

    fn all(&self, model: &str) -> Vec<Model> {
        self.tables.get(model).map(|t| t.rows.clone()).unwrap_or_default()
    }
}

/// Transaction over a working copy of the store's tables.
///
/// Writes become visible to the store on [`Transaction::commit`]. Dropping
/// the handle discards them.
pub struct RecordTransaction<'a> {
    store: &'a mut RecordStore,
    working: BTreeMap<String, Table>,
    dirty: BTreeSet<String>,
}

impl RecordTransaction<'_> {
    fn table(&mut self, model: &str) -> &mut Table {
        self.dirty.insert(model.to_string());
        self.working.entry(model.to_string()).or_insert_with(|| Table::new(model))
    }
}

impl Transaction for RecordTransaction<'_> {
    fn find_by(&self, model: &str, attribute: &str, value: &serde_json::Value) -> StoreResult<Option<Model>> {
        let found = self.working.get(model).and_then(|table| {
            table
                .rows
                .iter()
                .find(|row| row.get(attribute).is_some_and(|stored| values_match(stored, value)))
        });
        Ok(found.cloned())
    }

    fn create(&mut self, model: &str, attributes: CandidateRecord) -> StoreResult<Model> {
        Ok(self.table(model).insert(attributes))
    }

    fn save(&mut self, model: &str, mut attributes: CandidateRecord) -> StoreResult<Model> {
        let observers = self.store.observers.get(model).cloned().unwrap_or_default();
        for observer in observers {
            observer(&mut attributes).map_err(|message| StoreError::Refused {
                model: model.to_string(),
                message,
            })?;
        }
        Ok(self.table(model).insert(attributes))
    }

    fn update(&mut self, existing: &Model, attributes: CandidateRecord) -> StoreResult<Model> {
        let not_found = || StoreError::NotFound { model: existing.model.clone(), id: existing.id };
        let table = self.working.get_mut(&existing.model).ok_or_else(not_found)?;
        let row = table.rows.iter_mut().find(|r| r.id == existing.id).ok_or_else(not_found)?;

        for (key, value) in attributes {
            row.attributes.insert(key, value);
        }
        row.updated_at = Utc::now().to_rfc3339();
        let updated = row.clone();

        self.dirty.insert(existing.model.clone());
        Ok(updated)
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        let RecordTransaction { store, working, dirty } = *self;
        // A failed write leaves the store on its previous tables
        if let Some(dir) = &store.dir {
            write_tables(dir, &working, &dirty)?;
        }
        store.tables = working;
        Ok(())
    }

    fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

/// File name for a model: anything but letters, digits, `-` and `_` becomes `-`.
fn file_stem(model: &str) -> String {
    model
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::tempdir;

    fn attrs(value: Value) -> CandidateRecord {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_commit_makes_writes_visible() {
        let mut store = RecordStore::in_memory();
        let mut tx = store.begin().unwrap();
        let created = tx.create("users", attrs(json!({ "email": "ada@example.com" }))).unwrap();
        assert_eq!(created.id, 1);
        tx.commit().unwrap();

        let users = store.all("users");
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].get("email"), Some(&json!("ada@example.com")));
    }

    #[test]
    fn test_rollback_and_drop_discard_writes() {
        let mut store = RecordStore::in_memory();

        let mut tx = store.begin().unwrap();
        tx.create("users", attrs(json!({ "email": "a@b.c" }))).unwrap();
        tx.rollback().unwrap();
        assert!(store.all("users").is_empty());

        {
            let mut tx = store.begin().unwrap();
            tx.create("users", attrs(json!({ "email": "a@b.c" }))).unwrap();
        }
        assert!(store.all("users").is_empty());
    }

    #[test]
    fn test_find_by_sees_uncommitted_writes() {
        let mut store = RecordStore::in_memory();
        let mut tx = store.begin().unwrap();
        tx.create("users", attrs(json!({ "code": 5 }))).unwrap();

        let found = tx.find_by("users", "code", &json!("5")).unwrap();
        assert!(found.is_some());
        assert!(tx.find_by("users", "code", &json!("6")).unwrap().is_none());
        assert!(tx.find_by("teams", "code", &json!(5)).unwrap().is_none());
    }

    #[test]
    fn test_update_merges_attributes() {
        let mut store = RecordStore::in_memory();
        let existing = store.seed("users", attrs(json!({ "email": "a@b.c", "name": "Old" }))).unwrap();

        let mut tx = store.begin().unwrap();
        let updated = tx.update(&existing, attrs(json!({ "name": "New" }))).unwrap();
        tx.commit().unwrap();

        assert_eq!(updated.id, existing.id);
        assert_eq!(updated.get("email"), Some(&json!("a@b.c")));
        assert_eq!(store.all("users")[0].get("name"), Some(&json!("New")));
    }

    #[test]
    fn test_update_unknown_record() {
        let mut store = RecordStore::in_memory();
        let ghost = Model {
            id: 9,
            model: "users".into(),
            attributes: CandidateRecord::new(),
            created_at: String::new(),
            updated_at: String::new(),
        };
        let mut tx = store.begin().unwrap();
        let err = tx.update(&ghost, CandidateRecord::new()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { id: 9, .. }));
    }

    #[test]
    fn test_save_runs_observers_and_create_does_not() {
        let mut store = RecordStore::in_memory();
        store.observe("users", |attributes| {
            attributes.insert("slug".into(), json!("observed"));
            Ok(())
        });

        let mut tx = store.begin().unwrap();
        let saved = tx.save("users", attrs(json!({ "name": "Ada" }))).unwrap();
        let created = tx.create("users", attrs(json!({ "name": "Grace" }))).unwrap();
        tx.commit().unwrap();

        assert_eq!(saved.get("slug"), Some(&json!("observed")));
        assert_eq!(created.get("slug"), None);
    }

    #[test]
    fn test_observer_can_refuse() {
        let mut store = RecordStore::in_memory();
        store.observe("users", |_| Err("read only".to_string()));

        let mut tx = store.begin().unwrap();
        let err = tx.save("users", attrs(json!({ "name": "Ada" }))).unwrap_err();
        assert!(matches!(err, StoreError::Refused { .. }));
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = tempdir().unwrap();
        {
            let mut store = RecordStore::open(dir.path()).unwrap();
            store.seed("users", attrs(json!({ "email": "a@b.c" }))).unwrap();
            store.seed("users", attrs(json!({ "email": "d@e.f" }))).unwrap();
        }
        assert!(dir.path().join("users.json").exists());

        let mut store = RecordStore::open(dir.path()).unwrap();
        assert_eq!(store.all("users").len(), 2);

        let next = store.seed("users", attrs(json!({ "email": "g@h.i" }))).unwrap();
        assert_eq!(next.id, 3);
    }

    #[test]
    fn test_failed_write_keeps_store_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store");
        let mut store = RecordStore::open(&path).unwrap();
        store.seed("users", attrs(json!({ "email": "a@b.c" }))).unwrap();

        // A file where the store directory should be
        fs::remove_dir_all(&path).unwrap();
        fs::write(&path, "not a directory").unwrap();

        let mut tx = store.begin().unwrap();
        tx.create("users", attrs(json!({ "email": "d@e.f" }))).unwrap();
        assert!(matches!(tx.commit(), Err(StoreError::IoError(_))));

        let users = store.all("users");
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].get("email"), Some(&json!("a@b.c")));
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("users"), "users");
        assert_eq!(file_stem("App\\Models/User"), "App-Models-User");
    }
}
