//! Configuration.
//!
//! - [`ImportConfig`] - a JSON import definition, checked against the
//!   embedded schema and turned into an [`Import`]
//! - [`Settings`] - process settings from the environment (`.env` is loaded
//!   by the binary)
//!
//! ```json
//! {
//!   "model": "users",
//!   "skipHeader": true,
//!   "fields": { "email": 0, "profile": { "name": 1 }, "role": "member" },
//!   "descriptors": {
//!     "email": { "required": true, "rules": "email|max:255", "operations": [{ "type": "trim" }] },
//!     "profile.name": { "rules": ["string", "max:100"] }
//!   },
//!   "uniqueField": "email"
//! }
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ConfigResult, StoreResult};
use crate::parser::ColumnKeys;
use crate::schema::{Descriptors, FieldDescriptor, FieldPath, FieldTree};
use crate::storage::{Disks, DEFAULT_DISK_ROOT, LOCAL_DISK};
use crate::store::RecordStore;
use crate::transform::{compose, Import, Operation, UpdateExisting};
use crate::validation::{validate_import_config, FaultPolicy, Rule};

// =============================================================================
// Import definition
// =============================================================================

/// Rules as a pipe string or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleSpecs {
    Pipe(String),
    List(Vec<String>),
}

impl Default for RuleSpecs {
    fn default() -> Self {
        RuleSpecs::List(Vec::new())
    }
}

impl RuleSpecs {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            RuleSpecs::Pipe(spec) => spec
                .split('|')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect(),
            RuleSpecs::List(rules) => rules.clone(),
        }
    }
}

/// A descriptor as written in a definition file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DescriptorConfig {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub rules: RuleSpecs,
    #[serde(default)]
    pub messages: BTreeMap<String, String>,
    /// Chained into the descriptor's transform
    #[serde(default)]
    pub operations: Vec<Operation>,
}

impl DescriptorConfig {
    fn build(&self, field: &str) -> ConfigResult<FieldDescriptor> {
        let mut descriptor = FieldDescriptor::new().required(self.required);
        for rule in self.rules.to_vec() {
            descriptor = descriptor.rule(rule);
        }
        for (rule, template) in &self.messages {
            descriptor = descriptor.message(rule.clone(), template.clone());
        }
        if !self.operations.is_empty() {
            let transform = compose(self.operations.clone())
                .map_err(|source| ConfigError::InvalidOperation { field: field.to_string(), source })?;
            descriptor = descriptor.with_transform(transform);
        }
        Ok(descriptor)
    }
}

/// An import definition file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportConfig {
    pub model: String,
    #[serde(default)]
    pub spreadsheet: Option<String>,
    #[serde(default = "default_disk")]
    pub disk: String,
    #[serde(default)]
    pub skip_header: bool,
    #[serde(default = "default_true")]
    pub mass_create: bool,
    #[serde(default)]
    pub handle_blank_rows: bool,
    #[serde(default)]
    pub column_keys: ColumnKeys,
    #[serde(default)]
    pub fault_policy: FaultPolicy,
    /// Field tree: leaves are column references or constants
    pub fields: Value,
    /// Descriptors by dotted destination key
    #[serde(default)]
    pub descriptors: BTreeMap<String, DescriptorConfig>,
    #[serde(default)]
    pub skip_fields: Vec<String>,
    /// `false` and `null` disable the policy
    #[serde(default, deserialize_with = "string_or_false")]
    pub unique_field: Option<String>,
    #[serde(default)]
    pub update_existing: Option<UpdateExisting>,
}

fn default_disk() -> String {
    LOCAL_DISK.to_string()
}

fn default_true() -> bool {
    true
}

fn string_or_false<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Ok(Some(s)),
        _ => Ok(None),
    }
}

impl ImportConfig {
    /// Schema-check then deserialize.
    pub fn from_value(value: Value) -> ConfigResult<Self> {
        validate_import_config(&value).map_err(|errors| ConfigError::SchemaError { errors })?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_json(content: &str) -> ConfigResult<Self> {
        Self::from_value(serde_json::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn field_tree(&self) -> ConfigResult<FieldTree> {
        FieldTree::from_json(&self.fields)
    }

    /// Parsed descriptors, each matched against a field of the tree and with
    /// its rules and operation patterns checked.
    pub fn descriptors(&self, tree: &FieldTree) -> ConfigResult<Descriptors> {
        let mut descriptors = Descriptors::new();
        for (key, config) in &self.descriptors {
            let path = FieldPath::parse(key)?;
            if !tree.contains(&path) {
                return Err(ConfigError::UnknownField(key.clone()));
            }
            for spec in config.rules.to_vec() {
                Rule::parse(&spec).map_err(|source| ConfigError::InvalidRule { field: key.clone(), source })?;
            }
            descriptors.insert(path, config.build(key)?);
        }
        Ok(descriptors)
    }

    /// Everything [`Self::into_import`] would check, without building.
    pub fn check(&self) -> ConfigResult<()> {
        let tree = self.field_tree()?;
        self.descriptors(&tree)?;
        self.skip_paths()?;
        Ok(())
    }

    fn skip_paths(&self) -> ConfigResult<Vec<FieldPath>> {
        self.skip_fields.iter().map(|p| FieldPath::parse(p)).collect()
    }

    /// Build the import. Spreadsheet location and hooks can still be set on
    /// the returned builder.
    pub fn into_import(self) -> ConfigResult<Import> {
        let tree = self.field_tree()?;
        let descriptors = self.descriptors(&tree)?;
        let skip = self.skip_paths()?;

        let mut import = Import::new()
            .model(self.model)
            .disk(self.disk)
            .column_keys(self.column_keys)
            .fields(tree)
            .descriptors(descriptors)
            .skip_fields_in_execution(skip)
            .skip_header(self.skip_header)
            .mass_create(self.mass_create)
            .handle_blank_rows(self.handle_blank_rows)
            .fault_policy(self.fault_policy);

        if let Some(spreadsheet) = self.spreadsheet {
            import = import.spreadsheet(spreadsheet);
        }
        if let Some(unique) = self.unique_field {
            import = import.unique_field(unique);
        }
        if let Some(update) = self.update_existing {
            import = import.allow_updating_existing_model(update.key, update.attributes);
        }
        Ok(import)
    }
}

// =============================================================================
// Environment settings
// =============================================================================

/// Default store directory.
pub const DEFAULT_STORE_DIR: &str = ".sheetload/store";

pub const DEFAULT_PORT: u16 = 3000;

/// Process settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// `SHEETLOAD_STORE_DIR`
    pub store_dir: PathBuf,
    /// `SHEETLOAD_DISK_ROOT`, root of the `local` disk
    pub disk_root: PathBuf,
    /// `SHEETLOAD_PORT`
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
            disk_root: PathBuf::from(DEFAULT_DISK_ROOT),
            port: DEFAULT_PORT,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            store_dir: lookup("SHEETLOAD_STORE_DIR").map(PathBuf::from).unwrap_or(defaults.store_dir),
            disk_root: lookup("SHEETLOAD_DISK_ROOT").map(PathBuf::from).unwrap_or(defaults.disk_root),
            port: lookup("SHEETLOAD_PORT").and_then(|p| p.parse().ok()).unwrap_or(defaults.port),
        }
    }

    pub fn disks(&self) -> Disks {
        Disks::new(&self.disk_root)
    }

    pub fn open_store(&self) -> StoreResult<RecordStore> {
        RecordStore::open(&self.store_dir)
    }
}
