//! Field descriptors: requiredness, rules, messages and transform of one
//! destination attribute.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use super::tree::FieldPath;
use crate::models::RawRow;

/// Per-value transform: `(raw cell, full row, 0-based line) -> replacement`.
///
/// Returning `None` (or `Some(Value::Null)`) keeps the raw cell.
pub type TransformFn = Arc<dyn Fn(&Value, &RawRow, usize) -> Option<Value> + Send + Sync>;

/// Descriptors by destination path.
pub type Descriptors = HashMap<FieldPath, FieldDescriptor>;

/// Declares one destination attribute.
#[derive(Clone, Default)]
pub struct FieldDescriptor {
    required: bool,
    rules: Vec<String>,
    messages: BTreeMap<String, String>,
    transform: Option<TransformFn>,
}

impl FieldDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Add rules in pipe syntax (`"email|max:255"`).
    ///
    /// Patterns containing `|` must be added one by one with [`Self::rule`].
    pub fn rules(mut self, spec: &str) -> Self {
        self.rules.extend(
            spec.split('|')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
        );
        self
    }

    /// Add a single rule verbatim.
    pub fn rule(mut self, rule: impl Into<String>) -> Self {
        self.rules.push(rule.into());
        self
    }

    /// Override the message of one rule for this field.
    pub fn message(mut self, rule: impl Into<String>, template: impl Into<String>) -> Self {
        self.messages.insert(rule.into(), template.into());
        self
    }

    pub fn transform<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &RawRow, usize) -> Option<Value> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(f));
        self
    }

    /// Use an already shared transform.
    pub fn with_transform(mut self, transform: TransformFn) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Validation rules; a required field always starts with `required`.
    pub fn validation_rules(&self) -> Vec<String> {
        let mut rules = self.rules.clone();
        if self.required && !rules.iter().any(|r| r == "required") {
            rules.insert(0, "required".to_string());
        }
        rules
    }

    pub fn custom_messages(&self) -> &BTreeMap<String, String> {
        &self.messages
    }

    /// Apply the transform, falling back to the raw value.
    pub fn apply(&self, raw: &Value, row: &RawRow, line: usize) -> Value {
        match &self.transform {
            Some(f) => match f(raw, row, line) {
                Some(Value::Null) | None => raw.clone(),
                Some(v) => v,
            },
            None => raw.clone(),
        }
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("required", &self.required)
            .field("rules", &self.rules)
            .field("messages", &self.messages)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}
