//! Row materializer: one raw row -> one candidate record.

use serde_json::Value;
use std::collections::HashSet;

use crate::models::{is_blank_opt, CandidateRecord, RawRow};
use crate::schema::{unflatten, Descriptors, FieldPath, FieldTree};
use crate::validation::{CustomMessages, ValidationRuleset};

/// A materialized row with the rules that apply to it.
#[derive(Debug, Clone, Default)]
pub struct MaterializedRow {
    /// Nested record
    pub record: CandidateRecord,
    /// Rules of the descriptor-backed keys that were kept
    pub ruleset: ValidationRuleset,
    pub messages: CustomMessages,
}

/// Turns raw rows into candidate records.
///
/// For each leaf of the field tree, in declaration order:
/// - keys in the skip set are left out entirely;
/// - a key with a descriptor reads the cell named by its leaf. An optional
///   field with a blank cell is left out; otherwise the cell goes through the
///   descriptor's transform and the descriptor's rules are collected;
/// - a key without a descriptor stores its leaf value as-is (constant).
pub struct Materializer<'a> {
    fields: Vec<(FieldPath, &'a Value)>,
    descriptors: &'a Descriptors,
    skip: &'a HashSet<FieldPath>,
}

impl<'a> Materializer<'a> {
    pub fn new(fields: &'a FieldTree, descriptors: &'a Descriptors, skip: &'a HashSet<FieldPath>) -> Self {
        Self { fields: fields.flatten(), descriptors, skip }
    }

    pub fn materialize(&self, row: &RawRow) -> MaterializedRow {
        let mut out = MaterializedRow::default();
        let mut dotted = Vec::with_capacity(self.fields.len());

        for (path, source) in &self.fields {
            if self.skip.contains(path) {
                continue;
            }

            let value = match self.descriptors.get(path) {
                Some(descriptor) => {
                    let cell = row.get(source);
                    if !descriptor.is_required() && is_blank_opt(cell) {
                        continue;
                    }

                    let raw = cell.cloned().unwrap_or(Value::Null);
                    let value = descriptor.apply(&raw, row, row.line);

                    out.ruleset.insert(path.clone(), descriptor.validation_rules());
                    if !descriptor.custom_messages().is_empty() {
                        out.messages.insert(path.clone(), descriptor.custom_messages().clone());
                    }
                    value
                }
                None => (*source).clone(),
            };

            dotted.push((path.clone(), value));
        }

        out.record = unflatten(dotted);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDescriptor;
    use serde_json::json;

    fn row(values: Value) -> RawRow {
        RawRow::from_values(4, values.as_array().cloned().unwrap())
    }

    fn path(p: &str) -> FieldPath {
        FieldPath::parse(p).unwrap()
    }

    #[test]
    fn test_descriptor_fields_read_cells() {
        let tree = FieldTree::new().field("email", 0).field("name", 1);
        let descriptors = Descriptors::from([
            (path("email"), FieldDescriptor::new().required(true).rules("email")),
            (path("name"), FieldDescriptor::new()),
        ]);
        let skip = HashSet::new();

        let out = Materializer::new(&tree, &descriptors, &skip).materialize(&row(json!(["ada@example.com", "Ada"])));

        assert_eq!(Value::Object(out.record), json!({ "email": "ada@example.com", "name": "Ada" }));
        assert_eq!(out.ruleset.get(&path("email")), Some(&["required".to_string(), "email".to_string()][..]));
        assert_eq!(out.ruleset.get(&path("name")), Some(&[] as &[String]));
    }

    #[test]
    fn test_optional_blank_is_omitted() {
        let tree = FieldTree::new().field("email", 0).field("phone", 1).field("fax", 5);
        let descriptors = Descriptors::from([
            (path("email"), FieldDescriptor::new().required(true)),
            (path("phone"), FieldDescriptor::new().rules("digits:10")),
            (path("fax"), FieldDescriptor::new()),
        ]);
        let skip = HashSet::new();

        let out = Materializer::new(&tree, &descriptors, &skip).materialize(&row(json!(["a@b.c", "   "])));

        assert_eq!(Value::Object(out.record), json!({ "email": "a@b.c" }));
        assert!(out.ruleset.get(&path("phone")).is_none());
    }

    #[test]
    fn test_required_blank_is_kept_for_validation() {
        let tree = FieldTree::new().field("email", 0);
        let descriptors = Descriptors::from([(path("email"), FieldDescriptor::new().required(true))]);
        let skip = HashSet::new();

        let out = Materializer::new(&tree, &descriptors, &skip).materialize(&row(json!([""])));

        assert_eq!(Value::Object(out.record), json!({ "email": "" }));
        assert!(out.ruleset.get(&path("email")).is_some());
    }

    #[test]
    fn test_opaque_fields_are_constants() {
        let tree = FieldTree::new().field("email", 0).field("role", "member").field("active", true);
        let descriptors = Descriptors::from([(path("email"), FieldDescriptor::new())]);
        let skip = HashSet::new();

        let out = Materializer::new(&tree, &descriptors, &skip).materialize(&row(json!(["a@b.c"])));

        assert_eq!(
            Value::Object(out.record),
            json!({ "email": "a@b.c", "role": "member", "active": true })
        );
        assert!(out.ruleset.get(&path("role")).is_none());
    }

    #[test]
    fn test_transform_receives_row_and_line() {
        let tree = FieldTree::new().field("label", 0);
        let descriptors = Descriptors::from([(
            path("label"),
            FieldDescriptor::new().transform(|raw, row, line| {
                let other = row.get(&json!(1)).and_then(Value::as_str).unwrap_or("");
                Some(json!(format!("{}-{}-{}", raw.as_str().unwrap_or(""), other, line)))
            }),
        )]);
        let skip = HashSet::new();

        let out = Materializer::new(&tree, &descriptors, &skip).materialize(&row(json!(["a", "b"])));

        assert_eq!(out.record.get("label"), Some(&json!("a-b-4")));
    }

    #[test]
    fn test_transform_returning_none_keeps_cell() {
        let tree = FieldTree::new().field("name", 0);
        let descriptors = Descriptors::from([(path("name"), FieldDescriptor::new().transform(|_, _, _| None))]);
        let skip = HashSet::new();

        let out = Materializer::new(&tree, &descriptors, &skip).materialize(&row(json!(["Ada"])));

        assert_eq!(out.record.get("name"), Some(&json!("Ada")));
    }

    #[test]
    fn test_skip_set_and_nesting() {
        let tree = FieldTree::new()
            .field("email", 0)
            .nest("profile", FieldTree::new().field("name", 1).field("city", 2));
        let descriptors = Descriptors::from([
            (path("email"), FieldDescriptor::new()),
            (path("profile.name"), FieldDescriptor::new().message("string", "Bad name")),
            (path("profile.city"), FieldDescriptor::new()),
        ]);
        let skip = HashSet::from([path("email")]);

        let out = Materializer::new(&tree, &descriptors, &skip).materialize(&row(json!(["a@b.c", "Ada", "Paris"])));

        assert_eq!(Value::Object(out.record), json!({ "profile": { "name": "Ada", "city": "Paris" } }));
        assert!(out.ruleset.get(&path("email")).is_none());
        assert_eq!(out.messages[&path("profile.name")]["string"], "Bad name");
    }

    #[test]
    fn test_keys_containing_dots_stay_flat() {
        let tree = FieldTree::new().field("a.b", 0);
        let descriptors = Descriptors::from([(FieldPath::from("a.b"), FieldDescriptor::new())]);
        let skip = HashSet::new();

        let out = Materializer::new(&tree, &descriptors, &skip).materialize(&row(json!(["x"])));

        assert_eq!(Value::Object(out.record), json!({ "a.b": "x" }));
    }
}
