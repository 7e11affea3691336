//! Field tree: where each destination attribute takes its value from.
//!
//! The tree is an ordered mapping of key -> leaf value or nested tree. For
//! descriptor-backed fields the leaf is a column reference; for opaque fields
//! it is the constant stored as-is. Paths are kept as segments, so a key that
//! contains a `.` is never split.

use serde_json::{Map, Value};
use std::fmt;

use crate::error::{ConfigError, ConfigResult};

// =============================================================================
// Field paths
// =============================================================================

/// Path of a destination attribute inside the nested record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// Parse a dotted path (`"address.city"`).
    pub fn parse(dotted: &str) -> ConfigResult<Self> {
        let segments: Vec<String> = dotted.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(ConfigError::InvalidFieldPath(dotted.to_string()));
        }
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// First segment: the top-level attribute this path writes to.
    pub fn root(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or("")
    }

    fn child(&self, key: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(key.to_string());
        Self(segments)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl From<&str> for FieldPath {
    /// Single-segment path; use [`FieldPath::parse`] for dotted input.
    fn from(key: &str) -> Self {
        Self(vec![key.to_string()])
    }
}

// =============================================================================
// Field tree
// =============================================================================

/// A node of the field tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldNode {
    Leaf(Value),
    Branch(FieldTree),
}

/// Ordered field tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldTree {
    entries: Vec<(String, FieldNode)>,
}

impl FieldTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a leaf (column reference or constant).
    pub fn field(mut self, key: impl Into<String>, source: impl Into<Value>) -> Self {
        self.entries.push((key.into(), FieldNode::Leaf(source.into())));
        self
    }

    /// Add a nested tree.
    pub fn nest(mut self, key: impl Into<String>, tree: FieldTree) -> Self {
        self.entries.push((key.into(), FieldNode::Branch(tree)));
        self
    }

    /// Build from a JSON object; non-empty objects become branches.
    pub fn from_json(value: &Value) -> ConfigResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| ConfigError::InvalidFieldPath("<root is not an object>".to_string()))?;
        Ok(Self::from_map(obj))
    }

    fn from_map(obj: &Map<String, Value>) -> Self {
        let entries = obj
            .iter()
            .map(|(k, v)| {
                let node = match v {
                    Value::Object(inner) if !inner.is_empty() => FieldNode::Branch(Self::from_map(inner)),
                    other => FieldNode::Leaf(other.clone()),
                };
                (k.clone(), node)
            })
            .collect();
        Self { entries }
    }

    /// Leaves in declaration order, depth first.
    pub fn flatten(&self) -> Vec<(FieldPath, &Value)> {
        let mut out = Vec::new();
        self.flatten_into(&FieldPath::new(Vec::new()), &mut out);
        out
    }

    fn flatten_into<'a>(&'a self, prefix: &FieldPath, out: &mut Vec<(FieldPath, &'a Value)>) {
        for (key, node) in &self.entries {
            let path = prefix.child(key);
            match node {
                FieldNode::Leaf(v) => out.push((path, v)),
                FieldNode::Branch(tree) => tree.flatten_into(&path, out),
            }
        }
    }

    pub fn contains(&self, path: &FieldPath) -> bool {
        self.flatten().iter().any(|(p, _)| p == path)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Nested record helpers
// =============================================================================

/// Expand `(path, value)` pairs into a nested object.
///
/// A later path that goes through an existing scalar replaces the scalar with
/// an object.
pub fn unflatten<I>(entries: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (FieldPath, Value)>,
{
    let mut root = Map::new();
    for (path, value) in entries {
        insert_at(&mut root, path.segments(), value);
    }
    root
}

fn insert_at(map: &mut Map<String, Value>, segments: &[String], value: Value) {
    match segments {
        [] => {}
        [last] => {
            map.insert(last.clone(), value);
        }
        [head, rest @ ..] => {
            let slot = map
                .entry(head.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(inner) = slot {
                insert_at(inner, rest, value);
            }
        }
    }
}

/// Read the value at `path` in a nested object.
pub fn lookup<'a>(map: &'a Map<String, Value>, path: &FieldPath) -> Option<&'a Value> {
    let (first, rest) = path.segments().split_first()?;
    let mut current = map.get(first)?;
    for segment in rest {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_keeps_declaration_order() {
        let tree = FieldTree::new()
            .field("email", 0)
            .nest("address", FieldTree::new().field("city", 2).field("zip", 3))
            .field("name", 1);

        let keys: Vec<String> = tree.flatten().iter().map(|(p, _)| p.to_string()).collect();
        assert_eq!(keys, vec!["email", "address.city", "address.zip", "name"]);
    }

    #[test]
    fn test_dotted_key_is_one_segment() {
        let tree = FieldTree::new().field("a.b", 0);
        let flat = tree.flatten();
        assert_eq!(flat[0].0.segments(), &["a.b".to_string()]);

        let nested = unflatten(vec![(flat[0].0.clone(), json!(1))]);
        assert_eq!(nested.get("a.b"), Some(&json!(1)));
    }

    #[test]
    fn test_from_json() {
        let tree = FieldTree::from_json(&json!({
            "email": "0",
            "profile": { "bio": "3" },
            "role": "member",
            "tags": {}
        }))
        .unwrap();

        let flat = tree.flatten();
        assert_eq!(flat.len(), 4);
        assert_eq!(flat[1].0.to_string(), "profile.bio");
        assert_eq!(flat[3].1, &json!({}));
    }

    #[test]
    fn test_unflatten_and_lookup() {
        let nested = unflatten(vec![
            (FieldPath::parse("user.name").unwrap(), json!("Ada")),
            (FieldPath::parse("user.age").unwrap(), json!(36)),
            (FieldPath::parse("active").unwrap(), json!(true)),
        ]);
        assert_eq!(Value::Object(nested.clone()), json!({
            "user": { "name": "Ada", "age": 36 },
            "active": true
        }));
        assert_eq!(lookup(&nested, &FieldPath::parse("user.age").unwrap()), Some(&json!(36)));
        assert_eq!(lookup(&nested, &FieldPath::parse("user.missing").unwrap()), None);
    }

    #[test]
    fn test_unflatten_scalar_overwritten_by_deeper_path() {
        let nested = unflatten(vec![
            (FieldPath::parse("a").unwrap(), json!(1)),
            (FieldPath::parse("a.b").unwrap(), json!(2)),
        ]);
        assert_eq!(Value::Object(nested), json!({ "a": { "b": 2 } }));
    }

    #[test]
    fn test_invalid_path() {
        assert!(FieldPath::parse("a..b").is_err());
        assert!(FieldPath::parse("").is_err());
    }
}
