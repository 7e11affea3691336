//! Value operations for declarative field transforms.
//!
//! An import definition can give each descriptor an ordered list of
//! operations; they are chained into the descriptor's transform hook.
//!
//! ```json
//! "operations": [
//!   { "type": "trim" },
//!   { "type": "lowercase" },
//!   { "type": "map", "mapping": { "adm": "admin" }, "case_insensitive": true }
//! ]
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{is_blank, RawRow};
use crate::schema::TransformFn;

/// A single value operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    /// Remove leading and trailing whitespace
    Trim,

    Uppercase,

    Lowercase,

    /// Regex replacement
    Replace {
        pattern: String,
        #[serde(default)]
        value: String,
    },

    PadStart {
        length: usize,
        #[serde(default = "default_pad_char")]
        char: String,
    },

    PadEnd {
        length: usize,
        #[serde(default = "default_pad_char")]
        char: String,
    },

    EnsurePrefix { value: String },

    EnsureSuffix { value: String },

    /// Lookup table; unmapped values pass through unless `default_unmapped` is set
    Map {
        mapping: HashMap<String, String>,
        #[serde(default)]
        case_insensitive: bool,
        #[serde(default)]
        default_unmapped: Option<String>,
    },

    /// Split into an array of trimmed parts
    Split {
        #[serde(default = "default_split_separator")]
        separator: String,
    },

    ToBoolean {
        #[serde(default = "default_true_values")]
        true_values: Vec<String>,
    },

    /// Parse an integer or decimal; `,` is accepted as decimal separator
    ToNumber,

    Substring {
        start: usize,
        #[serde(default)]
        length: Option<usize>,
    },

    Alphanumeric,

    DigitsOnly,

    /// Replace a blank value
    Default { value: Value },
}

fn default_pad_char() -> String {
    "0".to_string()
}

fn default_split_separator() -> String {
    ",".to_string()
}

fn default_true_values() -> Vec<String> {
    ["true", "1", "yes", "y", "on"].iter().map(|s| s.to_string()).collect()
}

impl Operation {
    /// Apply this operation. Values the operation does not understand pass
    /// through unchanged.
    pub fn apply(&self, value: &Value) -> Value {
        match self {
            Operation::Trim => map_str(value, |s| s.trim().to_string()),
            Operation::Uppercase => map_str(value, |s| s.to_uppercase()),
            Operation::Lowercase => map_str(value, |s| s.to_lowercase()),
            Operation::Replace { pattern, value: replacement } => match Regex::new(pattern) {
                Ok(re) => map_str(value, |s| re.replace_all(s, replacement.as_str()).into_owned()),
                Err(_) => value.clone(),
            },
            Operation::PadStart { length, char } => map_str(value, |s| {
                let pad = padding(s, *length, char);
                format!("{}{}", pad, s)
            }),
            Operation::PadEnd { length, char } => map_str(value, |s| {
                let pad = padding(s, *length, char);
                format!("{}{}", s, pad)
            }),
            Operation::EnsurePrefix { value: prefix } => map_str(value, |s| {
                if s.starts_with(prefix.as_str()) { s.to_string() } else { format!("{}{}", prefix, s) }
            }),
            Operation::EnsureSuffix { value: suffix } => map_str(value, |s| {
                if s.ends_with(suffix.as_str()) { s.to_string() } else { format!("{}{}", s, suffix) }
            }),
            Operation::Map { mapping, case_insensitive, default_unmapped } => {
                let Some(s) = as_text(value) else { return value.clone() };
                let found = if *case_insensitive {
                    mapping.iter().find(|(k, _)| k.eq_ignore_ascii_case(&s)).map(|(_, v)| v)
                } else {
                    mapping.get(&s)
                };
                match (found, default_unmapped) {
                    (Some(v), _) => Value::String(v.clone()),
                    (None, Some(d)) => Value::String(d.clone()),
                    (None, None) => value.clone(),
                }
            }
            Operation::Split { separator } => match as_text(value) {
                Some(s) => Value::Array(
                    s.split(separator.as_str())
                        .map(|p| Value::String(p.trim().to_string()))
                        .collect(),
                ),
                None => value.clone(),
            },
            Operation::ToBoolean { true_values } => match value {
                Value::Bool(_) => value.clone(),
                _ => {
                    let s = as_text(value).unwrap_or_default();
                    Value::Bool(true_values.iter().any(|t| t.eq_ignore_ascii_case(s.trim())))
                }
            },
            Operation::ToNumber => match value {
                Value::Number(_) => value.clone(),
                _ => as_text(value).and_then(|s| parse_number(&s)).unwrap_or(Value::Null),
            },
            Operation::Substring { start, length } => map_str(value, |s| {
                let chars = s.chars().skip(*start);
                match length {
                    Some(l) => chars.take(*l).collect(),
                    None => chars.collect(),
                }
            }),
            Operation::Alphanumeric => map_str(value, |s| s.chars().filter(|c| c.is_alphanumeric()).collect()),
            Operation::DigitsOnly => map_str(value, |s| s.chars().filter(|c| c.is_ascii_digit()).collect()),
            Operation::Default { value: fallback } => {
                if is_blank(value) { fallback.clone() } else { value.clone() }
            }
        }
    }
}

/// An operation ready to run on every cell.
enum Compiled {
    Replace { re: Regex, replacement: String },
    Plain(Operation),
}

impl Compiled {
    fn new(operation: Operation) -> Result<Self, regex::Error> {
        match operation {
            Operation::Replace { pattern, value } => {
                Ok(Compiled::Replace { re: Regex::new(&pattern)?, replacement: value })
            }
            other => Ok(Compiled::Plain(other)),
        }
    }

    fn apply(&self, value: &Value) -> Value {
        match self {
            Compiled::Replace { re, replacement } => {
                map_str(value, |s| re.replace_all(s, replacement.as_str()).into_owned())
            }
            Compiled::Plain(operation) => operation.apply(value),
        }
    }
}

/// Chain operations into a descriptor transform. Patterns are compiled here,
/// once per import.
pub fn compose(operations: Vec<Operation>) -> Result<TransformFn, regex::Error> {
    let steps = operations.into_iter().map(Compiled::new).collect::<Result<Vec<_>, _>>()?;

    let transform: TransformFn = Arc::new(move |raw: &Value, _row: &RawRow, _line: usize| {
        Some(steps.iter().fold(raw.clone(), |v, step| step.apply(&v)))
    });
    Ok(transform)
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn map_str(value: &Value, f: impl FnOnce(&str) -> String) -> Value {
    match as_text(value) {
        Some(s) => Value::String(f(&s)),
        None => value.clone(),
    }
}

fn padding(s: &str, length: usize, pad: &str) -> String {
    let count = length.saturating_sub(s.chars().count());
    let c = pad.chars().next().unwrap_or('0');
    std::iter::repeat(c).take(count).collect()
}

fn parse_number(s: &str) -> Option<Value> {
    let cleaned: String = s.trim().chars().filter(|c| !c.is_whitespace()).collect();
    if let Ok(i) = cleaned.parse::<i64>() {
        return Some(Value::from(i));
    }
    cleaned
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

/// Human readable list of operations, for the CLI.
pub fn operations_description() -> String {
    r#"Available value operations:

| Operation     | Description                          | Parameters                                   |
|---------------|--------------------------------------|----------------------------------------------|
| trim          | Remove leading/trailing whitespace   | -                                            |
| uppercase     | Convert to uppercase                 | -                                            |
| lowercase     | Convert to lowercase                 | -                                            |
| replace       | Regex replacement                    | pattern, value                               |
| pad_start     | Pad at start                         | length, char (default "0")                   |
| pad_end       | Pad at end                           | length, char (default "0")                   |
| ensure_prefix | Add prefix if missing                | value                                        |
| ensure_suffix | Add suffix if missing                | value                                        |
| map           | Lookup table                         | mapping, case_insensitive, default_unmapped  |
| split         | Split into array                     | separator (default ",")                      |
| to_boolean    | Convert to boolean                   | true_values                                  |
| to_number     | Convert to number                    | -                                            |
| substring     | Extract substring                    | start, length                                |
| alphanumeric  | Keep letters and digits              | -                                            |
| digits_only   | Keep digits                          | -                                            |
| default       | Replace blank value                  | value                                        |

Example:
[
  {"type": "trim"},
  {"type": "lowercase"},
  {"type": "map", "mapping": {"adm": "admin"}, "case_insensitive": true},
  {"type": "default", "value": "member"}
]"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trim_and_case() {
        assert_eq!(Operation::Trim.apply(&json!("  Ada  ")), json!("Ada"));
        assert_eq!(Operation::Lowercase.apply(&json!("ADA@EXAMPLE.COM")), json!("ada@example.com"));
        assert_eq!(Operation::Uppercase.apply(&Value::Null), Value::Null);
    }

    #[test]
    fn test_map() {
        let mapping = HashMap::from([("ADM".to_string(), "admin".to_string())]);
        let op = Operation::Map { mapping: mapping.clone(), case_insensitive: true, default_unmapped: None };
        assert_eq!(op.apply(&json!("adm")), json!("admin"));
        assert_eq!(op.apply(&json!("guest")), json!("guest"));

        let op = Operation::Map { mapping, case_insensitive: false, default_unmapped: Some("member".into()) };
        assert_eq!(op.apply(&json!("adm")), json!("member"));
    }

    #[test]
    fn test_to_number() {
        assert_eq!(Operation::ToNumber.apply(&json!("42")), json!(42));
        assert_eq!(Operation::ToNumber.apply(&json!("3,5")), json!(3.5));
        assert_eq!(Operation::ToNumber.apply(&json!("n/a")), Value::Null);
    }

    #[test]
    fn test_pad_and_substring() {
        let op = Operation::PadStart { length: 5, char: "0".into() };
        assert_eq!(op.apply(&json!(42)), json!("00042"));
        let op = Operation::Substring { start: 1, length: Some(2) };
        assert_eq!(op.apply(&json!("abcd")), json!("bc"));
    }

    #[test]
    fn test_default_and_boolean() {
        let op = Operation::Default { value: json!("member") };
        assert_eq!(op.apply(&json!(" ")), json!("member"));
        assert_eq!(op.apply(&json!("admin")), json!("admin"));

        let op: Operation = serde_json::from_value(json!({ "type": "to_boolean" })).unwrap();
        assert_eq!(op.apply(&json!("Yes")), json!(true));
        assert_eq!(op.apply(&json!("no")), json!(false));
    }

    #[test]
    fn test_compose_runs_in_order() {
        let transform = compose(vec![
            Operation::Trim,
            Operation::Lowercase,
            Operation::EnsureSuffix { value: "@example.com".into() },
        ])
        .unwrap();
        let row = RawRow::from_values(0, vec![json!(" ADA ")]);
        assert_eq!(transform(&json!(" ADA "), &row, 0), Some(json!("ada@example.com")));
    }

    #[test]
    fn test_compose_compiles_patterns_once() {
        let transform = compose(vec![Operation::Replace { pattern: r"[\s-]+".into(), value: "".into() }]).unwrap();
        let row = RawRow::from_values(0, Vec::new());
        assert_eq!(transform(&json!("06 12-34"), &row, 0), Some(json!("061234")));
        assert_eq!(transform(&json!("07 00"), &row, 1), Some(json!("0700")));

        assert!(compose(vec![Operation::Trim, Operation::Replace { pattern: "(".into(), value: "".into() }]).is_err());
    }
}
