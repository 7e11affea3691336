//! Row validator.
//!
//! Runs the ruleset collected by the materializer against one nested record.
//! A failing row produces a single danger notification citing the line and
//! the first error, and a [`RowVerdict::Reject`]. Broken rules are handled by
//! the configured [`FaultPolicy`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

use super::rules::Rule;
use crate::api::logs::{log_error, log_warning};
use crate::error::{RuleError, RuleResult};
use crate::models::{is_blank_opt, CandidateRecord};
use crate::notify::{messages, Notification, NotificationSink};
use crate::schema::{lookup, FieldPath};

/// Rules per destination path, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationRuleset {
    rules: Vec<(FieldPath, Vec<String>)>,
}

impl ValidationRuleset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: FieldPath, rules: Vec<String>) {
        match self.rules.iter_mut().find(|(p, _)| *p == path) {
            Some((_, existing)) => *existing = rules,
            None => self.rules.push((path, rules)),
        }
    }

    pub fn get(&self, path: &FieldPath) -> Option<&[String]> {
        self.rules.iter().find(|(p, _)| p == path).map(|(_, r)| r.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldPath, &[String])> {
        self.rules.iter().map(|(p, r)| (p, r.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Custom messages: path -> rule name -> template.
pub type CustomMessages = HashMap<FieldPath, BTreeMap<String, String>>;

/// What to do when a rule itself is broken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultPolicy {
    /// Let the record through unvalidated.
    #[default]
    FailOpen,
    /// Reject the row as if validation failed.
    FailClosed,
}

/// One failed rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub rule: String,
    pub message: String,
}

/// Every failed rule of a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationFailure {
    pub errors: Vec<FieldError>,
}

impl ValidationFailure {
    /// The first error message, as shown to the user.
    pub fn first(&self) -> &str {
        self.errors.first().map(|e| e.message.as_str()).unwrap_or("")
    }
}

/// Result of validating one row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowVerdict {
    Accept(CandidateRecord),
    Reject { line: usize, message: String },
}

/// Validate a nested record.
///
/// The outer `Result` carries rule faults; the inner one the validation
/// result proper.
pub fn validate_record(
    record: &Map<String, Value>,
    ruleset: &ValidationRuleset,
    messages: &CustomMessages,
) -> RuleResult<Result<(), ValidationFailure>> {
    let mut errors = Vec::new();

    for (path, specs) in ruleset.iter() {
        let rules = specs.iter().map(|s| Rule::parse(s)).collect::<Result<Vec<_>, RuleError>>()?;
        let value = lookup(record, path);

        let numeric = rules.iter().any(|r| matches!(r, Rule::Numeric | Rule::Integer));
        let bail = rules.iter().any(|r| matches!(r, Rule::Bail));
        let nullable = rules.iter().any(|r| matches!(r, Rule::Nullable));
        let blank = is_blank_opt(value);

        if nullable && matches!(value, Some(Value::Null)) {
            continue;
        }

        for rule in &rules {
            if blank && !rule.is_implicit() {
                continue;
            }
            if rule.passes(value, numeric) {
                continue;
            }

            let template = messages
                .get(path)
                .and_then(|m| m.get(rule.name()))
                .map(String::as_str)
                .unwrap_or_else(|| rule.default_message(value, numeric));

            errors.push(FieldError {
                field: path.to_string(),
                rule: rule.name().to_string(),
                message: render(template, path, rule),
            });

            // A failed required check makes the other rules meaningless
            if bail || matches!(rule, Rule::Required) {
                break;
            }
        }
    }

    if errors.is_empty() {
        Ok(Ok(()))
    } else {
        Ok(Err(ValidationFailure { errors }))
    }
}

fn render(template: &str, path: &FieldPath, rule: &Rule) -> String {
    let attribute = path.to_string().replace('_', " ");
    let mut message = template.replace(":attribute", &attribute);
    for (placeholder, value) in rule.placeholders() {
        message = message.replace(placeholder, &value);
    }
    message
}

/// Validate one row and notify on rejection.
///
/// `line` is 1-based, as shown to the user.
pub fn validate_row(
    record: CandidateRecord,
    ruleset: &ValidationRuleset,
    messages: &CustomMessages,
    line: usize,
    policy: FaultPolicy,
    sink: &dyn NotificationSink,
) -> RowVerdict {
    let failure = match validate_record(&record, ruleset, messages) {
        Ok(Ok(())) => return RowVerdict::Accept(record),
        Ok(Err(failure)) => failure.first().to_string(),
        Err(fault) => match policy {
            FaultPolicy::FailOpen => {
                log_warning(format!("Line {}: validation skipped ({})", line, fault));
                return RowVerdict::Accept(record);
            }
            FaultPolicy::FailClosed => fault.to_string(),
        },
    };

    log_error(format!("Line {}: {}", line, failure));
    sink.send(
        Notification::danger(
            messages::IMPORT_FAILED_TITLE,
            messages::validation_failed(line, &failure),
        )
        .persistent(),
    );

    RowVerdict::Reject { line, message: failure }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{CollectingSink, Severity};
    use serde_json::json;

    fn record(value: Value) -> CandidateRecord {
        value.as_object().cloned().unwrap()
    }

    fn ruleset(entries: &[(&str, &str)]) -> ValidationRuleset {
        let mut set = ValidationRuleset::new();
        for (path, spec) in entries {
            set.insert(
                FieldPath::parse(path).unwrap(),
                spec.split('|').map(str::to_string).collect(),
            );
        }
        set
    }

    #[test]
    fn test_valid_record() {
        let rules = ruleset(&[("email", "required|email"), ("age", "integer|min:18")]);
        let result = validate_record(
            &record(json!({ "email": "ada@example.com", "age": "36" })),
            &rules,
            &CustomMessages::new(),
        )
        .unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn test_first_error_in_declaration_order() {
        let rules = ruleset(&[("email", "required|email"), ("age", "integer|min:18")]);
        let failure = validate_record(
            &record(json!({ "email": "nope", "age": "12" })),
            &rules,
            &CustomMessages::new(),
        )
        .unwrap()
        .unwrap_err();

        assert_eq!(failure.errors.len(), 2);
        assert_eq!(failure.first(), "The email field must be a valid email address.");
        assert_eq!(failure.errors[1].message, "The age field must be at least 18.");
    }

    #[test]
    fn test_blank_skips_non_implicit_rules() {
        let rules = ruleset(&[("phone", "digits:10")]);
        let result = validate_record(&record(json!({})), &rules, &CustomMessages::new()).unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn test_nested_paths_and_custom_messages() {
        let rules = ruleset(&[("profile.first_name", "required")]);
        let mut custom = CustomMessages::new();
        custom.insert(
            FieldPath::parse("profile.first_name").unwrap(),
            BTreeMap::from([("required".to_string(), "We need :attribute!".to_string())]),
        );

        let failure = validate_record(&record(json!({ "profile": {} })), &rules, &custom)
            .unwrap()
            .unwrap_err();
        assert_eq!(failure.first(), "We need profile.first name!");
    }

    #[test]
    fn test_rule_fault_is_reported() {
        let rules = ruleset(&[("email", "emial")]);
        let fault = validate_record(&record(json!({ "email": "x" })), &rules, &CustomMessages::new());
        assert_eq!(fault.unwrap_err(), RuleError::UnknownRule("emial".into()));
    }

    #[test]
    fn test_validate_row_notifies_with_line() {
        let sink = CollectingSink::new();
        let rules = ruleset(&[("email", "required")]);
        let verdict = validate_row(
            record(json!({ "email": "" })),
            &rules,
            &CustomMessages::new(),
            2,
            FaultPolicy::FailOpen,
            &sink,
        );

        assert_eq!(
            verdict,
            RowVerdict::Reject { line: 2, message: "The email field is required.".into() }
        );
        let sent = sink.notifications();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].severity, Severity::Danger);
        assert!(sent[0].persistent);
        assert_eq!(sent[0].body, "Validation failed on line 2: The email field is required.");
    }

    #[test]
    fn test_fault_policy() {
        let rules = ruleset(&[("email", "max:lots")]);
        let sink = CollectingSink::new();

        let open = validate_row(
            record(json!({ "email": "a" })),
            &rules,
            &CustomMessages::new(),
            1,
            FaultPolicy::FailOpen,
            &sink,
        );
        assert!(matches!(open, RowVerdict::Accept(_)));
        assert!(sink.notifications().is_empty());

        let closed = validate_row(
            record(json!({ "email": "a" })),
            &rules,
            &CustomMessages::new(),
            1,
            FaultPolicy::FailClosed,
            &sink,
        );
        assert!(matches!(closed, RowVerdict::Reject { line: 1, .. }));
        assert_eq!(sink.notifications().len(), 1);
    }
}
