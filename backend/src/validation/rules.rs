//! Validation rules.
//!
//! Rules are written as `name` or `name:param,param` (`"max:255"`,
//! `"in:admin,member"`, `"regex:/^[A-Z]{2}\d+$/i"`). A rule that fails to
//! parse is a [`RuleError`], which the validator treats as an internal fault.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::{RuleError, RuleResult};
use crate::models::is_blank_opt;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Invalid email pattern"));

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i)(https?|ftp)://[^\s/$.?#][^\s]*$").expect("Invalid url pattern"));

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d.%m.%Y", "%d-%m-%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// A parsed validation rule.
#[derive(Debug, Clone)]
pub enum Rule {
    Required,
    Nullable,
    Filled,
    Present,
    Bail,
    String,
    Numeric,
    Integer,
    Boolean,
    Array,
    Email,
    Url,
    Uuid,
    Date,
    DateFormat(String),
    Min(f64),
    Max(f64),
    Between(f64, f64),
    Size(f64),
    Digits(usize),
    DigitsBetween(usize, usize),
    In(Vec<String>),
    NotIn(Vec<String>),
    Regex(Regex),
    NotRegex(Regex),
    Alpha,
    AlphaNum,
    AlphaDash,
    StartsWith(Vec<String>),
    EndsWith(Vec<String>),
    Lowercase,
    Uppercase,
}

impl Rule {
    /// Parse one rule spec.
    pub fn parse(spec: &str) -> RuleResult<Rule> {
        let spec = spec.trim();
        let (name, param) = match spec.split_once(':') {
            Some((n, p)) => (n.trim(), Some(p)),
            None => (spec, None),
        };
        let name_lc = name.to_lowercase();

        let rule = match name_lc.as_str() {
            "required" => Rule::Required,
            "nullable" => Rule::Nullable,
            "filled" => Rule::Filled,
            "present" => Rule::Present,
            "bail" => Rule::Bail,
            "string" => Rule::String,
            "numeric" => Rule::Numeric,
            "integer" => Rule::Integer,
            "boolean" => Rule::Boolean,
            "array" => Rule::Array,
            "email" => Rule::Email,
            "url" => Rule::Url,
            "uuid" => Rule::Uuid,
            "date" => Rule::Date,
            "alpha" => Rule::Alpha,
            "alpha_num" => Rule::AlphaNum,
            "alpha_dash" => Rule::AlphaDash,
            "lowercase" => Rule::Lowercase,
            "uppercase" => Rule::Uppercase,
            "date_format" => Rule::DateFormat(php_date_format(require(name, param)?)),
            "min" => Rule::Min(number(name, require(name, param)?)?),
            "max" => Rule::Max(number(name, require(name, param)?)?),
            "size" => Rule::Size(number(name, require(name, param)?)?),
            "between" => {
                let (a, b) = pair(name, require(name, param)?)?;
                Rule::Between(number(name, a)?, number(name, b)?)
            }
            "digits" => Rule::Digits(count(name, require(name, param)?)?),
            "digits_between" => {
                let (a, b) = pair(name, require(name, param)?)?;
                Rule::DigitsBetween(count(name, a)?, count(name, b)?)
            }
            "in" => Rule::In(list(require(name, param)?)),
            "not_in" => Rule::NotIn(list(require(name, param)?)),
            "starts_with" => Rule::StartsWith(list(require(name, param)?)),
            "ends_with" => Rule::EndsWith(list(require(name, param)?)),
            "regex" => Rule::Regex(pattern(name, require(name, param)?)?),
            "not_regex" => Rule::NotRegex(pattern(name, require(name, param)?)?),
            _ => return Err(RuleError::UnknownRule(name.to_string())),
        };

        Ok(rule)
    }

    /// Rule name as used for message lookup.
    pub fn name(&self) -> &'static str {
        match self {
            Rule::Required => "required",
            Rule::Nullable => "nullable",
            Rule::Filled => "filled",
            Rule::Present => "present",
            Rule::Bail => "bail",
            Rule::String => "string",
            Rule::Numeric => "numeric",
            Rule::Integer => "integer",
            Rule::Boolean => "boolean",
            Rule::Array => "array",
            Rule::Email => "email",
            Rule::Url => "url",
            Rule::Uuid => "uuid",
            Rule::Date => "date",
            Rule::DateFormat(_) => "date_format",
            Rule::Min(_) => "min",
            Rule::Max(_) => "max",
            Rule::Between(..) => "between",
            Rule::Size(_) => "size",
            Rule::Digits(_) => "digits",
            Rule::DigitsBetween(..) => "digits_between",
            Rule::In(_) => "in",
            Rule::NotIn(_) => "not_in",
            Rule::Regex(_) => "regex",
            Rule::NotRegex(_) => "not_regex",
            Rule::Alpha => "alpha",
            Rule::AlphaNum => "alpha_num",
            Rule::AlphaDash => "alpha_dash",
            Rule::StartsWith(_) => "starts_with",
            Rule::EndsWith(_) => "ends_with",
            Rule::Lowercase => "lowercase",
            Rule::Uppercase => "uppercase",
        }
    }

    /// Implicit rules run even when the value is blank.
    pub fn is_implicit(&self) -> bool {
        matches!(self, Rule::Required | Rule::Filled | Rule::Present)
    }

    /// Check a value; `None` means the key is absent.
    /// `numeric` makes sizes compare by value instead of length.
    pub fn passes(&self, value: Option<&Value>, numeric: bool) -> bool {
        match self {
            Rule::Required => !is_blank_opt(value),
            Rule::Filled => value.is_none() || !is_blank_opt(value),
            Rule::Present => value.is_some(),
            Rule::Nullable | Rule::Bail => true,
            _ => match value {
                Some(v) => self.passes_value(v, numeric),
                None => true,
            },
        }
    }

    fn passes_value(&self, value: &Value, numeric: bool) -> bool {
        let text = scalar_string(value);
        let text_ref = text.as_deref();

        match self {
            Rule::String => value.is_string(),
            Rule::Numeric => as_number(value).is_some(),
            Rule::Integer => match value {
                Value::Number(n) => n.is_i64() || n.is_u64(),
                Value::String(s) => s.trim().parse::<i64>().is_ok(),
                _ => false,
            },
            Rule::Boolean => matches!(text_ref, Some("0" | "1" | "true" | "false")),
            Rule::Array => value.is_array() || value.is_object(),
            Rule::Email => text_ref.is_some_and(|s| EMAIL_RE.is_match(s)),
            Rule::Url => text_ref.is_some_and(|s| URL_RE.is_match(s)),
            Rule::Uuid => text_ref.is_some_and(|s| uuid::Uuid::parse_str(s).is_ok()),
            Rule::Date => text_ref.is_some_and(parses_as_date),
            Rule::DateFormat(fmt) => text_ref.is_some_and(|s| matches_date_format(s, fmt)),
            Rule::Min(min) => size_of(value, numeric).is_some_and(|s| s >= *min),
            Rule::Max(max) => size_of(value, numeric).is_some_and(|s| s <= *max),
            Rule::Between(min, max) => size_of(value, numeric).is_some_and(|s| s >= *min && s <= *max),
            Rule::Size(size) => size_of(value, numeric).is_some_and(|s| (s - size).abs() < f64::EPSILON),
            Rule::Digits(n) => text_ref.is_some_and(|s| all_digits(s) && s.len() == *n),
            Rule::DigitsBetween(min, max) => {
                text_ref.is_some_and(|s| all_digits(s) && s.len() >= *min && s.len() <= *max)
            }
            Rule::In(options) => text_ref.is_some_and(|s| options.iter().any(|o| o == s)),
            Rule::NotIn(options) => text_ref.map_or(true, |s| !options.iter().any(|o| o == s)),
            Rule::Regex(re) => text_ref.is_some_and(|s| re.is_match(s)),
            Rule::NotRegex(re) => text_ref.is_some_and(|s| !re.is_match(s)),
            Rule::Alpha => text_ref.is_some_and(|s| s.chars().all(char::is_alphabetic)),
            Rule::AlphaNum => text_ref.is_some_and(|s| s.chars().all(char::is_alphanumeric)),
            Rule::AlphaDash => text_ref
                .is_some_and(|s| s.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_')),
            Rule::StartsWith(prefixes) => {
                text_ref.is_some_and(|s| prefixes.iter().any(|p| s.starts_with(p.as_str())))
            }
            Rule::EndsWith(suffixes) => {
                text_ref.is_some_and(|s| suffixes.iter().any(|p| s.ends_with(p.as_str())))
            }
            Rule::Lowercase => text_ref.is_some_and(|s| s == s.to_lowercase()),
            Rule::Uppercase => text_ref.is_some_and(|s| s == s.to_uppercase()),
            Rule::Required | Rule::Filled | Rule::Present | Rule::Nullable | Rule::Bail => true,
        }
    }

    /// Default message template.
    pub fn default_message(&self, value: Option<&Value>, numeric: bool) -> &'static str {
        let kind = size_kind(value, numeric);
        match self {
            Rule::Required => "The :attribute field is required.",
            Rule::Filled => "The :attribute field must have a value.",
            Rule::Present => "The :attribute field must be present.",
            Rule::String => "The :attribute field must be a string.",
            Rule::Numeric => "The :attribute field must be a number.",
            Rule::Integer => "The :attribute field must be an integer.",
            Rule::Boolean => "The :attribute field must be true or false.",
            Rule::Array => "The :attribute field must be an array.",
            Rule::Email => "The :attribute field must be a valid email address.",
            Rule::Url => "The :attribute field must be a valid URL.",
            Rule::Uuid => "The :attribute field must be a valid UUID.",
            Rule::Date => "The :attribute field must be a valid date.",
            Rule::DateFormat(_) => "The :attribute field must match the format :format.",
            Rule::Min(_) => match kind {
                SizeKind::Numeric => "The :attribute field must be at least :min.",
                SizeKind::Array => "The :attribute field must have at least :min items.",
                SizeKind::String => "The :attribute field must be at least :min characters.",
            },
            Rule::Max(_) => match kind {
                SizeKind::Numeric => "The :attribute field must not be greater than :max.",
                SizeKind::Array => "The :attribute field must not have more than :max items.",
                SizeKind::String => "The :attribute field must not be greater than :max characters.",
            },
            Rule::Between(..) => match kind {
                SizeKind::Numeric => "The :attribute field must be between :min and :max.",
                SizeKind::Array => "The :attribute field must have between :min and :max items.",
                SizeKind::String => "The :attribute field must be between :min and :max characters.",
            },
            Rule::Size(_) => match kind {
                SizeKind::Numeric => "The :attribute field must be :size.",
                SizeKind::Array => "The :attribute field must contain :size items.",
                SizeKind::String => "The :attribute field must be :size characters.",
            },
            Rule::Digits(_) => "The :attribute field must be :digits digits.",
            Rule::DigitsBetween(..) => "The :attribute field must be between :min and :max digits.",
            Rule::In(_) | Rule::NotIn(_) => "The selected :attribute is invalid.",
            Rule::Regex(_) | Rule::NotRegex(_) => "The :attribute field format is invalid.",
            Rule::Alpha => "The :attribute field must only contain letters.",
            Rule::AlphaNum => "The :attribute field must only contain letters and numbers.",
            Rule::AlphaDash => {
                "The :attribute field must only contain letters, numbers, dashes, and underscores."
            }
            Rule::StartsWith(_) => "The :attribute field must start with one of the following: :values.",
            Rule::EndsWith(_) => "The :attribute field must end with one of the following: :values.",
            Rule::Lowercase => "The :attribute field must be lowercase.",
            Rule::Uppercase => "The :attribute field must be uppercase.",
            Rule::Nullable | Rule::Bail => "The :attribute field is invalid.",
        }
    }

    /// Placeholder replacements for this rule's message.
    pub fn placeholders(&self) -> Vec<(&'static str, String)> {
        match self {
            Rule::Min(n) => vec![(":min", fmt_number(*n))],
            Rule::Max(n) => vec![(":max", fmt_number(*n))],
            Rule::Size(n) => vec![(":size", fmt_number(*n))],
            Rule::Between(a, b) => vec![(":min", fmt_number(*a)), (":max", fmt_number(*b))],
            Rule::Digits(n) => vec![(":digits", n.to_string())],
            Rule::DigitsBetween(a, b) => vec![(":min", a.to_string()), (":max", b.to_string())],
            Rule::DateFormat(f) => vec![(":format", f.clone())],
            Rule::In(v) | Rule::NotIn(v) | Rule::StartsWith(v) | Rule::EndsWith(v) => {
                vec![(":values", v.join(", "))]
            }
            _ => Vec::new(),
        }
    }
}

// =============================================================================
// Parameter parsing
// =============================================================================

fn require<'a>(rule: &str, param: Option<&'a str>) -> RuleResult<&'a str> {
    param.filter(|p| !p.trim().is_empty()).ok_or_else(|| RuleError::InvalidParameter {
        rule: rule.to_string(),
        message: "missing parameter".to_string(),
    })
}

fn number(rule: &str, param: &str) -> RuleResult<f64> {
    param.trim().parse::<f64>().map_err(|_| RuleError::InvalidParameter {
        rule: rule.to_string(),
        message: format!("'{}' is not a number", param),
    })
}

fn count(rule: &str, param: &str) -> RuleResult<usize> {
    param.trim().parse::<usize>().map_err(|_| RuleError::InvalidParameter {
        rule: rule.to_string(),
        message: format!("'{}' is not a positive integer", param),
    })
}

fn pair<'a>(rule: &str, param: &'a str) -> RuleResult<(&'a str, &'a str)> {
    param.split_once(',').ok_or_else(|| RuleError::InvalidParameter {
        rule: rule.to_string(),
        message: "expected two comma separated values".to_string(),
    })
}

fn list(param: &str) -> Vec<String> {
    param.split(',').map(|s| s.trim().to_string()).collect()
}

/// Compile a delimited pattern (`/^a+$/i`).
fn pattern(rule: &str, param: &str) -> RuleResult<Regex> {
    let invalid = |message: String| RuleError::InvalidPattern { rule: rule.to_string(), message };

    let mut chars = param.chars();
    let delimiter = chars.next().ok_or_else(|| invalid("empty pattern".to_string()))?;
    if delimiter.is_alphanumeric() || delimiter == '\\' {
        return Err(invalid(format!("'{}' is not a valid delimiter", delimiter)));
    }
    let body = &param[delimiter.len_utf8()..];
    let end = body
        .rfind(delimiter)
        .ok_or_else(|| invalid("missing closing delimiter".to_string()))?;
    let (source, flags) = (&body[..end], &body[end + delimiter.len_utf8()..]);

    let inline: String = flags.chars().filter(|f| matches!(f, 'i' | 'm' | 's' | 'x')).collect();
    let full = if inline.is_empty() {
        source.to_string()
    } else {
        format!("(?{}){}", inline, source)
    };

    Regex::new(&full).map_err(|e| invalid(e.to_string()))
}

/// Translate the usual `Y-m-d H:i:s` style format into chrono syntax.
fn php_date_format(format: &str) -> String {
    let mut out = String::new();
    for c in format.chars() {
        match c {
            'Y' => out.push_str("%Y"),
            'y' => out.push_str("%y"),
            'm' | 'n' => out.push_str("%m"),
            'd' | 'j' => out.push_str("%d"),
            'H' | 'G' => out.push_str("%H"),
            'i' => out.push_str("%M"),
            's' => out.push_str("%S"),
            'M' => out.push_str("%b"),
            'D' => out.push_str("%a"),
            '%' => out.push_str("%%"),
            other => out.push(other),
        }
    }
    out
}

// =============================================================================
// Value helpers
// =============================================================================

enum SizeKind {
    Numeric,
    Array,
    String,
}

fn size_kind(value: Option<&Value>, numeric: bool) -> SizeKind {
    match value {
        Some(v) if numeric && as_number(v).is_some() => SizeKind::Numeric,
        Some(Value::Array(_)) | Some(Value::Object(_)) => SizeKind::Array,
        _ => SizeKind::String,
    }
}

fn size_of(value: &Value, numeric: bool) -> Option<f64> {
    if numeric {
        if let Some(n) = as_number(value) {
            return Some(n);
        }
    }
    match value {
        Value::Array(a) => Some(a.len() as f64),
        Value::Object(o) => Some(o.len() as f64),
        other => scalar_string(other).map(|s| s.chars().count() as f64),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// String form of a scalar; `None` for null, arrays and objects.
pub(crate) fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        _ => None,
    }
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

fn parses_as_date(s: &str) -> bool {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s).is_ok()
        || DATE_FORMATS.iter().any(|f| NaiveDate::parse_from_str(s, f).is_ok())
        || DATETIME_FORMATS.iter().any(|f| NaiveDateTime::parse_from_str(s, f).is_ok())
}

fn matches_date_format(s: &str, fmt: &str) -> bool {
    NaiveDateTime::parse_from_str(s, fmt).is_ok()
        || NaiveDate::parse_from_str(s, fmt).is_ok()
        || NaiveTime::parse_from_str(s, fmt).is_ok()
}

fn fmt_number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
