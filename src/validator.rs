//! Field validation for bound records.
//!
//! Rules are attached to fields in a type's [`FieldTable`] and checked by a
//! [`Validator`] after the merged parameters have been converted, before the
//! record is deserialized. Every failure is collected into a
//! [`ValidationErrors`] value unless bail mode stops at the first one.
//!
//! ```rust
//! use routeweave::binding::{Field, FieldTable};
//! use routeweave::validator::{Rule, RuleValidator, Validator};
//! use serde_json::json;
//!
//! let table = FieldTable::new()
//!     .field(Field::string("name").rule(Rule::required()).rule(Rule::length(Some(2), None)))
//!     .field(Field::string("email").rule(Rule::email().message("{field} must be an address")));
//! let data = json!({"name": "j", "email": "nope"});
//! let errors = RuleValidator.validate(data.as_object().unwrap(), &table, false);
//! assert_eq!(errors.len(), 2);
//! assert_eq!(errors.field("email").unwrap().message, "email must be an address");
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use validator::{ValidateEmail, ValidateUrl};

use crate::binding::{FieldKind, FieldTable};

/// One failed rule of one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    /// Dotted path of the field, e.g. `address.city` or `items.0.sku`.
    pub field: String,
    pub rule: &'static str,
    pub message: String,
}

/// Every rule failure of one binding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Error)]
#[error("validation failed: {}", summarize(.issues))]
pub struct ValidationErrors {
    issues: Vec<FieldViolation>,
}

fn summarize(issues: &[FieldViolation]) -> String {
    issues
        .iter()
        .map(|i| i.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, violation: FieldViolation) {
        self.issues.push(violation);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    #[must_use]
    pub fn issues(&self) -> &[FieldViolation] {
        &self.issues
    }

    /// First violation recorded for `field`.
    #[must_use]
    pub fn field(&self, field: &str) -> Option<&FieldViolation> {
        self.issues.iter().find(|i| i.field == field)
    }

    /// `field → rule → message`.
    #[must_use]
    pub fn into_map(self) -> BTreeMap<String, BTreeMap<String, String>> {
        let mut map: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for issue in self.issues {
            map.entry(issue.field)
                .or_default()
                .entry(issue.rule.to_string())
                .or_insert(issue.message);
        }
        map
    }
}

#[derive(Debug, Clone)]
enum RuleKind {
    Required,
    Length {
        min: Option<usize>,
        max: Option<usize>,
    },
    Min(f64),
    Max(f64),
    Between(f64, f64),
    Email,
    Url,
    Pattern(Regex),
    In(Vec<String>),
    Same(Cow<'static, str>),
    Custom {
        name: &'static str,
        check: fn(&Value) -> bool,
    },
}

/// A single validation rule. Every rule except [`Rule::required`] passes on
/// absent or empty values.
#[derive(Debug, Clone)]
pub struct Rule {
    kind: RuleKind,
    message: Option<Cow<'static, str>>,
}

impl Rule {
    fn of(kind: RuleKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// Value must be present and non-empty.
    #[must_use]
    pub fn required() -> Self {
        Self::of(RuleKind::Required)
    }

    /// Character count (or sequence length) within the given bounds.
    #[must_use]
    pub fn length(min: Option<usize>, max: Option<usize>) -> Self {
        Self::of(RuleKind::Length { min, max })
    }

    #[must_use]
    pub fn min(min: f64) -> Self {
        Self::of(RuleKind::Min(min))
    }

    #[must_use]
    pub fn max(max: f64) -> Self {
        Self::of(RuleKind::Max(max))
    }

    /// Numeric value within `min..=max`.
    #[must_use]
    pub fn between(min: f64, max: f64) -> Self {
        Self::of(RuleKind::Between(min, max))
    }

    #[must_use]
    pub fn email() -> Self {
        Self::of(RuleKind::Email)
    }

    #[must_use]
    pub fn url() -> Self {
        Self::of(RuleKind::Url)
    }

    #[must_use]
    pub fn pattern(regex: Regex) -> Self {
        Self::of(RuleKind::Pattern(regex))
    }

    /// Value must be one of `options`.
    #[must_use]
    pub fn one_of(options: &[&str]) -> Self {
        Self::of(RuleKind::In(options.iter().map(|s| (*s).to_string()).collect()))
    }

    /// Value must equal the sibling field `other`, e.g. a password
    /// confirmation.
    #[must_use]
    pub fn same(other: impl Into<Cow<'static, str>>) -> Self {
        Self::of(RuleKind::Same(other.into()))
    }

    #[must_use]
    pub fn custom(name: &'static str, check: fn(&Value) -> bool) -> Self {
        Self::of(RuleKind::Custom { name, check })
    }

    /// Replace the default message. `{field}` is substituted with the field
    /// path.
    #[must_use]
    pub fn message(mut self, message: impl Into<Cow<'static, str>>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Rule identifier used in [`FieldViolation::rule`].
    #[must_use]
    pub fn name(&self) -> &'static str {
        match &self.kind {
            RuleKind::Required => "required",
            RuleKind::Length { .. } => "length",
            RuleKind::Min(_) => "min",
            RuleKind::Max(_) => "max",
            RuleKind::Between(..) => "between",
            RuleKind::Email => "email",
            RuleKind::Url => "url",
            RuleKind::Pattern(_) => "pattern",
            RuleKind::In(_) => "in",
            RuleKind::Same(_) => "same",
            RuleKind::Custom { name, .. } => name,
        }
    }

    /// `None` when the value passes, the failure message otherwise.
    #[must_use]
    pub fn check(&self, path: &str, value: Option<&Value>, siblings: &Map<String, Value>) -> Option<String> {
        let value = match value {
            Some(v) if !is_empty(v) => v,
            _ => {
                return matches!(self.kind, RuleKind::Required)
                    .then(|| self.fail(path, format!("{path} is required")));
            }
        };
        let passed = match &self.kind {
            RuleKind::Required => true,
            RuleKind::Length { min, max } => {
                let len = length_of(value);
                min.map_or(true, |m| len >= m) && max.map_or(true, |m| len <= m)
            }
            RuleKind::Min(min) => number_of(value).is_some_and(|n| n >= *min),
            RuleKind::Max(max) => number_of(value).is_some_and(|n| n <= *max),
            RuleKind::Between(min, max) => number_of(value).is_some_and(|n| n >= *min && n <= *max),
            RuleKind::Email => text_of(value).validate_email(),
            RuleKind::Url => text_of(value).validate_url(),
            RuleKind::Pattern(re) => re.is_match(&text_of(value)),
            RuleKind::In(options) => {
                let text = text_of(value);
                options.iter().any(|o| *o == text)
            }
            RuleKind::Same(other) => siblings.get(other.as_ref()).map(text_of) == Some(text_of(value)),
            RuleKind::Custom { check, .. } => check(value),
        };
        if passed {
            return None;
        }
        let default = match &self.kind {
            RuleKind::Required => format!("{path} is required"),
            RuleKind::Length { min, max } => match (min, max) {
                (Some(min), Some(max)) => format!("{path} length must be between {min} and {max}"),
                (Some(min), None) => format!("{path} length must be at least {min}"),
                (None, Some(max)) => format!("{path} length must be at most {max}"),
                (None, None) => format!("{path} has an invalid length"),
            },
            RuleKind::Min(min) => format!("{path} must be at least {min}"),
            RuleKind::Max(max) => format!("{path} must be at most {max}"),
            RuleKind::Between(min, max) => format!("{path} must be between {min} and {max}"),
            RuleKind::Email => format!("{path} must be a valid email address"),
            RuleKind::Url => format!("{path} must be a valid URL"),
            RuleKind::Pattern(re) => format!("{path} must match `{}`", re.as_str()),
            RuleKind::In(options) => format!("{path} must be one of: {}", options.join(", ")),
            RuleKind::Same(other) => format!("{path} must match {other}"),
            RuleKind::Custom { name, .. } => format!("{path} failed rule {name}"),
        };
        Some(self.fail(path, default))
    }

    fn fail(&self, path: &str, default: String) -> String {
        match &self.message {
            Some(custom) => custom.replace("{field}", path),
            None => default,
        }
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(obj) => obj.is_empty(),
        _ => false,
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn length_of(value: &Value) -> usize {
    match value {
        Value::Array(items) => items.len(),
        Value::Object(obj) => obj.len(),
        other => text_of(other).chars().count(),
    }
}

fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Checks converted parameters against a field table.
pub trait Validator: Send + Sync + 'static {
    /// With `bail` set, stop at the first failure.
    fn validate(&self, data: &Map<String, Value>, table: &FieldTable, bail: bool) -> ValidationErrors;
}

/// Built-in validator running the [`Rule`]s attached to each field,
/// descending into nested and embedded records.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleValidator;

impl Validator for RuleValidator {
    fn validate(&self, data: &Map<String, Value>, table: &FieldTable, bail: bool) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        check_table(data, table, "", bail, &mut errors);
        errors
    }
}

/// Returns `true` when bail mode hit a failure.
fn check_table(
    data: &Map<String, Value>,
    table: &FieldTable,
    prefix: &str,
    bail: bool,
    errors: &mut ValidationErrors,
) -> bool {
    for field in table.fields() {
        if field.embedded {
            if let FieldKind::Record(describe) = &field.kind {
                if check_table(data, &describe(), prefix, bail, errors) {
                    return true;
                }
            }
            continue;
        }

        let path = if prefix.is_empty() {
            field.name.to_string()
        } else {
            format!("{prefix}.{}", field.name)
        };
        let value = data.get(field.name);
        for rule in &field.rules {
            if let Some(message) = rule.check(&path, value, data) {
                errors.push(FieldViolation {
                    field: path.clone(),
                    rule: rule.name(),
                    message,
                });
                if bail {
                    return true;
                }
            }
        }

        if check_nested(value, &field.kind, &path, bail, errors) {
            return true;
        }
    }
    false
}

fn check_nested(
    value: Option<&Value>,
    kind: &FieldKind,
    path: &str,
    bail: bool,
    errors: &mut ValidationErrors,
) -> bool {
    match (value, kind) {
        (Some(Value::Object(obj)), FieldKind::Record(describe)) => {
            check_table(obj, &describe(), path, bail, errors)
        }
        (Some(Value::Array(items)), FieldKind::List(inner)) => {
            for (i, item) in items.iter().enumerate() {
                if check_nested(Some(item), inner, &format!("{path}.{i}"), bail, errors) {
                    return true;
                }
            }
            false
        }
        _ => false,
    }
}
