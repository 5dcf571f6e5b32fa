use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};
use thiserror::Error;
use tracing::debug;

use crate::error::ParseError;
use crate::validator::{ValidationErrors, Validator};

use super::descriptor::{descriptor_of, Bind, FieldKind, FieldSource, FieldTable};

/// Why a request could not be bound onto a record.
#[derive(Debug, Error)]
pub enum BindError {
    /// One or more validation rules failed.
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    /// The body or query could not be decoded.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// A value could not be weakly converted to the field's kind.
    #[error("cannot convert `{field}`: {message}")]
    Convert { field: String, message: String },
    /// serde rejected the converted map.
    #[error("failed to bind request: {0}")]
    Deserialize(#[from] serde_json::Error),
}

/// Bind `params` onto `T` using its cached field table.
///
/// # Errors
///
/// See [`BindError`].
pub fn bind<T: Bind>(
    params: Map<String, Value>,
    validator: &dyn Validator,
    bail: bool,
) -> Result<T, BindError> {
    bind_with(params, &descriptor_of::<T>(), validator, bail, &|_| None)
}

/// Full binding pipeline. `external` resolves header and cookie sources.
pub(crate) fn bind_with<T: DeserializeOwned>(
    mut params: Map<String, Value>,
    table: &FieldTable,
    validator: &dyn Validator,
    bail: bool,
    external: &dyn Fn(&FieldSource) -> Option<String>,
) -> Result<T, BindError> {
    apply_sources(&mut params, table, external);
    prepare(&mut params, table, "")?;

    let bail = table.bail_mode().unwrap_or(bail);
    let errors = validator.validate(&params, table, bail);
    if !errors.is_empty() {
        debug!(issues = errors.len(), "Binding rejected by validation");
        return Err(errors.into());
    }
    Ok(serde_json::from_value(Value::Object(params))?)
}

fn apply_sources(
    params: &mut Map<String, Value>,
    table: &FieldTable,
    external: &dyn Fn(&FieldSource) -> Option<String>,
) {
    for field in table.fields() {
        if field.embedded {
            if let FieldKind::Record(describe) = &field.kind {
                apply_sources(params, &describe(), external);
            }
            continue;
        }
        if field.source == FieldSource::Params {
            continue;
        }
        if let Some(value) = external(&field.source) {
            params.insert(field.name.to_string(), Value::String(value));
        }
    }
}

/// Remap keys, fill defaults and convert values for every field of `table`.
fn prepare(map: &mut Map<String, Value>, table: &FieldTable, prefix: &str) -> Result<(), BindError> {
    let claimed = field_names(table);
    for field in table.fields() {
        if field.embedded {
            if let FieldKind::Record(describe) = &field.kind {
                prepare(map, &describe(), prefix)?;
            }
            continue;
        }

        remap(map, field.name, &field.aliases, &claimed);

        if map.get(field.name).map_or(true, is_blank) {
            match &field.default {
                Some(default) => {
                    map.insert(field.name.to_string(), default.clone());
                }
                None if !matches!(field.kind, FieldKind::String | FieldKind::Any) => {
                    map.remove(field.name);
                }
                None => {}
            }
        }

        if let Some(value) = map.get_mut(field.name) {
            let path = if prefix.is_empty() {
                field.name.to_string()
            } else {
                format!("{prefix}.{}", field.name)
            };
            coerce(value, &field.kind, &path)?;
        }
    }
    Ok(())
}

fn field_names(table: &FieldTable) -> Vec<&'static str> {
    let mut names = Vec::new();
    for field in table.fields() {
        if field.embedded {
            if let FieldKind::Record(describe) = &field.kind {
                names.extend(field_names(&describe()));
            }
        } else {
            names.push(field.name);
        }
    }
    names
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Lowercase and drop `-`, `_`, space and `.`.
pub(crate) fn fuzzy_key(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '-' | '_' | ' ' | '.'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Move the value stored under an alias or a fuzzily matching key to `name`.
fn remap(map: &mut Map<String, Value>, name: &str, aliases: &[&'static str], claimed: &[&'static str]) {
    if map.contains_key(name) {
        return;
    }
    let source = aliases
        .iter()
        .find(|a| map.contains_key(**a))
        .map(|a| (*a).to_string())
        .or_else(|| {
            let wanted: Vec<String> = std::iter::once(name)
                .chain(aliases.iter().copied())
                .map(fuzzy_key)
                .collect();
            map.keys()
                .find(|k| !claimed.contains(&k.as_str()) && wanted.contains(&fuzzy_key(k)))
                .cloned()
        });
    if let Some(source) = source {
        if let Some(value) = map.remove(&source) {
            map.insert(name.to_string(), value);
        }
    }
}

fn convert_error(path: &str, message: impl Into<String>) -> BindError {
    BindError::Convert {
        field: path.to_string(),
        message: message.into(),
    }
}

/// Scalars take the first element of a sequence.
fn first_of(value: &mut Value) {
    if let Value::Array(items) = value {
        let first = if items.is_empty() {
            Value::Null
        } else {
            items.swap_remove(0)
        };
        *value = first;
    }
}

fn coerce(value: &mut Value, kind: &FieldKind, path: &str) -> Result<(), BindError> {
    match kind {
        FieldKind::Any => {}
        FieldKind::String => {
            first_of(value);
            match value {
                Value::Number(n) => *value = Value::String(n.to_string()),
                Value::Bool(b) => *value = Value::String(b.to_string()),
                _ => {}
            }
        }
        FieldKind::Int => {
            first_of(value);
            let converted = match &*value {
                Value::String(s) => Some(parse_int(s.trim()).ok_or_else(|| {
                    convert_error(path, format!("`{s}` is not an integer"))
                })?),
                Value::Number(n) if n.as_i64().is_none() && n.as_u64().is_none() => {
                    let i = n
                        .as_f64()
                        .and_then(whole_to_i64)
                        .ok_or_else(|| convert_error(path, format!("`{n}` is not an integer")))?;
                    Some(Value::Number(Number::from(i)))
                }
                Value::Bool(b) => Some(Value::Number(Number::from(i64::from(*b)))),
                _ => None,
            };
            if let Some(converted) = converted {
                *value = converted;
            }
        }
        FieldKind::Float => {
            first_of(value);
            let converted = match &*value {
                Value::String(s) => {
                    let n = s
                        .trim()
                        .parse::<f64>()
                        .ok()
                        .and_then(Number::from_f64)
                        .ok_or_else(|| convert_error(path, format!("`{s}` is not a number")))?;
                    Some(Value::Number(n))
                }
                Value::Bool(b) => Some(Value::Number(Number::from(i64::from(*b)))),
                _ => None,
            };
            if let Some(converted) = converted {
                *value = converted;
            }
        }
        FieldKind::Bool => {
            first_of(value);
            let converted = match &*value {
                Value::String(s) => Some(Value::Bool(parse_bool(s).ok_or_else(|| {
                    convert_error(path, format!("`{s}` is not a boolean"))
                })?)),
                Value::Number(n) => Some(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
                _ => None,
            };
            if let Some(converted) = converted {
                *value = converted;
            }
        }
        FieldKind::List(item) => {
            if !value.is_array() && !value.is_null() {
                let single = std::mem::take(value);
                *value = Value::Array(vec![single]);
            }
            if let Value::Array(items) = value {
                for (i, element) in items.iter_mut().enumerate() {
                    coerce(element, item, &format!("{path}.{i}"))?;
                }
            }
        }
        FieldKind::Record(describe) => {
            if let Value::Object(obj) = value {
                prepare(obj, &describe(), path)?;
            }
        }
    }
    Ok(())
}

fn parse_int(s: &str) -> Option<Value> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::Number(Number::from(i)));
    }
    if let Ok(u) = s.parse::<u64>() {
        return Some(Value::Number(Number::from(u)));
    }
    let f = s.parse::<f64>().ok()?;
    whole_to_i64(f).map(|i| Value::Number(Number::from(i)))
}

/// `f` as `i64` when it is a whole number inside the `i64` range.
fn whole_to_i64(f: f64) -> Option<i64> {
    // 2^63 is exact in f64; `i64::MAX as f64` rounds up to it.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    (f.is_finite() && f.fract() == 0.0 && (-LIMIT..LIMIT).contains(&f)).then(|| f as i64)
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" | "y" => Some(true),
        "false" | "0" | "off" | "no" | "n" | "" => Some(false),
        _ => None,
    }
}

/// Deserialize a single value with weak typing: numeric and boolean
/// strings, scalars as strings, single values as one-element lists.
///
/// # Errors
///
/// The first serde error when no interpretation fits.
pub fn from_value_weak<T: DeserializeOwned>(value: Value) -> Result<T, serde_json::Error> {
    let first = match serde_json::from_value::<T>(value.clone()) {
        Ok(v) => return Ok(v),
        Err(e) => e,
    };
    let mut alternatives = Vec::new();
    match &value {
        Value::String(s) => {
            if let Ok(parsed) = serde_json::from_str::<Value>(s.trim()) {
                if !parsed.is_string() {
                    alternatives.push(parsed);
                }
            }
            if let Some(b) = parse_bool(s) {
                alternatives.push(Value::Bool(b));
            }
        }
        Value::Number(n) => alternatives.push(Value::String(n.to_string())),
        Value::Bool(b) => alternatives.push(Value::String(b.to_string())),
        Value::Array(items) if items.len() == 1 => alternatives.push(items[0].clone()),
        _ => {}
    }
    if !value.is_array() {
        alternatives.push(Value::Array(vec![value]));
    }
    alternatives
        .into_iter()
        .find_map(|alt| serde_json::from_value::<T>(alt).ok())
        .ok_or(first)
}
