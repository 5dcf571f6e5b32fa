//! Array-style key normalization for query strings and form bodies.
//!
//! - `a[]=1&a[]=2` → `{"a": ["1", "2"]}`
//! - `a[1]=y&a[0]=x` → `{"a": ["x", "y"]}`
//! - `m[a]=1&m[b]=2` → `{"m": {"a": "1", "b": "2"}}`
//! - `m[a][b]=1` → `{"m": {"a": {"b": "1"}}}`
//! - `k=1&k=2` → `{"k": "2"}` (last value wins)

use serde_json::{Map, Value};

/// Parse an `application/x-www-form-urlencoded` payload into a normalized map.
#[must_use]
pub fn parse_urlencoded(input: &[u8]) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in url::form_urlencoded::parse(input) {
        insert(&mut map, &key, Value::String(value.into_owned()));
    }
    finish(&mut map);
    map
}

/// Insert `value` under `key`, expanding bracket notation.
///
/// Call [`finish`] once every pair is inserted to turn index maps into
/// ordered sequences.
pub fn insert(map: &mut Map<String, Value>, key: &str, value: Value) {
    let Some((base, parts)) = split_key(key) else {
        map.insert(key.to_string(), value);
        return;
    };
    let slot = map.entry(base.to_string()).or_insert(Value::Null);
    insert_path(slot, &parts, value);
}

/// Turn every nested map whose keys are all numeric indexes into a
/// sequence ordered by index.
pub fn finish(map: &mut Map<String, Value>) {
    for value in map.values_mut() {
        finish_value(value);
    }
}

fn finish_value(value: &mut Value) {
    match value {
        Value::Array(items) => items.iter_mut().for_each(finish_value),
        Value::Object(obj) => {
            obj.values_mut().for_each(finish_value);
            if !obj.is_empty() && obj.keys().all(|k| k.parse::<usize>().is_ok()) {
                let mut indexed: Vec<(usize, Value)> = std::mem::take(obj)
                    .into_iter()
                    .filter_map(|(k, v)| k.parse::<usize>().ok().map(|i| (i, v)))
                    .collect();
                indexed.sort_by_key(|(i, _)| *i);
                *value = Value::Array(indexed.into_iter().map(|(_, v)| v).collect());
            }
        }
        _ => {}
    }
}

/// `a[b][]` → `("a", ["b", ""])`; `None` when the key has no well-formed
/// bracket suffix.
fn split_key(key: &str) -> Option<(&str, Vec<&str>)> {
    let open = key.find('[')?;
    if open == 0 || !key.ends_with(']') {
        return None;
    }
    let base = &key[..open];
    let mut parts = Vec::new();
    let mut rest = &key[open..];
    while !rest.is_empty() {
        let inner = rest.strip_prefix('[')?;
        let close = inner.find(']')?;
        parts.push(&inner[..close]);
        rest = &inner[close + 1..];
    }
    Some((base, parts))
}

fn insert_path(slot: &mut Value, parts: &[&str], value: Value) {
    let Some((part, rest)) = parts.split_first() else {
        *slot = value;
        return;
    };
    if part.is_empty() {
        if !slot.is_array() {
            *slot = Value::Array(Vec::new());
        }
        if let Value::Array(items) = slot {
            if rest.is_empty() {
                items.push(value);
            } else {
                items.push(Value::Null);
                if let Some(last) = items.last_mut() {
                    insert_path(last, rest, value);
                }
            }
        }
        return;
    }
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    if let Value::Object(obj) = slot {
        let child = obj.entry(part.to_string()).or_insert(Value::Null);
        insert_path(child, rest, value);
    }
}
