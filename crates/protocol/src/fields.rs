//! Lenient field access for inbound JSON objects
//!
//! The printer is inconsistent about quoting: the same field may arrive as a
//! JSON string, a number, or an empty string depending on firmware and state.

use serde_json::{Map, Value};
use std::str::FromStr;

pub(crate) type Object = Map<String, Value>;

/// Field rendered as text; `null` and absent keys are `None`
pub(crate) fn text(obj: &Object, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Numeric field from a string or number; empty or unparseable is `None`
pub(crate) fn number<T: FromStr>(obj: &Object, key: &str) -> Option<T> {
    match obj.get(key)? {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() { None } else { s.parse().ok() }
        }
        Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    }
}

/// Boolean field; accepts `true`/`false`, their string forms, and 0/1
pub(crate) fn flag(obj: &Object, key: &str) -> Option<bool> {
    match obj.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim() {
            "1" => Some(true),
            "0" => Some(false),
            s => s.parse().ok(),
        },
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        _ => None,
    }
}
