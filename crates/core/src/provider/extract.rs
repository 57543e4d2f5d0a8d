//! Reading mapped fields out of provider responses.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::descriptor::{get_by_path, ResponseField};

/// Values resolved from a response, keyed by internal response key.
///
/// A key whose path was missing (or `null`) is absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractedFields(BTreeMap<String, Value>);

impl ExtractedFields {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The field as text. Numbers and booleans are rendered, other shapes are not.
    pub fn string(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn into_map(self) -> BTreeMap<String, Value> {
        self.0
    }
}

/// Resolve every mapping against `payload`. Never fails.
pub fn extract(mapping: &[ResponseField], payload: &Value) -> ExtractedFields {
    let fields = mapping
        .iter()
        .filter_map(|field| {
            get_by_path(payload, &field.path).map(|v| (field.key.clone(), v.clone()))
        })
        .collect();
    ExtractedFields(fields)
}

/// Parse a response body. JSON first, then `application/x-www-form-urlencoded`,
/// otherwise the text itself.
pub fn parse_body(text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return value;
    }
    if let Some(form) = parse_form(trimmed) {
        return Value::Object(form);
    }
    Value::String(trimmed.to_string())
}

fn parse_form(text: &str) -> Option<Map<String, Value>> {
    if !text.contains('=') || text.contains(char::is_whitespace) {
        return None;
    }
    let mut map = Map::new();
    for pair in text.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = urlencoding::decode(&key.replace('+', " ")).ok()?.into_owned();
        let value = urlencoding::decode(&value.replace('+', " ")).ok()?.into_owned();
        map.insert(key, Value::String(value));
    }
    Some(map)
}
