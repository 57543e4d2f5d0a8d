//! Turning descriptor parameters plus caller overrides into a request payload.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::descriptor::{set_by_path, DescriptorError, ParamField, ParamKind};

/// A materialized request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestPayload {
    /// JSON body with dot-path keys expanded into nested objects.
    pub body: Map<String, Value>,
    /// `file` parameters, keyed by parameter key, routed to multipart construction.
    pub files: BTreeMap<String, Value>,
}

/// Build a request payload from descriptor params and caller overrides.
///
/// Same inputs always give the same payload. Invalid numbers and select
/// values fall back to the parameter default rather than failing.
pub fn materialize(
    params: &[ParamField],
    overrides: &BTreeMap<String, Value>,
) -> Result<RequestPayload, DescriptorError> {
    let mut payload = RequestPayload::default();

    for param in params {
        let supplied = overrides.get(&param.key);
        let value = coerce(param, supplied);

        if param.is_file() {
            if !value.is_null() {
                payload.files.insert(param.key.clone(), value);
            }
            continue;
        }

        if param.required && is_blank(&value) {
            return Err(DescriptorError::MissingRequired(param.key.clone()));
        }

        set_by_path(&mut payload.body, &param.key, value)?;
    }

    Ok(payload)
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// The final value of one parameter.
fn coerce(param: &ParamField, supplied: Option<&Value>) -> Value {
    let Some(raw) = supplied else {
        return param.value.clone();
    };

    match &param.kind {
        ParamKind::String => match raw {
            Value::Null => param.value.clone(),
            Value::String(_) => raw.clone(),
            Value::Number(n) => Value::String(n.to_string()),
            Value::Bool(b) => Value::String(b.to_string()),
            other => Value::String(other.to_string()),
        },
        ParamKind::Number => to_number(raw).unwrap_or_else(|| {
            debug!(key = %param.key, value = %raw, "Number override is not numeric, using default");
            param.value.clone()
        }),
        ParamKind::Boolean => Value::Bool(truthy(raw)),
        ParamKind::Select { options } => {
            let wanted = scalar_text(raw);
            match options.iter().find(|o| scalar_text(o) == wanted) {
                Some(option) => option.clone(),
                None => {
                    debug!(key = %param.key, value = %raw, "Select override is not an option, using default");
                    param.value.clone()
                }
            }
        }
        ParamKind::File => raw.clone(),
    }
}

fn to_number(raw: &Value) -> Option<Value> {
    match raw {
        Value::Number(_) => Some(raw.clone()),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Some(Value::Number(i.into()));
            }
            let f = s.parse::<f64>().ok().filter(|f| f.is_finite())?;
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                Some(Value::Number((f as i64).into()))
            } else {
                Number::from_f64(f).map(Value::Number)
            }
        }
        Value::Bool(b) => Some(Value::Number(i64::from(*b).into())),
        _ => None,
    }
}

fn truthy(raw: &Value) -> bool {
    match raw {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "" | "false" | "0" | "no" | "off"
        ),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// String form used to compare select values, so `"10"` matches `10`.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
