//! Dot-path parsing, lookup and insertion over JSON values.
//!
//! Paths are dot separated (`output.video_url`). Array elements can be
//! addressed either with brackets (`data[0].url`) or with a numeric segment
//! (`data.0.url`).

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde_json::{Map, Value};

use super::DescriptorError;

static SEGMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^\[\]]+)((?:\[\d+\])*)$").expect("segment pattern is valid")
});

static INDEX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(\d+)\]").expect("index pattern is valid"));

/// One step of a parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

fn invalid(path: &str, reason: &str) -> DescriptorError {
    DescriptorError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse a dot-path into segments.
pub fn parse_path(path: &str) -> Result<Vec<Segment>, DescriptorError> {
    if path.is_empty() {
        return Err(invalid(path, "path is empty"));
    }

    let mut segments = Vec::new();
    for part in path.split('.') {
        if part.is_empty() {
            return Err(invalid(path, "empty segment"));
        }
        let caps = SEGMENT_RE
            .captures(part)
            .ok_or_else(|| invalid(path, "malformed index"))?;

        segments.push(Segment::Key(caps[1].to_string()));
        if let Some(indexes) = caps.get(2) {
            for idx in INDEX_RE.captures_iter(indexes.as_str()) {
                let n = idx[1]
                    .parse::<usize>()
                    .map_err(|_| invalid(path, "index out of range"))?;
                segments.push(Segment::Index(n));
            }
        }
    }
    Ok(segments)
}

/// Resolve a path against a value. Missing steps and a final `null` give `None`.
///
/// A malformed path resolves to `None` as well; descriptors are validated
/// before they are used, so lookups never fail.
pub fn get_by_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = parse_path(path).ok()?;
    let mut current = value;
    for segment in &segments {
        current = match (segment, current) {
            (Segment::Key(key), Value::Object(map)) => map.get(key)?,
            (Segment::Key(key), Value::Array(items)) => items.get(key.parse::<usize>().ok()?)?,
            (Segment::Index(i), Value::Array(items)) => items.get(*i)?,
            _ => return None,
        };
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Insert `value` at `path` inside `root`, creating intermediate objects.
///
/// Only key segments are allowed. Writing through an existing non-object
/// value, or replacing an object that already holds nested keys, is a
/// collision.
pub fn set_by_path(
    root: &mut Map<String, Value>,
    path: &str,
    value: Value,
) -> Result<(), DescriptorError> {
    let segments = parse_path(path)?;
    let mut keys = Vec::with_capacity(segments.len());
    for segment in segments {
        match segment {
            Segment::Key(key) => keys.push(key),
            Segment::Index(_) => return Err(invalid(path, "array indexes cannot be written")),
        }
    }

    let Some((last, parents)) = keys.split_last() else {
        return Err(invalid(path, "path is empty"));
    };

    let mut current = root;
    let mut walked = String::new();
    for key in parents {
        if !walked.is_empty() {
            walked.push('.');
        }
        walked.push_str(key);

        let entry = current
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match entry {
            Value::Object(map) => map,
            _ => {
                return Err(DescriptorError::PathCollision {
                    key: path.to_string(),
                    at: walked,
                })
            }
        };
    }

    if let Some(Value::Object(existing)) = current.get(last) {
        if !existing.is_empty() {
            return Err(DescriptorError::PathCollision {
                key: path.to_string(),
                at: path.to_string(),
            });
        }
    }
    current.insert(last.clone(), value);
    Ok(())
}
