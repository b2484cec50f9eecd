//! Documents and dotted-path access
//!
//! A [`Document`] is a JSON object. Paths use `.` to descend into nested
//! objects; a numeric segment indexes into an array.

use crate::error::StoreError;
use serde_json::{Map, Value};

/// A stored document
pub type Document = Map<String, Value>;

/// Primary key field name
pub const ID_FIELD: &str = "_id";

/// Collect every value reachable through `path`
///
/// Arrays met along the way are fanned out: `mobile.mobile` against
/// `{"mobile": [{"mobile": "a"}, {"mobile": "b"}]}` yields both `"a"` and `"b"`.
#[must_use]
pub fn collect_path<'a>(doc: &'a Document, path: &str) -> Vec<&'a Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some((head, rest)) = segments.split_first() {
        if let Some(value) = doc.get(*head) {
            collect(value, rest, &mut out);
        }
    }
    out
}

fn collect<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };
    match value {
        Value::Object(map) => {
            if let Some(child) = map.get(*head) {
                collect(child, rest, out);
            }
        }
        Value::Array(items) => {
            if let Ok(idx) = head.parse::<usize>() {
                if let Some(child) = items.get(idx) {
                    collect(child, rest, out);
                }
            } else {
                for item in items {
                    collect(item, segments, out);
                }
            }
        }
        _ => {}
    }
}

/// Look up the single value at `path` without fanning out over arrays
#[must_use]
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Mutable variant of [`get_path`]
pub fn get_path_mut<'a>(doc: &'a mut Document, path: &str) -> Option<&'a mut Value> {
    let mut segments = path.split('.');
    let mut current = doc.get_mut(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Write `value` at `path`, creating intermediate objects as needed
///
/// # Errors
/// `StoreError::PathConflict` if an intermediate segment holds a scalar, or an
/// array that the next segment cannot index
pub fn set_path(doc: &mut Document, path: &str, value: Value) -> Result<(), StoreError> {
    let segments: Vec<&str> = path.split('.').collect();
    let conflict = || StoreError::PathConflict {
        path: path.to_string(),
    };

    let (last, parents) = segments.split_last().ok_or_else(conflict)?;
    if parents.is_empty() {
        doc.insert((*last).to_string(), value);
        return Ok(());
    }

    let mut current = doc
        .entry(parents[0].to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    for segment in &parents[1..] {
        current = descend_or_create(current, segment).ok_or_else(conflict)?;
    }

    match current {
        Value::Object(map) => {
            map.insert((*last).to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            let slot = last
                .parse::<usize>()
                .ok()
                .and_then(|idx| items.get_mut(idx))
                .ok_or_else(conflict)?;
            *slot = value;
            Ok(())
        }
        _ => Err(conflict()),
    }
}

fn descend_or_create<'a>(value: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match value {
        Value::Object(map) => Some(
            map.entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
        ),
        Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?),
        _ => None,
    }
}

/// Remove the value at `path`; returns whether anything was removed
pub fn remove_path(doc: &mut Document, path: &str) -> bool {
    match path.rsplit_once('.') {
        None => doc.remove(path).is_some(),
        Some((parent, last)) => match get_path_mut(doc, parent) {
            Some(Value::Object(map)) => map.remove(last).is_some(),
            _ => false,
        },
    }
}
