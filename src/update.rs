//! Structural Updates
//!
//! Pure application of path-qualified overrides to an immutable structured
//! value. The base value is never altered; every update produces a new
//! `serde_json::Value` with the overrides merged in.
//!
//! Override keys are paths with `__`-delimited segments: `a__b__0` navigates
//! into key `a`, then key `b`, then sequence index `0`. All segments but the
//! last must resolve to an existing container. The last segment sets,
//! replaces, or (for [`Override::Remove`]) deletes the addressed entry.

use crate::error::PathError;
use serde_json::Value;

/// Reserved delimiter separating path segments in override keys.
pub const PATH_DELIMITER: &str = "__";

/// One override: set a value at a path, or remove the entry at a path.
#[derive(Debug, Clone, PartialEq)]
pub enum Override {
    Set(Value),
    /// Tombstone: remove the addressed key or index. Removing an entry that
    /// is already absent is a no-op.
    Remove,
}

/// An ordered set of path-qualified overrides.
///
/// Overrides are applied in insertion order, so later entries observe the
/// effect of earlier ones (e.g. a set followed by a removal of a sibling
/// index sees the already-updated sequence).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    entries: Vec<(String, Override)>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a set/replace override at `path`.
    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.push((path.into(), Override::Set(value.into())));
        self
    }

    /// Add a tombstone override at `path`.
    pub fn remove(mut self, path: impl Into<String>) -> Self {
        self.entries.push((path.into(), Override::Remove));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Override)> {
        self.entries.iter().map(|(path, op)| (path.as_str(), op))
    }
}

/// Apply `overrides` to `base`, returning the merged value.
///
/// `base` is deep-copied first and never mutated. Fails with [`PathError`]
/// when an override path cannot be navigated; on failure the caller's value
/// is untouched and no partial merge escapes.
pub fn apply(base: &Value, overrides: &Overrides) -> Result<Value, PathError> {
    let mut merged = base.clone();
    for (path, op) in overrides.iter() {
        apply_one(&mut merged, path, op)?;
    }
    Ok(merged)
}

fn apply_one(root: &mut Value, path: &str, op: &Override) -> Result<(), PathError> {
    let segments: Vec<&str> = path.split(PATH_DELIMITER).collect();
    // `split` yields at least one segment for any input, including "".
    let (last, parents) = match segments.split_last() {
        Some(parts) => parts,
        None => return Ok(()),
    };

    let mut node = root;
    for segment in parents {
        node = descend(node, segment, path)?;
    }

    match op {
        Override::Set(value) => set_at(node, last, value.clone(), path),
        Override::Remove => remove_at(node, last, path),
    }
}

/// Navigate one non-leaf segment into an existing container.
fn descend<'a>(node: &'a mut Value, segment: &str, path: &str) -> Result<&'a mut Value, PathError> {
    match node {
        Value::Object(map) => map.get_mut(segment).ok_or_else(|| PathError::MissingKey {
            path: path.to_string(),
            segment: segment.to_string(),
        }),
        Value::Array(items) => {
            let index = parse_index(segment, path)?;
            items.get_mut(index).ok_or(PathError::IndexOutOfRange {
                path: path.to_string(),
                index,
            })
        }
        other => Err(PathError::NotAContainer {
            path: path.to_string(),
            segment: segment.to_string(),
            found: kind(other),
        }),
    }
}

fn set_at(parent: &mut Value, segment: &str, value: Value, path: &str) -> Result<(), PathError> {
    match parent {
        // Mapping: setting creates the key if absent.
        Value::Object(map) => {
            map.insert(segment.to_string(), value);
            Ok(())
        }
        // Sequence: the index must already exist.
        Value::Array(items) => {
            let index = parse_index(segment, path)?;
            match items.get_mut(index) {
                Some(slot) => {
                    *slot = value;
                    Ok(())
                }
                None => Err(PathError::IndexOutOfRange {
                    path: path.to_string(),
                    index,
                }),
            }
        }
        other => Err(PathError::NotAContainer {
            path: path.to_string(),
            segment: segment.to_string(),
            found: kind(other),
        }),
    }
}

fn remove_at(parent: &mut Value, segment: &str, path: &str) -> Result<(), PathError> {
    match parent {
        Value::Object(map) => {
            // Absent keys are ignored: repeated tombstones are safe.
            map.remove(segment);
            Ok(())
        }
        Value::Array(items) => {
            let index = parse_index(segment, path)?;
            if index < items.len() {
                items.remove(index);
            }
            Ok(())
        }
        other => Err(PathError::NotAContainer {
            path: path.to_string(),
            segment: segment.to_string(),
            found: kind(other),
        }),
    }
}

fn parse_index(segment: &str, path: &str) -> Result<usize, PathError> {
    segment.parse::<usize>().map_err(|_| PathError::NotAnIndex {
        path: path.to_string(),
        segment: segment.to_string(),
    })
}

/// Human-readable kind of a JSON value, for error messages.
pub(crate) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}
