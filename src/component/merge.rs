//! Deep merge of requirement fragments into component documents.
//!
//! Support fragments (`supports.features.<name>` / `supports.components.<name>`)
//! are merged into the declaring component when their condition becomes true.
//! The merge is best-effort: conflicting shapes are recorded and skipped while
//! the rest of the fragment is still applied.
//!
//! | existing \ incoming | object        | array        | scalar         |
//! |---------------------|---------------|--------------|----------------|
//! | absent / null       | insert        | insert       | insert         |
//! | object              | recurse       | conflict     | conflict       |
//! | array               | conflict      | concatenate  | append         |
//! | scalar              | conflict      | promote+concat | overwrite    |

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// A single shape conflict found while merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    /// JSON pointer of the conflicting location in the target document
    pub path: String,
    /// Shape already present in the target
    pub existing: &'static str,
    /// Shape found in the fragment
    pub incoming: &'static str,
}

impl fmt::Display for MergeConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "cannot merge {} into {} at '{}'", self.incoming, self.existing, path)
    }
}

/// All conflicts found by one merge. The non-conflicting parts were applied.
#[derive(Debug, Error)]
#[error("fragment partially merged: {}", conflicts.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
pub struct MergeError {
    /// The skipped locations
    pub conflicts: Vec<MergeConflict>,
}

/// Merge `fragment` into `target`.
///
/// # Errors
///
/// Returns [`MergeError`] listing every incompatible location. Everything else
/// has been merged regardless.
pub fn merge_fragment(target: &mut Value, fragment: &Value) -> Result<(), MergeError> {
    let mut conflicts = Vec::new();
    merge_into(target, fragment, "", &mut conflicts);
    if conflicts.is_empty() {
        Ok(())
    } else {
        Err(MergeError {
            conflicts,
        })
    }
}

fn merge_into(target: &mut Value, fragment: &Value, path: &str, conflicts: &mut Vec<MergeConflict>) {
    if target.is_null() {
        *target = fragment.clone();
        return;
    }
    if fragment.is_null() {
        return;
    }

    match target {
        Value::Object(existing) => match fragment {
            Value::Object(incoming) => {
                for (key, value) in incoming {
                    let child_path = format!("{path}/{key}");
                    match existing.get_mut(key) {
                        Some(slot) => merge_into(slot, value, &child_path, conflicts),
                        None => {
                            existing.insert(key.clone(), value.clone());
                        }
                    }
                }
            }
            other => conflicts.push(MergeConflict {
                path: path.to_string(),
                existing: "object",
                incoming: shape(other),
            }),
        },
        Value::Array(existing) => match fragment {
            Value::Array(incoming) => existing.extend(incoming.iter().cloned()),
            Value::Object(_) => conflicts.push(MergeConflict {
                path: path.to_string(),
                existing: "array",
                incoming: "object",
            }),
            scalar => existing.push(scalar.clone()),
        },
        slot => match fragment {
            Value::Object(_) => conflicts.push(MergeConflict {
                path: path.to_string(),
                existing: shape(slot),
                incoming: "object",
            }),
            Value::Array(incoming) => {
                let mut promoted = vec![slot.clone()];
                promoted.extend(incoming.iter().cloned());
                *slot = Value::Array(promoted);
            }
            scalar => *slot = scalar.clone(),
        },
    }
}

fn shape(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
