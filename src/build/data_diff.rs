//! Change detection for data dependencies.
//!
//! A data dependency names a value inside the project summary:
//! `:/<component>/<json-pointer>`, or `:/*/<json-pointer>` for "this pointer in
//! any component". It is considered changed when the value differs between the
//! summary persisted by the previous successful build and the current one.
//! Values are compared structurally.

use serde_json::Value;
use std::sync::Arc;

use crate::constants::{DATA_DEPENDENCY_SENTINEL, DATA_DEPENDENCY_WILDCARD};
use crate::core::YakkaError;

/// Which component(s) a data dependency looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataScope<'a> {
    AnyComponent,
    Component(&'a str),
}

/// A parsed data dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPath<'a> {
    pub scope: DataScope<'a>,
    /// JSON pointer inside the component, starting with `/`
    pub pointer: String,
}

/// Parse `:/<component>/<pointer>`.
///
/// # Errors
///
/// [`YakkaError::MalformedDataPath`] when the sentinel, the leading `/`, the
/// component segment or the `/` after it is missing.
pub fn parse_data_path(dependency: &str) -> Result<DataPath<'_>, YakkaError> {
    let malformed = |reason: &str| YakkaError::MalformedDataPath {
        path: dependency.to_string(),
        reason: reason.to_string(),
    };

    let rest = dependency
        .strip_prefix(DATA_DEPENDENCY_SENTINEL)
        .ok_or_else(|| malformed("missing ':' prefix"))?;
    let rest = rest.strip_prefix('/').ok_or_else(|| malformed("expected '/' after ':'"))?;
    let (component, pointer) = rest
        .split_once('/')
        .ok_or_else(|| malformed("expected '/' after the component name"))?;
    if component.is_empty() {
        return Err(malformed("empty component name"));
    }

    let scope = if component == DATA_DEPENDENCY_WILDCARD {
        DataScope::AnyComponent
    } else {
        DataScope::Component(component)
    };
    Ok(DataPath {
        scope,
        pointer: format!("/{pointer}"),
    })
}

/// Compares data between the previous and the current project summary.
#[derive(Debug, Clone)]
pub struct DataDiff {
    previous: Option<Arc<Value>>,
    current: Arc<Value>,
}

impl DataDiff {
    pub fn new(previous: Option<Arc<Value>>, current: Arc<Value>) -> Self {
        Self {
            previous,
            current,
        }
    }

    /// Whether the value named by `dependency` changed since the previous build.
    ///
    /// Without a previous summary everything counts as changed.
    pub fn has_changed(&self, dependency: &str) -> Result<bool, YakkaError> {
        let path = parse_data_path(dependency)?;
        let Some(previous) = &self.previous else {
            return Ok(true);
        };

        let previous_components = previous.get("components");
        let current_components = self.current.get("components");
        let lookup = |components: Option<&Value>, id: &str| -> Option<Value> {
            components?.get(id)?.pointer(&path.pointer).cloned()
        };

        match path.scope {
            DataScope::AnyComponent => {
                let Some(current) = current_components.and_then(Value::as_object) else {
                    return Ok(false);
                };
                Ok(current.keys().any(|id| {
                    lookup(previous_components, id) != lookup(current_components, id)
                }))
            }
            DataScope::Component(id) => {
                if previous_components.and_then(|c| c.get(id)).is_none() {
                    return Ok(true);
                }
                Ok(lookup(previous_components, id) != lookup(current_components, id))
            }
        }
    }
}
