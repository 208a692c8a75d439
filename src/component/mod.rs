//! Component description documents.
//!
//! A component is described by a YAML file named `<id>.yakka`. The document is
//! kept as a [`serde_json::Value`] because most sections (`data`, `tools`,
//! blueprints, free-form keys) are open-ended and end up in the project summary
//! unchanged. The well-known sections get typed accessors here:
//!
//! ```yaml
//! id: lwip
//! version: 2.1.3
//! requires:
//!   components: [freertos]
//!   features: [networking]
//! provides:
//!   features: [tcp]
//! supports:
//!   features:
//!     ipv6:
//!       data: { lwip: { ipv6: true } }
//!   components:
//!     mbedtls:
//!       requires: { features: [tls] }
//! choices:
//!   port:
//!     description: Which RTOS port to use
//!     features: [port_freertos, port_baremetal]
//!     default: { feature: port_freertos }
//! replaces:
//!   component: [lwip_legacy]
//! blueprints:
//!   "{{project_output}}/lwip.a": { depends: [...], process: [...] }
//! ```
//!
//! Parsing injects `directory` (the file's parent directory) and `yakka_file`
//! (the file itself) so templates can reference them.

pub mod merge;
pub mod store;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::core::YakkaError;

pub use merge::{MergeConflict, MergeError, merge_fragment};
pub use store::{ComponentLocation, ComponentStore, FsComponentStore};

/// Default selection for a choice when nothing else satisfies it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChoiceDefault {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
}

/// A decision point requiring exactly one of its options in the resolved build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ChoiceDefault>,
}

/// Requirements found in a document or a support fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requirements {
    pub components: Vec<String>,
    pub features: Vec<String>,
    pub provided_features: Vec<String>,
}

impl Requirements {
    /// Extract `requires.components`, `requires.features` and `provides.features`.
    ///
    /// Malformed shapes are logged and ignored.
    pub fn of(node: &Value, owner: &str) -> Self {
        let requires = node.get("requires");
        let provides = node.get("provides");
        Self {
            components: string_list(
                requires.and_then(|r| r.get("components")),
                owner,
                "requires.components",
            ),
            features: string_list(
                requires.and_then(|r| r.get("features")),
                owner,
                "requires.features",
            ),
            provided_features: string_list(
                provides.and_then(|p| p.get("features")),
                owner,
                "provides.features",
            ),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty() && self.features.is_empty() && self.provided_features.is_empty()
    }
}

/// A parsed component description.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentDocument {
    /// Normalized component id
    pub id: String,
    /// The description file
    pub path: PathBuf,
    /// Directory containing the description file
    pub directory: PathBuf,
    /// The document itself, including merged support fragments
    pub node: Value,
}

impl ComponentDocument {
    /// Read and parse a component description file.
    pub fn load(path: &Path) -> Result<Self, YakkaError> {
        let content = std::fs::read_to_string(path).map_err(|e| YakkaError::InvalidComponent {
            id: file_stem_id(path),
            path: path.display().to_string(),
            reason: format!("cannot read file: {e}"),
        })?;
        Self::parse(&content, path)
    }

    /// Parse YAML content read from `path`.
    pub fn parse(content: &str, path: &Path) -> Result<Self, YakkaError> {
        let node: Value = serde_yaml::from_str(content).map_err(|e| YakkaError::InvalidComponent {
            id: file_stem_id(path),
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_value(node, path)
    }

    /// Validate an already-deserialized document and inject provenance fields.
    pub fn from_value(node: Value, path: &Path) -> Result<Self, YakkaError> {
        let mut node = match node {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };

        let invalid = |reason: String| YakkaError::InvalidComponent {
            id: file_stem_id(path),
            path: path.display().to_string(),
            reason,
        };
        validate_document(&node).map_err(invalid)?;

        let raw_id = node
            .get("id")
            .and_then(Value::as_str)
            .map_or_else(|| file_stem_id(path), ToString::to_string);
        let id = normalize_id(&raw_id).to_string();
        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();

        if let Value::Object(map) = &mut node {
            map.insert("id".to_string(), Value::String(id.clone()));
            map.insert(
                "directory".to_string(),
                Value::String(directory.to_string_lossy().into_owned()),
            );
            map.insert("yakka_file".to_string(), Value::String(path.to_string_lossy().into_owned()));
        }

        Ok(Self {
            id,
            path: path.to_path_buf(),
            directory,
            node,
        })
    }

    pub fn requirements(&self) -> Requirements {
        Requirements::of(&self.node, &self.id)
    }

    /// Choices declared directly by this document.
    pub fn choices(&self) -> Vec<(String, Choice)> {
        choices_in(&self.node, &self.id)
    }

    /// Ids this component replaces (`replaces.component`).
    pub fn replaces(&self) -> Vec<String> {
        let replaces = self.node.get("replaces").and_then(|r| r.get("component"));
        string_list(replaces, &self.id, "replaces.component")
            .iter()
            .map(|id| normalize_id(id).to_string())
            .collect()
    }

    /// Fragment merged in when `feature` is required.
    pub fn feature_support(&self, feature: &str) -> Option<&Value> {
        self.node.get("supports")?.get("features")?.get(feature)
    }

    /// Fragment merged in when component `id` is required.
    pub fn component_support(&self, id: &str) -> Option<&Value> {
        let supported = self.node.get("supports")?.get("components")?.as_object()?;
        supported.iter().find(|(name, _)| normalize_id(name) == id).map(|(_, fragment)| fragment)
    }

    /// Names of features with a support fragment.
    pub fn supported_features(&self) -> Vec<String> {
        keys_at(&self.node, "features")
    }

    /// Normalized ids of components with a support fragment.
    pub fn supported_components(&self) -> Vec<String> {
        keys_at(&self.node, "components").iter().map(|id| normalize_id(id).to_string()).collect()
    }

    /// Merge a support fragment into this document.
    ///
    /// Provenance fields are restored afterwards so fragments cannot change them.
    pub fn merge(&mut self, fragment: &Value) -> Result<(), MergeError> {
        let result = merge_fragment(&mut self.node, fragment);
        if let Value::Object(map) = &mut self.node {
            map.insert("id".to_string(), Value::String(self.id.clone()));
            map.insert(
                "directory".to_string(),
                Value::String(self.directory.to_string_lossy().into_owned()),
            );
            map.insert(
                "yakka_file".to_string(),
                Value::String(self.path.to_string_lossy().into_owned()),
            );
        }
        result
    }
}

/// Choices declared in a document or fragment. Entries that don't parse are skipped.
pub fn choices_in(node: &Value, owner: &str) -> Vec<(String, Choice)> {
    let Some(choices) = node.get("choices").and_then(Value::as_object) else {
        return Vec::new();
    };
    choices
        .iter()
        .filter_map(|(name, value)| match serde_json::from_value::<Choice>(value.clone()) {
            Ok(choice) => Some((name.clone(), choice)),
            Err(e) => {
                warn!("Ignoring malformed choice '{name}' in '{owner}': {e}");
                None
            }
        })
        .collect()
}

/// Strip a dotted namespace prefix, keeping the trailing segment.
///
/// ```
/// use yakka_cli::component::normalize_id;
///
/// assert_eq!(normalize_id("vendor.net.lwip"), "lwip");
/// assert_eq!(normalize_id("lwip"), "lwip");
/// ```
pub fn normalize_id(id: &str) -> &str {
    id.rsplit('.').next().unwrap_or(id)
}

/// Shape checks a component document must pass before it is accepted.
pub fn validate_document(node: &Value) -> Result<(), String> {
    let Some(map) = node.as_object() else {
        return Err("document must be a mapping".to_string());
    };

    if let Some(id) = map.get("id") {
        if !id.is_string() {
            return Err("'id' must be a string".to_string());
        }
    }

    for section in ["supports", "blueprints", "tools", "choices"] {
        if let Some(value) = map.get(section) {
            if !value.is_object() && !value.is_null() {
                return Err(format!("'{section}' must be a mapping"));
            }
        }
    }

    if let Some(supports) = map.get("supports").and_then(Value::as_object) {
        for kind in ["features", "components"] {
            if let Some(value) = supports.get(kind) {
                if !value.is_object() && !value.is_null() {
                    return Err(format!("'supports.{kind}' must be a mapping"));
                }
            }
        }
    }

    if let Some(choices) = map.get("choices").and_then(Value::as_object) {
        for (name, value) in choices {
            serde_json::from_value::<Choice>(value.clone())
                .map_err(|e| format!("choice '{name}': {e}"))?;
        }
    }

    Ok(())
}

fn keys_at(node: &Value, kind: &str) -> Vec<String> {
    node.get("supports")
        .and_then(|s| s.get(kind))
        .and_then(Value::as_object)
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default()
}

fn file_stem_id(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

fn string_list(value: Option<&Value>, owner: &str, what: &str) -> Vec<String> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                other => {
                    warn!("Ignoring non-string entry {other} in {what} of '{owner}'");
                    None
                }
            })
            .collect(),
        Some(Value::Object(map)) => map.keys().cloned().collect(),
        Some(other) => {
            warn!("Ignoring malformed {what} in '{owner}': expected a list, found {other}");
            Vec::new()
        }
    }
}
