//! The project summary: the merged view of every resolved component.
//!
//! The summary is both the template data for blueprints and the durable
//! record of a build. After a successful build it is written to
//! `<project_output>/yakka_summary.json`; the next build diffs data
//! dependencies against it and reuses its parsed component documents for
//! files that have not changed since.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

use crate::component::ComponentDocument;
use crate::config::WorkspaceConfig;
use crate::constants::SUMMARY_FILE_NAME;
use crate::resolver::{DocumentCache, ResolutionState};
use crate::utils::atomic_write;

/// Serialized project state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub project_name: String,
    pub project_output: String,
    /// Resolved component documents with support fragments merged, by id
    pub components: Map<String, Value>,
    pub features: Vec<String>,
    /// Declared choices by name
    #[serde(default)]
    pub choices: BTreeMap<String, Value>,
    /// Tool name → path template, collected from every component
    #[serde(default)]
    pub tools: Map<String, Value>,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub configuration: Map<String, Value>,
    /// Component file → document as parsed, before any merge
    #[serde(default)]
    pub parsed_components: BTreeMap<String, Value>,
    pub generated_at: DateTime<Utc>,
}

impl ProjectSummary {
    /// Assemble a summary from a finished resolution.
    pub fn build<'a>(
        project_name: &str,
        project_output: &Path,
        state: &ResolutionState,
        pristine: impl IntoIterator<Item = &'a ComponentDocument>,
        config: &WorkspaceConfig,
    ) -> Self {
        let mut components = Map::new();
        let mut tools = Map::new();
        for document in &state.components {
            components.insert(document.id.clone(), document.node.clone());
            let Some(declared) = document.node.get("tools").and_then(Value::as_object) else {
                continue;
            };
            for (name, path) in declared {
                if let Some(existing) = tools.get(name) {
                    if existing != path {
                        warn!(
                            "Tool '{name}' from '{}' ignored, already declared as {existing}",
                            document.id
                        );
                    }
                    continue;
                }
                tools.insert(name.clone(), path.clone());
            }
        }

        let choices = state
            .choices
            .iter()
            .filter_map(|(name, choice)| {
                serde_json::to_value(choice).ok().map(|value| (name.clone(), value))
            })
            .collect();

        let parsed_components = pristine
            .into_iter()
            .map(|document| (document.path.display().to_string(), document.node.clone()))
            .collect();

        Self {
            project_name: project_name.to_string(),
            project_output: project_output.display().to_string(),
            components,
            features: state.required_features.iter().cloned().collect(),
            choices,
            tools,
            data: config.data.clone(),
            configuration: config.configuration.clone(),
            parsed_components,
            generated_at: Utc::now(),
        }
    }

    /// Where the summary of `project_output` is stored.
    pub fn path_in(project_output: &Path) -> PathBuf {
        project_output.join(SUMMARY_FILE_NAME)
    }

    /// Load a saved summary together with the time it was written.
    ///
    /// A missing file is `Ok(None)`. An unreadable one is logged and treated as
    /// missing so a corrupt summary only costs a full rebuild.
    pub fn load(path: &Path) -> Result<Option<(Self, SystemTime)>> {
        if !path.exists() {
            return Ok(None);
        }
        let written_at = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        match serde_json::from_str(&content) {
            Ok(summary) => Ok(Some((summary, written_at))),
            Err(e) => {
                warn!("Ignoring unreadable summary {}: {e}", path.display());
                Ok(None)
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        atomic_write(path, content.as_bytes())
            .with_context(|| format!("Failed to write summary {}", path.display()))?;
        debug!("Saved summary to {}", path.display());
        Ok(())
    }

    /// Parsed documents to reuse for files unchanged since `written_at`.
    pub fn document_cache(&self, written_at: SystemTime) -> DocumentCache {
        let mut cache = DocumentCache::new(written_at);
        for (path, node) in &self.parsed_components {
            cache.insert(PathBuf::from(path), node.clone());
        }
        cache
    }

    /// The summary as template and diff data, without the parse cache.
    pub fn to_value(&self) -> Result<Value> {
        let mut value = serde_json::to_value(self)?;
        if let Some(map) = value.as_object_mut() {
            map.remove("parsed_components");
        }
        Ok(value)
    }
}
