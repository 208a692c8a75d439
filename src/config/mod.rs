//! Configuration management for yakka
//!
//! yakka reads two optional TOML files and layers them:
//!
//! 1. **User configuration** (`~/.yakka/config.toml`) - defaults shared by every workspace
//! 2. **Workspace configuration** (`yakka.toml` in the workspace root) - overrides per workspace
//!
//! Command-line flags override both. Missing files mean defaults.
//!
//! ```toml
//! output_dir = "output"
//! max_jobs = 8
//! search_paths = ["components", ".yakka/repos"]
//! registry_dir = ".yakka/registries"
//! repos_dir = ".yakka/repos"
//!
//! [configuration]
//! optimisation = "-Os"
//!
//! [data]
//! board = "nrf52840"
//! ```
//!
//! Relative paths are resolved against the workspace root after `~` and
//! environment variable expansion.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::constants::{
    DEFAULT_COMPONENTS_DIR, DEFAULT_OUTPUT_DIR, DEFAULT_REGISTRY_DIR, DEFAULT_REPOS_DIR,
    WORKSPACE_CONFIG_FILE, default_parallelism,
};
use crate::core::YakkaError;

/// On-disk shape of a configuration file. Every field is optional so layers
/// can be merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_jobs: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_paths: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_dir: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repos_dir: Option<String>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub configuration: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

impl ConfigFile {
    /// Load a configuration file, returning defaults when it doesn't exist.
    pub async fn load_optional(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .map_err(YakkaError::from)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Overlay `other` on top of `self`. Scalars in `other` win; tables merge by key.
    pub fn overlay(mut self, other: Self) -> Self {
        self.output_dir = other.output_dir.or(self.output_dir);
        self.max_jobs = other.max_jobs.or(self.max_jobs);
        self.search_paths = other.search_paths.or(self.search_paths);
        self.registry_dir = other.registry_dir.or(self.registry_dir);
        self.repos_dir = other.repos_dir.or(self.repos_dir);
        self.configuration.extend(other.configuration);
        self.data.extend(other.data);
        self
    }
}

/// Fully resolved workspace configuration with absolute paths.
#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    /// Workspace root; relative paths are resolved against it.
    pub workspace: PathBuf,
    /// Directory holding `<project_name>/` output directories.
    pub output_dir: PathBuf,
    /// Maximum number of concurrently executing build tasks.
    pub max_jobs: usize,
    /// Directories scanned for component description files.
    pub search_paths: Vec<PathBuf>,
    /// Directory holding registry files.
    pub registry_dir: PathBuf,
    /// Directory where fetched components are cloned.
    pub repos_dir: PathBuf,
    /// Free-form values copied into the summary's `configuration` section.
    pub configuration: Map<String, Value>,
    /// Free-form values copied into the summary's `data` section.
    pub data: Map<String, Value>,
}

impl WorkspaceConfig {
    /// Load and layer the user and workspace configuration files.
    ///
    /// # Errors
    ///
    /// Returns an error if a file exists but can't be read or parsed, or if a
    /// path contains an undefined environment variable.
    pub async fn load(workspace: &Path) -> Result<Self> {
        let user = match Self::user_config_path() {
            Some(path) => ConfigFile::load_optional(&path).await?,
            None => ConfigFile::default(),
        };
        let local = ConfigFile::load_optional(&workspace.join(WORKSPACE_CONFIG_FILE)).await?;
        Self::from_file(workspace, user.overlay(local))
    }

    /// Default configuration for a workspace, ignoring configuration files.
    pub fn defaults(workspace: &Path) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            output_dir: workspace.join(DEFAULT_OUTPUT_DIR),
            max_jobs: default_parallelism(),
            search_paths: vec![workspace.join(DEFAULT_COMPONENTS_DIR), workspace.join(DEFAULT_REPOS_DIR)],
            registry_dir: workspace.join(DEFAULT_REGISTRY_DIR),
            repos_dir: workspace.join(DEFAULT_REPOS_DIR),
            configuration: Map::new(),
            data: Map::new(),
        }
    }

    /// Resolve a parsed configuration file against a workspace root.
    pub fn from_file(workspace: &Path, file: ConfigFile) -> Result<Self> {
        let defaults = Self::defaults(workspace);
        let resolve = |value: Option<String>, fallback: PathBuf| -> Result<PathBuf> {
            match value {
                Some(raw) => expand_path(workspace, &raw),
                None => Ok(fallback),
            }
        };

        let repos_dir = resolve(file.repos_dir, defaults.repos_dir)?;
        let search_paths = match file.search_paths {
            Some(paths) => {
                paths.iter().map(|p| expand_path(workspace, p)).collect::<Result<Vec<_>>>()?
            }
            None => vec![workspace.join(DEFAULT_COMPONENTS_DIR), repos_dir.clone()],
        };
        let max_jobs = match file.max_jobs {
            Some(0) => {
                return Err(YakkaError::ConfigError {
                    message: "max_jobs must be at least 1".to_string(),
                }
                .into());
            }
            Some(n) => n,
            None => defaults.max_jobs,
        };

        Ok(Self {
            workspace: workspace.to_path_buf(),
            output_dir: resolve(file.output_dir, defaults.output_dir)?,
            max_jobs,
            search_paths,
            registry_dir: resolve(file.registry_dir, defaults.registry_dir)?,
            repos_dir,
            configuration: file.configuration,
            data: file.data,
        })
    }

    /// Location of the user configuration file (`~/.yakka/config.toml`).
    ///
    /// `YAKKA_CONFIG` overrides the location.
    pub fn user_config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("YAKKA_CONFIG") {
            return Some(PathBuf::from(path));
        }
        dirs::home_dir().map(|home| home.join(".yakka").join("config.toml"))
    }
}

/// Expand `~` and environment variables, then anchor relative paths at the workspace.
fn expand_path(workspace: &Path, raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw).map_err(|e| YakkaError::ConfigError {
        message: format!("Failed to expand path '{raw}': {e}"),
    })?;
    let path = PathBuf::from(expanded.as_ref());
    Ok(if path.is_absolute() {
        path
    } else {
        workspace.join(path)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let file = ConfigFile::load_optional(&temp.path().join("yakka.toml")).await.unwrap();
        let config = WorkspaceConfig::from_file(temp.path(), file).unwrap();
        assert_eq!(config.output_dir, temp.path().join("output"));
        assert_eq!(config.registry_dir, temp.path().join(".yakka/registries"));
        assert!(config.max_jobs >= 1);
        assert_eq!(config.search_paths.len(), 2);
    }

    #[tokio::test]
    async fn test_workspace_file_is_parsed() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("yakka.toml"),
            r#"
output_dir = "build"
max_jobs = 3
search_paths = ["lib"]

[data]
board = "nrf52"
"#,
        )
        .unwrap();
        let file = ConfigFile::load_optional(&temp.path().join("yakka.toml")).await.unwrap();
        let config = WorkspaceConfig::from_file(temp.path(), file).unwrap();
        assert_eq!(config.output_dir, temp.path().join("build"));
        assert_eq!(config.max_jobs, 3);
        assert_eq!(config.search_paths, vec![temp.path().join("lib")]);
        assert_eq!(config.data["board"], Value::String("nrf52".to_string()));
    }

    #[test]
    fn test_overlay_prefers_later_layer() {
        let user = ConfigFile {
            max_jobs: Some(2),
            output_dir: Some("out".to_string()),
            ..Default::default()
        };
        let local = ConfigFile {
            max_jobs: Some(6),
            ..Default::default()
        };
        let merged = user.overlay(local);
        assert_eq!(merged.max_jobs, Some(6));
        assert_eq!(merged.output_dir.as_deref(), Some("out"));
    }

    #[test]
    fn test_zero_jobs_rejected() {
        let temp = TempDir::new().unwrap();
        let file = ConfigFile {
            max_jobs: Some(0),
            ..Default::default()
        };
        assert!(WorkspaceConfig::from_file(temp.path(), file).is_err());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let result: Result<ConfigFile, _> = toml::from_str("outptu_dir = \"x\"");
        assert!(result.is_err());
    }
}
