//! Component registries.
//!
//! A registry is a YAML file mapping component names to the git remotes they
//! can be fetched from:
//!
//! ```yaml
//! provides:
//!   components:
//!     lwip:
//!       url: https://git.savannah.gnu.org/git/lwip.git
//!       branch: STABLE-2_1_x
//!     freertos:
//!       url: https://github.com/FreeRTOS/FreeRTOS-Kernel.git
//! ```
//!
//! Every `*.yaml`/`*.yml` file under the registry directory is read, in file
//! name order. When two registries provide the same name the first one wins.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::core::YakkaError;

/// Where to fetch one component from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryEntry {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    provides: RegistryProvides,
}

#[derive(Debug, Default, Deserialize)]
struct RegistryProvides {
    #[serde(default)]
    components: BTreeMap<String, RegistryEntry>,
}

/// All registry entries known to a workspace.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: BTreeMap<String, (RegistryEntry, PathBuf)>,
}

impl Registry {
    /// Read every registry file under `dir`. A missing directory is an empty registry.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut registry = Self::default();
        if !dir.is_dir() {
            debug!("No registry directory at {}", dir.display());
            return Ok(registry);
        }

        let files = WalkDir::new(dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                matches!(
                    entry.path().extension().and_then(|e| e.to_str()),
                    Some("yaml" | "yml")
                )
            });

        for file in files {
            let content = std::fs::read_to_string(file.path())
                .with_context(|| format!("Failed to read registry {}", file.path().display()))?;
            registry.add_file(&content, file.path())?;
        }

        debug!("Registry: {} components", registry.entries.len());
        Ok(registry)
    }

    /// Add the entries of one registry file.
    pub fn add_file(&mut self, content: &str, source: &Path) -> Result<usize> {
        let file: RegistryFile = serde_yaml::from_str(content)
            .map_err(YakkaError::from)
            .with_context(|| format!("Invalid registry {}", source.display()))?;

        let mut added = 0;
        for (name, entry) in file.provides.components {
            if let Some((_, first)) = self.entries.get(&name) {
                warn!(
                    "Registry {} also provides '{name}'; using {}",
                    source.display(),
                    first.display()
                );
                continue;
            }
            self.entries.insert(name, (entry, source.to_path_buf()));
            added += 1;
        }
        Ok(added)
    }

    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.get(name).map(|(entry, _)| entry)
    }

    /// Like [`Registry::get`] but failing with [`YakkaError::RegistryEntryNotFound`].
    pub fn require(&self, name: &str) -> Result<&RegistryEntry, YakkaError> {
        self.get(name).ok_or_else(|| YakkaError::RegistryEntryNotFound {
            name: name.to_string(),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
