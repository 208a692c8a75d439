//! Component store: id → description file lookup.
//!
//! The store only knows where component files live. Parsing happens in the
//! resolver so that cached documents from a previous run can be reused.

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::normalize_id;
use crate::constants::COMPONENT_FILE_EXTENSION;

/// Where a component's description file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentLocation {
    /// The `<id>.yakka` file
    pub path: PathBuf,
    /// Top-level directory of the package containing the component
    pub package_root: PathBuf,
}

/// Lookup of component ids to description files.
pub trait ComponentStore: Send + Sync {
    /// Find a component by (normalized) id.
    fn find(&self, id: &str) -> Option<ComponentLocation>;

    /// Scan `root` for component files and add them to the store.
    ///
    /// Returns the number of components found under `root`.
    fn scan(&mut self, root: &Path) -> Result<usize>;

    /// All known component ids, sorted.
    fn ids(&self) -> Vec<String>;
}

/// Filesystem-backed store populated by walking search paths.
///
/// When the same id appears under several roots the first root scanned wins.
#[derive(Debug, Default)]
pub struct FsComponentStore {
    roots: Vec<PathBuf>,
    components: BTreeMap<String, ComponentLocation>,
}

impl FsComponentStore {
    /// Create a store and scan every existing search path.
    pub fn from_search_paths(paths: &[PathBuf]) -> Result<Self> {
        let mut store = Self::default();
        for path in paths {
            store.scan(path)?;
        }
        Ok(store)
    }

    /// Forget everything and scan all known roots again, in order.
    ///
    /// Called after a fetch adds new files under one of the roots.
    pub fn rescan(&mut self) -> Result<usize> {
        self.components.clear();
        let roots = self.roots.clone();
        let mut total = 0;
        for root in &roots {
            total += self.scan(root)?;
        }
        Ok(total)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl ComponentStore for FsComponentStore {
    fn find(&self, id: &str) -> Option<ComponentLocation> {
        self.components.get(normalize_id(id)).cloned()
    }

    fn scan(&mut self, root: &Path) -> Result<usize> {
        if !self.roots.iter().any(|r| r == root) {
            self.roots.push(root.to_path_buf());
        }
        if !root.is_dir() {
            debug!("Search path {} does not exist, skipping", root.display());
            return Ok(0);
        }

        let mut found = 0;
        let walker = WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {e}", root.display());
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(COMPONENT_FILE_EXTENSION)
            {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let id = normalize_id(stem).to_string();
            let location = ComponentLocation {
                path: path.to_path_buf(),
                package_root: package_root(root, path),
            };
            found += 1;
            match self.components.get(&id) {
                Some(existing) if existing.path != location.path => {
                    debug!(
                        "Component '{id}' at {} shadowed by {}",
                        location.path.display(),
                        existing.path.display()
                    );
                }
                Some(_) => {}
                None => {
                    self.components.insert(id, location);
                }
            }
        }

        debug!("Found {found} component file(s) under {}", root.display());
        Ok(found)
    }

    fn ids(&self) -> Vec<String> {
        self.components.keys().cloned().collect()
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with('.'))
}

/// First directory below `root` on the way to `path`, or `root` itself for
/// files directly inside it.
fn package_root(root: &Path, path: &Path) -> PathBuf {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut components = relative.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(first)), Some(_)) => root.join(first),
        _ => root.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "").unwrap();
    }

    #[test]
    fn test_scan_finds_nested_components() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("net/lwip/lwip.yakka"));
        touch(&temp.path().join("app.yakka"));
        touch(&temp.path().join("net/readme.md"));

        let store = FsComponentStore::from_search_paths(&[temp.path().to_path_buf()]).unwrap();
        assert_eq!(store.ids(), vec!["app", "lwip"]);

        let lwip = store.find("vendor.lwip").unwrap();
        assert_eq!(lwip.path, temp.path().join("net/lwip/lwip.yakka"));
        assert_eq!(lwip.package_root, temp.path().join("net"));
        assert_eq!(store.find("app").unwrap().package_root, temp.path());
    }

    #[test]
    fn test_hidden_directories_are_skipped() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join(".git/hooks/x.yakka"));
        let store = FsComponentStore::from_search_paths(&[temp.path().to_path_buf()]).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_first_root_wins() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        touch(&first.path().join("lib.yakka"));
        touch(&second.path().join("lib.yakka"));

        let store = FsComponentStore::from_search_paths(&[
            first.path().to_path_buf(),
            second.path().to_path_buf(),
        ])
        .unwrap();
        assert_eq!(store.find("lib").unwrap().path, first.path().join("lib.yakka"));
    }

    #[test]
    fn test_rescan_picks_up_new_files() {
        let temp = TempDir::new().unwrap();
        let mut store = FsComponentStore::from_search_paths(&[temp.path().join("missing")]).unwrap();
        assert!(store.find("late").is_none());

        touch(&temp.path().join("missing/pkg/late.yakka"));
        assert_eq!(store.rescan().unwrap(), 1);
        assert!(store.find("late").is_some());
    }
}
