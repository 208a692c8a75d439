//! Temporary workspaces for tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

use crate::component::FsComponentStore;
use crate::config::WorkspaceConfig;
use crate::constants::DEFAULT_COMPONENTS_DIR;

/// A workspace in a temporary directory, removed on drop.
///
/// Components are written to `components/<id>/<id>.yakka`.
pub struct TestWorkspace {
    pub temp_dir: TempDir,
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorkspace {
    /// Create an empty workspace.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory can't be created.
    pub fn new() -> Self {
        super::init_test_logging(None);
        let temp_dir = TempDir::new().expect("create temp workspace");
        fs::create_dir_all(temp_dir.path().join(DEFAULT_COMPONENTS_DIR))
            .expect("create components dir");
        Self {
            temp_dir,
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn components_dir(&self) -> PathBuf {
        self.path().join(DEFAULT_COMPONENTS_DIR)
    }

    /// Write a component description, replacing any previous one with the same id.
    pub fn write_component(&self, id: &str, yaml: &str) -> PathBuf {
        let path = self.components_dir().join(id).join(format!("{id}.yakka"));
        self.write(&path, yaml)
    }

    /// Write a file relative to the workspace root.
    pub fn write_file(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.path().join(relative);
        self.write(&path, content)
    }

    pub fn read_file(&self, relative: &str) -> String {
        fs::read_to_string(self.path().join(relative)).unwrap_or_default()
    }

    /// Move a file's modification time `seconds` into the future.
    pub fn touch_future(&self, relative: &str, seconds: u64) {
        let file = fs::File::options()
            .write(true)
            .open(self.path().join(relative))
            .expect("open file to touch");
        file.set_modified(SystemTime::now() + Duration::from_secs(seconds))
            .expect("set modification time");
    }

    /// A store scanning the workspace's components directory.
    pub fn store(&self) -> FsComponentStore {
        FsComponentStore::from_search_paths(&[self.components_dir()]).expect("scan components")
    }

    /// Default configuration rooted at this workspace with a small job count.
    pub fn config(&self) -> WorkspaceConfig {
        let mut config = WorkspaceConfig::defaults(self.path());
        config.max_jobs = 4;
        config
    }

    fn write(&self, path: &Path, content: &str) -> PathBuf {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent directory");
        }
        fs::write(path, content).expect("write test file");
        path.to_path_buf()
    }
}
