//! Global constants used throughout the yakka codebase.
//!
//! This module contains file names, sentinel characters, and numeric caps
//! that are used across multiple modules. Defining them centrally makes the
//! magic values easy to find.

use std::time::Duration;

/// Prefix marking a dependency as a data dependency rather than a file.
///
/// A data dependency names a value inside the project summary, for example
/// `:/gcc/flags` or `:/*/defines`. Data dependencies are never expanded as
/// targets.
pub const DATA_DEPENDENCY_SENTINEL: char = ':';

/// Component segment of a data dependency path that matches every component.
pub const DATA_DEPENDENCY_WILDCARD: &str = "*";

/// File extension of component description files.
pub const COMPONENT_FILE_EXTENSION: &str = "yakka";

/// Name of the persisted project summary inside the project output directory.
pub const SUMMARY_FILE_NAME: &str = "yakka_summary.json";

/// Name of the optional workspace configuration file.
pub const WORKSPACE_CONFIG_FILE: &str = "yakka.toml";

/// Default directory (relative to the workspace) holding project outputs.
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Default directory (relative to the workspace) holding registry files.
pub const DEFAULT_REGISTRY_DIR: &str = ".yakka/registries";

/// Default directory (relative to the workspace) where fetched components land.
pub const DEFAULT_REPOS_DIR: &str = ".yakka/repos";

/// Default directory (relative to the workspace) scanned for local components.
pub const DEFAULT_COMPONENTS_DIR: &str = "components";

/// Upper bound on concurrently executing build tasks.
pub const MAX_PARALLELISM: usize = 32;

/// Core count used when `std::thread::available_parallelism()` fails.
pub const FALLBACK_CORE_COUNT: usize = 4;

/// Maximum nesting of the `render()` template callback.
pub const MAX_RENDER_DEPTH: usize = 10;

/// Maximum number of rounds in which choice defaults may reopen resolution.
pub const MAX_DEFAULT_CHOICE_ROUNDS: usize = 64;

/// Interval at which the build loop refreshes aggregate progress.
pub const PROGRESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Environment variable disabling progress bars.
pub const NO_PROGRESS_ENV: &str = "YAKKA_NO_PROGRESS";

/// Default parallelism: `min(MAX_PARALLELISM, available hardware concurrency)`.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(FALLBACK_CORE_COUNT)
        .min(MAX_PARALLELISM)
}
