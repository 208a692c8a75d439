//! Cross-platform utilities and helpers
//!
//! # Modules
//!
//! - [`fs`] - atomic writes, directory copies and modification times
//! - [`platform`] - shell invocation and tool lookup
//! - [`progress`] - progress bars and spinners for long-running operations

pub mod fs;
pub mod platform;
pub mod progress;

pub use fs::{atomic_write, copy_dir, ensure_dir, modified_time};
pub use platform::{find_tool, shell_command};
pub use progress::{MultiProgress, ProgressBar};
