//! Test utilities for yakka
//!
//! Helpers shared by unit tests and the `integration` test target (through the
//! `test-utils` feature):
//! - [`init_test_logging`] - one-time tracing setup honoring `RUST_LOG`
//! - [`TestWorkspace`] - a temporary workspace with component files
//!
//! # Example
//!
//! ```rust,no_run
//! use yakka_cli::test_utils::TestWorkspace;
//!
//! let ws = TestWorkspace::new();
//! ws.write_component("app", "requires:\n  components: [lib]\n");
//! ws.write_component("lib", "provides:\n  features: [io]\n");
//! let store = ws.store();
//! ```

pub mod environment;

pub use environment::TestWorkspace;

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. With `None` logging is enabled only when
/// `RUST_LOG` is set.
///
/// ```bash
/// RUST_LOG=yakka_cli=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}
