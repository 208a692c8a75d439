//! Integration test suite for yakka
//!
//! End-to-end tests that drive a [`Project`](yakka_cli::project::Project) or
//! the `yakka` binary against temporary workspaces.
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **abort**: a failing target stops independent targets that have not started
//! - **build**: first builds, no-op rebuilds and timestamp/data driven rebuilds
//! - **cli**: smoke tests of the `yakka` binary

mod abort;
mod build;
mod cli;
