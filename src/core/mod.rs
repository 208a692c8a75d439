//! Core types and functionality for yakka
//!
//! This module holds the error taxonomy shared by every subsystem:
//! - [`YakkaError`] - enumerated error types covering all yakka failure modes
//! - [`ErrorContext`] - user-friendly wrapper with details and suggestions
//! - [`user_friendly_error`] - convert any [`anyhow::Error`] for CLI display
//!
//! # Error Handling Pattern
//!
//! ```rust,no_run
//! use yakka_cli::core::{YakkaError, user_friendly_error};
//! use anyhow::Result;
//!
//! fn example_operation() -> Result<()> {
//!     Err(YakkaError::ToolNotFound { name: "gcc".to_string() }.into())
//! }
//!
//! if let Err(e) = example_operation() {
//!     user_friendly_error(e).display();
//! }
//! ```

pub mod error;

pub use error::{ErrorContext, YakkaError, user_friendly_error};
