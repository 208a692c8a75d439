//! Error handling for yakka
//!
//! This module provides the crate-wide error type [`YakkaError`] and the
//! user-facing [`ErrorContext`] wrapper used by the CLI. Domain code returns
//! [`YakkaError`] variants (usually through [`anyhow::Error`]) and the CLI turns
//! them into colored messages with details and suggestions via
//! [`user_friendly_error`].
//!
//! # Error Categories
//!
//! - **Resolution errors**: [`UnknownComponents`], [`InvalidComponent`],
//!   [`MultipleReplacements`], [`IncompleteChoices`], [`AmbiguousChoices`]
//! - **Expansion errors**: template failures, reported per blueprint
//! - **Execution errors**: [`CommandFailed`], [`ToolNotFound`], [`BuildFailed`]
//! - **Data errors**: [`MalformedDataPath`]
//!
//! [`UnknownComponents`]: YakkaError::UnknownComponents
//! [`InvalidComponent`]: YakkaError::InvalidComponent
//! [`MultipleReplacements`]: YakkaError::MultipleReplacements
//! [`IncompleteChoices`]: YakkaError::IncompleteChoices
//! [`AmbiguousChoices`]: YakkaError::AmbiguousChoices
//! [`CommandFailed`]: YakkaError::CommandFailed
//! [`ToolNotFound`]: YakkaError::ToolNotFound
//! [`BuildFailed`]: YakkaError::BuildFailed
//! [`MalformedDataPath`]: YakkaError::MalformedDataPath

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for yakka operations.
///
/// # Examples
///
/// ```rust,no_run
/// use yakka_cli::core::YakkaError;
///
/// let error = YakkaError::UnknownComponents {
///     names: vec!["lwip".to_string()],
/// };
/// assert!(error.to_string().contains("lwip"));
/// ```
#[derive(Error, Debug)]
pub enum YakkaError {
    /// One or more requested components are not in the component store
    #[error("Unknown components: {}", names.join(", "))]
    UnknownComponents {
        /// Ids of the components that could not be found
        names: Vec<String>,
    },

    /// A component description file could not be parsed or validated
    #[error("Invalid component '{id}' in {path}: {reason}")]
    InvalidComponent {
        /// Component id
        id: String,
        /// Path of the offending description file
        path: String,
        /// Why the document was rejected
        reason: String,
    },

    /// Two different components both declare that they replace the same id
    #[error("Component '{target}' is replaced by both '{first}' and '{second}'")]
    MultipleReplacements {
        /// The replaced component
        target: String,
        /// The replacement recorded first
        first: String,
        /// The conflicting replacement
        second: String,
    },

    /// Choices with none of their options selected
    #[error("Incomplete choices: {}", choices.join(", "))]
    IncompleteChoices {
        /// `owner:choice` pairs that were not satisfied
        choices: Vec<String>,
    },

    /// Choices with more than one of their options selected
    #[error("Choices with multiple answers: {}", choices.join(", "))]
    AmbiguousChoices {
        /// Names of the over-satisfied choices
        choices: Vec<String>,
    },

    /// A data dependency path does not have the `:/<component>/<pointer>` shape
    #[error("Malformed data dependency '{path}': {reason}")]
    MalformedDataPath {
        /// The offending dependency name
        path: String,
        /// What is wrong with it
        reason: String,
    },

    /// The target graph contains a cycle
    #[error("Circular dependency detected: {chain}")]
    CircularDependency {
        /// Human-readable cycle, e.g. `a -> b -> a`
        chain: String,
    },

    /// A step of a blueprint's command pipeline failed
    #[error("Command '{command}' failed for target '{target}': {reason}")]
    CommandFailed {
        /// Target being built
        target: String,
        /// Name of the failing step
        command: String,
        /// Failure details (exit status, stderr)
        reason: String,
    },

    /// A process step names a tool that is neither a built-in nor a known tool
    #[error("Tool '{name}' not found")]
    ToolNotFound {
        /// The tool name
        name: String,
    },

    /// One or more build tasks failed
    #[error("Build failed: {} target(s) failed", failed.len())]
    BuildFailed {
        /// Targets whose pipelines failed
        failed: Vec<String>,
    },

    /// Fetching a component from its registry failed
    #[error("Failed to fetch component '{name}': {reason}")]
    FetchFailed {
        /// Component name
        name: String,
        /// Failure details
        reason: String,
    },

    /// A component is unknown locally and no registry provides it
    #[error("No registry provides component '{name}'")]
    RegistryEntryNotFound {
        /// Component name
        name: String,
    },

    /// Configuration problem
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the problem
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Other error
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

impl Clone for YakkaError {
    fn clone(&self) -> Self {
        match self {
            Self::UnknownComponents {
                names,
            } => Self::UnknownComponents {
                names: names.clone(),
            },
            Self::InvalidComponent {
                id,
                path,
                reason,
            } => Self::InvalidComponent {
                id: id.clone(),
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::MultipleReplacements {
                target,
                first,
                second,
            } => Self::MultipleReplacements {
                target: target.clone(),
                first: first.clone(),
                second: second.clone(),
            },
            Self::IncompleteChoices {
                choices,
            } => Self::IncompleteChoices {
                choices: choices.clone(),
            },
            Self::AmbiguousChoices {
                choices,
            } => Self::AmbiguousChoices {
                choices: choices.clone(),
            },
            Self::MalformedDataPath {
                path,
                reason,
            } => Self::MalformedDataPath {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::CircularDependency {
                chain,
            } => Self::CircularDependency {
                chain: chain.clone(),
            },
            Self::CommandFailed {
                target,
                command,
                reason,
            } => Self::CommandFailed {
                target: target.clone(),
                command: command.clone(),
                reason: reason.clone(),
            },
            Self::ToolNotFound {
                name,
            } => Self::ToolNotFound {
                name: name.clone(),
            },
            Self::BuildFailed {
                failed,
            } => Self::BuildFailed {
                failed: failed.clone(),
            },
            Self::FetchFailed {
                name,
                reason,
            } => Self::FetchFailed {
                name: name.clone(),
                reason: reason.clone(),
            },
            Self::RegistryEntryNotFound {
                name,
            } => Self::RegistryEntryNotFound {
                name: name.clone(),
            },
            Self::ConfigError {
                message,
            } => Self::ConfigError {
                message: message.clone(),
            },
            // For errors that don't implement Clone, convert to Other
            Self::IoError(e) => Self::Other {
                message: format!("IO error: {e}"),
            },
            Self::YamlError(e) => Self::Other {
                message: format!("YAML parsing error: {e}"),
            },
            Self::JsonError(e) => Self::Other {
                message: format!("JSON error: {e}"),
            },
            Self::TomlError(e) => Self::Other {
                message: format!("TOML parsing error: {e}"),
            },
            Self::Other {
                message,
            } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

/// Error context wrapper that provides user-friendly error information
///
/// `ErrorContext` wraps a [`YakkaError`] and adds optional details and a
/// suggestion for resolution. This is how the CLI presents errors.
///
/// # Examples
///
/// ```rust,no_run
/// use yakka_cli::core::{ErrorContext, YakkaError};
///
/// let context = ErrorContext::new(YakkaError::ToolNotFound {
///     name: "arm-none-eabi-gcc".to_string(),
/// })
/// .with_suggestion("Add the tool to a component's `tools` section")
/// .with_details("Process steps resolve tool paths from the project summary");
///
/// context.display();
/// ```
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying yakka error
    pub error: YakkaError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context without details or suggestion.
    #[must_use]
    pub const fn new(error: YakkaError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors
    ///
    /// - Error message: red and bold
    /// - Details: yellow
    /// - Suggestion: green
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error to a user-friendly [`ErrorContext`] with actionable suggestions
///
/// Recognizes [`YakkaError`] (anywhere in the chain), [`ErrorContext`] that was
/// already attached by lower layers, and [`std::io::Error`]. Anything else is
/// wrapped as [`YakkaError::Other`] with the full cause chain as details.
///
/// # Examples
///
/// ```rust,no_run
/// use yakka_cli::core::{YakkaError, user_friendly_error};
///
/// let error = anyhow::Error::from(YakkaError::BuildFailed {
///     failed: vec!["output/app.elf".to_string()],
/// });
/// user_friendly_error(error).display();
/// ```
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(context) = error.downcast_ref::<ErrorContext>() {
        return ErrorContext {
            error: context.error.clone(),
            suggestion: context.suggestion.clone(),
            details: context.details.clone(),
        };
    }

    for cause in error.chain() {
        if let Some(yakka_error) = cause.downcast_ref::<YakkaError>() {
            return create_error_context(yakka_error.clone());
        }
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        let suggestion = match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                "Check file ownership and permissions in the workspace and output directory"
            }
            std::io::ErrorKind::NotFound => {
                "Check that the file or directory exists and the path is correct"
            }
            _ => "Check the workspace for filesystem problems and try again",
        };
        return ErrorContext::new(YakkaError::Other {
            message: format!("IO error: {io_error}"),
        })
        .with_suggestion(suggestion);
    }

    let mut context = ErrorContext::new(YakkaError::Other {
        message: error.to_string(),
    });
    let causes: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    if !causes.is_empty() {
        context = context.with_details(causes.join("\n  caused by: "));
    }
    context
}

fn create_error_context(error: YakkaError) -> ErrorContext {
    match &error {
        YakkaError::UnknownComponents {
            ..
        } => ErrorContext::new(error)
            .with_suggestion(
                "Check the component names, add a registry that provides them, \
                 or run without --no-fetch",
            )
            .with_details("Components are found by scanning the configured search paths"),
        YakkaError::InvalidComponent {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Fix the YAML syntax or section shapes in the component file"),
        YakkaError::MultipleReplacements {
            ..
        } => ErrorContext::new(error).with_suggestion(
            "Only one component in a project may replace a given component; \
             remove one of the components from the request",
        ),
        YakkaError::IncompleteChoices {
            ..
        } => ErrorContext::new(error).with_suggestion(
            "Request one of the choice's features (+feature) or components explicitly",
        ),
        YakkaError::AmbiguousChoices {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Remove all but one of the options selected for each listed choice"),
        YakkaError::MalformedDataPath {
            ..
        } => ErrorContext::new(error)
            .with_details("Data dependencies have the form ':/<component>/<json-pointer>'")
            .with_suggestion("Use '*' as the component to watch every component"),
        YakkaError::CircularDependency {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Break the cycle by removing one of the blueprint dependencies"),
        YakkaError::ToolNotFound {
            ..
        } => ErrorContext::new(error).with_suggestion(
            "Declare the tool in a component's `tools` section or install it on PATH",
        ),
        YakkaError::BuildFailed {
            failed,
        } => {
            let details = format!("Failed targets:\n  {}", failed.join("\n  "));
            ErrorContext::new(error)
                .with_details(details)
                .with_suggestion("Re-run with --verbose to see each command's output")
        }
        YakkaError::FetchFailed {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check network connectivity and the registry URL"),
        YakkaError::RegistryEntryNotFound {
            ..
        } => ErrorContext::new(error).with_suggestion(
            "Add a registry file providing the component to the registry directory",
        ),
        YakkaError::ConfigError {
            ..
        }
        | YakkaError::TomlError(_) => {
            ErrorContext::new(error).with_suggestion("Check the syntax of yakka.toml")
        }
        _ => ErrorContext::new(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = YakkaError::UnknownComponents {
            names: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(error.to_string(), "Unknown components: a, b");

        let error = YakkaError::MultipleReplacements {
            target: "b".to_string(),
            first: "c".to_string(),
            second: "d".to_string(),
        };
        assert_eq!(error.to_string(), "Component 'b' is replaced by both 'c' and 'd'");
    }

    #[test]
    fn test_clone_converts_io_error() {
        let error = YakkaError::IoError(std::io::Error::other("disk"));
        match error.clone() {
            YakkaError::Other {
                message,
            } => assert!(message.contains("disk")),
            other => panic!("unexpected clone: {other:?}"),
        }
    }

    #[test]
    fn test_user_friendly_error_finds_nested_yakka_error() {
        let error = anyhow::Error::from(YakkaError::BuildFailed {
            failed: vec!["app.elf".to_string()],
        })
        .context("while building");
        let context = user_friendly_error(error);
        assert!(matches!(context.error, YakkaError::BuildFailed { .. }));
        assert!(context.details.unwrap().contains("app.elf"));
    }

    #[test]
    fn test_user_friendly_error_keeps_attached_context() {
        let error = anyhow::Error::new(
            ErrorContext::new(YakkaError::UnknownComponents {
                names: vec!["lwp".to_string()],
            })
            .with_suggestion("Did you mean 'lwip'?"),
        );
        let context = user_friendly_error(error);
        assert_eq!(context.suggestion.as_deref(), Some("Did you mean 'lwip'?"));
    }

    #[test]
    fn test_error_context_display() {
        let context = ErrorContext::new(YakkaError::ToolNotFound {
            name: "gcc".to_string(),
        })
        .with_details("details here")
        .with_suggestion("install it");
        let text = context.to_string();
        assert!(text.contains("Tool 'gcc' not found"));
        assert!(text.contains("Details: details here"));
        assert!(text.contains("Suggestion: install it"));
    }
}
