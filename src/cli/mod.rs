//! Command-line interface for yakka.
//!
//! The binary is a thin composition root: it parses arguments with `clap`,
//! sets up logging, opens the [`Project`](crate::project::Project) for the
//! working directory and hands off to one of the subcommands.
//!
//! # Commands
//!
//! - `build`: resolve components and features, then build the requested targets
//! - `list`: show the components the workspace knows about
//! - `fetch`: fetch components from the registries
//!
//! # Global Options
//!
//! - `-v, --verbose` - debug output
//! - `-q, --quiet` - errors only
//! - `--no-progress` - hide progress bars
//! - `-C, --directory <DIR>` - run as if started in `DIR`
//!
//! # Examples
//!
//! ```bash
//! yakka build board_nrf52 freertos +debug firmware.elf!
//! yakka -v build lwip --no-fetch -j 4 lib!
//! yakka list
//! yakka fetch lwip freertos
//! ```

mod build;
mod fetch;
mod list;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

pub use build::{BuildCommand, BuildItems, parse_items};
pub use fetch::FetchCommand;
pub use list::ListCommand;

/// Settings derived from the global flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    /// `None` silences everything but errors.
    pub log_level: Option<String>,
    pub no_progress: bool,
    pub directory: Option<PathBuf>,
}

impl CliConfig {
    /// Install the tracing subscriber. `RUST_LOG` wins over the flags.
    pub fn init_logging(&self) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(self.log_level.as_deref().unwrap_or("error"))
        });
        // A subscriber may already exist when running inside tests.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    }

    pub const fn show_progress(&self) -> bool {
        !self.no_progress
    }
}

/// Component-oriented build orchestrator.
#[derive(Parser, Debug)]
#[command(
    name = "yakka",
    about = "Resolve components and build their blueprints",
    version,
    long_about = "yakka composes a project from reusable component descriptions, \
                  resolves their requirements, features and choices, and runs the \
                  blueprints they provide to build the requested targets."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Show debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only show errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable progress bars
    #[arg(long, global = true)]
    no_progress: bool,

    /// Run as if yakka was started in this directory
    #[arg(short = 'C', long, global = true, value_name = "DIR")]
    directory: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve components and build targets
    Build(BuildCommand),

    /// List known components
    List(ListCommand),

    /// Fetch components from the registries
    Fetch(FetchCommand),
}

impl Cli {
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            None
        } else {
            Some("info".to_string())
        };

        CliConfig {
            log_level,
            no_progress: self.no_progress,
            directory: self.directory.clone(),
        }
    }

    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    /// Run the selected command with an explicit configuration.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        config.init_logging();

        let workspace = match &config.directory {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("Cannot determine the current directory")?,
        };
        let workspace = workspace
            .canonicalize()
            .with_context(|| format!("Workspace {} does not exist", workspace.display()))?;

        match self.command {
            Commands::Build(cmd) => cmd.execute(&workspace, &config).await,
            Commands::List(cmd) => cmd.execute(&workspace).await,
            Commands::Fetch(cmd) => cmd.execute(&workspace, &config).await,
        }
    }
}
