//! yakka - a component-oriented build orchestrator
//!
//! A yakka project is composed from reusable *components*: YAML description
//! files (`<id>.yakka`) that declare what they require, which features they
//! provide, which choices they make and which blueprints they contribute.
//! Building a project runs in two phases.
//!
//! 1. **Resolution** turns the requested components and features into a
//!    closed, consistent set. Requirements are followed transitively, feature
//!    fragments and `supports` fragments are merged in, replacements restart
//!    the walk, and every declared choice must end up with exactly one answer.
//!    Unknown components can be fetched from git registries on the way.
//! 2. **Construction** expands the requested targets through the blueprints
//!    into a dependency graph, decides which targets are stale by comparing
//!    timestamps and data-dependency diffs against the previous run, and
//!    executes the stale ones in parallel.
//!
//! The merged view of the resolved project is the *summary*
//! (`<output>/<project>/yakka_summary.json`). It is the data every blueprint is
//! rendered against and the durable record the next build diffs against.
//!
//! # Modules
//!
//! ## Resolution
//! - [`component`] - component documents, their merge semantics and the store
//! - [`resolver`] - the resolution state machine and choice validation
//! - [`registry`] - registry files mapping component names to git remotes
//! - [`fetch`] - fetching registry entries with `git`
//!
//! ## Construction
//! - [`blueprint`] - blueprint extraction and target matching
//! - [`build`] - the build graph, data-dependency diffing, staleness and execution
//! - [`templating`] - template rendering with yakka's helper functions
//!
//! ## Orchestration
//! - [`project`] - ties resolution and construction together for one workspace
//! - [`cli`] - the `yakka` command line
//! - [`config`] - `yakka.toml` workspace configuration
//!
//! ## Supporting Modules
//! - [`core`] - error types and user-facing error formatting
//! - [`constants`] - shared defaults and limits
//! - [`utils`] - filesystem, platform and progress helpers
//!
//! # Example
//!
//! A minimal component with one blueprint:
//!
//! ```yaml
//! # components/hello/hello.yakka
//! requires:
//!   components: [gcc]
//! blueprints:
//!   "{{project_output}}/hello":
//!     depends:
//!       - "{{curdir()}}/hello.c"
//!     process:
//!       - gcc: "-o {{target}} {{curdir()}}/hello.c"
//! ```
//!
//! ```bash
//! yakka build hello output/hello/hello!
//! ```

pub mod blueprint;
pub mod build;
pub mod cli;
pub mod component;
pub mod config;
pub mod constants;
pub mod core;
pub mod fetch;
pub mod project;
pub mod registry;
pub mod resolver;
pub mod templating;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
