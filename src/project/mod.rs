//! Project orchestration.
//!
//! A [`Project`] ties the subsystems together for one workspace:
//!
//! 1. resolve the requested components and features, fetching unknown
//!    components from the registries and retrying until the store has them
//! 2. assemble the [`ProjectSummary`]
//! 3. extract blueprints, expand the requested targets into a build graph and
//!    execute it
//! 4. persist the summary, only when the build succeeded

pub mod summary;

use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::blueprint::{BlueprintDatabase, TargetDatabase};
use crate::build::{BuildGraph, BuildReport, DataDiff, ExecutionOptions};
use crate::component::{ComponentStore, FsComponentStore};
use crate::config::WorkspaceConfig;
use crate::core::{ErrorContext, YakkaError};
use crate::fetch::{ComponentFetcher, GitFetcher, ProgressCallback};
use crate::registry::Registry;
use crate::resolver::{ResolutionResult, Resolver};
use crate::utils::MultiProgress;

pub use summary::ProjectSummary;

/// What to build.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    pub components: Vec<String>,
    pub features: Vec<String>,
    /// Root targets; empty means resolve and record the summary only
    pub targets: Vec<String>,
    /// Fetch unknown components from the registries
    pub fetch: bool,
    pub show_progress: bool,
    /// Overrides the configured job count
    pub max_jobs: Option<usize>,
}

/// Result of [`Project::build`].
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub project_name: String,
    pub summary_path: PathBuf,
    pub report: BuildReport,
}

/// `<components>-<features>` joined with `-`.
pub fn project_name(components: &[String], features: &[String]) -> String {
    components
        .iter()
        .chain(features.iter())
        .map(|item| item.trim_start_matches('+'))
        .filter(|item| !item.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// The most similar known name, if any is close enough to be a typo.
fn closest_name<'a>(name: &str, known: &'a [String]) -> Option<&'a str> {
    known
        .iter()
        .map(|candidate| (strsim::levenshtein(name, candidate), candidate))
        .filter(|(distance, candidate)| *distance > 0 && *distance <= (candidate.len() / 3).max(2))
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate.as_str())
}

/// A workspace with its component store, registries and fetcher.
pub struct Project {
    config: WorkspaceConfig,
    store: FsComponentStore,
    registry: Registry,
    fetcher: Arc<dyn ComponentFetcher>,
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("workspace", &self.config.workspace)
            .field("components", &self.store.len())
            .field("registry_entries", &self.registry.len())
            .finish()
    }
}

impl Project {
    /// Open the workspace at `workspace`, reading `yakka.toml` when present.
    pub async fn open(workspace: &Path) -> Result<Self> {
        let config = WorkspaceConfig::load(workspace).await?;
        Self::with_config(config)
    }

    /// Open a workspace with an explicit configuration.
    pub fn with_config(config: WorkspaceConfig) -> Result<Self> {
        let store = FsComponentStore::from_search_paths(&config.search_paths)
            .context("Failed to scan component search paths")?;
        let registry = Registry::load(&config.registry_dir)?;
        let fetcher: Arc<dyn ComponentFetcher> = Arc::new(GitFetcher::new(&config.repos_dir));
        debug!(
            "Workspace {}: {} components, {} registry entries",
            config.workspace.display(),
            store.len(),
            registry.len()
        );
        Ok(Self {
            config,
            store,
            registry,
            fetcher,
        })
    }

    /// Replace the fetcher used for unknown components.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ComponentFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub const fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub const fn store(&self) -> &FsComponentStore {
        &self.store
    }

    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Output directory of a project.
    pub fn project_output(&self, project_name: &str) -> PathBuf {
        self.config.output_dir.join(project_name)
    }

    /// Fetch `names` concurrently, rescanning the store after each one lands.
    pub async fn fetch_components(
        &mut self,
        names: &[String],
        show_progress: bool,
    ) -> Result<Vec<PathBuf>> {
        let mut requests = Vec::new();
        for name in names {
            let entry = self.registry.require(name)?.clone();
            requests.push((name.clone(), entry));
        }
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        info!("Fetching {} component(s)", requests.len());
        let multi = MultiProgress::new(show_progress);
        let mut pending = FuturesUnordered::new();
        for (name, entry) in requests {
            let fetcher = Arc::clone(&self.fetcher);
            let bar = multi.add_percent_bar(name.clone());
            let progress: ProgressCallback = Arc::new(move |phase: &str, percent: usize| {
                bar.set_position(percent as u64);
                bar.set_message(phase.to_string());
            });
            pending.push(async move {
                let result = fetcher.fetch(&name, &entry, progress).await;
                (name, result)
            });
        }

        let mut fetched = Vec::new();
        while let Some((name, result)) = pending.next().await {
            let path = result?;
            debug!("'{name}' fetched to {}", path.display());
            let found = self.store.rescan()?;
            debug!("Store now has {found} components");
            fetched.push(path);
        }
        Ok(fetched)
    }

    /// Resolve until valid, fetching unknown components when `fetch` is set.
    pub async fn resolve(
        &mut self,
        mut resolver: Resolver,
        fetch: bool,
        show_progress: bool,
    ) -> Result<Resolver> {
        let mut attempted: BTreeSet<String> = BTreeSet::new();
        loop {
            match resolver.resolve(&self.store) {
                ResolutionResult::Valid => return Ok(resolver),
                ResolutionResult::HasUnknownComponents(names) if fetch => {
                    let retried: Vec<&String> =
                        names.iter().filter(|name| attempted.contains(*name)).collect();
                    if !retried.is_empty() {
                        warn!("Fetched components still unknown: {retried:?}");
                        return Err(self.unknown_components_error(names));
                    }
                    let unfetchable: Vec<String> = names
                        .iter()
                        .filter(|name| self.registry.get(name).is_none())
                        .cloned()
                        .collect();
                    if !unfetchable.is_empty() {
                        return Err(self.unknown_components_error(unfetchable));
                    }

                    self.fetch_components(&names, show_progress).await?;
                    attempted.extend(names);
                    resolver.retry_unknown_components();
                }
                ResolutionResult::HasUnknownComponents(names) => {
                    return Err(self.unknown_components_error(names));
                }
                other => {
                    let error = other.into_error().unwrap_or_else(|| YakkaError::Other {
                        message: "resolution failed".to_string(),
                    });
                    return Err(error.into());
                }
            }
        }
    }

    /// Resolve, build the requested targets and record the summary.
    ///
    /// # Errors
    ///
    /// Resolution failures, malformed data dependencies, dependency cycles and
    /// failed targets ([`YakkaError::BuildFailed`]) are errors. The summary is
    /// not written when the build fails.
    pub async fn build(&mut self, request: &BuildRequest) -> Result<BuildOutcome> {
        let name = project_name(&request.components, &request.features);
        if name.is_empty() {
            return Err(YakkaError::ConfigError {
                message: "nothing to build: no components or features given".to_string(),
            }
            .into());
        }
        let output = self.project_output(&name);
        let summary_path = ProjectSummary::path_in(&output);
        let previous = ProjectSummary::load(&summary_path)?;

        let mut resolver = Resolver::new(&request.components, &request.features);
        if let Some((summary, written_at)) = &previous {
            resolver = resolver.with_cache(summary.document_cache(*written_at));
        }
        let resolver = self.resolve(resolver, request.fetch, request.show_progress).await?;
        info!(
            "Resolved {} components, {} features",
            resolver.state().required_components.len(),
            resolver.state().required_features.len()
        );

        let summary = ProjectSummary::build(
            &name,
            &output,
            resolver.state(),
            resolver.pristine_documents(),
            &self.config,
        );
        let current = Arc::new(summary.to_value()?);
        let previous = match previous {
            Some((summary, _)) => Some(Arc::new(summary.to_value()?)),
            None => None,
        };

        let blueprints = Arc::new(BlueprintDatabase::from_summary(&current));
        debug!("{} blueprints", blueprints.len());
        let targets = TargetDatabase::new(blueprints, Arc::clone(&current));
        let data = DataDiff::new(previous, Arc::clone(&current));
        let graph = BuildGraph::construct(&request.targets, &targets, &data)?;

        let options = ExecutionOptions {
            max_jobs: request.max_jobs.unwrap_or(self.config.max_jobs),
            show_progress: request.show_progress,
        };
        let report = graph.execute(current, options).await?.into_result()?;

        summary.save(&summary_path)?;
        Ok(BuildOutcome {
            project_name: name,
            summary_path,
            report,
        })
    }

    /// An [`YakkaError::UnknownComponents`] carrying "did you mean" hints from
    /// the store and the registries.
    fn unknown_components_error(&self, names: Vec<String>) -> anyhow::Error {
        let known: Vec<String> =
            self.store.ids().into_iter().chain(self.registry.names().map(String::from)).collect();
        let hints: Vec<String> = names
            .iter()
            .filter_map(|name| {
                closest_name(name, &known).map(|candidate| format!("'{name}' → '{candidate}'"))
            })
            .collect();

        let context = ErrorContext::new(YakkaError::UnknownComponents {
            names,
        })
        .with_details("Components are found by scanning the configured search paths");
        let context = if hints.is_empty() {
            context.with_suggestion(
                "Check the component names or add a registry that provides them",
            )
        } else {
            context.with_suggestion(format!("Did you mean: {}", hints.join(", ")))
        };
        context.into()
    }

    /// Known components and their description files.
    pub fn components(&self) -> Vec<(String, PathBuf)> {
        self.store
            .ids()
            .into_iter()
            .filter_map(|id| self.store.find(&id).map(|location| (id, location.path)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::user_friendly_error;
    use crate::registry::RegistryEntry;
    use crate::test_utils::TestWorkspace;
    use futures::future::BoxFuture;
    use std::sync::Mutex;

    /// Writes a component file instead of cloning anything.
    struct FakeFetcher {
        repos_dir: PathBuf,
        fetched: Mutex<Vec<String>>,
    }

    impl ComponentFetcher for FakeFetcher {
        fn fetch<'a>(
            &'a self,
            name: &'a str,
            _entry: &'a RegistryEntry,
            progress: ProgressCallback,
        ) -> BoxFuture<'a, Result<PathBuf, YakkaError>> {
            Box::pin(async move {
                let dir = self.repos_dir.join(name);
                std::fs::create_dir_all(&dir)?;
                let yaml = "provides:\n  features: [net]\n";
                std::fs::write(dir.join(format!("{name}.yakka")), yaml)?;
                progress("Receiving objects", 50);
                self.fetched.lock().unwrap().push(name.to_string());
                Ok::<_, YakkaError>(dir)
            })
        }
    }

    #[test]
    fn test_project_name() {
        let name = project_name(&["app".to_string(), "board".to_string()], &["+debug".to_string()]);
        assert_eq!(name, "app-board-debug");
        assert_eq!(project_name(&[], &[]), "");
    }

    #[tokio::test]
    async fn test_unknown_component_is_fetched_and_resolution_retried() {
        let workspace = TestWorkspace::new();
        workspace.write_component("app", "requires:\n  components: [lwip]\n");
        workspace.write_file(
            ".yakka/registries/main.yaml",
            "provides:\n  components:\n    lwip:\n      url: https://example.com/lwip.git\n",
        );
        let config = workspace.config();
        let fetcher = Arc::new(FakeFetcher {
            repos_dir: config.repos_dir.clone(),
            fetched: Mutex::new(Vec::new()),
        });
        let mut project = Project::with_config(config)
            .unwrap()
            .with_fetcher(Arc::clone(&fetcher) as Arc<dyn ComponentFetcher>);

        let resolver = project
            .resolve(Resolver::new(&["app".to_string()], &[]), true, false)
            .await
            .unwrap();
        let state = resolver.state();
        assert!(state.required_components.contains("lwip"));
        assert!(state.required_features.contains("net"));
        assert_eq!(*fetcher.fetched.lock().unwrap(), vec!["lwip"]);
    }

    #[tokio::test]
    async fn test_unknown_component_without_registry_entry() {
        let workspace = TestWorkspace::new();
        workspace.write_component("app", "requires:\n  components: [nowhere]\n");
        let mut project = Project::with_config(workspace.config()).unwrap();

        let error = project
            .resolve(Resolver::new(&["app".to_string()], &[]), true, false)
            .await
            .unwrap_err();
        match error.downcast_ref::<ErrorContext>().map(|context| &context.error) {
            Some(YakkaError::UnknownComponents {
                names,
            }) => assert_eq!(names, &vec!["nowhere".to_string()]),
            other => panic!("unexpected error: {other:?}"),
        }

        let error = project
            .resolve(Resolver::new(&["app".to_string()], &[]), false, false)
            .await
            .unwrap_err();
        assert!(error.to_string().contains("nowhere"));
    }

    #[tokio::test]
    async fn test_misspelled_component_gets_a_hint() {
        let workspace = TestWorkspace::new();
        workspace.write_component("lwip", "");
        let mut project = Project::with_config(workspace.config()).unwrap();

        let error = project
            .resolve(Resolver::new(&["lwpi".to_string()], &[]), false, false)
            .await
            .unwrap_err();
        let context = user_friendly_error(error);
        assert_eq!(context.suggestion.as_deref(), Some("Did you mean: 'lwpi' → 'lwip'"));
    }

    #[test]
    fn test_closest_name() {
        let known = vec!["freertos".to_string(), "lwip".to_string()];
        assert_eq!(closest_name("freertso", &known), Some("freertos"));
        assert_eq!(closest_name("zephyr", &known), None);
        assert_eq!(closest_name("lwip", &known), None);
    }

    #[tokio::test]
    async fn test_build_without_targets_records_summary() {
        let workspace = TestWorkspace::new();
        workspace.write_component("app", "requires:\n  components: [lib]\n");
        workspace.write_component("lib", "provides:\n  features: [io]\n");
        let mut project = Project::with_config(workspace.config()).unwrap();

        let outcome = project
            .build(&BuildRequest {
                components: vec!["app".to_string()],
                ..BuildRequest::default()
            })
            .await
            .unwrap();
        assert_eq!(outcome.project_name, "app");
        assert!(outcome.summary_path.exists());
        assert_eq!(project.components().len(), 2);
    }
}
