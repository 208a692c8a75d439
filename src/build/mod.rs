//! Incremental, parallel target construction.
//!
//! A [`BuildGraph`] is built depth-first from the requested targets. Every
//! distinct target name becomes exactly one [`ConstructionTask`] node, and
//! an edge runs from each dependency to the target that needs it. Targets
//! without a blueprint are leaves:
//!
//! - data dependencies (`:/component/pointer`) are [`Timestamp::Changed`] when
//!   the value differs from the previous build and [`Timestamp::Never`] otherwise
//! - existing files carry their modification time
//! - anything else is logged as "no action" and never causes a rebuild
//!
//! [`BuildGraph::execute`] walks the graph in dependency order on a bounded set
//! of blocking workers. A produced target runs its blueprints' command
//! pipelines when its file is missing or a dependency is newer. The first
//! failing pipeline raises a shared abort flag; tasks that have not started
//! yet see it and skip their work, while tasks already running finish.

pub mod commands;
pub mod data_diff;

use petgraph::Direction;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;
use tokio::task::{Id, JoinSet};
use tracing::{debug, error, info};

use crate::blueprint::{BlueprintMatch, TargetDatabase};
use crate::constants::{DATA_DEPENDENCY_SENTINEL, PROGRESS_POLL_INTERVAL, default_parallelism};
use crate::core::YakkaError;
use crate::templating::TemplateRenderer;
use crate::utils::{ProgressBar, modified_time};

pub use commands::{BlueprintCommand, CommandError, run_pipeline};
pub use data_diff::DataDiff;

/// Freshness of a target, ordered oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Timestamp {
    /// Never built, or nothing to compare
    Never,
    At(SystemTime),
    /// Newer than anything: a data dependency whose value changed
    Changed,
}

impl Timestamp {
    fn of_file(path: &str) -> Self {
        modified_time(Path::new(path)).map_or(Self::Never, Self::At)
    }
}

/// What a graph node stands for.
#[derive(Debug, Clone)]
pub enum TaskKind {
    Data {
        changed: bool,
    },
    /// Existing file without a blueprint
    File,
    /// Neither produced nor present
    NoAction,
    /// Produced by one or more blueprints, run in order
    Produced(Arc<Vec<BlueprintMatch>>),
}

/// One target in the build graph.
#[derive(Debug, Clone)]
pub struct ConstructionTask {
    pub target: String,
    pub kind: TaskKind,
    pub last_modified: Timestamp,
}

impl ConstructionTask {
    pub fn is_produced(&self) -> bool {
        matches!(self.kind, TaskKind::Produced(_))
    }
}

/// Options for [`BuildGraph::execute`].
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Maximum number of pipelines running at once
    pub max_jobs: usize,
    pub show_progress: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            max_jobs: default_parallelism(),
            show_progress: false,
        }
    }
}

/// What happened to each produced target.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub executed: Vec<String>,
    pub up_to_date: Vec<String>,
    /// Not started because the build was aborted
    pub skipped: Vec<String>,
    /// Target and reason
    pub failed: Vec<(String, String)>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Convert a failed report into [`YakkaError::BuildFailed`].
    pub fn into_result(self) -> Result<Self, YakkaError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(YakkaError::BuildFailed {
                failed: self
                    .failed
                    .iter()
                    .map(|(target, reason)| format!("{target}: {reason}"))
                    .collect(),
            })
        }
    }
}

type TaskRunner = fn(&str, &[BlueprintMatch], &TemplateRenderer, &AtomicBool) -> TaskOutcome;

enum TaskOutcome {
    Executed(SystemTime),
    Skipped,
    Failed(String),
}

/// Target dependency graph for one build invocation.
#[derive(Debug, Default)]
pub struct BuildGraph {
    graph: DiGraph<ConstructionTask, ()>,
    node_map: HashMap<String, NodeIndex>,
}

impl BuildGraph {
    /// Expand `roots` and everything they depend on.
    ///
    /// # Errors
    ///
    /// Fails on a malformed data dependency.
    pub fn construct(
        roots: &[String],
        targets: &TargetDatabase,
        data: &DataDiff,
    ) -> Result<Self, YakkaError> {
        let mut graph = Self::default();
        for root in roots {
            graph.visit(root, targets, data)?;
        }
        debug!(
            "Build graph: {} targets, {} edges",
            graph.graph.node_count(),
            graph.graph.edge_count()
        );
        Ok(graph)
    }

    fn visit(
        &mut self,
        target: &str,
        targets: &TargetDatabase,
        data: &DataDiff,
    ) -> Result<NodeIndex, YakkaError> {
        if let Some(&index) = self.node_map.get(target) {
            return Ok(index);
        }

        let (kind, last_modified) = if target.starts_with(DATA_DEPENDENCY_SENTINEL) {
            let changed = data.has_changed(target)?;
            debug!("Data dependency '{target}' changed: {changed}");
            let timestamp = if changed {
                Timestamp::Changed
            } else {
                Timestamp::Never
            };
            (
                TaskKind::Data {
                    changed,
                },
                timestamp,
            )
        } else {
            let matches = targets.matches(target);
            if !matches.is_empty() {
                (TaskKind::Produced(matches), Timestamp::of_file(target))
            } else {
                match Timestamp::of_file(target) {
                    Timestamp::Never => {
                        debug!("No action for '{target}'");
                        (TaskKind::NoAction, Timestamp::Never)
                    }
                    timestamp => (TaskKind::File, timestamp),
                }
            }
        };

        let dependencies: Vec<String> = match &kind {
            TaskKind::Produced(matches) => {
                matches.iter().flat_map(|m| m.dependencies.iter().cloned()).collect()
            }
            _ => Vec::new(),
        };

        // Insert before recursing so a cycle ends at this node instead of looping.
        let index = self.graph.add_node(ConstructionTask {
            target: target.to_string(),
            kind,
            last_modified,
        });
        self.node_map.insert(target.to_string(), index);

        for dependency in &dependencies {
            let dependency_index = self.visit(dependency, targets, data)?;
            self.graph.update_edge(dependency_index, index, ());
        }

        Ok(index)
    }

    pub fn task(&self, target: &str) -> Option<&ConstructionTask> {
        self.node_map.get(target).map(|&index| &self.graph[index])
    }

    /// Direct dependencies of `target`.
    pub fn dependencies_of(&self, target: &str) -> Vec<&str> {
        let Some(&index) = self.node_map.get(target) else {
            return Vec::new();
        };
        let mut dependencies: Vec<&str> = self
            .graph
            .neighbors_directed(index, Direction::Incoming)
            .map(|d| self.graph[d].target.as_str())
            .collect();
        dependencies.sort_unstable();
        dependencies
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Reject graphs where a target transitively depends on itself.
    pub fn check_cycles(&self) -> Result<(), YakkaError> {
        let Err(cycle) = toposort(&self.graph, None) else {
            return Ok(());
        };
        let start = cycle.node_id();
        let members = tarjan_scc(&self.graph)
            .into_iter()
            .find(|component| component.contains(&start))
            .unwrap_or_else(|| vec![start]);
        let mut chain: Vec<&str> =
            members.iter().rev().map(|&index| self.graph[index].target.as_str()).collect();
        chain.push(self.graph[start].target.as_str());
        Err(YakkaError::CircularDependency {
            chain: chain.join(" -> "),
        })
    }

    /// Run every stale produced target, dependencies first.
    ///
    /// Pipeline failures do not make this return an error; they are recorded
    /// in the [`BuildReport`].
    ///
    /// # Errors
    ///
    /// Fails with [`YakkaError::CircularDependency`] before running anything
    /// if the graph has a cycle.
    pub async fn execute(
        self,
        summary: Arc<Value>,
        options: ExecutionOptions,
    ) -> Result<BuildReport, YakkaError> {
        self.execute_with(summary, options, run_task).await
    }

    async fn execute_with(
        self,
        summary: Arc<Value>,
        options: ExecutionOptions,
        runner: TaskRunner,
    ) -> Result<BuildReport, YakkaError> {
        self.check_cycles()?;

        let graph = self.graph;
        let max_jobs = options.max_jobs.max(1);
        let produced = graph.node_weights().filter(|task| task.is_produced()).count();
        info!("Building {produced} targets with up to {max_jobs} jobs");

        let renderer = TemplateRenderer::new(summary);
        let progress = ProgressBar::new(produced as u64, options.show_progress);
        let abort = Arc::new(AtomicBool::new(false));
        let mut timestamps: Vec<Timestamp> =
            graph.node_weights().map(|task| task.last_modified).collect();
        let mut pending_dependencies: Vec<usize> = graph
            .node_indices()
            .map(|index| graph.edges_directed(index, Direction::Incoming).count())
            .collect();
        let mut ready: VecDeque<NodeIndex> =
            graph.node_indices().filter(|index| pending_dependencies[index.index()] == 0).collect();

        let mut report = BuildReport::default();
        let mut running: JoinSet<TaskOutcome> = JoinSet::new();
        let mut running_nodes: HashMap<Id, NodeIndex> = HashMap::new();
        let mut ticker = tokio::time::interval(PROGRESS_POLL_INTERVAL);

        // Releases dependents whose last dependency just finished.
        let complete = |index: NodeIndex, pending: &mut [usize], ready: &mut VecDeque<NodeIndex>| {
            for dependent in graph.neighbors_directed(index, Direction::Outgoing) {
                let count = &mut pending[dependent.index()];
                *count = count.saturating_sub(1);
                if *count == 0 {
                    ready.push_back(dependent);
                }
            }
        };

        loop {
            while running.len() < max_jobs {
                let Some(index) = ready.pop_front() else {
                    break;
                };
                let task = &graph[index];
                let TaskKind::Produced(matches) = &task.kind else {
                    complete(index, &mut pending_dependencies, &mut ready);
                    continue;
                };

                let newest_dependency = graph
                    .neighbors_directed(index, Direction::Incoming)
                    .map(|d| timestamps[d.index()])
                    .max();
                let own = timestamps[index.index()];
                let stale = own == Timestamp::Never || newest_dependency.is_some_and(|d| d > own);

                if !stale {
                    debug!("'{}' is up to date", task.target);
                    report.up_to_date.push(task.target.clone());
                    progress.inc(1);
                    complete(index, &mut pending_dependencies, &mut ready);
                } else if abort.load(Ordering::SeqCst) {
                    report.skipped.push(task.target.clone());
                    progress.inc(1);
                    complete(index, &mut pending_dependencies, &mut ready);
                } else {
                    let matches = Arc::clone(matches);
                    let renderer = renderer.clone();
                    let abort = Arc::clone(&abort);
                    let target = task.target.clone();
                    let handle = running
                        .spawn_blocking(move || runner(&target, &matches, &renderer, &abort));
                    running_nodes.insert(handle.id(), index);
                }
            }

            if running.is_empty() {
                break;
            }

            tokio::select! {
                joined = running.join_next_with_id() => {
                    let Some(joined) = joined else {
                        continue;
                    };
                    let id = match &joined {
                        Ok((id, _)) => *id,
                        Err(e) => e.id(),
                    };
                    let Some(index) = running_nodes.remove(&id) else {
                        continue;
                    };
                    let target = graph[index].target.clone();
                    match joined {
                        Ok((_, TaskOutcome::Executed(finished))) => {
                            timestamps[index.index()] = Timestamp::At(finished);
                            report.executed.push(target);
                        }
                        Ok((_, TaskOutcome::Skipped)) => report.skipped.push(target),
                        Ok((_, TaskOutcome::Failed(reason))) => {
                            error!("Failed to build '{target}': {reason}");
                            report.failed.push((target, reason));
                        }
                        Err(e) => {
                            abort.store(true, Ordering::SeqCst);
                            error!("Task for '{target}' panicked: {e}");
                            report.failed.push((target, format!("task panicked: {e}")));
                        }
                    }
                    progress.inc(1);
                    complete(index, &mut pending_dependencies, &mut ready);
                }
                _ = ticker.tick() => {
                    progress.set_message(format!("{} running", running.len()));
                }
            }
        }

        if report.is_success() {
            progress.finish_with_message(format!("{} executed", report.executed.len()));
        } else {
            progress.finish_and_clear();
        }
        info!(
            "Build finished: {} executed, {} up to date, {} skipped, {} failed",
            report.executed.len(),
            report.up_to_date.len(),
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }
}

fn run_task(
    target: &str,
    matches: &[BlueprintMatch],
    renderer: &TemplateRenderer,
    abort: &AtomicBool,
) -> TaskOutcome {
    if abort.load(Ordering::SeqCst) {
        return TaskOutcome::Skipped;
    }
    info!("Building '{target}'");
    for blueprint_match in matches {
        if let Err(e) = run_pipeline(blueprint_match, renderer) {
            abort.store(true, Ordering::SeqCst);
            let failure = YakkaError::CommandFailed {
                target: target.to_string(),
                command: e.command().to_string(),
                reason: e.to_string(),
            };
            return TaskOutcome::Failed(failure.to_string());
        }
    }
    TaskOutcome::Executed(SystemTime::now())
}
