//! Target expansion: matching targets against blueprints.

use dashmap::DashMap;
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use super::{Blueprint, BlueprintDatabase, BlueprintMatch, Dependency};
use crate::constants::DATA_DEPENDENCY_SENTINEL;
use crate::templating::{TemplateError, TemplateRenderer};

type MatchCell = Arc<OnceLock<Arc<Vec<BlueprintMatch>>>>;

/// Memoized target → matches mapping for one build.
///
/// Each target is matched against the blueprints exactly once, even when
/// several threads ask for it at the same time. Entries are never changed
/// after they are computed.
#[derive(Debug)]
pub struct TargetDatabase {
    blueprints: Arc<BlueprintDatabase>,
    renderer: TemplateRenderer,
    targets: DashMap<String, MatchCell>,
    match_invocations: AtomicUsize,
}

impl TargetDatabase {
    pub fn new(blueprints: Arc<BlueprintDatabase>, summary: Arc<Value>) -> Self {
        Self {
            blueprints,
            renderer: TemplateRenderer::new(summary),
            targets: DashMap::new(),
            match_invocations: AtomicUsize::new(0),
        }
    }

    /// Matches for `target`, computing them on first request.
    pub fn matches(&self, target: &str) -> Arc<Vec<BlueprintMatch>> {
        // Clone the cell out so the map shard isn't locked while rendering.
        let cell: MatchCell = Arc::clone(
            &self.targets.entry(target.to_string()).or_insert_with(|| Arc::new(OnceLock::new())),
        );
        Arc::clone(cell.get_or_init(|| {
            self.match_invocations.fetch_add(1, Ordering::Relaxed);
            Arc::new(find_matches(&self.blueprints, target, &self.renderer))
        }))
    }

    /// How many times pattern matching actually ran.
    pub fn match_invocations(&self) -> usize {
        self.match_invocations.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Match `target` against every blueprint in registration order.
///
/// `base` renders against the project summary; each match layers its captures
/// and target on a clone of it. A blueprint whose dependencies fail to render
/// contributes nothing; the remaining blueprints are still considered.
pub fn find_matches(
    blueprints: &BlueprintDatabase,
    target: &str,
    base: &TemplateRenderer,
) -> Vec<BlueprintMatch> {
    let mut matches = Vec::new();

    for blueprint in blueprints.iter() {
        let Some(captures) = blueprint.pattern.captures(target) else {
            continue;
        };

        let renderer = base
            .clone()
            .with_captures(captures.clone())
            .with_curdir(&blueprint.parent_path)
            .with_value("target", Value::String(target.to_string()));

        match expand_dependencies(blueprint, &renderer) {
            Ok(dependencies) => {
                debug!(
                    "Target '{target}' matched blueprint '{}' from '{}' ({} dependencies)",
                    blueprint.pattern.as_str(),
                    blueprint.owner,
                    dependencies.len()
                );
                matches.push(BlueprintMatch {
                    blueprint: Arc::clone(blueprint),
                    target: target.to_string(),
                    regex_matches: captures,
                    dependencies,
                });
            }
            Err(e) => warn!(
                "Blueprint '{}' from '{}' dropped for target '{target}': {e}",
                blueprint.pattern.as_str(),
                blueprint.owner
            ),
        }
    }

    if matches.is_empty()
        && !target.starts_with(DATA_DEPENDENCY_SENTINEL)
        && !Path::new(target).exists()
    {
        warn!("No blueprint for target '{target}'");
    }

    matches
}

fn expand_dependencies(
    blueprint: &Blueprint,
    renderer: &TemplateRenderer,
) -> Result<Vec<String>, TemplateError> {
    let mut dependencies = Vec::new();

    for dependency in &blueprint.dependencies {
        match dependency {
            Dependency::DependencyFile(template) => {
                let path = renderer.render(template)?;
                match std::fs::read_to_string(path.trim()) {
                    Ok(content) => dependencies.extend(parse_dependency_file(&content)),
                    Err(e) => debug!("Dependency file '{path}' not read: {e}"),
                }
            }
            Dependency::Data(template) => {
                let rendered = renderer.render(template)?;
                let rendered = rendered.trim();
                if rendered.starts_with(DATA_DEPENDENCY_SENTINEL) {
                    dependencies.push(rendered.to_string());
                } else {
                    dependencies.push(format!("{DATA_DEPENDENCY_SENTINEL}{rendered}"));
                }
            }
            Dependency::Default(template) => {
                let rendered = renderer.render(template)?;
                dependencies.extend(split_rendered_list(&rendered));
            }
        }
    }

    Ok(dependencies)
}

/// Split a rendered dependency into target names.
///
/// `[a, b]` is read as a YAML flow sequence, falling back to splitting on
/// commas. Anything else is a single name. Leading `./` is stripped and empty
/// names are dropped.
pub fn split_rendered_list(rendered: &str) -> Vec<String> {
    let trimmed = rendered.trim();
    let names: Vec<String> = if trimmed.starts_with('[') && trimmed.ends_with(']') {
        // Deserialize as strings so scalars keep their source text (`1.10`, `0x1F`).
        match serde_yaml::from_str::<Vec<String>>(trimmed) {
            Ok(items) => items,
            Err(_) => trimmed[1..trimmed.len() - 1].split(',').map(ToString::to_string).collect(),
        }
    } else {
        vec![trimmed.to_string()]
    };

    names
        .iter()
        .map(|name| strip_dot_slash(name.trim()))
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Parse a compiler dependency listing (`gcc -MD` output).
///
/// Only the first rule is read: the target before the first `:` is dropped and
/// the whitespace separated prerequisites that follow are returned, with
/// backslash line continuations joined.
pub fn parse_dependency_file(content: &str) -> Vec<String> {
    let joined = content.replace("\\\r\n", " ").replace("\\\n", " ");
    let Some(rule) = joined.lines().find(|line| !line.trim().is_empty()) else {
        return Vec::new();
    };
    let Some((_, prerequisites)) = rule.split_once(':') else {
        return Vec::new();
    };

    prerequisites
        .split_whitespace()
        .map(strip_dot_slash)
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn strip_dot_slash(name: &str) -> &str {
    name.strip_prefix("./").unwrap_or(name)
}
