//! Requirement resolution.
//!
//! The resolver computes the closed set of components, features and choices
//! needed by a project, starting from the requested components and features.
//!
//! # Algorithm
//!
//! Resolution is a fixpoint over two passes that feed each other:
//!
//! 1. **Component pass** - takes a snapshot of the unprocessed components.
//!    Each newly required component is parsed, its `requires`/`provides` are
//!    queued, its choices registered (first declaration wins) and its
//!    `replaces` recorded. Support fragments are merged in both directions:
//!    the new component's fragments for features and components already
//!    required, and fragments of already required components that support the
//!    new one.
//! 2. **Feature pass** - takes a snapshot of the unprocessed features and
//!    merges the fragments of every parsed component supporting them.
//!
//! Items queued during a pass are handled in the next iteration. When both
//! queues drain, unresolved choices with a `default` reopen the loop (bounded
//! by [`MAX_DEFAULT_CHOICE_ROUNDS`]). Finally, pending replacements are
//! committed; if a replaced component already contributed to the result the
//! whole resolution restarts from the initial request, so nothing derived
//! from a replaced component survives.
//!
//! Unknown components do not stop resolution. They are reported through
//! [`ResolutionResult::HasUnknownComponents`] so the caller can fetch them and
//! call [`Resolver::retry_unknown_components`] followed by another
//! [`Resolver::resolve`].

pub mod choices;

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

use crate::component::{
    Choice, ComponentDocument, ComponentLocation, ComponentStore, Requirements, choices_in,
    normalize_id,
};
use crate::constants::MAX_DEFAULT_CHOICE_ROUNDS;
use crate::core::YakkaError;

pub use choices::{ChoiceReport, evaluate};

/// Outcome of a resolution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionResult {
    /// Everything resolved and every choice has exactly one answer
    Valid,
    /// Requested components missing from the store; fetch and retry
    HasUnknownComponents(Vec<String>),
    /// A component file failed to parse or validate
    HasInvalidComponent {
        id: String,
        path: String,
        reason: String,
    },
    /// Two components replace the same component
    HasMultipleReplacements {
        target: String,
        first: String,
        second: String,
    },
    /// `(owner, choice)` pairs without an answer
    HasIncompleteChoices(Vec<(String, String)>),
    /// Choices with more than one answer
    HasMultipleAnswersForChoices(Vec<String>),
}

impl ResolutionResult {
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// The error equivalent of a non-valid result.
    pub fn into_error(self) -> Option<YakkaError> {
        match self {
            Self::Valid => None,
            Self::HasUnknownComponents(names) => Some(YakkaError::UnknownComponents {
                names,
            }),
            Self::HasInvalidComponent {
                id,
                path,
                reason,
            } => Some(YakkaError::InvalidComponent {
                id,
                path,
                reason,
            }),
            Self::HasMultipleReplacements {
                target,
                first,
                second,
            } => Some(YakkaError::MultipleReplacements {
                target,
                first,
                second,
            }),
            Self::HasIncompleteChoices(choices) => Some(YakkaError::IncompleteChoices {
                choices: choices.into_iter().map(|(owner, name)| format!("{owner}:{name}")).collect(),
            }),
            Self::HasMultipleAnswersForChoices(choices) => Some(YakkaError::AmbiguousChoices {
                choices,
            }),
        }
    }
}

/// A choice together with the component that declared it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeclaredChoice {
    pub owner: String,
    #[serde(flatten)]
    pub choice: Choice,
}

/// Mutable state of one resolution.
#[derive(Debug, Default)]
pub struct ResolutionState {
    pub unprocessed_components: BTreeSet<String>,
    pub unprocessed_features: BTreeSet<String>,
    pub required_components: BTreeSet<String>,
    pub required_features: BTreeSet<String>,
    pub unknown_components: BTreeSet<String>,
    /// Parsed documents backing `required_components`, in the order they were required
    pub components: Vec<ComponentDocument>,
    pub choices: BTreeMap<String, DeclaredChoice>,
    /// replaced id → replacing id
    pub replacements: BTreeMap<String, String>,
    pub replaced_components: BTreeSet<String>,
    pending_replacements: BTreeMap<String, String>,
    checked_for_replacement: BTreeSet<String>,
    applied_defaults: BTreeSet<String>,
    default_rounds: usize,
    restarts: usize,
}

impl ResolutionState {
    /// Number of full restarts caused by replacements.
    pub const fn restarts(&self) -> usize {
        self.restarts
    }

    pub fn component(&self, id: &str) -> Option<&ComponentDocument> {
        self.components.iter().find(|c| c.id == id)
    }
}

/// Previously parsed documents, trusted while their files are unchanged.
#[derive(Debug, Clone, Default)]
pub struct DocumentCache {
    documents: HashMap<PathBuf, Value>,
    written_at: Option<SystemTime>,
}

impl DocumentCache {
    /// Create a cache whose entries were recorded at `written_at`.
    pub fn new(written_at: SystemTime) -> Self {
        Self {
            documents: HashMap::new(),
            written_at: Some(written_at),
        }
    }

    pub fn insert(&mut self, path: PathBuf, document: Value) {
        self.documents.insert(path, document);
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// The cached document for `path`, unless the file changed since it was cached.
    pub fn lookup(&self, path: &Path) -> Option<&Value> {
        let written_at = self.written_at?;
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
        if modified > written_at {
            return None;
        }
        self.documents.get(path)
    }
}

/// Requirement resolver for one project.
#[derive(Debug)]
pub struct Resolver {
    initial_components: Vec<String>,
    initial_features: Vec<String>,
    cache: DocumentCache,
    parsed: HashMap<String, ComponentDocument>,
    state: ResolutionState,
}

impl Resolver {
    /// Create a resolver seeded with the requested components and features.
    pub fn new(components: &[String], features: &[String]) -> Self {
        let mut resolver = Self {
            initial_components: components.iter().map(|c| normalize_id(c).to_string()).collect(),
            initial_features: features.to_vec(),
            cache: DocumentCache::default(),
            parsed: HashMap::new(),
            state: ResolutionState::default(),
        };
        resolver.seed();
        resolver
    }

    /// Reuse documents parsed by a previous run.
    #[must_use]
    pub fn with_cache(mut self, cache: DocumentCache) -> Self {
        self.cache = cache;
        self
    }

    pub const fn state(&self) -> &ResolutionState {
        &self.state
    }

    pub fn into_state(self) -> ResolutionState {
        self.state
    }

    /// Documents as parsed from disk, before any fragment was merged in.
    pub fn pristine_documents(&self) -> impl Iterator<Item = &ComponentDocument> {
        self.parsed.values()
    }

    /// Queue the unknown components again, typically after fetching them.
    pub fn retry_unknown_components(&mut self) {
        let unknown = std::mem::take(&mut self.state.unknown_components);
        self.state.unprocessed_components.extend(unknown);
    }

    /// Run the fixpoint until nothing is left to process.
    pub fn resolve(&mut self, store: &dyn ComponentStore) -> ResolutionResult {
        loop {
            if !self.state.unprocessed_components.is_empty()
                || !self.state.unprocessed_features.is_empty()
            {
                if let Err(result) = self.component_pass(store) {
                    return result;
                }
                self.feature_pass();
                continue;
            }

            if self.apply_choice_defaults() {
                continue;
            }

            if !self.state.pending_replacements.is_empty() {
                if self.commit_replacements() {
                    self.restart();
                }
                continue;
            }

            break;
        }

        if !self.state.unknown_components.is_empty() {
            return ResolutionResult::HasUnknownComponents(
                self.state.unknown_components.iter().cloned().collect(),
            );
        }

        let report = evaluate(
            &self.state.components,
            &self.state.required_features,
            &self.state.required_components,
        );
        if !report.incomplete.is_empty() {
            return ResolutionResult::HasIncompleteChoices(report.incomplete);
        }
        if !report.overfull.is_empty() {
            return ResolutionResult::HasMultipleAnswersForChoices(report.overfull);
        }

        info!(
            "Resolved {} component(s) and {} feature(s)",
            self.state.required_components.len(),
            self.state.required_features.len()
        );
        ResolutionResult::Valid
    }

    fn seed(&mut self) {
        self.state.unprocessed_components.extend(self.initial_components.iter().cloned());
        self.state.unprocessed_features.extend(self.initial_features.iter().cloned());
    }

    fn component_pass(&mut self, store: &dyn ComponentStore) -> Result<(), ResolutionResult> {
        let snapshot = std::mem::take(&mut self.state.unprocessed_components);

        for raw_id in snapshot {
            let id = normalize_id(&raw_id).to_string();

            if self.state.replaced_components.contains(&id) {
                if let Some(replacer) = self.state.replacements.get(&id) {
                    if !self.state.replaced_components.contains(replacer)
                        && !self.state.required_components.contains(replacer)
                    {
                        debug!("'{id}' is replaced by '{replacer}'");
                        self.state.unprocessed_components.insert(replacer.clone());
                    }
                }
                continue;
            }
            if self.state.required_components.contains(&id) {
                continue;
            }

            let Some(location) = store.find(&id) else {
                debug!("Component '{id}' not found");
                self.state.unknown_components.insert(id);
                continue;
            };
            self.state.unknown_components.remove(&id);

            let document = self.load(&id, &location).map_err(|e| match e {
                YakkaError::InvalidComponent {
                    id,
                    path,
                    reason,
                } => ResolutionResult::HasInvalidComponent {
                    id,
                    path,
                    reason,
                },
                other => ResolutionResult::HasInvalidComponent {
                    id: id.clone(),
                    path: location.path.display().to_string(),
                    reason: other.to_string(),
                },
            })?;

            self.record_replacements(&document)?;
            self.add_component(document);
        }

        Ok(())
    }

    fn feature_pass(&mut self) {
        let snapshot = std::mem::take(&mut self.state.unprocessed_features);

        for feature in snapshot {
            if !self.state.required_features.insert(feature.clone()) {
                continue;
            }
            debug!("Feature '{feature}' required");
            for index in 0..self.state.components.len() {
                if let Some(fragment) = self.state.components[index].feature_support(&feature) {
                    let fragment = fragment.clone();
                    self.apply_fragment(index, &fragment, &format!("feature '{feature}'"));
                }
            }
        }
    }

    fn add_component(&mut self, document: ComponentDocument) {
        let id = document.id.clone();
        debug!("Component '{id}' required ({})", document.path.display());

        let requirements = document.requirements();
        let declared = document.choices();
        self.state.required_components.insert(id.clone());
        self.state.components.push(document);
        self.enqueue(requirements);
        self.register_choices(&id, declared);

        let index = self.state.components.len() - 1;

        // The new component supports what is already required.
        let supported_features: Vec<String> = self.state.components[index]
            .supported_features()
            .into_iter()
            .filter(|f| self.state.required_features.contains(f))
            .collect();
        for feature in supported_features {
            if let Some(fragment) = self.state.components[index].feature_support(&feature) {
                let fragment = fragment.clone();
                self.apply_fragment(index, &fragment, &format!("feature '{feature}'"));
            }
        }
        let supported_components: Vec<String> = self.state.components[index]
            .supported_components()
            .into_iter()
            .filter(|c| *c != id && self.state.required_components.contains(c))
            .collect();
        for component in supported_components {
            if let Some(fragment) = self.state.components[index].component_support(&component) {
                let fragment = fragment.clone();
                self.apply_fragment(index, &fragment, &format!("component '{component}'"));
            }
        }

        // Already required components that support the new one.
        for other in 0..index {
            if let Some(fragment) = self.state.components[other].component_support(&id) {
                let fragment = fragment.clone();
                self.apply_fragment(other, &fragment, &format!("component '{id}'"));
            }
        }
    }

    fn apply_fragment(&mut self, index: usize, fragment: &Value, condition: &str) {
        let document = &mut self.state.components[index];
        let owner = document.id.clone();
        debug!("Merging support for {condition} into '{owner}'");
        if let Err(e) = document.merge(fragment) {
            warn!("Support for {condition} in '{owner}': {e}");
        }
        self.enqueue(Requirements::of(fragment, &owner));
        self.register_choices(&owner, choices_in(fragment, &owner));
    }

    fn enqueue(&mut self, requirements: Requirements) {
        for component in requirements.components {
            let id = normalize_id(&component).to_string();
            if !self.state.required_components.contains(&id) {
                self.state.unprocessed_components.insert(id);
            }
        }
        for feature in requirements.features.into_iter().chain(requirements.provided_features) {
            if !self.state.required_features.contains(&feature) {
                self.state.unprocessed_features.insert(feature);
            }
        }
    }

    fn register_choices(&mut self, owner: &str, declared: Vec<(String, Choice)>) {
        for (name, choice) in declared {
            self.state.choices.entry(name).or_insert_with(|| DeclaredChoice {
                owner: owner.to_string(),
                choice,
            });
        }
    }

    fn record_replacements(&mut self, document: &ComponentDocument) -> Result<(), ResolutionResult> {
        if !self.state.checked_for_replacement.insert(document.id.clone()) {
            return Ok(());
        }
        for target in document.replaces() {
            if target == document.id {
                continue;
            }
            let existing = self
                .state
                .replacements
                .get(&target)
                .or_else(|| self.state.pending_replacements.get(&target));
            match existing {
                Some(first) if *first != document.id => {
                    return Err(ResolutionResult::HasMultipleReplacements {
                        target,
                        first: first.clone(),
                        second: document.id.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    self.state.pending_replacements.insert(target, document.id.clone());
                }
            }
        }
        Ok(())
    }

    /// Commit pending replacements. Returns true when a replaced component
    /// already contributed to the result and a restart is needed.
    fn commit_replacements(&mut self) -> bool {
        let pending = std::mem::take(&mut self.state.pending_replacements);
        let mut restart = false;
        for (target, replacer) in pending {
            info!("Component '{replacer}' replaces '{target}'");
            restart |= self.state.required_components.contains(&target);
            self.state.replaced_components.insert(target.clone());
            self.state.replacements.insert(target, replacer);
        }
        restart
    }

    fn restart(&mut self) {
        self.state.restarts += 1;
        debug!("Restarting resolution ({} restart(s))", self.state.restarts);
        self.state.required_components.clear();
        self.state.required_features.clear();
        self.state.unknown_components.clear();
        self.state.components.clear();
        self.state.choices.clear();
        self.state.applied_defaults.clear();
        self.state.default_rounds = 0;
        self.state.unprocessed_components.clear();
        self.state.unprocessed_features.clear();
        self.seed();
    }

    /// Queue the defaults of unanswered choices. Returns true if anything was queued.
    fn apply_choice_defaults(&mut self) -> bool {
        // An unknown component might answer the choice once fetched.
        if !self.state.unknown_components.is_empty() {
            return false;
        }

        let pending: Vec<(String, Choice)> = self
            .state
            .choices
            .iter()
            .filter(|(name, declared)| {
                declared.choice.default.is_some()
                    && !self.state.applied_defaults.contains(*name)
                    && choices::selected_options(
                        &declared.choice,
                        &self.state.required_features,
                        &self.state.required_components,
                    ) == 0
            })
            .map(|(name, declared)| (name.clone(), declared.choice.clone()))
            .collect();
        if pending.is_empty() {
            return false;
        }
        if self.state.default_rounds >= MAX_DEFAULT_CHOICE_ROUNDS {
            warn!(
                "Stopped applying choice defaults after {MAX_DEFAULT_CHOICE_ROUNDS} rounds; \
                 {} choice(s) left unanswered",
                pending.len()
            );
            return false;
        }
        self.state.default_rounds += 1;

        for (name, choice) in pending {
            self.state.applied_defaults.insert(name.clone());
            let Some(default) = choice.default else {
                continue;
            };
            if let Some(feature) = default.feature {
                info!("Choice '{name}' defaults to feature '{feature}'");
                self.state.unprocessed_features.insert(feature);
            }
            if let Some(component) = default.component {
                info!("Choice '{name}' defaults to component '{component}'");
                self.state.unprocessed_components.insert(normalize_id(&component).to_string());
            }
        }
        true
    }

    fn load(&mut self, id: &str, location: &ComponentLocation) -> Result<ComponentDocument, YakkaError> {
        if let Some(document) = self.parsed.get(id) {
            if document.path == location.path {
                return Ok(document.clone());
            }
        }

        let document = match self.cache.lookup(&location.path) {
            Some(node) => match ComponentDocument::from_value(node.clone(), &location.path) {
                Ok(document) => {
                    debug!("Using cached description of '{id}'");
                    document
                }
                Err(_) => ComponentDocument::load(&location.path)?,
            },
            None => ComponentDocument::load(&location.path)?,
        };

        self.parsed.insert(id.to_string(), document.clone());
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::FsComponentStore;
    use crate::test_utils::TestWorkspace;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(ToString::to_string).collect()
    }

    fn resolve(
        store: &FsComponentStore,
        components: &[&str],
        features: &[&str],
    ) -> (ResolutionResult, ResolutionState) {
        let mut resolver = Resolver::new(&strings(components), &strings(features));
        let result = resolver.resolve(store);
        (result, resolver.into_state())
    }

    #[test]
    fn test_app_requires_lib_providing_io() {
        let ws = TestWorkspace::new();
        ws.write_component("app", "requires:\n  components: [lib]\n");
        ws.write_component("lib", "provides:\n  features: [io]\n");

        let (result, state) = resolve(&ws.store(), &["app"], &[]);
        assert_eq!(result, ResolutionResult::Valid);
        assert_eq!(state.required_components, set(&["app", "lib"]));
        assert_eq!(state.required_features, set(&["io"]));
        assert!(state.unknown_components.is_empty());
        assert_eq!(state.components.len(), 2);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let ws = TestWorkspace::new();
        ws.write_component("app", "requires:\n  components: [lib, util]\n  features: [fast]\n");
        ws.write_component("lib", "requires:\n  components: [util]\nprovides:\n  features: [io]\n");
        ws.write_component("util", "supports:\n  features:\n    fast:\n      requires: { features: [simd] }\n");
        let store = ws.store();

        let (first_result, first) = resolve(&store, &["app"], &[]);
        let (second_result, second) = resolve(&store, &["app"], &[]);
        assert_eq!(first_result, second_result);
        assert_eq!(first.required_components, second.required_components);
        assert_eq!(first.required_features, second.required_features);
        assert!(first.required_features.contains("simd"));
    }

    #[test]
    fn test_replacement_restarts_and_drops_replaced_requirements() {
        let ws = TestWorkspace::new();
        ws.write_component("app", "requires:\n  components: [b, c]\n");
        ws.write_component("b", "requires:\n  components: [x]\n  features: [b_only]\n");
        ws.write_component("c", "replaces:\n  component: [b]\n");
        ws.write_component("x", "");

        let (result, state) = resolve(&ws.store(), &["app"], &[]);
        assert_eq!(result, ResolutionResult::Valid);
        assert_eq!(state.required_components, set(&["app", "c"]));
        assert!(state.required_features.is_empty());
        assert!(state.replaced_components.contains("b"));
        assert_eq!(state.replacements.get("b").map(String::as_str), Some("c"));
        assert_eq!(state.restarts(), 1);
    }

    #[test]
    fn test_replaced_requirement_redirects_to_replacer() {
        let ws = TestWorkspace::new();
        ws.write_component("app", "requires:\n  components: [b, extras]\n");
        ws.write_component("extras", "requires:\n  components: [c]\n");
        ws.write_component("b", "");
        ws.write_component("c", "replaces:\n  component: b\n");

        let (result, state) = resolve(&ws.store(), &["app"], &[]);
        assert!(result.is_valid());
        assert!(state.required_components.contains("c"));
        assert!(!state.required_components.contains("b"));
    }

    #[test]
    fn test_mutual_replacement_drops_both_after_one_restart() {
        let ws = TestWorkspace::new();
        ws.write_component("app", "requires:\n  components: [a, b]\n");
        ws.write_component("a", "replaces:\n  component: [b]\n");
        ws.write_component("b", "replaces:\n  component: [a]\n");

        let (result, state) = resolve(&ws.store(), &["app"], &[]);
        assert_eq!(result, ResolutionResult::Valid);
        assert_eq!(state.required_components, set(&["app"]));
        assert_eq!(state.replaced_components, set(&["a", "b"]));
        assert_eq!(state.restarts(), 1);
    }

    #[test]
    fn test_multiple_replacements_are_fatal() {
        let ws = TestWorkspace::new();
        ws.write_component("app", "requires:\n  components: [c, d]\n");
        ws.write_component("c", "replaces:\n  component: [b]\n");
        ws.write_component("d", "replaces:\n  component: [b]\n");

        let (result, _) = resolve(&ws.store(), &["app"], &[]);
        assert_eq!(
            result,
            ResolutionResult::HasMultipleReplacements {
                target: "b".to_string(),
                first: "c".to_string(),
                second: "d".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_components_can_be_retried() {
        let ws = TestWorkspace::new();
        ws.write_component("app", "requires:\n  components: [remote]\n");
        let mut store = ws.store();

        let mut resolver = Resolver::new(&strings(&["app"]), &[]);
        assert_eq!(
            resolver.resolve(&store),
            ResolutionResult::HasUnknownComponents(strings(&["remote"]))
        );

        ws.write_component("remote", "provides:\n  features: [net]\n");
        store.rescan().unwrap();
        resolver.retry_unknown_components();
        assert_eq!(resolver.resolve(&store), ResolutionResult::Valid);
        assert!(resolver.state().required_features.contains("net"));
    }

    #[test]
    fn test_invalid_component_is_fatal() {
        let ws = TestWorkspace::new();
        ws.write_component("app", "requires:\n  components: [broken]\n");
        ws.write_component("broken", "choices: [not, a, map]\n");

        let (result, _) = resolve(&ws.store(), &["app"], &[]);
        assert!(matches!(
            result,
            ResolutionResult::HasInvalidComponent { ref id, .. } if id == "broken"
        ));
    }

    #[test]
    fn test_support_fragments_merge_in_both_directions() {
        let ws = TestWorkspace::new();
        ws.write_component("app", "requires:\n  components: [rtos, net]\n");
        ws.write_component("rtos", "");
        ws.write_component(
            "net",
            "supports:\n  components:\n    rtos:\n      requires: { features: [net_threads] }\n      flags: [-DRTOS]\n",
        );

        let (_, state) = resolve(&ws.store(), &["app"], &[]);
        assert!(state.required_features.contains("net_threads"));
        assert_eq!(state.component("net").unwrap().node["flags"][0], "-DRTOS");

        // Same outcome when the supported component is required first.
        ws.write_component("app", "requires:\n  components: [rtos, wrapper]\n");
        ws.write_component("wrapper", "requires:\n  components: [net]\n");
        let (_, state) = resolve(&ws.store(), &["app"], &[]);
        assert!(state.required_features.contains("net_threads"));
        assert_eq!(state.component("net").unwrap().node["flags"][0], "-DRTOS");
    }

    #[test]
    fn test_feature_support_adds_components() {
        let ws = TestWorkspace::new();
        ws.write_component(
            "lib",
            "supports:\n  features:\n    debug:\n      requires: { components: [tracer] }\n",
        );
        ws.write_component("tracer", "");

        let (result, state) = resolve(&ws.store(), &["lib"], &["debug"]);
        assert!(result.is_valid());
        assert!(state.required_components.contains("tracer"));
    }

    #[test]
    fn test_incomplete_and_ambiguous_choices() {
        let ws = TestWorkspace::new();
        ws.write_component("app", "choices:\n  port:\n    features: [uart, usb]\n");
        let store = ws.store();

        let (result, _) = resolve(&store, &["app"], &[]);
        assert_eq!(
            result,
            ResolutionResult::HasIncompleteChoices(vec![("app".to_string(), "port".to_string())])
        );

        let (result, _) = resolve(&store, &["app"], &["uart", "usb"]);
        assert_eq!(result, ResolutionResult::HasMultipleAnswersForChoices(strings(&["port"])));

        let (result, _) = resolve(&store, &["app"], &["usb"]);
        assert!(result.is_valid());
    }

    #[test]
    fn test_chained_choice_defaults() {
        let ws = TestWorkspace::new();
        ws.write_component(
            "app",
            "choices:\n  port:\n    features: [uart, usb]\n    default: { feature: uart }\nsupports:\n  features:\n    uart:\n      choices:\n        baud:\n          features: [b9600, b115200]\n          default: { feature: b115200 }\n",
        );

        let (result, state) = resolve(&ws.store(), &["app"], &[]);
        assert!(result.is_valid());
        assert!(state.required_features.contains("uart"));
        assert!(state.required_features.contains("b115200"));
        assert!(state.choices.contains_key("baud"));
    }

    #[test]
    fn test_choice_default_chain_stops_at_round_limit() {
        let mut description = String::from(
            "choices:\n  c0: {features: [f0], default: {feature: f0}}\nsupports:\n  features:\n",
        );
        for k in 0..=MAX_DEFAULT_CHOICE_ROUNDS {
            let next = k + 1;
            description.push_str(&format!(
                "    f{k}: {{choices: {{c{next}: {{features: [f{next}], default: {{feature: f{next}}}}}}}}}\n"
            ));
        }
        let ws = TestWorkspace::new();
        ws.write_component("app", &description);

        let (result, state) = resolve(&ws.store(), &["app"], &[]);
        let last = MAX_DEFAULT_CHOICE_ROUNDS;
        assert_eq!(
            result,
            ResolutionResult::HasIncompleteChoices(vec![("app".to_string(), format!("c{last}"))])
        );
        assert!(state.required_features.contains(&format!("f{}", last - 1)));
        assert!(!state.required_features.contains(&format!("f{last}")));
    }

    #[test]
    fn test_first_choice_declaration_wins() {
        let ws = TestWorkspace::new();
        ws.write_component(
            "app",
            "requires:\n  components: [lib]\nchoices:\n  mode:\n    features: [a, b]\n    default: { feature: a }\n",
        );
        ws.write_component("lib", "choices:\n  mode:\n    features: [c]\n");

        let (_, state) = resolve(&ws.store(), &["app"], &[]);
        assert_eq!(state.choices["mode"].owner, "app");
    }

    #[test]
    fn test_cached_documents_are_used_when_unchanged() {
        let ws = TestWorkspace::new();
        let path = ws.write_component("app", "provides:\n  features: [real]\n");
        let store = ws.store();

        let mut cache = DocumentCache::new(SystemTime::now() + std::time::Duration::from_secs(60));
        cache.insert(
            path,
            serde_json::json!({"id": "app", "provides": {"features": ["cached"]}}),
        );
        let mut resolver = Resolver::new(&strings(&["app"]), &[]).with_cache(cache);
        assert!(resolver.resolve(&store).is_valid());
        assert!(resolver.state().required_features.contains("cached"));

        let stale = DocumentCache::new(SystemTime::UNIX_EPOCH);
        let mut resolver = Resolver::new(&strings(&["app"]), &[]).with_cache(stale);
        assert!(resolver.resolve(&store).is_valid());
        assert!(resolver.state().required_features.contains("real"));
    }

    #[test]
    fn test_into_error_formats_choices() {
        let error = ResolutionResult::HasIncompleteChoices(vec![(
            "app".to_string(),
            "port".to_string(),
        )])
        .into_error()
        .unwrap();
        assert_eq!(error.to_string(), "Incomplete choices: app:port");
        assert!(ResolutionResult::Valid.into_error().is_none());
    }
}
