//! Choice evaluation.
//!
//! A choice is satisfied when exactly one of its listed features or components
//! is part of the resolved build. Evaluation is read-only.

use std::collections::{BTreeSet, HashSet};

use crate::component::{Choice, ComponentDocument, normalize_id};

/// Outcome of evaluating every declared choice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChoiceReport {
    /// `(owner component, choice name)` for choices with no option selected
    pub incomplete: Vec<(String, String)>,
    /// Names of choices with more than one option selected
    pub overfull: Vec<String>,
}

impl ChoiceReport {
    pub fn is_satisfied(&self) -> bool {
        self.incomplete.is_empty() && self.overfull.is_empty()
    }
}

/// Number of the choice's options present in the resolved sets.
pub fn selected_options(
    choice: &Choice,
    required_features: &BTreeSet<String>,
    required_components: &BTreeSet<String>,
) -> usize {
    let features = choice.features.iter().filter(|f| required_features.contains(*f)).count();
    let components = choice
        .components
        .iter()
        .filter(|c| required_components.contains(normalize_id(c)))
        .count();
    features + components
}

/// Evaluate the choices declared by `components`.
///
/// When several components declare a choice with the same name, the first
/// declaration in component order is the one evaluated.
pub fn evaluate(
    components: &[ComponentDocument],
    required_features: &BTreeSet<String>,
    required_components: &BTreeSet<String>,
) -> ChoiceReport {
    let mut report = ChoiceReport::default();
    let mut seen = HashSet::new();

    for component in components {
        for (name, choice) in component.choices() {
            if !seen.insert(name.clone()) {
                continue;
            }
            match selected_options(&choice, required_features, required_components) {
                0 => report.incomplete.push((component.id.clone(), name)),
                1 => {}
                _ => report.overfull.push(name),
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn component_with_choice() -> Vec<ComponentDocument> {
        vec![
            ComponentDocument::parse(
                "choices:\n  transport:\n    features: [f1, f2]\n",
                Path::new("/c/app.yakka"),
            )
            .unwrap(),
        ]
    }

    fn features(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_exactly_one_option_is_satisfied() {
        let report = evaluate(&component_with_choice(), &features(&["f1"]), &BTreeSet::new());
        assert!(report.is_satisfied());
    }

    #[test]
    fn test_no_option_is_incomplete() {
        let report = evaluate(&component_with_choice(), &features(&[]), &BTreeSet::new());
        assert_eq!(report.incomplete, vec![("app".to_string(), "transport".to_string())]);
        assert!(report.overfull.is_empty());
    }

    #[test]
    fn test_two_options_is_overfull() {
        let report = evaluate(&component_with_choice(), &features(&["f1", "f2"]), &BTreeSet::new());
        assert!(report.incomplete.is_empty());
        assert_eq!(report.overfull, vec!["transport".to_string()]);
    }

    #[test]
    fn test_component_options_count() {
        let components = vec![
            ComponentDocument::parse(
                "choices:\n  rtos:\n    components: [ns.freertos, zephyr]\n",
                Path::new("/c/board.yakka"),
            )
            .unwrap(),
        ];
        let required = features(&["board", "freertos"]);
        assert!(evaluate(&components, &BTreeSet::new(), &required).is_satisfied());
    }

    #[test]
    fn test_duplicate_choice_names_evaluated_once() {
        let mut components = component_with_choice();
        components.push(
            ComponentDocument::parse(
                "choices:\n  transport:\n    features: [other]\n",
                Path::new("/c/lib.yakka"),
            )
            .unwrap(),
        );
        let report = evaluate(&components, &features(&[]), &BTreeSet::new());
        assert_eq!(report.incomplete.len(), 1);
        assert_eq!(report.incomplete[0].0, "app");
    }
}
