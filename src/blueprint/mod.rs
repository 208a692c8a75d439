//! Blueprints: production rules extracted from the project summary.
//!
//! Components declare blueprints under a `blueprints` mapping:
//!
//! ```yaml
//! blueprints:
//!   "{{project_output}}/{{project_name}}.elf":
//!     depends:
//!       - "{{aggregate(pointer='/sources')}}"
//!       - data: ":/gcc/flags"
//!     process:
//!       - gcc: "-o {{target}} {{aggregate(pointer='/sources')}}"
//!   object:
//!     regex: "{{project_output}}/(.+)\\.o"
//!     depends:
//!       - "{{capture(i=1)}}.c"
//!       - dependency_file: "{{project_output}}/{{capture(i=1)}}.d"
//!     process:
//!       - create_directory: "{{dir(path=target)}}"
//!       - execute: "cc -MMD -c {{capture(i=1)}}.c -o {{target}}"
//! ```
//!
//! The key, or the `regex` value when present, is rendered against the summary
//! to produce the target pattern. Regex patterns must match the whole target.

pub mod expander;

use regex::Regex;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::build::commands::BlueprintCommand;
use crate::templating::TemplateRenderer;

pub use expander::{
    TargetDatabase, find_matches, parse_dependency_file, split_rendered_list,
};

/// How a blueprint selects targets.
#[derive(Debug, Clone)]
pub enum BlueprintPattern {
    /// Exact target name
    Literal(String),
    /// Regex matched against the whole target name
    Regex(Regex),
}

impl BlueprintPattern {
    /// Compile a regex pattern anchored at both ends.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(&format!("^(?:{pattern})$")).map(Self::Regex)
    }

    /// Capture groups if `target` matches, group 0 being the whole target.
    pub fn captures(&self, target: &str) -> Option<Vec<String>> {
        match self {
            Self::Literal(literal) => (literal == target).then(|| vec![target.to_string()]),
            Self::Regex(regex) => regex.captures(target).map(|caps| {
                caps.iter()
                    .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect()
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Literal(literal) => literal,
            Self::Regex(regex) => regex.as_str(),
        }
    }
}

/// A templated dependency of a blueprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    /// Target name, or a `[a, b]` sequence of target names
    Default(String),
    /// Value in the project summary, `:/<component>/<pointer>`
    Data(String),
    /// Compiler-generated dependency listing (`.d` file)
    DependencyFile(String),
}

impl Dependency {
    fn parse(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Default(s.clone())),
            Value::Object(map) if map.len() == 1 => {
                let (kind, template) = map.iter().next()?;
                let template = template.as_str()?.to_string();
                match kind.as_str() {
                    "data" => Some(Self::Data(template)),
                    "dependency_file" => Some(Self::DependencyFile(template)),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

/// A production rule.
#[derive(Debug, Clone)]
pub struct Blueprint {
    pub pattern: BlueprintPattern,
    pub dependencies: Vec<Dependency>,
    pub process: Vec<BlueprintCommand>,
    /// Directory of the declaring component
    pub parent_path: PathBuf,
    /// Id of the declaring component
    pub owner: String,
}

impl Blueprint {
    /// Build a blueprint from its declaration. `key` is the rendered mapping key.
    pub fn from_declaration(
        key: &str,
        declaration: &Value,
        owner: &str,
        parent_path: PathBuf,
        renderer: &TemplateRenderer,
    ) -> Result<Self, String> {
        let pattern = match declaration.get("regex") {
            Some(Value::String(regex)) => {
                let rendered = renderer.render(regex).map_err(|e| e.to_string())?;
                BlueprintPattern::regex(&rendered).map_err(|e| format!("invalid regex: {e}"))?
            }
            Some(other) => return Err(format!("'regex' must be a string, found {other}")),
            None => BlueprintPattern::Literal(renderer.render(key).map_err(|e| e.to_string())?),
        };

        let dependencies = match declaration.get("depends") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| {
                    let dependency = Dependency::parse(item);
                    if dependency.is_none() {
                        warn!("Blueprint '{key}' in '{owner}': ignoring dependency {item}");
                    }
                    dependency
                })
                .collect(),
            Some(single) => Dependency::parse(single).into_iter().collect(),
        };

        let process = match declaration.get("process") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(steps)) => steps
                .iter()
                .map(BlueprintCommand::from_step)
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => return Err(format!("'process' must be a list, found {other}")),
        };

        Ok(Self {
            pattern,
            dependencies,
            process,
            parent_path,
            owner: owner.to_string(),
        })
    }
}

/// All blueprints of a project, in registration order.
///
/// Several blueprints may share a pattern; a target is produced by every
/// blueprint whose pattern matches it.
#[derive(Debug, Clone, Default)]
pub struct BlueprintDatabase {
    blueprints: Vec<Arc<Blueprint>>,
}

impl BlueprintDatabase {
    /// Extract blueprints from every component of a project summary.
    ///
    /// Components are visited in summary order and blueprints in declaration
    /// order. Blueprints that fail to render or parse are logged and skipped.
    pub fn from_summary(summary: &Arc<Value>) -> Self {
        let mut database = Self::default();
        let Some(components) = summary.get("components").and_then(Value::as_object) else {
            return database;
        };

        let base = TemplateRenderer::new(Arc::clone(summary));
        for (id, component) in components {
            let Some(blueprints) = component.get("blueprints").and_then(Value::as_object) else {
                continue;
            };
            let parent_path = component
                .get("directory")
                .and_then(Value::as_str)
                .map(PathBuf::from)
                .unwrap_or_default();
            let renderer = base.clone().with_curdir(&parent_path);

            for (key, declaration) in blueprints {
                match Blueprint::from_declaration(key, declaration, id, parent_path.clone(), &renderer) {
                    Ok(blueprint) => {
                        debug!("Blueprint '{}' from '{id}'", blueprint.pattern.as_str());
                        database.push(blueprint);
                    }
                    Err(e) => warn!("Skipping blueprint '{key}' in '{id}': {e}"),
                }
            }
        }

        database
    }

    pub fn push(&mut self, blueprint: Blueprint) {
        self.blueprints.push(Arc::new(blueprint));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Blueprint>> {
        self.blueprints.iter()
    }

    pub fn len(&self) -> usize {
        self.blueprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blueprints.is_empty()
    }
}

/// The result of matching one target against one blueprint.
#[derive(Debug, Clone)]
pub struct BlueprintMatch {
    pub blueprint: Arc<Blueprint>,
    pub target: String,
    /// Capture groups, group 0 being the whole target
    pub regex_matches: Vec<String>,
    /// Rendered dependencies; data dependencies keep their `:` prefix
    pub dependencies: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn summary() -> Arc<Value> {
        Arc::new(json!({
            "project_output": "out/demo",
            "components": {
                "app": {
                    "directory": "/ws/components/app",
                    "blueprints": {
                        "{{project_output}}/app.elf": {
                            "depends": ["a.o", {"data": ":/app/flags"}, {"dependency_file": "app.d"}],
                            "process": [{"echo": "linking"}]
                        },
                        "objects": {
                            "regex": "{{project_output}}/(.+)\\.o",
                            "depends": "{{capture(i=1)}}.c"
                        },
                        "broken": {"regex": "(unclosed"}
                    }
                },
                "lib": {"directory": "/ws/components/lib"}
            }
        }))
    }

    #[test]
    fn test_blueprints_extracted_in_order_and_rendered() {
        let database = BlueprintDatabase::from_summary(&summary());
        assert_eq!(database.len(), 2);

        let patterns: Vec<&str> = database.iter().map(|b| b.pattern.as_str()).collect();
        assert_eq!(patterns, vec!["out/demo/app.elf", "^(?:out/demo/(.+)\\.o)$"]);

        let elf = &database.iter().next().unwrap();
        assert_eq!(elf.owner, "app");
        assert_eq!(elf.parent_path, PathBuf::from("/ws/components/app"));
        assert_eq!(
            elf.dependencies,
            vec![
                Dependency::Default("a.o".to_string()),
                Dependency::Data(":/app/flags".to_string()),
                Dependency::DependencyFile("app.d".to_string()),
            ]
        );
        assert_eq!(elf.process.len(), 1);
    }

    #[test]
    fn test_pattern_captures() {
        let literal = BlueprintPattern::Literal("all".to_string());
        assert_eq!(literal.captures("all"), Some(vec!["all".to_string()]));
        assert_eq!(literal.captures("all2"), None);

        let regex = BlueprintPattern::regex(r"build/(\w+)\.o").unwrap();
        assert_eq!(
            regex.captures("build/main.o"),
            Some(vec!["build/main.o".to_string(), "main".to_string()])
        );
        // Full-string match only.
        assert_eq!(regex.captures("x/build/main.o"), None);
        assert_eq!(regex.captures("build/main.obj"), None);
    }

    #[test]
    fn test_optional_group_becomes_empty_string() {
        let regex = BlueprintPattern::regex(r"(a)?b").unwrap();
        assert_eq!(regex.captures("b"), Some(vec!["b".to_string(), String::new()]));
    }
}
