//! Template rendering for blueprints.
//!
//! Blueprint patterns, dependencies and command arguments are [Tera] templates
//! rendered against the project summary. A fresh [`Tera`] instance is built for
//! every render so that match-specific functions (`capture()`, `curdir()`) can
//! close over their own data without shared state. The context is built once
//! per renderer and shared by its clones until one of them adds a value.
//!
//! The context contains every top-level key of the summary plus:
//!
//! - `regex_matches` - capture groups of the current blueprint match
//! - `curdir` - directory of the declaring component
//! - any values added with [`TemplateRenderer::with_value`] (`target`,
//!   `captured_output` during command pipelines)
//!
//! See [`functions`] for the callable helpers.
//!
//! [Tera]: https://keats.github.io/tera/

pub mod error;
pub mod functions;

use regex::Regex;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use tera::{Context as TeraContext, Tera};

use crate::constants::MAX_RENDER_DEPTH;

pub use error::TemplateError;
pub use functions::aggregate;

static VARIABLE_NOT_FOUND: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"Variable `([^`]+)` not found").ok());
static LINE_COLUMN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(\d+):(\d+)").ok());

/// Render `template` against `data` with no match-specific context.
pub fn render(template: &str, data: &Value) -> Result<String, TemplateError> {
    TemplateRenderer::new(Arc::new(data.clone())).render(template)
}

/// Renders templates against a shared summary and optional match context.
///
/// Cloning is cheap: the summary and the prepared context are shared.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    data: Arc<Value>,
    captures: Arc<Vec<String>>,
    curdir: PathBuf,
    context: Arc<TeraContext>,
    depth: usize,
}

impl TemplateRenderer {
    pub fn new(data: Arc<Value>) -> Self {
        let mut context = match data.as_ref() {
            Value::Object(map) => {
                let mut context = TeraContext::new();
                for (key, value) in map {
                    context.insert(key.as_str(), value);
                }
                context
            }
            _ => TeraContext::new(),
        };
        context.insert("regex_matches", &Vec::<String>::new());
        context.insert("curdir", "");

        Self {
            data,
            captures: Arc::new(Vec::new()),
            curdir: PathBuf::new(),
            context: Arc::new(context),
            depth: 0,
        }
    }

    /// The summary templates are rendered against.
    pub fn data(&self) -> &Arc<Value> {
        &self.data
    }

    /// Regex capture groups of the current match, group 0 first.
    #[must_use]
    pub fn with_captures(mut self, captures: Vec<String>) -> Self {
        Arc::make_mut(&mut self.context).insert("regex_matches", &captures);
        self.captures = Arc::new(captures);
        self
    }

    #[must_use]
    pub fn with_curdir(mut self, curdir: impl Into<PathBuf>) -> Self {
        self.curdir = curdir.into();
        Arc::make_mut(&mut self.context).insert("curdir", &self.curdir.to_string_lossy());
        self
    }

    /// Add a top-level context value.
    #[must_use]
    pub fn with_value(mut self, key: &str, value: Value) -> Self {
        self.set_value(key, value);
        self
    }

    /// Add or replace a top-level context value in place.
    ///
    /// Only copies the context when it is still shared with another renderer.
    pub fn set_value(&mut self, key: &str, value: Value) {
        Arc::make_mut(&mut self.context).insert(key, &value);
    }

    /// Render a template string.
    ///
    /// Strings without template markers are returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns a [`TemplateError`] for syntax errors, unknown variables, failing
    /// functions, or `render()` nesting deeper than [`MAX_RENDER_DEPTH`].
    pub fn render(&self, template: &str) -> Result<String, TemplateError> {
        if !template.contains("{{") && !template.contains("{%") && !template.contains("{#") {
            return Ok(template.to_string());
        }
        if self.depth > MAX_RENDER_DEPTH {
            return Err(TemplateError::RenderDepthExceeded {
                depth: MAX_RENDER_DEPTH,
            });
        }

        let mut tera = Tera::default();
        functions::register(&mut tera, self);

        tera.render_str(template, &self.context).map_err(|e| parse_tera_error(&e, &self.context))
    }

    fn nested(&self) -> Self {
        let mut nested = self.clone();
        nested.depth += 1;
        nested
    }
}

fn parse_tera_error(error: &tera::Error, context: &TeraContext) -> TemplateError {
    let message = format_tera_error(error);

    let variable = VARIABLE_NOT_FOUND
        .as_ref()
        .and_then(|re| re.captures(&message))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());
    if let Some(variable) = variable {
        let available: Vec<String> = match context.clone().into_json() {
            Value::Object(map) => map.keys().cloned().collect(),
            _ => Vec::new(),
        };
        return TemplateError::VariableNotFound {
            suggestions: similar_names(&variable, &available),
            variable,
        };
    }

    let debug = format!("{error:?}");
    let line = LINE_COLUMN
        .as_ref()
        .and_then(|re| re.captures(&debug))
        .and_then(|caps| caps.get(1)?.as_str().parse().ok());
    TemplateError::SyntaxError {
        message,
        line,
    }
}

/// Flatten a tera error chain, dropping tera's internal template name.
pub fn format_tera_error(error: &tera::Error) -> String {
    use std::error::Error;

    let mut messages = Vec::new();
    let mut current: Option<&dyn Error> = Some(error);
    while let Some(err) = current {
        let cleaned = err
            .to_string()
            .replace("while rendering '__tera_one_off'", "")
            .replace("Failed to render '__tera_one_off'", "")
            .replace("Failed to parse '__tera_one_off'", "")
            .replace("'__tera_one_off'", "template")
            .trim()
            .to_string();
        if !cleaned.is_empty() {
            messages.push(cleaned);
        }
        current = err.source();
    }

    if messages.is_empty() {
        "template rendering failed".to_string()
    } else {
        messages.join(": ")
    }
}

fn similar_names(target: &str, available: &[String]) -> Vec<String> {
    let head = target.split('.').next().unwrap_or(target);
    let mut scored: Vec<(usize, &String)> = available
        .iter()
        .map(|name| (strsim::levenshtein(head, name), name))
        .filter(|(distance, _)| *distance <= 3)
        .collect();
    scored.sort();
    scored.into_iter().take(3).map(|(_, name)| name.clone()).collect()
}
