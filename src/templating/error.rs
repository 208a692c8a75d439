//! Template error types.

/// Errors produced while rendering a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A variable used by the template is not in the context
    VariableNotFound {
        variable: String,
        /// Similar top-level names from the context
        suggestions: Vec<String>,
    },

    /// The template failed to parse or a function call failed
    SyntaxError {
        message: String,
        /// Line reported by tera, if any
        line: Option<usize>,
    },

    /// Nested `render()` calls went deeper than allowed
    RenderDepthExceeded {
        depth: usize,
    },
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateError::VariableNotFound {
                variable,
                suggestions,
            } => {
                write!(f, "Template variable not found: '{variable}'")?;
                if !suggestions.is_empty() {
                    write!(f, " (did you mean {}?)", suggestions.join(", "))?;
                }
                Ok(())
            }
            TemplateError::SyntaxError {
                message,
                line: Some(line),
            } => write!(f, "Template error at line {line}: {message}"),
            TemplateError::SyntaxError {
                message,
                line: None,
            } => write!(f, "Template error: {message}"),
            TemplateError::RenderDepthExceeded {
                depth,
            } => write!(f, "render() nested deeper than {depth} levels"),
        }
    }
}

impl std::error::Error for TemplateError {}
