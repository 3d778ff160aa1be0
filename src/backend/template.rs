//! Placeholder substitution for backend command templates.
//!
//! # Syntax
//!
//! - `{name}` - Substitutes the value of variable `name` (surrounding
//!   whitespace inside the braces is ignored)
//! - `{{` - Renders as literal `{`
//! - `}}` - Renders as literal `}`
//!
//! Referencing a variable that was not provided is an error, so a typo in
//! the configured command fails loudly instead of producing an empty argument.

use std::collections::HashMap;
use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

/// Error type for template rendering failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A variable was referenced but not provided.
    UndefinedVariable { name: String, position: usize },
    /// A `{` was found without a matching `}`.
    UnmatchedBrace { position: usize },
    /// An empty variable name was found (e.g., `{}`).
    EmptyVariableName { position: usize },
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::UndefinedVariable { name, position } => {
                write!(f, "undefined variable '{}' at position {}", name, position)
            }
            TemplateError::UnmatchedBrace { position } => {
                write!(f, "unmatched '{{' at position {}", position)
            }
            TemplateError::EmptyVariableName { position } => {
                write!(f, "empty variable name '{{}}' at position {}", position)
            }
        }
    }
}

impl std::error::Error for TemplateError {}

/// Render `template`, substituting `{name}` placeholders from `variables`.
///
/// # Examples
///
/// ```no_run
/// use std::collections::HashMap;
/// use cmdgpt::backend::render_template;
///
/// let vars = HashMap::from([("model", "gpt-4")]);
/// let command = render_template("llm --model {model}", &vars).unwrap();
/// assert_eq!(command, "llm --model gpt-4");
/// ```
pub fn render_template(
    template: &str,
    variables: &HashMap<&str, &str>,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        match ch {
            '{' if chars.next_if(|&(_, c)| c == '{').is_some() => out.push('{'),
            '{' => {
                let name = read_name(&mut chars, pos)?;
                let value = variables
                    .get(name.as_str())
                    .ok_or(TemplateError::UndefinedVariable {
                        name: name.clone(),
                        position: pos,
                    })?;
                out.push_str(value);
            }
            // `}}` collapses to one brace; a lone `}` is kept as-is.
            '}' => {
                chars.next_if(|&(_, c)| c == '}');
                out.push('}');
            }
            _ => out.push(ch),
        }
    }

    Ok(out)
}

fn read_name(chars: &mut Peekable<CharIndices<'_>>, open: usize) -> Result<String, TemplateError> {
    let mut raw = String::new();
    loop {
        match chars.next() {
            Some((_, '}')) => break,
            Some((_, c)) => raw.push(c),
            None => return Err(TemplateError::UnmatchedBrace { position: open }),
        }
    }

    let name = raw.trim();
    if name.is_empty() {
        return Err(TemplateError::EmptyVariableName { position: open });
    }
    Ok(name.to_string())
}

/// Names accepted in a template given `variables`, sorted, for error messages.
pub fn variable_names(variables: &HashMap<&str, &str>) -> String {
    let mut names: Vec<&str> = variables.keys().copied().collect();
    names.sort_unstable();
    names.join(", ")
}
