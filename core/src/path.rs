//! Path templates with named placeholders.
//!
//! A template such as `https://api.example.com/users/:id/posts/:post` is
//! compiled once into literal and placeholder segments, then rendered per
//! request from the Intent's parameters.
//!
//! A placeholder is `:` followed by a name that starts with an ASCII letter
//! or `_` and continues with ASCII letters, digits or `_`. Any other `:` is
//! literal text, so schemes (`https://`) and ports (`:8080`) are left alone.

use crate::error::TemplateError;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// Compiled path template.
///
/// # Examples
///
/// ```
/// use composable_request_core::path::PathTemplate;
/// use serde_json::json;
///
/// let template = PathTemplate::compile("https://x/users/:id");
/// assert_eq!(template.render(&json!({"id": "a b"})).unwrap(), "https://x/users/a%20b");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Compile a template
    ///
    /// Every string is a valid template; text that is not a placeholder is
    /// kept verbatim.
    #[must_use]
    pub fn compile(template: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            let starts_name = c == ':'
                && chars
                    .peek()
                    .is_some_and(|next| next.is_ascii_alphabetic() || *next == '_');
            if !starts_name {
                literal.push(c);
                continue;
            }

            let mut name = String::new();
            while let Some(next) = chars.peek().copied() {
                if next.is_ascii_alphanumeric() || next == '_' {
                    name.push(next);
                    chars.next();
                } else {
                    break;
                }
            }

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Placeholder(name));
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self {
            source: template.to_string(),
            segments,
        }
    }

    /// Placeholder names in template order
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Whether the template has at least one placeholder
    #[must_use]
    pub fn has_placeholders(&self) -> bool {
        self.placeholders().next().is_some()
    }

    /// The template text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Render an address from JSON parameters
    ///
    /// String values are percent-encoded; numbers and booleans are inserted
    /// as their JSON text. Without placeholders the parameters are ignored.
    ///
    /// # Errors
    ///
    /// - [`TemplateError::ParamsNotObject`] if there are placeholders and
    ///   `params` is not an object
    /// - [`TemplateError::MissingParameter`] if a placeholder has no key
    /// - [`TemplateError::NonPrimitive`] if a value is null, an array or an object
    pub fn render(&self, params: &Value) -> Result<String, TemplateError> {
        if !self.has_placeholders() {
            return Ok(self.source.clone());
        }

        let values = params.as_object().ok_or(TemplateError::ParamsNotObject)?;
        let mut address = String::with_capacity(self.source.len());

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => address.push_str(text),
                Segment::Placeholder(name) => {
                    let value = values
                        .get(name)
                        .ok_or_else(|| TemplateError::MissingParameter { name: name.clone() })?;
                    match value {
                        Value::String(text) => address.push_str(&urlencoding::encode(text)),
                        Value::Number(number) => address.push_str(&number.to_string()),
                        Value::Bool(flag) => address.push_str(if *flag { "true" } else { "false" }),
                        Value::Null | Value::Array(_) | Value::Object(_) => {
                            return Err(TemplateError::NonPrimitive { name: name.clone() });
                        },
                    }
                },
            }
        }

        Ok(address)
    }

    /// Render an address from any serializable parameters
    ///
    /// # Errors
    ///
    /// [`TemplateError::Serialize`] if `params` cannot be turned into JSON,
    /// otherwise the errors of [`PathTemplate::render`].
    pub fn render_params<P: Serialize>(&self, params: &P) -> Result<String, TemplateError> {
        if !self.has_placeholders() {
            return Ok(self.source.clone());
        }
        let value =
            serde_json::to_value(params).map_err(|e| TemplateError::Serialize(e.to_string()))?;
        self.render(&value)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for PathTemplate {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::compile(s))
    }
}

impl From<&str> for PathTemplate {
    fn from(template: &str) -> Self {
        Self::compile(template)
    }
}
