//! StringTemplate - field interpolation against events
//!
//! `{field}` placeholders are replaced with the event's field value. A
//! template with a placeholder whose field is missing does not resolve.

use std::fmt;

use crate::{ContractError, Event};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Field(String),
}

/// Compiled string template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringTemplate {
    original: String,
    parts: Vec<Part>,
}

impl StringTemplate {
    /// Compile a template string.
    ///
    /// # Errors
    /// Unterminated or empty placeholders.
    pub fn compile(template: &str) -> Result<Self, ContractError> {
        let mut parts = Vec::new();
        let mut rest = template;

        while let Some(start) = rest.find('{') {
            if start > 0 {
                parts.push(Part::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 1..];
            let end = after.find('}').ok_or_else(|| ContractError::Template {
                template: template.to_string(),
                message: "unterminated placeholder".to_string(),
            })?;
            let field = after[..end].trim();
            if field.is_empty() {
                return Err(ContractError::Template {
                    template: template.to_string(),
                    message: "empty placeholder".to_string(),
                });
            }
            parts.push(Part::Field(field.to_string()));
            rest = &after[end + 1..];
        }
        if !rest.is_empty() {
            parts.push(Part::Literal(rest.to_string()));
        }

        Ok(Self {
            original: template.to_string(),
            parts,
        })
    }

    /// Resolve against an event, `None` when a referenced field is missing
    pub fn format(&self, event: &Event) -> Option<String> {
        let mut out = String::with_capacity(self.original.len());
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Field(name) => out.push_str(&event.value_as_string(name)?),
            }
        }
        Some(out)
    }

    /// Whether the template has no placeholders
    pub fn is_constant(&self) -> bool {
        self.parts.iter().all(|p| matches!(p, Part::Literal(_)))
    }

    /// The template as written
    pub fn original(&self) -> &str {
        &self.original
    }
}

impl fmt::Display for StringTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event() -> Event {
        Event::from_json(json!({"app": "billing", "env": "prod", "shard": 7})).unwrap()
    }

    #[test]
    fn test_constant_template() {
        let t = StringTemplate::compile("logs").unwrap();
        assert!(t.is_constant());
        assert_eq!(t.format(&event()).as_deref(), Some("logs"));
    }

    #[test]
    fn test_field_interpolation() {
        let t = StringTemplate::compile("{app}-{env}/{shard}").unwrap();
        assert!(!t.is_constant());
        assert_eq!(t.format(&event()).as_deref(), Some("billing-prod/7"));
    }

    #[test]
    fn test_missing_field_does_not_resolve() {
        let t = StringTemplate::compile("{app}-{region}").unwrap();
        assert_eq!(t.format(&event()), None);
    }

    #[test]
    fn test_invalid_templates() {
        assert!(StringTemplate::compile("{app").is_err());
        assert!(StringTemplate::compile("x{}y").is_err());
    }
}
