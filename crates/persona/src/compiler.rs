//! Persona compiler — renders a persona definition into a system directive.
//!
//! The compiler is a pure transform: identical input always yields a
//! byte-identical directive. A configurable set of forbidden patterns is
//! checked against both the raw definition fields and the rendered text;
//! any match fails compilation with the offending pattern named — content
//! is never silently stripped.

use preflight_core::error::ValidationError;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Directive used when no persona is configured at all.
pub const DEFAULT_DIRECTIVE: &str = "You are Preflight, a helpful, precise assistant.";

/// A structured persona definition, typically supplied as YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaDefinition {
    /// Assistant name.
    #[serde(default = "default_name")]
    pub name: String,

    /// Tone description, rendered verbatim into the directive.
    #[serde(default = "default_style")]
    pub style: String,

    /// Things the assistant must strictly avoid.
    #[serde(default)]
    pub forbid: Vec<String>,

    /// Free-form supplementary notes.
    #[serde(default)]
    pub notes: String,
}

fn default_name() -> String {
    "Preflight".into()
}
fn default_style() -> String {
    "calm, concise".into()
}

impl Default for PersonaDefinition {
    fn default() -> Self {
        Self {
            name: default_name(),
            style: default_style(),
            forbid: Vec::new(),
            notes: String::new(),
        }
    }
}

/// Compiles persona definitions into system directives.
pub struct PersonaCompiler {
    forbidden: Vec<Regex>,
}

impl PersonaCompiler {
    /// Build a compiler from configured prohibition patterns.
    ///
    /// Patterns that fail to compile are skipped with a warning — a broken
    /// pattern must not take the whole pipeline down.
    pub fn new(patterns: &[String]) -> Self {
        let mut forbidden = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            if pattern.is_empty() {
                continue;
            }
            match Regex::new(pattern) {
                Ok(re) => forbidden.push(re),
                Err(e) => warn!(pattern = %pattern, error = %e, "Skipping invalid forbidden pattern"),
            }
        }
        Self { forbidden }
    }

    /// Compile a definition into a system directive.
    pub fn compile(&self, definition: &PersonaDefinition) -> Result<String, ValidationError> {
        let directive = render(definition);

        // Scan raw fields first so the reported pattern points at what the
        // author wrote, then the rendered text as a whole.
        let mut haystacks: Vec<&str> = vec![&definition.name, &definition.style, &definition.notes];
        haystacks.extend(definition.forbid.iter().map(String::as_str));
        haystacks.push(&directive);

        for re in &self.forbidden {
            for text in &haystacks {
                if re.is_match(text) {
                    return Err(ValidationError::ForbiddenContent {
                        pattern: re.as_str().to_string(),
                    });
                }
            }
        }

        Ok(directive)
    }

    /// Compile a user-supplied YAML persona.
    ///
    /// Blank input falls back to the default directive; malformed YAML is a
    /// validation error, not a panic.
    pub fn compile_yaml(&self, yaml: &str) -> Result<String, ValidationError> {
        if yaml.trim().is_empty() {
            return Ok(DEFAULT_DIRECTIVE.to_string());
        }
        let definition: PersonaDefinition = serde_yaml::from_str(yaml)
            .map_err(|e| ValidationError::InvalidDefinition(e.to_string()))?;
        self.compile(&definition)
    }
}

fn render(definition: &PersonaDefinition) -> String {
    let mut sections = vec![
        format!(
            "You are {}. Maintain {} tone.",
            definition.name, definition.style
        ),
        "Be accurate, helpful, and safe.".to_string(),
    ];
    if !definition.forbid.is_empty() {
        sections.push(format!(
            "Avoid the following strictly: {}",
            definition.forbid.join(", ")
        ));
    }
    if !definition.notes.trim().is_empty() {
        sections.push(format!("Additional notes:\n{}", definition.notes.trim()));
    }
    sections.join("\n\n")
}
