//! Prethought decomposition — raw user input to a structured intent block.
//!
//! A fixed template with four labeled dimensions. Decomposition never
//! fails: a dimension that cannot be inferred is emitted as an explicit
//! empty string, and all four keys are always present — downstream
//! consumers rely on that.

use serde::{Deserialize, Serialize};

const CONSTRAINT_MARKERS: &[&str] = &[
    "must", "only", "without", "never", "at least", "at most", "except",
];

/// The decomposed intent of a user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredIntent {
    /// What the user is trying to achieve.
    pub purpose: String,
    /// Stated restrictions on the answer.
    pub constraints: String,
    /// The point of view the user asked for.
    pub perspective: String,
    /// The shape of result the user expects.
    pub expectation: String,
}

impl StructuredIntent {
    /// Render the bracketed system block injected ahead of history.
    pub fn render(&self) -> String {
        format!(
            "[prethought]\npurpose: {}\nconstraints: {}\nperspective: {}\nexpectation: {}",
            self.purpose, self.constraints, self.perspective, self.expectation
        )
    }
}

/// Decomposes user input into a [`StructuredIntent`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PrethoughtDecomposer;

impl PrethoughtDecomposer {
    pub fn new() -> Self {
        Self
    }

    /// Decompose raw input. Total: every input produces all four fields.
    pub fn decompose(&self, input: &str) -> StructuredIntent {
        let trimmed = input.trim();

        StructuredIntent {
            purpose: purpose_of(trimmed),
            constraints: constraints_of(trimmed),
            perspective: perspective_of(trimmed),
            expectation: expectation_of(trimmed),
        }
    }
}

fn purpose_of(input: &str) -> String {
    let first = sentences(input).next().unwrap_or("").trim();
    truncate(first, 160)
}

fn constraints_of(input: &str) -> String {
    let found: Vec<&str> = sentences(input)
        .filter(|s| {
            let low = s.to_lowercase();
            CONSTRAINT_MARKERS.iter().any(|m| low.contains(m))
        })
        .map(str::trim)
        .collect();
    truncate(&found.join("; "), 240)
}

fn perspective_of(input: &str) -> String {
    let lower = input.to_lowercase();
    for marker in ["as a ", "as an ", "from the perspective of "] {
        // Offsets into `lower` only line up with `input` for ASCII text;
        // the boundary check guards the non-ASCII case.
        if let Some(pos) = lower.find(marker) {
            if !input.is_char_boundary(pos) {
                continue;
            }
            let fragment = &input[pos..];
            let end = fragment
                .find(['.', ',', '\n'])
                .unwrap_or(fragment.len());
            return truncate(fragment[..end].trim(), 120);
        }
    }
    String::new()
}

fn expectation_of(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }
    if input.contains('?') {
        "a direct answer to the question".into()
    } else {
        "a concrete, immediately usable result".into()
    }
}

fn sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split(['.', '!', '?', '\n']).filter(|s| !s.trim().is_empty())
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_four_fields_always_present() {
        let intent = PrethoughtDecomposer::new().decompose("");
        assert_eq!(intent.purpose, "");
        assert_eq!(intent.constraints, "");
        assert_eq!(intent.perspective, "");
        assert_eq!(intent.expectation, "");

        let rendered = intent.render();
        for key in ["purpose:", "constraints:", "perspective:", "expectation:"] {
            assert!(rendered.contains(key), "missing {key}");
        }
    }

    #[test]
    fn purpose_is_first_sentence() {
        let intent =
            PrethoughtDecomposer::new().decompose("Summarize this report. Keep it short.");
        assert_eq!(intent.purpose, "Summarize this report");
    }

    #[test]
    fn constraints_detected() {
        let intent = PrethoughtDecomposer::new()
            .decompose("Write a haiku. It must mention rain and never use rhyme.");
        assert!(intent.constraints.contains("must mention rain"));
    }

    #[test]
    fn perspective_detected() {
        let intent =
            PrethoughtDecomposer::new().decompose("Explain monads as a kindergarten teacher, briefly.");
        assert_eq!(intent.perspective, "as a kindergarten teacher");
    }

    #[test]
    fn question_sets_expectation() {
        let intent = PrethoughtDecomposer::new().decompose("What is the capital of France?");
        assert_eq!(intent.expectation, "a direct answer to the question");
    }

    #[test]
    fn decompose_is_deterministic() {
        let d = PrethoughtDecomposer::new();
        let input = "As a reviewer, list the issues. Only include blocking ones.";
        assert_eq!(d.decompose(input), d.decompose(input));
    }

    #[test]
    fn render_starts_with_block_label() {
        let rendered = PrethoughtDecomposer::new().decompose("Do the thing").render();
        assert!(rendered.starts_with("[prethought]\n"));
    }

    #[test]
    fn long_purpose_is_truncated() {
        let long = "a".repeat(500);
        let intent = PrethoughtDecomposer::new().decompose(&long);
        assert!(intent.purpose.len() < 500);
        assert!(intent.purpose.ends_with('…'));
    }
}
