//! Token-budgeted history trimming for Preflight.
//!
//! [`ContextTrimmer`] bounds a conversation window to a token budget while
//! honoring a minimum-turns floor, and reports how much of the window
//! survived both in tokens (compress ratio) and in meaning (semantic
//! retention, via [`RetentionScorer`] embeddings). Each trim feeds one
//! sample into the shared metrics registry.

pub mod retention;
pub mod trimmer;

pub use retention::RetentionScorer;
pub use trimmer::{ContextTrimmer, TrimResult};
