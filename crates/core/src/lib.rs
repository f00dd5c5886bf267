//! # Preflight Core
//!
//! Domain types, traits, and error definitions for the Preflight
//! conversation-preparation and model-dispatch pipeline. This crate has
//! **zero framework dependencies** — it defines the domain model that all
//! other crates implement against.
//!
//! ## Design Philosophy
//!
//! The provider abstraction is a trait here; concrete HTTP clients live in
//! `preflight-providers`. Everything that flows through the pipeline —
//! messages, turns, conversation windows, reasoning configs — is defined
//! once in this crate so that the trimmer, the reflect chain, and the
//! gateway all speak the same types.

pub mod error;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use error::{DispatchError, EmbeddingError, ProviderError, ValidationError};
pub use message::{ConversationWindow, Message, Role, Turn, estimate_tokens};
pub use provider::{
    EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse,
    ReasoningConfig, ReasoningOverride, StreamChunk, Usage,
};
