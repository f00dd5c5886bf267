//! Persona compilation and intent decomposition for Preflight.
//!
//! Two small, pure framing stages that run before any provider call:
//!
//! - [`PersonaCompiler`] turns a structured persona definition into the
//!   system directive governing tone and prohibitions, rejecting banned
//!   content outright instead of silently stripping it.
//! - [`PrethoughtDecomposer`] turns raw user input into a four-field
//!   structured intent block injected ahead of the conversation history.

pub mod compiler;
pub mod prethought;

pub use compiler::{PersonaCompiler, PersonaDefinition};
pub use prethought::{PrethoughtDecomposer, StructuredIntent};
