//! LLM provider implementations and dispatch for Preflight.
//!
//! All providers implement the `preflight_core::Provider` trait. The
//! [`ProviderRouter`] selects the concrete client by the capability
//! registry's `provider` field; the [`ProviderDispatcher`] normalizes
//! per-model reasoning parameters before issuing the call.

pub mod capability;
pub mod dispatch;
pub mod gemini;
pub mod openai_compat;
pub mod router;

pub use capability::{ModelCapability, ModelCapabilityRegistry};
pub use dispatch::{ProviderDispatcher, normalize_reasoning};
pub use gemini::GeminiProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::ProviderRouter;
