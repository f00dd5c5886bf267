//! Provider dispatcher — capability-aware parameter negotiation and call
//! issuance.
//!
//! The dispatcher is the single place where outbound calls are shaped: it
//! normalizes the reasoning configuration against the capability registry,
//! picks the concrete client via the router, and forwards the call. It
//! never retries — retry/backoff, if any, belongs to the provider client.

use crate::capability::{ModelCapability, ModelCapabilityRegistry};
use crate::router::ProviderRouter;
use preflight_core::error::{DispatchError, ProviderError};
use preflight_core::message::Message;
use preflight_core::provider::{
    Provider, ProviderRequest, ProviderResponse, ReasoningConfig, ReasoningOverride, StreamChunk,
};
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;
use tracing::debug;

/// Normalize a reasoning configuration for a model.
///
/// Deterministic, in three steps:
/// 1. defaults — effort from the capability, `parallel: Some(true)` only
///    for parallel-capable models;
/// 2. caller override fields win field-by-field;
/// 3. `parallel` is unconditionally removed for non-parallel models,
///    regardless of what the caller requested. `effort` is always present.
pub fn normalize_reasoning(
    capability: &ModelCapability,
    user: Option<&ReasoningOverride>,
) -> ReasoningConfig {
    let mut config = ReasoningConfig {
        effort: capability.default_effort.clone(),
        parallel: capability.supports_parallel_reasoning.then_some(true),
    };

    if let Some(user) = user {
        if let Some(effort) = &user.effort {
            config.effort = effort.clone();
        }
        if let Some(parallel) = user.parallel {
            config.parallel = Some(parallel);
        }
    }

    if !capability.supports_parallel_reasoning {
        config.parallel = None;
    }

    config
}

/// Issues provider calls with normalized per-model parameters.
pub struct ProviderDispatcher {
    router: ProviderRouter,
    registry: Arc<ModelCapabilityRegistry>,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl ProviderDispatcher {
    pub fn new(router: ProviderRouter, registry: Arc<ModelCapabilityRegistry>) -> Self {
        Self {
            router,
            registry,
            temperature: 0.7,
            max_tokens: None,
        }
    }

    /// Set the sampling temperature for outbound calls.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the default max tokens per response.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// The capability registry backing this dispatcher.
    pub fn registry(&self) -> &Arc<ModelCapabilityRegistry> {
        &self.registry
    }

    /// Normalize a caller-supplied reasoning override for `model_id`.
    pub fn normalize(
        &self,
        model_id: &str,
        user: Option<&ReasoningOverride>,
    ) -> ReasoningConfig {
        normalize_reasoning(&self.registry.capability_of(model_id), user)
    }

    fn prepare(
        &self,
        model: &str,
        messages: Vec<Message>,
        user: Option<&ReasoningOverride>,
        stream: bool,
    ) -> Result<(Arc<dyn Provider>, ProviderRequest, String), DispatchError> {
        let provider_name = self.registry.provider_of(model);
        let provider =
            self.router
                .get(&provider_name)
                .ok_or_else(|| DispatchError {
                    provider: provider_name.clone(),
                    model: model.to_string(),
                    source: ProviderError::NotConfigured(format!(
                        "no client registered for provider `{provider_name}`"
                    )),
                })?;

        let reasoning = self.normalize(model, user);
        debug!(
            provider = %provider_name,
            model = %model,
            effort = %reasoning.effort,
            parallel = ?reasoning.parallel,
            "Dispatching provider call"
        );

        let request = ProviderRequest {
            model: model.to_string(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            reasoning: Some(reasoning),
            stream,
        };

        Ok((provider, request, provider_name))
    }

    /// Issue a non-streaming call.
    pub async fn complete(
        &self,
        model: &str,
        messages: Vec<Message>,
        user: Option<&ReasoningOverride>,
    ) -> Result<ProviderResponse, DispatchError> {
        let (provider, request, provider_name) = self.prepare(model, messages, user, false)?;
        provider.complete(request).await.map_err(|source| DispatchError {
            provider: provider_name,
            model: model.to_string(),
            source,
        })
    }

    /// Issue a streaming call, yielding incremental text fragments.
    pub async fn stream(
        &self,
        model: &str,
        messages: Vec<Message>,
        user: Option<&ReasoningOverride>,
    ) -> Result<Receiver<Result<StreamChunk, ProviderError>>, DispatchError> {
        let (provider, request, provider_name) = self.prepare(model, messages, user, true)?;
        provider.stream(request).await.map_err(|source| DispatchError {
            provider: provider_name,
            model: model.to_string(),
            source,
        })
    }
}
