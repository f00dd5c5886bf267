//! Error types for the Preflight domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Each bounded context
//! has its own error type; only `ValidationError` and `DispatchError` are
//! surfaced to callers as user-facing failures — everything else degrades
//! gracefully.

use thiserror::Error;

/// Persona compilation rejections. The request is aborted before any
/// provider call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("persona definition is not valid YAML: {0}")]
    InvalidDefinition(String),

    #[error("persona contains forbidden content matching `{pattern}`")]
    ForbiddenContent { pattern: String },
}

/// Failures from a concrete provider client (HTTP/SDK level).
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Call cancelled: {0}")]
    Cancelled(String),
}

/// A provider call failure with its dispatch context attached: which
/// provider, which model, and the underlying reason. The dispatcher never
/// retries — retry/backoff belongs to the provider client, if anywhere.
#[derive(Debug, Clone, Error)]
#[error("provider `{provider}` failed for model `{model}`: {source}")]
pub struct DispatchError {
    pub provider: String,
    pub model: String,
    #[source]
    pub source: ProviderError,
}

/// Embedding-stage failures inside retention scoring. Always downgraded to
/// a Missing retention value by callers — never surfaced to the user.
#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    #[error("embedding backend unavailable: {0}")]
    Unavailable(String),

    #[error("embedding failed: {0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_error_names_provider_and_model() {
        let err = DispatchError {
            provider: "openai".into(),
            model: "gpt-5-main".into(),
            source: ProviderError::Timeout("deadline exceeded".into()),
        };
        let text = err.to_string();
        assert!(text.contains("openai"));
        assert!(text.contains("gpt-5-main"));
        assert!(text.contains("deadline exceeded"));
    }

    #[test]
    fn validation_error_names_pattern() {
        let err = ValidationError::ForbiddenContent {
            pattern: "(?i)jailbreak".into(),
        };
        assert!(err.to_string().contains("(?i)jailbreak"));
    }

    #[test]
    fn provider_error_displays_status() {
        let err = ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        };
        assert!(err.to_string().contains("429"));
    }
}
