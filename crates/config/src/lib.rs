//! Configuration loading, validation, and management for Preflight.
//!
//! Loads configuration from `~/.preflight/config.toml` with environment
//! variable overrides. Validates all settings at startup. Secrets (API
//! keys, the bearer secret) are redacted from `Debug` output and are never
//! logged.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.preflight/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default reasoning effort applied to unknown models
    #[serde(default = "default_effort")]
    pub default_effort: String,

    /// Default chain: "single" or "reflect"
    #[serde(default = "default_chain")]
    pub default_chain: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// History trimming defaults
    #[serde(default)]
    pub trim: TrimConfig,

    /// Retention scoring configuration
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Persona compilation configuration
    #[serde(default)]
    pub persona: PersonaConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Model capability registry entries
    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-5-main".into()
}
fn default_effort() -> String {
    "medium".into()
}
fn default_chain() -> String {
    "single".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_effort", &self.default_effort)
            .field("default_chain", &self.default_chain)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("trim", &self.trim)
            .field("retention", &self.retention)
            .field("gateway", &self.gateway)
            .field("persona", &self.persona)
            .field("providers", &self.providers)
            .field("models", &self.models)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("bearer_secret", &redact(&self.bearer_secret))
            .finish()
    }
}

/// History trimming defaults, overridable per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrimConfig {
    #[serde(default = "default_target_tokens")]
    pub target_tokens: usize,

    #[serde(default)]
    pub min_turns: usize,
}

fn default_target_tokens() -> usize {
    4096
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            target_tokens: default_target_tokens(),
            min_turns: 0,
        }
    }
}

/// Semantic retention scoring configuration.
///
/// `provider = "none"` disables scoring entirely: the trimmer records
/// Missing without attempting an embedding call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_retention_provider")]
    pub provider: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,
}

fn default_retention_provider() -> String {
    "none".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-large".into()
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            provider: default_retention_provider(),
            model: default_embedding_model(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Shared secret for the bearer-token gate. None = endpoints open.
    /// Overridden by `PREFLIGHT_BEARER_SECRET`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_secret: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8787
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            bearer_secret: None,
        }
    }
}

/// Persona compilation configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Regex patterns that must never appear in a compiled directive.
    /// Invalid patterns are skipped with a warning at load time.
    #[serde(default)]
    pub forbidden_patterns: Vec<String>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

/// One model capability registry record.
///
/// Fields are optional so a malformed entry deserializes rather than
/// failing the whole config: the registry loader validates each entry and
/// skips broken ones with a warning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel: Option<bool>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.preflight/config.toml).
    ///
    /// Environment variables take priority over the file:
    /// - `PREFLIGHT_API_KEY` / `OPENAI_API_KEY` for the default API key
    /// - `PREFLIGHT_PROVIDER`, `PREFLIGHT_MODEL`
    /// - `PREFLIGHT_BEARER_SECRET` for the gateway gate
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("PREFLIGHT_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("PREFLIGHT_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("PREFLIGHT_MODEL") {
            config.default_model = model;
        }

        if let Ok(secret) = std::env::var("PREFLIGHT_BEARER_SECRET") {
            if !secret.is_empty() {
                config.gateway.bearer_secret = Some(secret);
            }
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".preflight")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !matches!(self.default_chain.as_str(), "single" | "reflect") {
            return Err(ConfigError::ValidationError(format!(
                "default_chain must be \"single\" or \"reflect\", got \"{}\"",
                self.default_chain
            )));
        }

        Ok(())
    }

    /// Resolve the API key for a named provider (per-provider first, then
    /// the global key).
    pub fn api_key_for(&self, provider: &str) -> Option<String> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.clone())
            .or_else(|| self.api_key.clone())
    }

    /// Generate a default config TOML string (for first-run setup).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_effort: default_effort(),
            default_chain: default_chain(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            trim: TrimConfig::default(),
            retention: RetentionConfig::default(),
            gateway: GatewayConfig::default(),
            persona: PersonaConfig::default(),
            providers: HashMap::new(),
            models: Vec::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
