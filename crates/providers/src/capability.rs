//! Model capability registry — per-model execution capabilities.
//!
//! Built once at startup from configuration records and read on every
//! dispatch. Lookups are total: unknown models degrade to the most
//! conservative capability (no parallel reasoning, global default effort)
//! rather than failing. An explicit `reload` swaps the whole table behind
//! the lock — concurrent readers see the old or the new table, never a
//! partial one.

use preflight_config::ModelEntry;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{info, warn};

/// Known parallel-capable models, applied when no configured entry declares
/// parallel support. Keeps dispatch from seeing zero parallel-capable
/// models when such models are actually in use.
const PARALLEL_FALLBACK_MODELS: &[&str] = &["gpt-5-thinking", "gpt-5-thinking-pro"];

/// A model's declared execution capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCapability {
    /// Lower-cased model id.
    pub model_id: String,
    /// Whether the model accepts a `parallel` reasoning flag.
    pub supports_parallel_reasoning: bool,
    /// Effort level used when the caller does not override it.
    pub default_effort: String,
}

/// Full registry record for one model.
#[derive(Debug, Clone)]
struct RegistryEntry {
    provider: String,
    family: Option<String>,
    model_type: Option<String>,
    reasoning: bool,
    parallel: bool,
}

/// A row of the capability table, as listed by `preflight models`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ModelSummary {
    pub id: String,
    pub provider: String,
    pub family: Option<String>,
    #[serde(rename = "type")]
    pub model_type: Option<String>,
    pub reasoning: bool,
    pub parallel: bool,
}

/// Per-model capability table, keyed by lower-cased model id.
pub struct ModelCapabilityRegistry {
    entries: RwLock<HashMap<String, RegistryEntry>>,
    default_effort: String,
    default_provider: String,
}

impl ModelCapabilityRegistry {
    /// Build the registry from configuration records.
    ///
    /// Malformed entries (missing id or provider) are skipped with a
    /// warning — a broken record never prevents startup.
    pub fn load(
        entries: &[ModelEntry],
        default_effort: impl Into<String>,
        default_provider: impl Into<String>,
    ) -> Self {
        let registry = Self {
            entries: RwLock::new(HashMap::new()),
            default_effort: default_effort.into(),
            default_provider: default_provider.into(),
        };
        registry.reload(entries);
        registry
    }

    /// Replace the whole table atomically. Readers never observe a
    /// half-loaded table.
    pub fn reload(&self, entries: &[ModelEntry]) {
        let table = self.build_table(entries);
        info!(models = table.len(), "Model capability registry loaded");
        let mut guard = self.entries.write().unwrap_or_else(|e| e.into_inner());
        *guard = table;
    }

    fn build_table(&self, entries: &[ModelEntry]) -> HashMap<String, RegistryEntry> {
        let mut table = HashMap::new();

        for entry in entries {
            let Some(id) = entry.id.as_deref().filter(|s| !s.is_empty()) else {
                warn!(entry = ?entry, "Skipping model entry without an id");
                continue;
            };
            let Some(provider) = entry.provider.as_deref().filter(|s| !s.is_empty()) else {
                warn!(id = %id, "Skipping model entry without a provider");
                continue;
            };

            table.insert(
                id.to_lowercase(),
                RegistryEntry {
                    provider: provider.to_lowercase(),
                    family: entry.family.clone(),
                    model_type: entry.model_type.clone(),
                    reasoning: entry.reasoning.unwrap_or(false),
                    parallel: entry.parallel.unwrap_or(false),
                },
            );
        }

        if !table.values().any(|e| e.parallel) {
            warn!(
                "No configured model declares parallel reasoning; applying built-in fallback set"
            );
            for id in PARALLEL_FALLBACK_MODELS {
                table
                    .entry((*id).to_string())
                    .and_modify(|e| e.parallel = true)
                    .or_insert_with(|| RegistryEntry {
                        provider: self.default_provider.clone(),
                        family: None,
                        model_type: None,
                        reasoning: true,
                        parallel: true,
                    });
            }
        }

        table
    }

    /// Look up a model's capability. Total — unknown models get the safest
    /// defaults.
    pub fn capability_of(&self, model_id: &str) -> ModelCapability {
        let key = model_id.to_lowercase();
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let supports_parallel = entries.get(&key).map(|e| e.parallel).unwrap_or(false);
        ModelCapability {
            model_id: key,
            supports_parallel_reasoning: supports_parallel,
            default_effort: self.default_effort.clone(),
        }
    }

    /// Resolve which provider serves a model. Unknown models fall back to a
    /// `gemini-` prefix heuristic, then the default provider.
    pub fn provider_of(&self, model_id: &str) -> String {
        let key = model_id.to_lowercase();
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        match entries.get(&key) {
            Some(entry) => entry.provider.clone(),
            None if key.starts_with("gemini-") => "gemini".to_string(),
            None => self.default_provider.clone(),
        }
    }

    /// List the loaded table for operational display, sorted by id.
    pub fn models(&self) -> Vec<ModelSummary> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut rows: Vec<ModelSummary> = entries
            .iter()
            .map(|(id, e)| ModelSummary {
                id: id.clone(),
                provider: e.provider.clone(),
                family: e.family.clone(),
                model_type: e.model_type.clone(),
                reasoning: e.reasoning,
                parallel: e.parallel,
            })
            .collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        rows
    }
}
