//! Context trimmer — bounds a conversation window to a token budget.
//!
//! # Algorithm
//!
//! The leading system block (persona directive, prethought) is always
//! retained. Turns are walked newest to oldest:
//!
//! 1. While fewer than `min_turns` turns are kept, a turn is kept
//!    unconditionally — the floor always wins over the budget.
//! 2. Past the floor, a turn is kept while the accumulated cost stays
//!    within `target_tokens`; the first over-budget turn stops the walk and
//!    every older turn is dropped whole. Turns are never split.
//!
//! The newest turn is always retained — a window that still has turns never
//! trims to nothing, which keeps the compress ratio strictly positive.
//!
//! Retention scoring runs over the pre-/post-trim turn text; a scorer
//! failure downgrades to a Missing value and the trim still succeeds.

use crate::retention::RetentionScorer;
use preflight_core::message::ConversationWindow;
use preflight_telemetry::{MetricSample, MetricsRegistry};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// The outcome of one trim operation.
#[derive(Debug, Clone, Serialize)]
pub struct TrimResult {
    /// The bounded window: full system block + surviving turns.
    pub kept: ConversationWindow,

    /// tokens_after / tokens_before, in (0, 1]. Exactly 1.0 when nothing
    /// was dropped.
    pub compress_ratio: f64,

    /// Semantic retention in [-1, 1], or `None` when the measurement is
    /// Missing. Never 0 as a stand-in for failure.
    pub retention: Option<f64>,
}

/// Trims conversation windows and records the resulting quality signals.
#[derive(Default)]
pub struct ContextTrimmer {
    scorer: Option<Arc<RetentionScorer>>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl ContextTrimmer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a retention scorer. Without one, every trim reports Missing
    /// retention.
    pub fn with_scorer(mut self, scorer: Arc<RetentionScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// Attach the shared metrics registry; one sample is recorded per trim.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Bound `window` to `target_tokens`, keeping at least `min_turns`
    /// turns. The embedding call inside retention scoring is the only
    /// suspension point.
    pub async fn trim(
        &self,
        window: &ConversationWindow,
        target_tokens: usize,
        min_turns: usize,
    ) -> TrimResult {
        // Zero turns: trivially lossless no-op.
        if window.turns.is_empty() {
            let result = TrimResult {
                kept: window.clone(),
                compress_ratio: 1.0,
                retention: Some(1.0),
            };
            self.record(&result);
            return result;
        }

        let (kept, compress_ratio) = trim_window(window, target_tokens, min_turns);

        let retention = match &self.scorer {
            Some(scorer) => {
                match scorer.score(&window.turn_text(), &kept.turn_text()).await {
                    Ok(score) => Some(score),
                    Err(e) => {
                        warn!(error = %e, "Retention scoring failed, recording as missing");
                        None
                    }
                }
            }
            None => None,
        };

        debug!(
            turns_before = window.turns.len(),
            turns_after = kept.turns.len(),
            compress_ratio,
            retention = ?retention,
            "Trimmed conversation window"
        );

        let result = TrimResult {
            kept,
            compress_ratio,
            retention,
        };
        self.record(&result);
        result
    }

    fn record(&self, result: &TrimResult) {
        if let Some(metrics) = &self.metrics {
            metrics.record(MetricSample::new(result.compress_ratio, result.retention));
        }
    }
}

/// The pure trimming core: returns the kept window and the compress ratio.
fn trim_window(
    window: &ConversationWindow,
    target_tokens: usize,
    min_turns: usize,
) -> (ConversationWindow, f64) {
    let tokens_before = window.total_tokens();

    let mut kept_rev = Vec::new();
    let mut accumulated = 0usize;

    for turn in window.turns.iter().rev() {
        let cost = turn.cost();
        let under_floor = kept_rev.len() < min_turns;
        let is_newest = kept_rev.is_empty();

        if under_floor || is_newest || accumulated + cost <= target_tokens {
            accumulated += cost;
            kept_rev.push(turn.clone());
        } else {
            break;
        }
    }

    kept_rev.reverse();
    let kept = ConversationWindow {
        system: window.system.clone(),
        turns: kept_rev,
    };

    let tokens_after = kept.total_tokens();
    let compress_ratio = if tokens_before == 0 {
        1.0
    } else {
        tokens_after as f64 / tokens_before as f64
    };

    (kept, compress_ratio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use preflight_core::error::ProviderError;
    use preflight_core::message::{Message, Turn};
    use preflight_core::provider::{
        EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse,
    };

    /// A turn costing roughly `tokens` tokens.
    fn turn_of(tokens: usize) -> Turn {
        // token_count = len / 4 rounded up, so 4 * tokens chars ≈ tokens.
        Turn::opening(Message::user("x".repeat(tokens * 4)))
    }

    fn window_of(turn_count: usize, tokens_each: usize) -> ConversationWindow {
        let mut window = ConversationWindow {
            system: vec![Message::system("directive")],
            turns: Vec::new(),
        };
        for _ in 0..turn_count {
            window.push_turn(turn_of(tokens_each));
        }
        window
    }

    #[tokio::test]
    async fn floor_wins_over_budget() {
        // Scenario A: 10 turns, budget below 3 turns' cost, floor 2 → exactly 2.
        let window = window_of(10, 100);
        let result = ContextTrimmer::new().trim(&window, 250, 2).await;
        assert_eq!(result.kept.turns.len(), 2);
    }

    #[tokio::test]
    async fn floor_larger_than_window_keeps_everything() {
        let window = window_of(3, 100);
        let result = ContextTrimmer::new().trim(&window, 10, 10).await;
        assert_eq!(result.kept.turns.len(), 3);
        assert_eq!(result.compress_ratio, 1.0);
    }

    #[tokio::test]
    async fn zero_turns_is_lossless_noop() {
        let window = ConversationWindow {
            system: vec![Message::system("directive")],
            turns: Vec::new(),
        };
        let result = ContextTrimmer::new().trim(&window, 10, 0).await;
        assert_eq!(result.compress_ratio, 1.0);
        assert_eq!(result.retention, Some(1.0));
        assert!(result.kept.turns.is_empty());
    }

    #[tokio::test]
    async fn generous_budget_drops_nothing() {
        let window = window_of(5, 10);
        let result = ContextTrimmer::new().trim(&window, 100_000, 0).await;
        assert_eq!(result.kept.turns.len(), 5);
        assert_eq!(result.compress_ratio, 1.0);
    }

    #[tokio::test]
    async fn newest_turns_survive_oldest_dropped() {
        let mut window = ConversationWindow::default();
        for i in 0..6 {
            window.push_turn(Turn::opening(Message::user(format!(
                "message number {i} {}",
                "pad ".repeat(30)
            ))));
        }
        let result = ContextTrimmer::new().trim(&window, 70, 1).await;

        assert!(result.kept.turns.len() < 6);
        let last = result.kept.turns.last().unwrap();
        assert!(last.messages[0].content.contains("message number 5"));
        // Kept turns are a contiguous suffix.
        let first_kept = &result.kept.turns[0].messages[0].content;
        let first_idx: usize = 6 - result.kept.turns.len();
        assert!(first_kept.contains(&format!("message number {first_idx}")));
    }

    #[tokio::test]
    async fn turns_are_never_split() {
        let mut window = ConversationWindow::default();
        for _ in 0..4 {
            window.push_turn(Turn::exchange(
                Message::user("q ".repeat(40)),
                Message::assistant("a ".repeat(40)),
            ));
        }
        let result = ContextTrimmer::new().trim(&window, 45, 0).await;
        for turn in &result.kept.turns {
            assert_eq!(turn.messages.len(), 2, "turn was split");
        }
    }

    #[tokio::test]
    async fn compress_ratio_in_unit_interval() {
        let window = window_of(8, 50);
        let result = ContextTrimmer::new().trim(&window, 120, 1).await;
        assert!(result.compress_ratio > 0.0);
        assert!(result.compress_ratio <= 1.0);
    }

    #[tokio::test]
    async fn newest_turn_always_kept() {
        let window = window_of(4, 100);
        let result = ContextTrimmer::new().trim(&window, 0, 0).await;
        assert_eq!(result.kept.turns.len(), 1);
        assert!(result.compress_ratio > 0.0);
    }

    #[tokio::test]
    async fn system_block_never_trimmed() {
        let mut window = window_of(5, 100);
        window.system.push(Message::system("prethought block"));
        let result = ContextTrimmer::new().trim(&window, 50, 1).await;
        assert_eq!(result.kept.system.len(), 2);
    }

    #[tokio::test]
    async fn no_scorer_means_missing_retention() {
        let window = window_of(3, 10);
        let result = ContextTrimmer::new().trim(&window, 10_000, 0).await;
        assert!(result.retention.is_none());
    }

    // ── Retention / metrics integration ────────────────────────────────

    struct ScriptedEmbedProvider {
        result: Result<Vec<Vec<f32>>, ProviderError>,
    }

    #[async_trait::async_trait]
    impl Provider for ScriptedEmbedProvider {
        fn name(&self) -> &str {
            "scripted_embed"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::NotConfigured("embed-only test double".into()))
        }

        async fn embed(
            &self,
            _request: EmbeddingRequest,
        ) -> Result<EmbeddingResponse, ProviderError> {
            self.result.clone().map(|embeddings| EmbeddingResponse {
                embeddings,
                model: "test-embedding".into(),
                usage: None,
            })
        }
    }

    fn scorer_with(result: Result<Vec<Vec<f32>>, ProviderError>) -> Arc<RetentionScorer> {
        Arc::new(RetentionScorer::new(
            Arc::new(ScriptedEmbedProvider { result }),
            "test-embedding",
        ))
    }

    #[tokio::test]
    async fn retention_scored_from_embeddings() {
        let window = window_of(3, 50);
        let trimmer = ContextTrimmer::new()
            .with_scorer(scorer_with(Ok(vec![vec![1.0, 0.0], vec![1.0, 0.0]])));
        let result = trimmer.trim(&window, 60, 1).await;
        let retention = result.retention.unwrap();
        assert!((retention - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn embedding_failure_downgrades_to_missing() {
        // Scenario D: the backend throws; the trim still succeeds and
        // retention is the explicit Missing marker, not 0.
        let window = window_of(3, 50);
        let metrics = Arc::new(MetricsRegistry::new());
        let trimmer = ContextTrimmer::new()
            .with_scorer(scorer_with(Err(ProviderError::Network("down".into()))))
            .with_metrics(metrics.clone());

        let result = trimmer.trim(&window, 60, 1).await;
        assert!(result.retention.is_none());
        assert!(result.compress_ratio > 0.0);

        // The same trim is visible in both expositions, Missing preserved.
        let payload = metrics.export_prometheus();
        assert!(payload.trim().ends_with("semantic_retention NaN"));
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert!(json["semantic_retention"].is_null());
    }

    #[tokio::test]
    async fn each_trim_records_one_sample() {
        let metrics = Arc::new(MetricsRegistry::new());
        let trimmer = ContextTrimmer::new().with_metrics(metrics.clone());

        let window = window_of(6, 100);
        let result = trimmer.trim(&window, 150, 1).await;

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.compress_ratio, result.compress_ratio);
        assert!(snapshot.semantic_retention.is_none());
    }
}
