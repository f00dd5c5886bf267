//! Semantic retention scoring.
//!
//! Embeds the pre-trim and post-trim conversation text and returns their
//! cosine similarity, in [-1, 1]. Every failure mode — unreachable
//! embedding backend, empty text, degenerate vectors — is an
//! [`EmbeddingError`] that callers downgrade to a Missing measurement.
//! Retention is diagnostic, never load-bearing.

use preflight_core::error::EmbeddingError;
use preflight_core::provider::{EmbeddingRequest, Provider};
use std::sync::Arc;

/// Scores how much meaning survived a trim.
pub struct RetentionScorer {
    provider: Arc<dyn Provider>,
    model: String,
}

impl RetentionScorer {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Embed both texts and return their cosine similarity.
    pub async fn score(&self, before: &str, after: &str) -> Result<f64, EmbeddingError> {
        if before.is_empty() || after.is_empty() {
            return Err(EmbeddingError::Failed("empty input text".into()));
        }

        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs: vec![before.to_string(), after.to_string()],
            })
            .await
            .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;

        let [a, b] = response.embeddings.as_slice() else {
            return Err(EmbeddingError::Failed(format!(
                "expected 2 embedding vectors, got {}",
                response.embeddings.len()
            )));
        };

        cosine_similarity(a, b)
            .ok_or_else(|| EmbeddingError::Failed("zero-magnitude embedding vector".into()))
    }
}

/// Cosine similarity of two vectors, clamped to [-1, 1].
///
/// Returns `None` for empty or zero-magnitude vectors.
fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return None;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return None;
    }
    Some((dot / denom).clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use preflight_core::error::ProviderError;
    use preflight_core::provider::{
        EmbeddingResponse, ProviderRequest, ProviderResponse,
    };

    struct FixedEmbedProvider {
        vectors: Vec<Vec<f32>>,
    }

    #[async_trait::async_trait]
    impl Provider for FixedEmbedProvider {
        fn name(&self) -> &str {
            "fixed_embed"
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
            Ok(EmbeddingResponse {
                embeddings: self.vectors.clone(),
                model: "test-embedding".into(),
                usage: None,
            })
        }
    }

    struct FailingEmbedProvider;

    #[async_trait::async_trait]
    impl Provider for FailingEmbedProvider {
        fn name(&self) -> &str {
            "failing_embed"
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
            Err(ProviderError::Network("connection refused".into()))
        }
    }

    #[test]
    fn identical_vectors_score_one() {
        let sim = cosine_similarity(&[0.5, 0.5, 0.1], &[0.5, 0.5, 0.1]).unwrap();
        assert!((sim - 1.0).abs() < 1e-9);
    }

    #[test]
    fn opposite_vectors_score_minus_one() {
        let sim = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]).unwrap();
        assert!((sim + 1.0).abs() < 1e-9);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!(sim.abs() < 1e-9);
    }

    #[test]
    fn zero_vector_is_none() {
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]).is_none());
    }

    #[test]
    fn mismatched_lengths_is_none() {
        assert!(cosine_similarity(&[1.0], &[1.0, 2.0]).is_none());
    }

    #[tokio::test]
    async fn score_uses_provider_embeddings() {
        let provider = Arc::new(FixedEmbedProvider {
            vectors: vec![vec![1.0, 0.0], vec![1.0, 0.0]],
        });
        let scorer = RetentionScorer::new(provider, "test-embedding");
        let score = scorer.score("before text", "after text").await.unwrap();
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn backend_failure_is_unavailable() {
        let scorer = RetentionScorer::new(Arc::new(FailingEmbedProvider), "test-embedding");
        let err = scorer.score("before", "after").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Unavailable(_)));
    }

    #[tokio::test]
    async fn empty_text_is_error_not_zero() {
        let provider = Arc::new(FixedEmbedProvider { vectors: vec![] });
        let scorer = RetentionScorer::new(provider, "test-embedding");
        assert!(scorer.score("", "after").await.is_err());
    }

    #[tokio::test]
    async fn wrong_vector_count_is_error() {
        let provider = Arc::new(FixedEmbedProvider {
            vectors: vec![vec![1.0, 0.0]],
        });
        let scorer = RetentionScorer::new(provider, "test-embedding");
        assert!(scorer.score("before", "after").await.is_err());
    }
}
