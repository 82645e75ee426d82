//! Embedder trait for generating vector embeddings from text.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{RagError, Result};

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends behind a unified async
/// interface. Every vector returned by one instance has exactly
/// [`dimensions()`](Embedder::dimensions) components, and identical input is
/// expected to produce identical output; hosted backends that do not
/// guarantee bit-identical vectors across calls still produce vectors whose
/// cosine ranking is stable.
///
/// The default [`embed_batch`](Embedder::embed_batch) implementation calls
/// [`embed`](Embedder::embed) sequentially; backends that support native
/// batching should override it. Batch output is order-preserving:
/// `output[i]` is the embedding of `texts[i]`.
///
/// # Example
///
/// ```rust,ignore
/// use firstaid_rag::Embedder;
///
/// let embedding = embedder.embed("how do I treat a minor burn?").await?;
/// assert_eq!(embedding.len(), embedder.dimensions());
/// ```
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// A short name used in logs and error messages.
    fn name(&self) -> &str {
        "embedder"
    }
}

/// Bounded exponential backoff for transient embedding failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
    /// Factor applied to the delay after each failed attempt.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(4),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Wraps an [`Embedder`] with retries and output validation.
///
/// Only [`RagError::EmbeddingServiceError`] is retried. Successful batches
/// are checked for length and dimensionality, so a misbehaving backend is
/// reported as an embedding failure instead of corrupting the index.
pub struct RetryingEmbedder<E> {
    inner: E,
    policy: RetryPolicy,
}

impl<E: Embedder> RetryingEmbedder<E> {
    /// Wrap `inner` with the default [`RetryPolicy`] (3 attempts).
    pub fn new(inner: E) -> Self {
        Self { inner, policy: RetryPolicy::default() }
    }

    /// Override the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    fn validate(&self, expected: usize, vectors: &[Vec<f32>]) -> Result<()> {
        if vectors.len() != expected {
            return Err(RagError::embedding(
                self.inner.name(),
                format!("expected {expected} embeddings, backend returned {}", vectors.len()),
            ));
        }
        let dims = self.inner.dimensions();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(RagError::embedding(
                self.inner.name(),
                format!("expected {dims}-dimensional embeddings, got {}", bad.len()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl<E: Embedder> Embedder for RetryingEmbedder<E> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut batch = self.embed_batch(&[text]).await?;
        batch.pop().ok_or_else(|| RagError::embedding(self.inner.name(), "empty response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut attempt = 1;
        loop {
            let outcome = self
                .inner
                .embed_batch(texts)
                .await
                .and_then(|vectors| self.validate(texts.len(), &vectors).map(|()| vectors));

            match outcome {
                Ok(vectors) => return Ok(vectors),
                Err(e @ RagError::EmbeddingServiceError { .. })
                    if attempt < self.policy.max_attempts =>
                {
                    let delay = self.policy.backoff_after(attempt);
                    warn!(
                        provider = self.inner.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "embedding failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(failures: u32) -> Self {
            Self { failures_left: AtomicU32::new(failures), calls: AtomicU32::new(0) }
        }
    }

    #[async_trait]
    impl Embedder for Flaky {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(RagError::embedding("flaky", "429 too many requests"));
            }
            Ok(vec![text.len() as f32, 1.0])
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy { initial_backoff: Duration::from_millis(1), ..RetryPolicy::default() }
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_after(1), Duration::from_millis(250));
        assert_eq!(policy.backoff_after(2), Duration::from_millis(500));
        assert_eq!(policy.backoff_after(10), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn recovers_within_attempt_budget() {
        let embedder = RetryingEmbedder::new(Flaky::new(2)).with_policy(fast_policy());
        let vector = embedder.embed("abc").await.unwrap();
        assert_eq!(vector, vec![3.0, 1.0]);
        assert_eq!(embedder.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn surfaces_error_after_max_attempts() {
        let embedder = RetryingEmbedder::new(Flaky::new(5)).with_policy(fast_policy());
        let err = embedder.embed("abc").await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingServiceError { .. }));
        assert_eq!(embedder.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn batch_preserves_order() {
        let embedder = RetryingEmbedder::new(Flaky::new(0));
        let vectors = embedder.embed_batch(&["a", "abcd", "ab"]).await.unwrap();
        let lens: Vec<f32> = vectors.iter().map(|v| v[0]).collect();
        assert_eq!(lens, vec![1.0, 4.0, 2.0]);
    }
}
