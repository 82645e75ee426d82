//! Deterministic collaborators shared by the integration tests.

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use firstaid_rag::{
    ChatMessage, Document, DocumentLoader, Embedder, IndexEntry, LanguageModel, RagError, Result,
    ScoredChunk, VectorIndex,
};

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "at", "by", "do", "for", "how", "i", "in", "is", "it", "my", "of", "on",
    "or", "the", "to", "under", "what", "with",
];

/// Bag-of-words embedder: every non-stopword token increments one FNV-hashed
/// dimension, then the vector is L2-normalised. Texts sharing vocabulary score
/// high under cosine similarity; unrelated texts score near zero.
pub struct HashingEmbedder {
    dimensions: usize,
    batches: AtomicUsize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions, batches: AtomicUsize::new(0) }
    }

    /// Number of embedding requests served (a single `embed` counts as one).
    pub fn requests(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .map(str::to_lowercase)
            .filter(|t| !t.is_empty() && !STOPWORDS.contains(&t.as_str()))
        {
            v[fnv1a(&token) as usize % self.dimensions] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

fn fnv1a(s: &str) -> u64 {
    s.bytes().fold(0xcbf2_9ce4_8422_2325u64, |hash, b| (hash ^ u64::from(b)).wrapping_mul(0x100_0000_01b3))
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(self.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

/// Always fails with [`RagError::EmbeddingServiceError`].
pub struct FailingEmbedder {
    pub dimensions: usize,
}

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::EmbeddingServiceError {
            provider: "failing".into(),
            message: "quota exceeded".into(),
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Serves the first `healthy_batches` batch requests like [`HashingEmbedder`],
/// then fails every later one.
pub struct FlakyEmbedder {
    inner: HashingEmbedder,
    healthy_batches: usize,
    calls: AtomicUsize,
}

impl FlakyEmbedder {
    pub fn new(dimensions: usize, healthy_batches: usize) -> Self {
        Self { inner: HashingEmbedder::new(dimensions), healthy_batches, calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut batch = self.embed_batch(&[text]).await?;
        Ok(batch.remove(0))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.healthy_batches {
            return Err(RagError::EmbeddingServiceError {
                provider: "flaky".into(),
                message: "503 service unavailable".into(),
            });
        }
        self.inner.embed_batch(texts).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

/// An index whose backing store cannot be reached.
pub struct UnreachableIndex;

impl UnreachableIndex {
    fn down() -> RagError {
        RagError::IndexUnavailable { backend: "unreachable".into(), message: "connection refused".into() }
    }
}

#[async_trait]
impl VectorIndex for UnreachableIndex {
    fn name(&self) -> &str {
        "unreachable"
    }

    async fn create_if_missing(&self, _dimensions: usize) -> Result<()> {
        Err(Self::down())
    }

    async fn upsert(&self, _entries: &[IndexEntry]) -> Result<()> {
        Err(Self::down())
    }

    async fn query(&self, _vector: &[f32], _k: usize) -> Result<Vec<ScoredChunk>> {
        Err(Self::down())
    }

    async fn len(&self) -> Result<u64> {
        Err(Self::down())
    }
}

/// Replies with fixed text and records every conversation it receives.
pub struct ScriptedModel {
    reply: String,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    pub fn new(reply: impl Into<String>) -> Self {
        Self { reply: reply.into(), calls: Mutex::new(Vec::new()) }
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }

    /// The system instruction of the most recent call.
    pub fn last_instruction(&self) -> Option<String> {
        self.calls.lock().unwrap().last().and_then(|messages| {
            messages
                .iter()
                .find(|m| m.role == firstaid_rag::Role::System)
                .map(|m| m.content.clone())
        })
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.calls.lock().unwrap().push(messages.to_vec());
        Ok(self.reply.clone())
    }
}

/// Always fails with [`RagError::GenerationServiceError`].
pub struct FailingModel;

#[async_trait]
impl LanguageModel for FailingModel {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        Err(RagError::GenerationServiceError {
            provider: "failing".into(),
            message: "rate limited".into(),
        })
    }
}

/// Serves a fixed set of documents.
pub struct StaticLoader(pub Vec<Document>);

impl DocumentLoader for StaticLoader {
    fn load(&self) -> Result<Vec<Document>> {
        Ok(self.0.clone())
    }
}

pub const BURNS: &str = "Treat a minor burn by cooling the burn under cool running water for ten \
                         minutes. Cover the burn with a clean dressing.";

pub const BLEEDING: &str = "Stop severe bleeding by applying firm direct pressure on the wound \
                            with a sterile pad. Raise the injured limb.";

pub const CHOKING: &str = "If an adult is choking, give five back blows between the shoulder \
                           blades, then five abdominal thrusts.";

/// A small first-aid corpus, one short passage per document.
pub fn first_aid_corpus() -> Vec<Document> {
    vec![
        Document::new("burns.txt", BURNS),
        Document::new("bleeding.txt", BLEEDING),
        Document::new("choking.txt", CHOKING),
    ]
}
