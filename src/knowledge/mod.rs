//! Semantic-similarity knowledge store used by the retrieval-augmented
//! pipeline stages.
//!
//! The store is deliberately small: add free text, query the top-k most
//! similar snippets, clear everything. It is cleared at the start of every
//! research branch so tasks never see stale context from an earlier run,
//! even though the session thread itself is long-lived.

use crate::types::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Sentinel returned by `query` when the store holds nothing.
pub const EMPTY_STORE_SENTINEL: &str = "Knowledge store is empty.";

/// Produces embedding vectors for free text.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Interface to the semantic text index.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Index a snippet. Blank input is ignored.
    async fn add(&self, text: &str) -> Result<()>;

    /// Return the `k` most similar snippets, best first. An empty store
    /// yields the documented sentinel list rather than an error.
    async fn query(&self, text: &str, k: usize) -> Result<Vec<String>>;

    /// Drop every entry. Idempotent.
    fn clear(&self);

    /// Number of indexed snippets.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Entry {
    id: u64,
    text: String,
    embedding: Vec<f32>,
}

/// In-memory store backed by cosine similarity over provider embeddings.
///
/// Entry ids grow monotonically for the lifetime of the store; ranking ties
/// break on insertion order, which keeps query results deterministic for
/// identical inputs.
pub struct InMemoryKnowledgeStore {
    embedder: std::sync::Arc<dyn EmbeddingProvider>,
    entries: RwLock<Vec<Entry>>,
    next_id: AtomicU64,
}

impl InMemoryKnowledgeStore {
    pub fn new(embedder: std::sync::Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn add(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let embedding = self.embedder.embed(text).await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.write();
        entries.push(Entry {
            id,
            text: text.to_string(),
            embedding,
        });
        tracing::debug!(total = entries.len(), "added snippet to knowledge store");
        Ok(())
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<String>> {
        if self.entries.read().is_empty() {
            return Ok(vec![EMPTY_STORE_SENTINEL.to_string()]);
        }
        let query_embedding = self.embedder.embed(text).await?;

        let entries = self.entries.read();
        let mut scored: Vec<(f32, u64, &str)> = entries
            .iter()
            .map(|e| {
                (
                    cosine_similarity(&query_embedding, &e.embedding),
                    e.id,
                    e.text.as_str(),
                )
            })
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, _, text)| text.to_string())
            .collect())
    }

    fn clear(&self) {
        self.entries.write().clear();
        tracing::debug!("knowledge store cleared");
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}
