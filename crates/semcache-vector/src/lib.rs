//! semcache Vector - Embedding and vector store abstraction
//!
//! Provides the two external collaborators of a semantic cache lookup:
//! an embedding service that turns text into vectors, and a vector
//! store (Qdrant) that answers top-1 similarity queries.

use async_trait::async_trait;
use semcache_core::{CacheEntry, CacheHit, Result};

/// Trait for vector database operations on the cache collection
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Store a prompt/completion pair
    async fn store(&self, entry: &CacheEntry) -> Result<()>;

    /// Find the single most similar entry scoring above `threshold`
    ///
    /// Returns `Ok(None)` when nothing clears the threshold. Ties are
    /// broken by the store's own ordering.
    async fn nearest_above(&self, query_vector: &[f32], threshold: f32) -> Result<Option<CacheHit>>;
}

pub mod embedding;
pub mod qdrant_store;

pub use embedding::{
    create_embedding_client, AzureOpenAiEmbedding, EmbeddingClient, OllamaEmbedding,
    OpenAiEmbedding,
};
pub use qdrant_store::QdrantCacheStore;
