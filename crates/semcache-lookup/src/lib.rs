//! semcache Lookup - Semantic cache lookup
//!
//! Answers "is there a previously cached completion semantically close
//! enough to this prompt?" by embedding the prompt and asking the vector
//! store for its single best match above a similarity threshold.
//!
//! The embedding call always completes before the store query starts, and
//! neither is retried. Each call runs under an optional deadline.
//!
//! Author: hephaex@gmail.com

use semcache_core::{CacheConfig, CacheEntry, CacheHit, CacheQuery, Result, SemCacheError};
use semcache_vector::{CacheStore, EmbeddingClient};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub mod stats;

pub use stats::{LookupStats, LookupStatsReport};

// ============================================================================
// Semantic Cache
// ============================================================================

/// Semantic cache over an embedding service and a vector store
pub struct SemanticCache {
    /// Embedding service
    embedder: Arc<dyn EmbeddingClient>,

    /// Vector store holding prompt/completion pairs
    store: Arc<dyn CacheStore>,

    /// Threshold used when the caller does not pass one
    default_threshold: f32,

    /// Deadline for each network call
    request_timeout: Option<Duration>,

    /// Lookup counters
    stats: Arc<LookupStats>,
}

impl SemanticCache {
    /// Create a new semantic cache
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn CacheStore>,
        config: &CacheConfig,
    ) -> Self {
        let request_timeout = match config.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Self {
            embedder,
            store,
            default_threshold: config.similarity_threshold,
            request_timeout,
            stats: Arc::new(LookupStats::new()),
        }
    }

    /// Set the per-call deadline (`None` disables it)
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Threshold used by [`lookup_default`](Self::lookup_default)
    pub fn default_threshold(&self) -> f32 {
        self.default_threshold
    }

    /// Get lookup statistics
    pub fn stats(&self) -> Arc<LookupStats> {
        Arc::clone(&self.stats)
    }

    /// Look up a cached completion for `input_text`
    ///
    /// Returns `Ok(None)` when no stored entry is strictly more similar than
    /// `threshold_score`.
    pub async fn lookup(&self, input_text: &str, threshold_score: f32) -> Result<Option<String>> {
        let hit = self
            .find(&CacheQuery::new(input_text, threshold_score))
            .await?;
        Ok(hit.map(|h| h.completion_text))
    }

    /// Look up using the configured threshold
    pub async fn lookup_default(&self, input_text: &str) -> Result<Option<String>> {
        self.lookup(input_text, self.default_threshold).await
    }

    /// Look up the best matching entry, with its score and stored prompt
    pub async fn find(&self, query: &CacheQuery) -> Result<Option<CacheHit>> {
        query.validate()?;

        let result = self.find_validated(query).await;
        match &result {
            Ok(Some(_)) => self.stats.record_hit(),
            Ok(None) => self.stats.record_miss(),
            Err(SemCacheError::EmbeddingError(_)) => self.stats.record_embedding_failure(),
            Err(SemCacheError::StoreQueryError(_)) => self.stats.record_store_failure(),
            Err(_) => {}
        }
        result
    }

    async fn find_validated(&self, query: &CacheQuery) -> Result<Option<CacheHit>> {
        let start_time = Instant::now();

        // 1. Embed the prompt
        let vector = self.embed(&query.input_text).await?;
        tracing::debug!(dimension = vector.len(), "prompt embedded");

        // 2. Top-1 similarity query
        let threshold = query.threshold_score;
        let hit = self
            .with_deadline(self.store.nearest_above(&vector, threshold), |t| {
                SemCacheError::StoreQueryError(format!("similarity query timed out after {t:?}"))
            })
            .await?;

        // 3. The store's own threshold filter is inclusive
        let hit = match hit {
            Some(hit) if hit.exceeds(threshold) => Some(hit),
            Some(hit) => {
                tracing::warn!(
                    score = hit.similarity_score,
                    threshold,
                    "store returned a row that does not exceed the threshold"
                );
                self.stats.record_rejected();
                None
            }
            None => None,
        };

        tracing::info!(
            hit = hit.is_some(),
            score = hit.as_ref().map(|h| h.similarity_score),
            threshold,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "semantic cache lookup"
        );
        Ok(hit)
    }

    /// Embed `text` and check the result against the collection dimension
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self
            .with_deadline(self.embedder.embed(text), |t| {
                SemCacheError::EmbeddingError(format!("embedding request timed out after {t:?}"))
            })
            .await?;

        let expected = self.embedder.dimension();
        if vector.is_empty() {
            return Err(SemCacheError::EmbeddingError(
                "embedding service returned an empty vector".to_string(),
            ));
        }
        if vector.len() != expected {
            return Err(SemCacheError::EmbeddingError(format!(
                "embedding has {} dimensions, expected {expected}",
                vector.len()
            )));
        }
        Ok(vector)
    }

    /// Embed a prompt and store it with its completion
    ///
    /// Lookups never call this; it populates the collection.
    pub async fn record(
        &self,
        user_prompt: &str,
        completion_text: &str,
        session_id: Option<&str>,
    ) -> Result<CacheEntry> {
        if user_prompt.trim().is_empty() {
            return Err(SemCacheError::ValidationError(
                "prompt must not be empty".to_string(),
            ));
        }
        if completion_text.is_empty() {
            return Err(SemCacheError::ValidationError(
                "completion must not be empty".to_string(),
            ));
        }

        let vector = self.embed(user_prompt).await?;
        let mut entry = CacheEntry::new(user_prompt, completion_text, vector);
        if let Some(session) = session_id {
            entry = entry.with_session(session);
        }

        self.with_deadline(self.store.store(&entry), |t| {
            SemCacheError::DatabaseError(format!("store write timed out after {t:?}"))
        })
        .await?;

        tracing::info!(id = %entry.id, session = %entry.session_id, "cached completion");
        Ok(entry)
    }

    async fn with_deadline<T, F>(
        &self,
        fut: F,
        on_timeout: impl FnOnce(Duration) -> SemCacheError,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| on_timeout(limit))?,
            None => fut.await,
        }
    }
}
