//! Semantic cache lookup tests
//!
//! The embedding service and vector store are replaced by in-memory fakes
//! that count calls. The fake store mimics Qdrant: cosine scores and an
//! inclusive `score >= threshold` filter.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use proptest::prelude::*;
use semcache_core::{CacheConfig, CacheEntry, CacheHit, CacheQuery, Result, SemCacheError};
use semcache_lookup::SemanticCache;
use semcache_vector::{CacheStore, EmbeddingClient};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const LAKE_PROMPT: &str = "What is the largest lake in North America?";
const LAKE_VECTOR: [f32; 4] = [0.12, 0.87, 0.33, 0.41];
const UNRELATED_VECTOR: [f32; 4] = [0.9, -0.1, -0.4, 0.05];

// =============================================================================
// Fakes
// =============================================================================

#[derive(Clone, Copy)]
enum Behaviour {
    Normal,
    Fail,
    Hang,
}

struct FakeEmbedder {
    table: HashMap<String, Vec<f32>>,
    dimension: usize,
    behaviour: Behaviour,
    calls: AtomicUsize,
}

impl FakeEmbedder {
    fn new(dimension: usize) -> Self {
        Self {
            table: HashMap::new(),
            dimension,
            behaviour: Behaviour::Normal,
            calls: AtomicUsize::new(0),
        }
    }

    fn with(mut self, text: &str, vector: &[f32]) -> Self {
        self.table.insert(text.to_string(), vector.to_vec());
        self
    }

    fn behaving(mut self, behaviour: Behaviour) -> Self {
        self.behaviour = behaviour;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingClient for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Fail => Err(SemCacheError::EmbeddingError(
                "service unavailable".to_string(),
            )),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(SemCacheError::EmbeddingError("unreachable".to_string()))
            }
            Behaviour::Normal => self.table.get(text).cloned().ok_or_else(|| {
                SemCacheError::EmbeddingError(format!("no fake embedding for {text:?}"))
            }),
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

struct FakeStore {
    entries: Mutex<Vec<CacheEntry>>,
    /// Row returned regardless of the query vector
    forced: Option<CacheHit>,
    fail: bool,
    /// Every call sleeps instead of answering
    hang: bool,
    queries: AtomicUsize,
}

impl FakeStore {
    fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            forced: None,
            fail: false,
            hang: false,
            queries: AtomicUsize::new(0),
        }
    }

    fn with_entry(self, entry: CacheEntry) -> Self {
        self.entries.lock().unwrap().push(entry);
        self
    }

    fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    dot / (norm_a * norm_b)
}

#[async_trait]
impl CacheStore for FakeStore {
    async fn store(&self, entry: &CacheEntry) -> Result<()> {
        if self.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn nearest_above(&self, query_vector: &[f32], threshold: f32) -> Result<Option<CacheHit>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.fail {
            return Err(SemCacheError::StoreQueryError(
                "service unavailable".to_string(),
            ));
        }
        if let Some(hit) = &self.forced {
            return Ok(Some(hit.clone()));
        }

        let entries = self.entries.lock().unwrap();
        let best = entries
            .iter()
            .map(|e| (cosine(query_vector, &e.vectors), e))
            .filter(|(score, _)| *score >= threshold)
            .fold(None::<(f32, &CacheEntry)>, |best, (score, e)| match best {
                Some((top, _)) if top >= score => best,
                _ => Some((score, e)),
            });

        Ok(best.map(|(score, e)| {
            CacheHit::new(e.completion_text.clone(), score).with_user_prompt(e.user_prompt.clone())
        }))
    }
}

fn config() -> CacheConfig {
    CacheConfig {
        similarity_threshold: 0.95,
        request_timeout_secs: 5,
    }
}

fn cache(embedder: &Arc<FakeEmbedder>, store: &Arc<FakeStore>) -> SemanticCache {
    SemanticCache::new(embedder.clone(), store.clone(), &config())
}

fn lake_store() -> FakeStore {
    FakeStore::new().with_entry(
        CacheEntry::new(LAKE_PROMPT, "Lake Superior", LAKE_VECTOR.to_vec()).with_session("s-1"),
    )
}

// =============================================================================
// Hits and misses
// =============================================================================

#[tokio::test]
async fn test_exact_match_returns_completion() {
    let embedder = Arc::new(FakeEmbedder::new(4).with(LAKE_PROMPT, &LAKE_VECTOR));
    let store = Arc::new(lake_store());

    let result = cache(&embedder, &store).lookup(LAKE_PROMPT, 0.95).await.unwrap();

    assert_eq!(result.as_deref(), Some("Lake Superior"));
}

#[tokio::test]
async fn test_unrelated_prompt_misses() {
    let embedder = Arc::new(FakeEmbedder::new(4).with("How do I bake bread?", &UNRELATED_VECTOR));
    let store = Arc::new(lake_store());

    let result = cache(&embedder, &store)
        .lookup("How do I bake bread?", 0.95)
        .await
        .unwrap();

    assert!(result.is_none());
}

#[tokio::test]
async fn test_threshold_above_one_never_hits() {
    let embedder = Arc::new(FakeEmbedder::new(4).with(LAKE_PROMPT, &LAKE_VECTOR));
    let store = Arc::new(lake_store());

    let result = cache(&embedder, &store).lookup(LAKE_PROMPT, 1.01).await.unwrap();

    assert!(result.is_none());
}

#[tokio::test]
async fn test_empty_store_issues_one_call_each() {
    let embedder = Arc::new(FakeEmbedder::new(4).with(LAKE_PROMPT, &LAKE_VECTOR));
    let store = Arc::new(FakeStore::new());
    let cache = cache(&embedder, &store);

    assert!(cache.lookup(LAKE_PROMPT, 0.95).await.unwrap().is_none());
    assert_eq!(embedder.calls(), 1);
    assert_eq!(store.queries(), 1);
    assert_eq!(cache.stats().misses(), 1);
}

#[tokio::test]
async fn test_lookup_default_uses_configured_threshold() {
    let near = [0.12, 0.87, 0.33, 0.5];
    assert!(cosine(&near, &LAKE_VECTOR) > 0.9 && cosine(&near, &LAKE_VECTOR) < 0.999);

    let embedder = Arc::new(FakeEmbedder::new(4).with("largest lake?", &near));
    let store = Arc::new(lake_store());
    let strict = SemanticCache::new(
        embedder.clone(),
        store.clone(),
        &CacheConfig {
            similarity_threshold: 0.999,
            ..config()
        },
    );
    let loose = SemanticCache::new(
        embedder.clone(),
        store.clone(),
        &CacheConfig {
            similarity_threshold: 0.9,
            ..config()
        },
    );

    assert!(strict.lookup_default("largest lake?").await.unwrap().is_none());
    assert_eq!(
        loose.lookup_default("largest lake?").await.unwrap().as_deref(),
        Some("Lake Superior")
    );
    assert_eq!(loose.default_threshold(), 0.9);
}

#[tokio::test]
async fn test_find_returns_best_of_several() {
    let query = [1.0, 0.0, 0.0, 0.0];
    let store = Arc::new(
        FakeStore::new()
            .with_entry(CacheEntry::new("a", "close", vec![1.0, 0.1, 0.0, 0.0]))
            .with_entry(CacheEntry::new("b", "closest", vec![1.0, 0.01, 0.0, 0.0]))
            .with_entry(CacheEntry::new("c", "far", vec![0.0, 1.0, 0.0, 0.0])),
    );
    let embedder = Arc::new(FakeEmbedder::new(4).with("q", &query));

    let hit = cache(&embedder, &store)
        .find(&CacheQuery::new("q", 0.5))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(hit.completion_text, "closest");
    assert_eq!(hit.user_prompt.as_deref(), Some("b"));
    assert!(hit.similarity_score > 0.99);
}

#[tokio::test]
async fn test_tied_entries_yield_exactly_one() {
    let store = Arc::new(
        FakeStore::new()
            .with_entry(CacheEntry::new("p1", "first", LAKE_VECTOR.to_vec()))
            .with_entry(CacheEntry::new("p2", "second", LAKE_VECTOR.to_vec())),
    );
    let embedder = Arc::new(FakeEmbedder::new(4).with(LAKE_PROMPT, &LAKE_VECTOR));

    let result = cache(&embedder, &store).lookup(LAKE_PROMPT, 0.9).await.unwrap();

    let completion = result.unwrap();
    assert!(completion == "first" || completion == "second");
}

#[tokio::test]
async fn test_row_at_threshold_is_rejected() {
    let store = Arc::new(FakeStore {
        forced: Some(CacheHit::new("Lake Superior", 0.95)),
        ..FakeStore::new()
    });
    let embedder = Arc::new(FakeEmbedder::new(4).with(LAKE_PROMPT, &LAKE_VECTOR));
    let cache = cache(&embedder, &store);

    assert!(cache.lookup(LAKE_PROMPT, 0.95).await.unwrap().is_none());
    assert_eq!(cache.stats().rejected(), 1);
    assert_eq!(cache.stats().misses(), 1);

    assert_eq!(
        cache.lookup(LAKE_PROMPT, 0.94).await.unwrap().as_deref(),
        Some("Lake Superior")
    );
    assert_eq!(cache.stats().hits(), 1);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_embedding_failure_skips_store() {
    let embedder = Arc::new(FakeEmbedder::new(4).behaving(Behaviour::Fail));
    let store = Arc::new(lake_store());
    let cache = cache(&embedder, &store);

    let err = cache.lookup(LAKE_PROMPT, 0.95).await.unwrap_err();

    assert!(matches!(err, SemCacheError::EmbeddingError(_)));
    assert_eq!(store.queries(), 0);
    assert_eq!(cache.stats().embedding_failures(), 1);
    assert_eq!(cache.stats().completed(), 0);
}

#[tokio::test]
async fn test_store_failure_is_distinct() {
    let embedder = Arc::new(FakeEmbedder::new(4).with(LAKE_PROMPT, &LAKE_VECTOR));
    let store = Arc::new(FakeStore {
        fail: true,
        ..FakeStore::new()
    });
    let cache = cache(&embedder, &store);

    let err = cache.lookup(LAKE_PROMPT, 0.95).await.unwrap_err();

    assert!(matches!(err, SemCacheError::StoreQueryError(_)));
    assert!(err.is_service_failure());
    assert_eq!(embedder.calls(), 1);
    assert_eq!(store.queries(), 1);
    assert_eq!(cache.stats().store_failures(), 1);
}

#[tokio::test]
async fn test_wrong_dimension_is_embedding_error() {
    let embedder = Arc::new(FakeEmbedder::new(1536).with(LAKE_PROMPT, &LAKE_VECTOR));
    let store = Arc::new(lake_store());

    let err = cache(&embedder, &store)
        .lookup(LAKE_PROMPT, 0.95)
        .await
        .unwrap_err();

    assert!(matches!(err, SemCacheError::EmbeddingError(_)));
    assert_eq!(store.queries(), 0);
}

#[tokio::test]
async fn test_empty_vector_is_embedding_error() {
    let embedder = Arc::new(FakeEmbedder::new(4).with(LAKE_PROMPT, &[]));
    let store = Arc::new(lake_store());

    let err = cache(&embedder, &store)
        .lookup(LAKE_PROMPT, 0.95)
        .await
        .unwrap_err();

    assert!(matches!(err, SemCacheError::EmbeddingError(_)));
}

#[tokio::test]
async fn test_invalid_query_makes_no_calls() {
    let embedder = Arc::new(FakeEmbedder::new(4));
    let store = Arc::new(lake_store());
    let cache = cache(&embedder, &store);

    assert!(matches!(
        cache.lookup("  ", 0.95).await,
        Err(SemCacheError::ValidationError(_))
    ));
    assert!(matches!(
        cache.lookup(LAKE_PROMPT, f32::NAN).await,
        Err(SemCacheError::ValidationError(_))
    ));
    assert_eq!(embedder.calls(), 0);
    assert_eq!(store.queries(), 0);
}

#[tokio::test]
async fn test_hung_embedding_times_out() {
    let embedder = Arc::new(FakeEmbedder::new(4).behaving(Behaviour::Hang));
    let store = Arc::new(lake_store());
    let cache = cache(&embedder, &store).with_timeout(Some(Duration::from_millis(20)));

    let err = cache.lookup(LAKE_PROMPT, 0.95).await.unwrap_err();

    match err {
        SemCacheError::EmbeddingError(msg) => assert!(msg.contains("timed out")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(store.queries(), 0);
}

#[tokio::test]
async fn test_hung_store_query_times_out() {
    let embedder = Arc::new(FakeEmbedder::new(4).with(LAKE_PROMPT, &LAKE_VECTOR));
    let store = Arc::new(FakeStore {
        hang: true,
        ..lake_store()
    });
    let cache = cache(&embedder, &store).with_timeout(Some(Duration::from_millis(20)));

    let err = cache.lookup(LAKE_PROMPT, 0.95).await.unwrap_err();

    match err {
        SemCacheError::StoreQueryError(msg) => assert!(msg.contains("timed out")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(embedder.calls(), 1);
    assert_eq!(store.queries(), 1);
    assert_eq!(cache.stats().store_failures(), 1);
    assert_eq!(cache.stats().embedding_failures(), 0);
}

// =============================================================================
// Recording entries
// =============================================================================

#[tokio::test]
async fn test_record_then_lookup() {
    let embedder = Arc::new(FakeEmbedder::new(4).with(LAKE_PROMPT, &LAKE_VECTOR));
    let store = Arc::new(FakeStore::new());
    let cache = cache(&embedder, &store);

    let entry = cache
        .record(LAKE_PROMPT, "Lake Superior", Some("session-42"))
        .await
        .unwrap();
    assert_eq!(entry.session_id, "session-42");
    assert_eq!(store.len(), 1);

    let lookups_before = store.queries();
    assert_eq!(
        cache.lookup(LAKE_PROMPT, 0.95).await.unwrap().as_deref(),
        Some("Lake Superior")
    );
    assert_eq!(store.queries(), lookups_before + 1);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_record_rejects_empty_prompt() {
    let embedder = Arc::new(FakeEmbedder::new(4));
    let store = Arc::new(FakeStore::new());

    let err = cache(&embedder, &store)
        .record("", "completion", None)
        .await
        .unwrap_err();

    assert!(matches!(err, SemCacheError::ValidationError(_)));
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn test_record_rejects_empty_completion() {
    let embedder = Arc::new(FakeEmbedder::new(4).with(LAKE_PROMPT, &LAKE_VECTOR));
    let store = Arc::new(FakeStore::new());

    let err = cache(&embedder, &store)
        .record(LAKE_PROMPT, "", None)
        .await
        .unwrap_err();

    assert!(matches!(err, SemCacheError::ValidationError(_)));
    assert_eq!(embedder.calls(), 0);
    assert_eq!(store.len(), 0);
}

#[tokio::test]
async fn test_hung_store_write_times_out() {
    let embedder = Arc::new(FakeEmbedder::new(4).with(LAKE_PROMPT, &LAKE_VECTOR));
    let store = Arc::new(FakeStore {
        hang: true,
        ..FakeStore::new()
    });
    let cache = cache(&embedder, &store).with_timeout(Some(Duration::from_millis(20)));

    let err = cache
        .record(LAKE_PROMPT, "Lake Superior", None)
        .await
        .unwrap_err();

    match err {
        SemCacheError::DatabaseError(msg) => assert!(msg.contains("timed out")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(embedder.calls(), 1);
    assert_eq!(store.len(), 0);
}

// =============================================================================
// Properties
// =============================================================================

fn vector4() -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(0.1f32..1.0, 4)
}

proptest! {
    #[test]
    fn prop_identical_embedding_hits_below_one(stored in vector4(), threshold in -1.0f32..0.99) {
        let embedder = Arc::new(FakeEmbedder::new(4).with("prompt", &stored));
        let store = Arc::new(FakeStore::new().with_entry(CacheEntry::new("prompt", "cached", stored.clone())));
        let cache = SemanticCache::new(embedder, store, &CacheConfig { request_timeout_secs: 0, ..config() });

        let result = tokio_test::block_on(cache.lookup("prompt", threshold)).unwrap();
        prop_assert_eq!(result.as_deref(), Some("cached"));
    }

    #[test]
    fn prop_threshold_above_one_always_misses(
        entries in prop::collection::vec(vector4(), 0..8),
        query in vector4(),
        threshold in 1.01f32..10.0,
    ) {
        let embedder = Arc::new(FakeEmbedder::new(4).with("prompt", &query));
        let mut store = FakeStore::new();
        for (i, vectors) in entries.into_iter().enumerate() {
            store = store.with_entry(CacheEntry::new(format!("p{i}"), format!("c{i}"), vectors));
        }
        let store = Arc::new(store);
        let cache = SemanticCache::new(embedder.clone(), store.clone(), &CacheConfig { request_timeout_secs: 0, ..config() });

        let result = tokio_test::block_on(cache.lookup("prompt", threshold)).unwrap();
        prop_assert!(result.is_none());
        prop_assert_eq!(embedder.calls(), 1);
        prop_assert_eq!(store.queries(), 1);
    }
}
