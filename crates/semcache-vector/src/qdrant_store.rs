//! Qdrant implementation of the cache store
//!
//! Provides collection provisioning and the top-1 similarity query
//! used by semantic cache lookups.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, Distance, FieldType, PointStruct,
    ScalarQuantizationBuilder, SearchPointsBuilder, UpsertPointsBuilder, Value,
    VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use semcache_core::{CacheEntry, CacheHit, Result, SemCacheError, StoreConfig};
use serde::Serialize;
use std::collections::HashMap;

const SESSION_FIELD: &str = "session_id";
const PROMPT_FIELD: &str = "user_prompt";
const COMPLETION_FIELD: &str = "completion_text";

/// Qdrant cache store implementation
pub struct QdrantCacheStore {
    client: Qdrant,
    collection: String,
    dimension: usize,
    quantized: bool,
}

impl QdrantCacheStore {
    /// Create a new Qdrant connection
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let client = Qdrant::from_url(&config.qdrant_url)
            .api_key(config.qdrant_api_key.clone())
            .build()
            .map_err(|e| SemCacheError::DatabaseError(format!("Qdrant connection failed: {e}")))?;

        Ok(Self {
            client,
            collection: config.collection.clone(),
            dimension: config.vector_dimension,
            quantized: config.quantized,
        })
    }

    /// Collection name
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Initialize collection (run once on setup)
    ///
    /// Returns `true` if the collection was created, `false` if it
    /// already existed.
    pub async fn init_collection(&self) -> Result<bool> {
        // Check if collection exists
        let collections = self.client.list_collections().await.map_err(|e| {
            SemCacheError::DatabaseError(format!("Failed to list collections: {e}"))
        })?;

        let exists = collections
            .collections
            .iter()
            .any(|c| c.name == self.collection);

        if exists {
            tracing::debug!(collection = %self.collection, "collection already exists");
            return Ok(false);
        }

        let mut request = CreateCollectionBuilder::new(&self.collection).vectors_config(
            VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
        );
        if self.quantized {
            request = request.quantization_config(ScalarQuantizationBuilder::default());
        }

        self.client.create_collection(request).await.map_err(|e| {
            SemCacheError::DatabaseError(format!("Failed to create collection: {e}"))
        })?;

        // Entries are grouped by chat session
        self.client
            .create_field_index(CreateFieldIndexCollectionBuilder::new(
                &self.collection,
                SESSION_FIELD,
                FieldType::Keyword,
            ))
            .await
            .map_err(|e| {
                SemCacheError::DatabaseError(format!("Failed to index {SESSION_FIELD}: {e}"))
            })?;

        tracing::info!(
            collection = %self.collection,
            dimension = self.dimension,
            quantized = self.quantized,
            "created cache collection"
        );
        Ok(true)
    }
}

/// Payload stored with each vector
#[derive(Debug, Clone, Serialize)]
struct EntryPayload<'a> {
    session_id: &'a str,
    user_prompt: &'a str,
    completion_text: &'a str,
    created_at: String,
}

fn to_payload(entry: &CacheEntry) -> Result<HashMap<String, Value>> {
    let payload = EntryPayload {
        session_id: &entry.session_id,
        user_prompt: &entry.user_prompt,
        completion_text: &entry.completion_text,
        created_at: entry.created_at.to_rfc3339(),
    };

    match serde_json::to_value(&payload) {
        Ok(serde_json::Value::Object(map)) => {
            Ok(map.into_iter().map(|(k, v)| (k, v.into())).collect())
        }
        Ok(other) => Err(SemCacheError::ValidationError(format!(
            "entry payload is not an object: {other}"
        ))),
        Err(e) => Err(SemCacheError::ValidationError(format!(
            "Failed to encode entry payload: {e}"
        ))),
    }
}

/// Decode a scored point's payload into a typed hit
///
/// A row without a completion is a store error rather than a miss.
fn hit_from_payload(payload: &HashMap<String, Value>, score: f32) -> Result<CacheHit> {
    let text = |field: &str| payload.get(field).and_then(|v| v.as_str()).cloned();

    let completion_text = text(COMPLETION_FIELD).ok_or_else(|| {
        SemCacheError::StoreQueryError(format!("matched row has no {COMPLETION_FIELD}"))
    })?;

    Ok(CacheHit {
        completion_text,
        similarity_score: score,
        user_prompt: text(PROMPT_FIELD),
        session_id: text(SESSION_FIELD),
    })
}

#[async_trait]
impl super::CacheStore for QdrantCacheStore {
    async fn store(&self, entry: &CacheEntry) -> Result<()> {
        entry.validate(self.dimension)?;

        let point = PointStruct::new(
            entry.id.to_string(),
            entry.vectors.clone(),
            to_payload(entry)?,
        );

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true))
            .await
            .map_err(|e| SemCacheError::DatabaseError(format!("Failed to upsert entry: {e}")))?;

        tracing::debug!(id = %entry.id, session = %entry.session_id, "stored cache entry");
        Ok(())
    }

    async fn nearest_above(&self, query_vector: &[f32], threshold: f32) -> Result<Option<CacheHit>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, query_vector.to_vec(), 1)
                    .score_threshold(threshold)
                    .with_payload(true),
            )
            .await
            .map_err(|e| SemCacheError::StoreQueryError(format!("Vector search failed: {e}")))?;

        tracing::debug!(
            rows = response.result.len(),
            elapsed = response.time,
            "similarity query finished"
        );

        match response.result.into_iter().next() {
            Some(point) => hit_from_payload(&point.payload, point.score).map(Some),
            None => Ok(None),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
