//! semcache Core - Domain models, errors, and shared configuration
//!
//! This crate defines the types shared by every semcache crate:
//! - Cache entries stored in the vector collection
//! - Lookup queries and typed lookup hits
//! - Common error types
//! - Configuration management

pub mod config;

pub use config::{
    AppConfig, CacheConfig, ConfigError, EmbeddingConfig, EmbeddingProvider, LoggingConfig,
    StoreConfig,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for semcache operations
///
/// Embedding and store failures are kept apart so callers can tell
/// "checked and missed" (`Ok(None)`) from "could not check".
#[derive(Error, Debug)]
pub enum SemCacheError {
    #[error("Embedding service error: {0}")]
    EmbeddingError(String),

    #[error("Store query error: {0}")]
    StoreQueryError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SemCacheError {
    /// Whether the failure came from one of the external services
    pub fn is_service_failure(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingError(_) | Self::StoreQueryError(_) | Self::DatabaseError(_)
        )
    }
}

impl From<ConfigError> for SemCacheError {
    fn from(err: ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SemCacheError>;

// ============================================================================
// Cache Entries
// ============================================================================

/// Session used when an entry is stored without an explicit session
pub const DEFAULT_SESSION_ID: &str = "default";

/// A prompt/completion pair stored in the vector collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Point identifier in the vector store
    pub id: Uuid,

    /// Chat session the pair was recorded in
    pub session_id: String,

    /// Prompt the user sent
    pub user_prompt: String,

    /// Completion returned for the prompt
    pub completion_text: String,

    /// Embedding of `user_prompt`
    pub vectors: Vec<f32>,

    /// When the entry was recorded
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create a new entry in the default session
    pub fn new(
        user_prompt: impl Into<String>,
        completion_text: impl Into<String>,
        vectors: Vec<f32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: DEFAULT_SESSION_ID.to_string(),
            user_prompt: user_prompt.into(),
            completion_text: completion_text.into(),
            vectors,
            created_at: Utc::now(),
        }
    }

    /// Set session
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Check the entry against the collection dimension
    pub fn validate(&self, dimension: usize) -> Result<()> {
        if self.vectors.len() != dimension {
            return Err(SemCacheError::ValidationError(format!(
                "entry vector has {} dimensions, collection expects {dimension}",
                self.vectors.len()
            )));
        }
        if self.completion_text.is_empty() {
            return Err(SemCacheError::ValidationError(
                "entry completion text is empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Lookup Types
// ============================================================================

/// A single semantic cache lookup request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheQuery {
    /// Text to look up
    pub input_text: String,

    /// Cosine similarity a stored entry must strictly exceed
    pub threshold_score: f32,
}

impl CacheQuery {
    /// Create a new lookup query
    pub fn new(input_text: impl Into<String>, threshold_score: f32) -> Self {
        Self {
            input_text: input_text.into(),
            threshold_score,
        }
    }

    /// Reject queries that could never be answered meaningfully
    ///
    /// Thresholds above 1.0 are allowed; they simply never match.
    pub fn validate(&self) -> Result<()> {
        if self.input_text.trim().is_empty() {
            return Err(SemCacheError::ValidationError(
                "input text must not be empty".to_string(),
            ));
        }
        if !self.threshold_score.is_finite() {
            return Err(SemCacheError::ValidationError(format!(
                "threshold must be a finite number, got {}",
                self.threshold_score
            )));
        }
        Ok(())
    }
}

/// The best stored entry for a lookup, as returned by the vector store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheHit {
    /// Cached completion
    pub completion_text: String,

    /// Cosine similarity between the query and the stored prompt
    pub similarity_score: f32,

    /// Stored prompt, when the store returned it
    pub user_prompt: Option<String>,

    /// Stored session, when the store returned it
    pub session_id: Option<String>,
}

impl CacheHit {
    /// Create a hit with only the required fields
    pub fn new(completion_text: impl Into<String>, similarity_score: f32) -> Self {
        Self {
            completion_text: completion_text.into(),
            similarity_score,
            user_prompt: None,
            session_id: None,
        }
    }

    /// Set prompt
    pub fn with_user_prompt(mut self, user_prompt: impl Into<String>) -> Self {
        self.user_prompt = Some(user_prompt.into());
        self
    }

    /// Whether this hit clears `threshold` (strictly greater)
    pub fn exceeds(&self, threshold: f32) -> bool {
        self.similarity_score > threshold
    }
}

// ============================================================================
// Tests
// ============================================================================
