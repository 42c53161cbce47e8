//! Lookup statistics
//!
//! Lock-free counters describing how lookups ended: hits, misses, and the
//! two kinds of service failure.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for semantic cache lookups
#[derive(Debug, Default)]
pub struct LookupStats {
    /// Lookups that returned a cached completion
    hits: AtomicU64,
    /// Lookups where nothing cleared the threshold
    misses: AtomicU64,
    /// Rows the store returned at or below the threshold
    rejected: AtomicU64,
    /// Lookups aborted by the embedding service
    embedding_failures: AtomicU64,
    /// Lookups aborted by the vector store
    store_failures: AtomicU64,
}

impl LookupStats {
    /// Create new statistics tracker
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_embedding_failure(&self) {
        self.embedding_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store_failure(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total hits
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get total misses
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get rows rejected by the strict threshold check
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Get embedding failures
    pub fn embedding_failures(&self) -> u64 {
        self.embedding_failures.load(Ordering::Relaxed)
    }

    /// Get store failures
    pub fn store_failures(&self) -> u64 {
        self.store_failures.load(Ordering::Relaxed)
    }

    /// Lookups that reached a verdict (hits + misses)
    pub fn completed(&self) -> u64 {
        self.hits() + self.misses()
    }

    /// Calculate hit rate over completed lookups (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.completed();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }

    /// Get a summary report
    pub fn report(&self) -> LookupStatsReport {
        LookupStatsReport {
            hits: self.hits(),
            misses: self.misses(),
            rejected: self.rejected(),
            embedding_failures: self.embedding_failures(),
            store_failures: self.store_failures(),
            hit_rate: self.hit_rate(),
        }
    }
}

/// Serializable lookup statistics report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupStatsReport {
    pub hits: u64,
    pub misses: u64,
    pub rejected: u64,
    pub embedding_failures: u64,
    pub store_failures: u64,
    pub hit_rate: f64,
}
