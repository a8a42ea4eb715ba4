//! Cache backend trait definitions
//!
//! Any key-value store with TTL support and a sorted-range score index can
//! back the cache tier: the in-memory provider here, or a Redis-shaped
//! backend slotted into `CacheProvider`.

use super::errors::CacheResult;
use std::time::Duration;

/// Trait defining key-value cache operations
///
/// Implemented by concrete cache providers (in-memory, no-op).
/// All operations are async and return `CacheResult` for error handling.
pub trait CacheService: Send + Sync {
    /// Get a value from the cache by key
    ///
    /// Returns `Ok(Some(value))` on cache hit, `Ok(None)` on cache miss.
    /// An entry past its TTL is a miss, never a stale value.
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = CacheResult<Option<String>>> + Send;

    /// Set a value in the cache with a TTL; upsert semantics (last write wins)
    fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = CacheResult<()>> + Send;

    /// Delete a specific key from the cache
    fn delete(&self, key: &str) -> impl std::future::Future<Output = CacheResult<()>> + Send;

    /// Delete all keys matching a glob-style pattern, returning the count
    fn scan_delete(
        &self,
        pattern: &str,
    ) -> impl std::future::Future<Output = CacheResult<u64>> + Send;

    /// Check if the cache backend is healthy
    fn health_check(&self) -> impl std::future::Future<Output = CacheResult<bool>> + Send;

    /// Get the name of the cache provider
    fn provider_name(&self) -> &'static str;
}

/// A key in the scored similarity index
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredKey {
    pub key: String,
    pub score: f64,
}

/// Trait defining the sorted-range index used for coarse similarity bucketing
pub trait ScoredIndexService: Send + Sync {
    /// Add (or re-score) a key in the index
    fn add_scored(
        &self,
        key: &str,
        score: f64,
    ) -> impl std::future::Future<Output = CacheResult<()>> + Send;

    /// All keys with score in `[min, max]`, ascending by score
    fn range_by_score(
        &self,
        min: f64,
        max: f64,
    ) -> impl std::future::Future<Output = CacheResult<Vec<ScoredKey>>> + Send;

    /// Remove keys from the index, returning how many were present
    fn remove_scored(
        &self,
        keys: &[String],
    ) -> impl std::future::Future<Output = CacheResult<u64>> + Send;
}
