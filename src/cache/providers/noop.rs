//! No-op cache provider
//!
//! Always returns miss/success. Used when caching is disabled
//! (graceful degradation: a missing cache must never fail the caller).

use crate::cache::errors::CacheResult;
use crate::cache::traits::{CacheService, ScoredIndexService, ScoredKey};
use std::time::Duration;

/// No-op cache service that never caches anything
///
/// All reads return None, all writes succeed silently.
#[derive(Debug, Clone, Default)]
pub struct NoOpCacheService;

impl NoOpCacheService {
    pub fn new() -> Self {
        Self
    }
}

impl CacheService for NoOpCacheService {
    async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
        Ok(None)
    }

    async fn set_with_ttl(&self, _key: &str, _value: &str, _ttl: Duration) -> CacheResult<()> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> CacheResult<()> {
        Ok(())
    }

    async fn scan_delete(&self, _pattern: &str) -> CacheResult<u64> {
        Ok(0)
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "noop"
    }
}

impl ScoredIndexService for NoOpCacheService {
    async fn add_scored(&self, _key: &str, _score: f64) -> CacheResult<()> {
        Ok(())
    }

    async fn range_by_score(&self, _min: f64, _max: f64) -> CacheResult<Vec<ScoredKey>> {
        Ok(Vec::new())
    }

    async fn remove_scored(&self, _keys: &[String]) -> CacheResult<u64> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_always_misses() {
        let svc = NoOpCacheService::new();
        svc.set_with_ttl("key", "value", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(svc.get("key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_noop_index_is_empty() {
        let svc = NoOpCacheService::new();
        svc.add_scored("key", 0.5).await.unwrap();
        assert!(svc.range_by_score(0.0, 1.0).await.unwrap().is_empty());
    }
}
