//! Cache provider with enum dispatch
//!
//! Uses enum dispatch for zero-cost abstraction over concrete backends.
//! Any store exposing the `CacheService` + `ScoredIndexService` contract
//! (a Redis-shaped backend, for instance) slots in as another variant;
//! consumers only see `CacheProvider`.

use super::errors::CacheResult;
use super::providers::{MemoryCacheService, NoOpCacheService};
use super::traits::{CacheService, ScoredIndexService, ScoredKey};
use crate::config::CacheConfig;
use std::time::Duration;
use tracing::info;

/// Internal cache backend enum for zero-cost dispatch
#[derive(Debug, Clone)]
enum CacheBackend {
    /// In-process store with TTL and scored index
    Memory(MemoryCacheService),

    /// Always-miss, always-succeed fallback
    NoOp(NoOpCacheService),
}

/// Unified cache backend handle used by the cache tier.
///
/// Disabled configuration degrades to the NoOp backend so the engine runs
/// identically with caching off.
#[derive(Debug, Clone)]
pub struct CacheProvider {
    backend: CacheBackend,
}

impl CacheProvider {
    /// Create a provider from configuration
    pub fn from_config(config: &CacheConfig) -> Self {
        if !config.enabled {
            info!("generation cache disabled by configuration");
            return Self::noop();
        }
        info!(namespace = %config.namespace, "in-memory cache provider initialized");
        Self::memory()
    }

    /// In-memory backend
    pub fn memory() -> Self {
        Self {
            backend: CacheBackend::Memory(MemoryCacheService::new()),
        }
    }

    /// No-op backend (explicit opt-out or testing)
    pub fn noop() -> Self {
        Self {
            backend: CacheBackend::NoOp(NoOpCacheService::new()),
        }
    }

    /// Whether caching is actually enabled (not NoOp)
    pub fn is_enabled(&self) -> bool {
        !matches!(self.backend, CacheBackend::NoOp(_))
    }

    pub fn provider_name(&self) -> &'static str {
        match &self.backend {
            CacheBackend::Memory(s) => s.provider_name(),
            CacheBackend::NoOp(s) => s.provider_name(),
        }
    }

    pub async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        match &self.backend {
            CacheBackend::Memory(s) => s.get(key).await,
            CacheBackend::NoOp(s) => s.get(key).await,
        }
    }

    pub async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        match &self.backend {
            CacheBackend::Memory(s) => s.set_with_ttl(key, value, ttl).await,
            CacheBackend::NoOp(s) => s.set_with_ttl(key, value, ttl).await,
        }
    }

    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        match &self.backend {
            CacheBackend::Memory(s) => s.delete(key).await,
            CacheBackend::NoOp(s) => s.delete(key).await,
        }
    }

    pub async fn scan_delete(&self, pattern: &str) -> CacheResult<u64> {
        match &self.backend {
            CacheBackend::Memory(s) => s.scan_delete(pattern).await,
            CacheBackend::NoOp(s) => s.scan_delete(pattern).await,
        }
    }

    pub async fn health_check(&self) -> CacheResult<bool> {
        match &self.backend {
            CacheBackend::Memory(s) => s.health_check().await,
            CacheBackend::NoOp(s) => s.health_check().await,
        }
    }

    pub async fn add_scored(&self, key: &str, score: f64) -> CacheResult<()> {
        match &self.backend {
            CacheBackend::Memory(s) => s.add_scored(key, score).await,
            CacheBackend::NoOp(s) => s.add_scored(key, score).await,
        }
    }

    pub async fn range_by_score(&self, min: f64, max: f64) -> CacheResult<Vec<ScoredKey>> {
        match &self.backend {
            CacheBackend::Memory(s) => s.range_by_score(min, max).await,
            CacheBackend::NoOp(s) => s.range_by_score(min, max).await,
        }
    }

    pub async fn remove_scored(&self, keys: &[String]) -> CacheResult<u64> {
        match &self.backend {
            CacheBackend::Memory(s) => s.remove_scored(keys).await,
            CacheBackend::NoOp(s) => s.remove_scored(keys).await,
        }
    }
}
