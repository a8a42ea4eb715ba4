//! In-memory cache provider
//!
//! Single-process key-value store with per-entry TTL and a sorted score
//! index. Expiry is lazy: an expired entry is dropped on first read.
//!
//! Time is measured with `tokio::time::Instant`, so TTL behavior is fully
//! testable under a paused runtime clock.

use crate::cache::errors::CacheResult;
use crate::cache::key::glob_match;
use crate::cache::traits::{CacheService, ScoredIndexService, ScoredKey};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredEntry {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Clone)]
struct ScoredMember {
    key: String,
    score: f64,
}

/// Scores are bucketed on a fixed-point integer key to keep the index
/// ordered; the true score is kept alongside for range filtering.
fn scale_score(score: f64) -> i64 {
    (score * 1_000_000.0).round() as i64
}

#[derive(Debug, Default)]
struct MemoryInner {
    entries: DashMap<String, StoredEntry>,
    scored: RwLock<BTreeMap<i64, Vec<ScoredMember>>>,
    score_buckets: DashMap<String, i64>,
}

/// In-memory cache service with TTL and scored-index support
#[derive(Clone, Default)]
pub struct MemoryCacheService {
    inner: Arc<MemoryInner>,
}

impl std::fmt::Debug for MemoryCacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCacheService")
            .field("entry_count", &self.inner.entries.len())
            .field("scored_count", &self.inner.score_buckets.len())
            .finish()
    }
}

impl MemoryCacheService {
    pub fn new() -> Self {
        Self::default()
    }

    fn remove_from_bucket(&self, key: &str, bucket: i64) {
        let mut scored = self.inner.scored.write();
        if let Some(members) = scored.get_mut(&bucket) {
            members.retain(|m| m.key != key);
            if members.is_empty() {
                scored.remove(&bucket);
            }
        }
    }
}

impl CacheService for MemoryCacheService {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        if let Some(entry) = self.inner.entries.get(key) {
            if entry.expires_at <= Instant::now() {
                drop(entry);
                self.inner.entries.remove(key);
                debug!(key = key, "cache entry expired (memory)");
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.inner.entries.insert(
            key.to_string(),
            StoredEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.inner.entries.remove(key);
        Ok(())
    }

    async fn scan_delete(&self, pattern: &str) -> CacheResult<u64> {
        let matching: Vec<String> = self
            .inner
            .entries
            .iter()
            .filter(|entry| glob_match(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in matching {
            if self.inner.entries.remove(&key).is_some() {
                removed += 1;
            }
        }
        debug!(pattern = pattern, removed = removed, "scan delete (memory)");
        Ok(removed)
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}

impl ScoredIndexService for MemoryCacheService {
    async fn add_scored(&self, key: &str, score: f64) -> CacheResult<()> {
        if let Some(old_bucket) = self.inner.score_buckets.get(key).map(|b| *b) {
            self.remove_from_bucket(key, old_bucket);
        }

        let bucket = scale_score(score);
        self.inner
            .scored
            .write()
            .entry(bucket)
            .or_default()
            .push(ScoredMember {
                key: key.to_string(),
                score,
            });
        self.inner.score_buckets.insert(key.to_string(), bucket);
        Ok(())
    }

    async fn range_by_score(&self, min: f64, max: f64) -> CacheResult<Vec<ScoredKey>> {
        let scored = self.inner.scored.read();
        let mut results: Vec<ScoredKey> = scored
            .range(scale_score(min)..=scale_score(max))
            .flat_map(|(_, members)| members.iter())
            .filter(|m| m.score >= min && m.score <= max)
            .map(|m| ScoredKey {
                key: m.key.clone(),
                score: m.score,
            })
            .collect();
        results.sort_by(|a, b| a.score.total_cmp(&b.score));
        Ok(results)
    }

    async fn remove_scored(&self, keys: &[String]) -> CacheResult<u64> {
        let mut removed = 0;
        for key in keys {
            if let Some((_, bucket)) = self.inner.score_buckets.remove(key) {
                self.remove_from_bucket(key, bucket);
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_then_get_round_trips() {
        let svc = MemoryCacheService::new();
        svc.set_with_ttl("k1", "v1", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(svc.get("k1").await.unwrap(), Some("v1".to_string()));
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let svc = MemoryCacheService::new();
        assert_eq!(svc.get("absent").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let svc = MemoryCacheService::new();
        svc.set_with_ttl("k1", "v1", Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(svc.get("k1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let svc = MemoryCacheService::new();
        svc.set_with_ttl("k1", "v1", Duration::from_secs(60))
            .await
            .unwrap();
        svc.set_with_ttl("k1", "v2", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(svc.get("k1").await.unwrap(), Some("v2".to_string()));
    }

    #[tokio::test]
    async fn test_scan_delete_by_pattern() {
        let svc = MemoryCacheService::new();
        svc.set_with_ttl("ns:unit:a", "1", Duration::from_secs(60))
            .await
            .unwrap();
        svc.set_with_ttl("ns:unit:b", "2", Duration::from_secs(60))
            .await
            .unwrap();
        svc.set_with_ttl("ns:plan:c", "3", Duration::from_secs(60))
            .await
            .unwrap();

        let removed = svc.scan_delete("ns:unit:*").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(svc.get("ns:unit:a").await.unwrap(), None);
        assert_eq!(svc.get("ns:plan:c").await.unwrap(), Some("3".to_string()));
    }

    #[tokio::test]
    async fn test_scored_index_range_query() {
        let svc = MemoryCacheService::new();
        svc.add_scored("low", 0.2).await.unwrap();
        svc.add_scored("mid", 0.5).await.unwrap();
        svc.add_scored("high", 0.9).await.unwrap();

        let hits = svc.range_by_score(0.4, 0.6).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "mid");

        let all = svc.range_by_score(0.0, 1.0).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].key, "low");
        assert_eq!(all[2].key, "high");
    }

    #[tokio::test]
    async fn test_scored_index_rescore_moves_key() {
        let svc = MemoryCacheService::new();
        svc.add_scored("k", 0.2).await.unwrap();
        svc.add_scored("k", 0.8).await.unwrap();

        assert!(svc.range_by_score(0.1, 0.3).await.unwrap().is_empty());
        let hits = svc.range_by_score(0.7, 0.9).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_scored() {
        let svc = MemoryCacheService::new();
        svc.add_scored("a", 0.5).await.unwrap();
        svc.add_scored("b", 0.5).await.unwrap();

        let removed = svc
            .remove_scored(&["a".to_string(), "absent".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        let remaining = svc.range_by_score(0.0, 1.0).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].key, "b");
    }
}
