//! # Generation Cache (two-level tier)
//!
//! Avoids repeating expensive generation calls for equivalent inputs:
//!
//! 1. **L1**: in-process bounded LRU, move-to-front on hit.
//! 2. **Exact**: persistent provider keyed on the namespaced SHA-256 key.
//! 3. **Similarity**: for queries carrying an embedding, a coarse
//!    bucket-score range query followed by true cosine comparison.
//!
//! Every successful resolution is written back into the L1. Backend errors
//! are logged, counted, and degrade to a miss — a broken backend never
//! fails the caller. All writes are upserts; no cross-request transactions.

use super::key::{build_cache_key, detect_category, glob_match, CacheCategory};
use super::provider::CacheProvider;
use super::similarity::{bucket_score, cosine_similarity, SimilarityEntry};
use crate::config::CacheConfig;
use crate::metrics::MetricsSink;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// A lookup/store request against the generation cache.
///
/// `parameter` is the caller-stringified tuning parameter folded into the
/// exact key (bit-exact contract). The embedding, when present, enables the
/// similarity path; `result_count` is the secondary parameter that must
/// match exactly for a similarity hit.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub content: String,
    pub model_id: String,
    pub parameter: String,
    pub embedding: Option<Vec<f32>>,
    pub result_count: u32,
    /// Explicit TTL category; `None` detects one from the content
    pub category: Option<CacheCategory>,
}

impl GenerationRequest {
    pub fn new(
        content: impl Into<String>,
        model_id: impl Into<String>,
        parameter: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            model_id: model_id.into(),
            parameter: parameter.into(),
            embedding: None,
            result_count: 1,
            category: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_result_count(mut self, result_count: u32) -> Self {
        self.result_count = result_count;
        self
    }

    pub fn with_category(mut self, category: CacheCategory) -> Self {
        self.category = Some(category);
        self
    }
}

struct L1Entry {
    value: String,
    expires_at: Instant,
}

/// Two-level generation cache with exact and similarity lookup
pub struct GenerationCache {
    provider: CacheProvider,
    l1: Mutex<LruCache<String, L1Entry>>,
    config: CacheConfig,
    metrics: Arc<dyn MetricsSink>,
}

impl GenerationCache {
    pub fn new(config: CacheConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        let provider = CacheProvider::from_config(&config);
        Self::with_provider(provider, config, metrics)
    }

    pub fn with_provider(
        provider: CacheProvider,
        config: CacheConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let capacity = NonZeroUsize::new(config.l1_capacity.max(1))
            .unwrap_or_else(|| NonZeroUsize::new(100).expect("nonzero"));
        Self {
            provider,
            l1: Mutex::new(LruCache::new(capacity)),
            config,
            metrics,
        }
    }

    /// Resolve a request: L1, then exact, then similarity.
    ///
    /// Returns `None` on a full miss; backend errors also resolve to `None`.
    pub async fn get(&self, request: &GenerationRequest) -> Option<String> {
        let key = self.exact_key(request);

        if let Some(value) = self.l1_get(&key) {
            self.metrics.increment("cache.l1.hit");
            debug!(key = %key, "cache hit (l1)");
            return Some(value);
        }
        self.metrics.increment("cache.l1.miss");

        match self.provider.get(&key).await {
            Ok(Some(value)) => {
                self.metrics.increment("cache.exact.hit");
                debug!(key = %key, "cache hit (exact)");
                self.l1_insert(&key, &value, self.ttl_for(request));
                return Some(value);
            }
            Ok(None) => {
                self.metrics.increment("cache.exact.miss");
            }
            Err(e) => {
                self.metrics.increment("cache.error");
                warn!(key = %key, error = %e, "cache backend error on get, treating as miss");
            }
        }

        if let Some(embedding) = &request.embedding {
            if let Some(value) = self.similarity_get(embedding, request.result_count).await {
                self.metrics.increment("cache.similarity.hit");
                self.l1_insert(&key, &value, self.ttl_for(request));
                return Some(value);
            }
            self.metrics.increment("cache.similarity.miss");
        }

        None
    }

    /// Store a resolved payload under the request's exact key; requests with
    /// an embedding are additionally indexed for similarity lookup.
    pub async fn put(&self, request: &GenerationRequest, payload: &str) {
        let key = self.exact_key(request);
        let ttl = self.ttl_for(request);

        match self.provider.set_with_ttl(&key, payload, ttl).await {
            Ok(()) => self.metrics.increment("cache.write"),
            Err(e) => {
                self.metrics.increment("cache.error");
                warn!(key = %key, error = %e, "cache backend error on set");
            }
        }
        self.l1_insert(&key, payload, ttl);

        if let Some(embedding) = &request.embedding {
            self.similarity_put(&key, embedding, request.result_count, payload, ttl)
                .await;
        }
    }

    /// Scoped invalidation: remove matching keys from the persistent store
    /// and the similarity index, and clear the L1.
    ///
    /// Returns the number of entries removed from the persistent store.
    pub async fn invalidate(&self, pattern: &str) -> u64 {
        let removed = match self.provider.scan_delete(pattern).await {
            Ok(count) => count,
            Err(e) => {
                self.metrics.increment("cache.error");
                warn!(pattern = pattern, error = %e, "cache backend error on invalidation");
                0
            }
        };

        match self.provider.range_by_score(f64::MIN, f64::MAX).await {
            Ok(indexed) => {
                let matching: Vec<String> = indexed
                    .into_iter()
                    .map(|scored| scored.key)
                    .filter(|key| glob_match(pattern, key))
                    .collect();
                if !matching.is_empty() {
                    if let Err(e) = self.provider.remove_scored(&matching).await {
                        self.metrics.increment("cache.error");
                        warn!(error = %e, "failed to prune similarity index on invalidation");
                    }
                }
            }
            Err(e) => {
                self.metrics.increment("cache.error");
                warn!(error = %e, "failed to scan similarity index on invalidation");
            }
        }

        self.l1.lock().clear();
        self.metrics.increment("cache.invalidation");
        debug!(pattern = pattern, removed = removed, "cache invalidated");
        removed
    }

    fn exact_key(&self, request: &GenerationRequest) -> String {
        build_cache_key(
            &self.config.namespace,
            &request.content,
            &request.model_id,
            &request.parameter,
        )
    }

    fn ttl_for(&self, request: &GenerationRequest) -> Duration {
        request
            .category
            .or_else(|| detect_category(&request.content))
            .map(|category| category.ttl(&self.config.ttl))
            .unwrap_or_else(|| self.config.ttl.default_ttl())
    }

    fn l1_get(&self, key: &str) -> Option<String> {
        let mut l1 = self.l1.lock();
        let expired = match l1.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            l1.pop(key);
        }
        None
    }

    fn l1_insert(&self, key: &str, value: &str, ttl: Duration) {
        self.l1.lock().put(
            key.to_string(),
            L1Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn similarity_get(&self, embedding: &[f32], result_count: u32) -> Option<String> {
        let score = bucket_score(embedding, self.config.bucket_prefix_dims);
        let window = self.config.bucket_window;

        let candidates = match self
            .provider
            .range_by_score(score - window, score + window)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                self.metrics.increment("cache.error");
                warn!(error = %e, "similarity index range query failed, treating as miss");
                return None;
            }
        };

        for candidate in candidates {
            let raw = match self.provider.get(&candidate.key).await {
                Ok(Some(raw)) => raw,
                // An expired or deleted payload leaves a dangling index
                // entry; skip it.
                Ok(None) => continue,
                Err(e) => {
                    self.metrics.increment("cache.error");
                    warn!(key = %candidate.key, error = %e, "similarity candidate fetch failed");
                    continue;
                }
            };

            let entry: SimilarityEntry = match serde_json::from_str(&raw) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(key = %candidate.key, error = %e, "malformed similarity entry, skipping");
                    continue;
                }
            };

            if entry.result_count != result_count {
                continue;
            }
            let similarity = cosine_similarity(embedding, &entry.embedding);
            if similarity >= self.config.similarity_threshold {
                debug!(
                    key = %candidate.key,
                    similarity = similarity,
                    "cache hit (similarity)"
                );
                return Some(entry.payload);
            }
        }

        None
    }

    async fn similarity_put(
        &self,
        exact_key: &str,
        embedding: &[f32],
        result_count: u32,
        payload: &str,
        ttl: Duration,
    ) {
        let sim_key = match exact_key.split_once(':') {
            Some((namespace, digest)) => format!("{namespace}:sim:{digest}"),
            None => format!("sim:{exact_key}"),
        };

        let entry = SimilarityEntry {
            payload: payload.to_string(),
            embedding: embedding.to_vec(),
            result_count,
        };
        let serialized = match serde_json::to_string(&entry) {
            Ok(serialized) => serialized,
            Err(e) => {
                warn!(error = %e, "failed to serialize similarity entry");
                return;
            }
        };

        if let Err(e) = self.provider.set_with_ttl(&sim_key, &serialized, ttl).await {
            self.metrics.increment("cache.error");
            warn!(key = %sim_key, error = %e, "failed to store similarity entry");
            return;
        }

        let score = bucket_score(embedding, self.config.bucket_prefix_dims);
        if let Err(e) = self.provider.add_scored(&sim_key, score).await {
            self.metrics.increment("cache.error");
            warn!(key = %sim_key, error = %e, "failed to index similarity entry");
        }
    }
}
