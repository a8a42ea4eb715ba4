//! # Metrics Sink
//!
//! Abstract counter/histogram capability consumed by the cache tier and the
//! request batcher. No specific protocol is mandated: hosts adapt this trait
//! to their metrics pipeline, tests use [`InMemoryMetricsSink`].
//!
//! Counter names in use: `cache.{l1,exact,similarity}.{hit,miss}`,
//! `cache.write`, `cache.invalidation`, `cache.error`, `batch.missing_item`;
//! histogram: `batch.size`.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Abstract "increment counter / observe value" capability
pub trait MetricsSink: Send + Sync {
    fn increment(&self, name: &str);
    fn observe(&self, name: &str, value: f64);
}

/// Discards every metric
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetricsSink;

impl NoopMetricsSink {
    pub fn new() -> Self {
        Self
    }
}

impl MetricsSink for NoopMetricsSink {
    fn increment(&self, _name: &str) {}
    fn observe(&self, _name: &str, _value: f64) {}
}

/// In-process metrics sink backed by concurrent maps.
///
/// Suitable for tests and single-process deployments that scrape counters
/// directly.
#[derive(Debug, Default)]
pub struct InMemoryMetricsSink {
    counters: DashMap<String, u64>,
    samples: DashMap<String, Arc<Mutex<Vec<f64>>>>,
}

impl InMemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter (0 if never incremented)
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).map(|v| *v).unwrap_or(0)
    }

    /// All observed values for a histogram, in observation order
    pub fn samples(&self, name: &str) -> Vec<f64> {
        self.samples
            .get(name)
            .map(|s| s.lock().clone())
            .unwrap_or_default()
    }
}

impl MetricsSink for InMemoryMetricsSink {
    fn increment(&self, name: &str) {
        *self.counters.entry(name.to_string()).or_insert(0) += 1;
    }

    fn observe(&self, name: &str, value: f64) {
        self.samples
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .lock()
            .push(value);
    }
}
