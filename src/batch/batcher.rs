//! # Request Batcher
//!
//! Amortizes per-call overhead by grouping concurrent requests to the same
//! expensive external operation into one combined call.
//!
//! The first submission arms a flush timer; everything arriving inside the
//! window joins the batch, up to the configured maximum (a full batch
//! flushes immediately). Payloads are concatenated with per-item delimiters
//! carrying each request's id, and the combined response is split back on
//! the same delimiters in submission order. A response missing items
//! resolves those requests with an empty result and logs the discrepancy;
//! a dispatch error fails every pending request in the batch.

use crate::config::BatchConfig;
use crate::error::GenerationError;
use crate::metrics::MetricsSink;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

/// The single combined external call behind the batcher
#[async_trait]
pub trait BatchDispatch: Send + Sync {
    async fn dispatch(&self, combined: String) -> Result<String, GenerationError>;
}

/// Errors surfaced to individual batch submitters
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BatchError {
    /// The combined external call failed; every request in the batch gets
    /// this error.
    #[error("batch dispatch failed: {0}")]
    DispatchFailed(String),

    /// The batcher dropped the request before resolving it
    #[error("batch request dropped before resolution")]
    Dropped,
}

struct PendingRequest {
    id: String,
    payload: String,
    tx: oneshot::Sender<Result<String, BatchError>>,
}

struct BatcherInner {
    backend: Arc<dyn BatchDispatch>,
    config: BatchConfig,
    pending: Mutex<Vec<PendingRequest>>,
    timer_armed: AtomicBool,
    metrics: Arc<dyn MetricsSink>,
}

/// Groups concurrent submissions into windowed batches
#[derive(Clone)]
pub struct RequestBatcher {
    inner: Arc<BatcherInner>,
}

impl RequestBatcher {
    pub fn new(
        backend: Arc<dyn BatchDispatch>,
        config: BatchConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            inner: Arc::new(BatcherInner {
                backend,
                config,
                pending: Mutex::new(Vec::new()),
                timer_armed: AtomicBool::new(false),
                metrics,
            }),
        }
    }

    /// Submit a request and await its individual result.
    ///
    /// Blocks until the batch containing this request is dispatched and
    /// parsed (at most one window, sooner if the batch fills).
    pub async fn submit(
        &self,
        request_id: impl Into<String>,
        payload: impl Into<String>,
    ) -> Result<String, BatchError> {
        let (tx, rx) = oneshot::channel();
        let request = PendingRequest {
            id: request_id.into(),
            payload: payload.into(),
            tx,
        };

        let mut full_batch = None;
        let mut arm_timer = false;
        {
            let mut pending = self.inner.pending.lock();
            pending.push(request);
            if pending.len() >= self.inner.config.max_size {
                full_batch = Some(std::mem::take(&mut *pending));
            } else if !self.inner.timer_armed.swap(true, Ordering::SeqCst) {
                arm_timer = true;
            }
        }

        if let Some(batch) = full_batch {
            let inner = self.inner.clone();
            tokio::spawn(async move {
                dispatch_batch(inner, batch).await;
            });
        } else if arm_timer {
            let inner = self.inner.clone();
            tokio::spawn(async move {
                tokio::time::sleep(inner.config.window()).await;
                inner.timer_armed.store(false, Ordering::SeqCst);
                let batch = std::mem::take(&mut *inner.pending.lock());
                if !batch.is_empty() {
                    dispatch_batch(inner, batch).await;
                }
            });
        }

        rx.await.map_err(|_| BatchError::Dropped)?
    }

    /// Number of requests currently awaiting a flush
    pub fn pending_len(&self) -> usize {
        self.inner.pending.lock().len()
    }
}

fn item_marker(id: &str) -> String {
    format!("<<<ITEM {id}>>>")
}

fn combine_payloads(batch: &[PendingRequest]) -> String {
    let mut combined = String::new();
    for request in batch {
        combined.push_str(&item_marker(&request.id));
        combined.push('\n');
        combined.push_str(&request.payload);
        combined.push('\n');
    }
    combined
}

/// Split a combined response back into per-item results by locating each
/// item's delimiter marker. `None` marks an item the response omitted.
fn parse_combined_response(response: &str, ids: &[String]) -> Vec<Option<String>> {
    let mut found: Vec<(usize, usize, usize)> = Vec::new();
    for (idx, id) in ids.iter().enumerate() {
        let marker = item_marker(id);
        if let Some(pos) = response.find(&marker) {
            found.push((pos, idx, marker.len()));
        }
    }
    found.sort_by_key(|&(pos, _, _)| pos);

    let mut results: Vec<Option<String>> = vec![None; ids.len()];
    for (i, &(pos, idx, marker_len)) in found.iter().enumerate() {
        let start = pos + marker_len;
        let end = found
            .get(i + 1)
            .map(|&(next_pos, _, _)| next_pos)
            .unwrap_or(response.len());
        results[idx] = Some(response[start..end].trim().to_string());
    }
    results
}

async fn dispatch_batch(inner: Arc<BatcherInner>, batch: Vec<PendingRequest>) {
    let batch_id = Uuid::new_v4();
    let size = batch.len();
    inner.metrics.observe("batch.size", size as f64);
    debug!(batch_id = %batch_id, size = size, "dispatching request batch");

    let combined = combine_payloads(&batch);
    match inner.backend.dispatch(combined).await {
        Ok(response) => {
            let ids: Vec<String> = batch.iter().map(|r| r.id.clone()).collect();
            let results = parse_combined_response(&response, &ids);
            for (request, result) in batch.into_iter().zip(results) {
                let value = match result {
                    Some(value) => value,
                    None => {
                        inner.metrics.increment("batch.missing_item");
                        warn!(
                            batch_id = %batch_id,
                            request_id = %request.id,
                            "combined response missing item, resolving empty"
                        );
                        String::new()
                    }
                };
                let _ = request.tx.send(Ok(value));
            }
        }
        Err(e) => {
            warn!(batch_id = %batch_id, error = %e, "batch dispatch failed, failing all pending");
            for request in batch {
                let _ = request
                    .tx
                    .send(Err(BatchError::DispatchFailed(e.to_string())));
            }
        }
    }
}
