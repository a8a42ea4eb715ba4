//! # Concurrent Executor
//!
//! Executes every unit of one wave in parallel, bounded by a counting
//! semaphore of size `K`.
//!
//! Dependencies are re-checked at dispatch time, not only at wave-build
//! time: a unit whose dependency failed its retries since the waves were
//! computed is skipped without consuming a concurrency slot or invoking the
//! callback. Units are claimed `Pending → Running` atomically so the same
//! unit can never run twice concurrently. One unit's failure — including a
//! panicked task — never aborts or blocks its siblings; outcomes are
//! collected through a fan-in join.

use crate::cache::{GenerationCache, GenerationRequest};
use crate::config::ExecutionConfig;
use crate::types::{ExecutionResult, UnitGenerator, UnitStatus, UnitStore, Wave, WorkUnit};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, instrument, warn};

/// Outcome of executing one wave
#[derive(Debug, Clone, Default)]
pub struct WaveExecutionResult {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub results: Vec<ExecutionResult>,
    /// Executor-level problems (panicked tasks, claim conflicts) that do not
    /// map to a per-unit outcome
    pub errors: Vec<String>,
}

/// Point-in-time executor capacity
#[derive(Debug, Clone)]
pub struct ExecutionStats {
    pub available_capacity: usize,
    pub max_concurrent_units: usize,
    pub capacity_used: usize,
}

/// Bounded-parallelism wave executor
pub struct ConcurrentExecutor {
    config: ExecutionConfig,
    semaphore: Arc<Semaphore>,
    cache: Option<Arc<GenerationCache>>,
}

impl ConcurrentExecutor {
    pub fn new(config: ExecutionConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_units));
        Self {
            config,
            semaphore,
            cache: None,
        }
    }

    /// Attach a generation cache consulted before each initial execution
    pub fn with_cache(mut self, cache: Arc<GenerationCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Current capacity snapshot from semaphore state
    pub fn stats(&self) -> ExecutionStats {
        let available = self.semaphore.available_permits();
        ExecutionStats {
            available_capacity: available,
            max_concurrent_units: self.config.max_concurrent_units,
            capacity_used: self.config.max_concurrent_units - available,
        }
    }

    /// Execute one wave to completion.
    ///
    /// Mutates unit status in `store` in place so subsequent waves observe
    /// up-to-date dependency state. Never returns an error: all failures are
    /// captured per unit or in `errors`.
    #[instrument(skip(self, store, generator), fields(wave = wave.index, units = wave.unit_ids.len()))]
    pub async fn execute_wave(
        &self,
        wave: &Wave,
        store: &UnitStore,
        generator: Arc<dyn UnitGenerator>,
        exploration: f64,
    ) -> WaveExecutionResult {
        let mut outcome = WaveExecutionResult {
            total: wave.unit_ids.len(),
            ..WaveExecutionResult::default()
        };

        let mut handles = Vec::new();
        for unit_id in &wave.unit_ids {
            let unit = match store.get(unit_id) {
                Some(entry) => entry.clone(),
                None => {
                    outcome
                        .errors
                        .push(format!("unit {unit_id} missing from store"));
                    continue;
                }
            };

            // Dispatch-time dependency check; a failed or skipped dependency
            // skips this unit without consuming a slot.
            if let Some(blocked_on) = unsatisfied_dependency(&unit, store) {
                let reason = format!("dependency not satisfied: {blocked_on}");
                if let Some(mut entry) = store.get_mut(unit_id) {
                    entry.status = UnitStatus::Skipped;
                    entry.error = Some(reason.clone());
                }
                debug!(unit_id = %unit_id, blocked_on = %blocked_on, "unit skipped");
                outcome.results.push(ExecutionResult {
                    unit_id: unit_id.clone(),
                    status: UnitStatus::Skipped,
                    artifact: None,
                    error: Some(reason),
                    duration: Duration::default(),
                    retry_count: unit.retry_count,
                });
                continue;
            }

            let semaphore = self.semaphore.clone();
            let store = store.clone();
            let generator = generator.clone();
            let cache = self.cache.clone();
            let model_id = self.config.model_id.clone();
            let unit_timeout = self.config.unit_timeout();
            let unit_id = unit_id.clone();

            handles.push(tokio::spawn(async move {
                execute_unit(
                    unit_id,
                    store,
                    semaphore,
                    generator,
                    cache,
                    model_id,
                    unit_timeout,
                    exploration,
                )
                .await
            }));
        }

        // Fan-in join: a panicked unit task is recorded, never propagated
        for handle in handles {
            match handle.await {
                Ok(result) => outcome.results.push(result),
                Err(e) => {
                    error!(error = %e, "unit execution task panicked");
                    outcome.errors.push(format!("unit task panicked: {e}"));
                }
            }
        }

        for result in &outcome.results {
            match result.status {
                UnitStatus::Success => outcome.successful += 1,
                UnitStatus::Failed => outcome.failed += 1,
                UnitStatus::Skipped => outcome.skipped += 1,
                _ => {}
            }
        }

        debug!(
            successful = outcome.successful,
            failed = outcome.failed,
            skipped = outcome.skipped,
            "wave execution completed"
        );
        outcome
    }
}

/// First dependency id not in `Success` state, if any
fn unsatisfied_dependency(unit: &WorkUnit, store: &UnitStore) -> Option<String> {
    unit.dependencies
        .iter()
        .find(|dep| {
            store
                .get(dep.as_str())
                .map(|entry| entry.status != UnitStatus::Success)
                .unwrap_or(true)
        })
        .cloned()
}

#[allow(clippy::too_many_arguments)]
async fn execute_unit(
    unit_id: String,
    store: UnitStore,
    semaphore: Arc<Semaphore>,
    generator: Arc<dyn UnitGenerator>,
    cache: Option<Arc<GenerationCache>>,
    model_id: String,
    unit_timeout: Duration,
    exploration: f64,
) -> ExecutionResult {
    let started = Instant::now();

    let permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => {
            return fail_unit(
                &unit_id,
                &store,
                format!("execution slot unavailable: {e}"),
                started.elapsed(),
            );
        }
    };

    // Claim Pending -> Running after the permit so the Running count stays
    // bounded by K; a unit that is not Pending is rejected, never run twice.
    let claimed_unit = match store.get_mut(&unit_id) {
        Some(mut entry) if entry.status == UnitStatus::Pending => {
            entry.status = UnitStatus::Running;
            entry.clone()
        }
        Some(entry) => {
            warn!(unit_id = %unit_id, status = %entry.status, "unit not pending at dispatch, rejecting");
            return ExecutionResult {
                unit_id: unit_id.clone(),
                status: entry.status,
                artifact: entry.artifact.clone(),
                error: Some("unit already claimed or terminal at dispatch".to_string()),
                duration: started.elapsed(),
                retry_count: entry.retry_count,
            };
        }
        None => {
            return fail_unit(
                &unit_id,
                &store,
                "unit disappeared from store".to_string(),
                started.elapsed(),
            );
        }
    };

    if let Some(cache) = &cache {
        let request = GenerationRequest::new(
            claimed_unit.description.clone(),
            model_id.clone(),
            format!("{exploration:.2}"),
        );
        if let Some(artifact) = cache.get(&request).await {
            debug!(unit_id = %unit_id, "serving unit artifact from cache");
            drop(permit);
            return succeed_unit(&unit_id, &store, artifact, started.elapsed());
        }
    }

    let generation = timeout(
        unit_timeout,
        generator.generate(&claimed_unit, 0, exploration, ""),
    )
    .await;
    drop(permit);

    match generation {
        Ok(Ok(artifact)) => {
            if let Some(cache) = &cache {
                let request = GenerationRequest::new(
                    claimed_unit.description.clone(),
                    model_id,
                    format!("{exploration:.2}"),
                );
                cache.put(&request, &artifact).await;
            }
            succeed_unit(&unit_id, &store, artifact, started.elapsed())
        }
        Ok(Err(e)) => fail_unit(&unit_id, &store, e.to_string(), started.elapsed()),
        Err(_) => fail_unit(
            &unit_id,
            &store,
            format!("execution timed out after {unit_timeout:?}"),
            started.elapsed(),
        ),
    }
}

fn succeed_unit(
    unit_id: &str,
    store: &UnitStore,
    artifact: String,
    duration: Duration,
) -> ExecutionResult {
    let mut retry_count = 0;
    if let Some(mut entry) = store.get_mut(unit_id) {
        entry.status = UnitStatus::Success;
        entry.artifact = Some(artifact.clone());
        entry.error = None;
        retry_count = entry.retry_count;
    }
    debug!(unit_id = %unit_id, duration_ms = duration.as_millis() as u64, "unit succeeded");
    ExecutionResult {
        unit_id: unit_id.to_string(),
        status: UnitStatus::Success,
        artifact: Some(artifact),
        error: None,
        duration,
        retry_count,
    }
}

fn fail_unit(
    unit_id: &str,
    store: &UnitStore,
    error: String,
    duration: Duration,
) -> ExecutionResult {
    let mut retry_count = 0;
    if let Some(mut entry) = store.get_mut(unit_id) {
        entry.status = UnitStatus::Failed;
        entry.error = Some(error.clone());
        retry_count = entry.retry_count;
    }
    warn!(unit_id = %unit_id, error = %error, "unit failed");
    ExecutionResult {
        unit_id: unit_id.to_string(),
        status: UnitStatus::Failed,
        artifact: None,
        error: Some(error),
        duration,
        retry_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use async_trait::async_trait;
    use dashmap::DashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store_with(units: Vec<WorkUnit>) -> UnitStore {
        let store = DashMap::new();
        for unit in units {
            store.insert(unit.id.clone(), unit);
        }
        Arc::new(store)
    }

    fn wave_of(ids: &[&str]) -> Wave {
        Wave {
            index: 0,
            unit_ids: ids.iter().map(|id| id.to_string()).collect(),
        }
    }

    fn test_executor(max_concurrent: usize) -> ConcurrentExecutor {
        ConcurrentExecutor::new(ExecutionConfig {
            max_concurrent_units: max_concurrent,
            unit_timeout_ms: 1_000,
            model_id: "test-model".to_string(),
        })
    }

    struct SucceedAll;

    #[async_trait]
    impl UnitGenerator for SucceedAll {
        async fn generate(
            &self,
            unit: &WorkUnit,
            _attempt: u32,
            _exploration: f64,
            _feedback: &str,
        ) -> Result<String, GenerationError> {
            Ok(format!("artifact for {}", unit.id))
        }
    }

    struct FailMatching(&'static str);

    #[async_trait]
    impl UnitGenerator for FailMatching {
        async fn generate(
            &self,
            unit: &WorkUnit,
            _attempt: u32,
            _exploration: f64,
            _feedback: &str,
        ) -> Result<String, GenerationError> {
            if unit.id == self.0 {
                Err(GenerationError::new("logic error in generated output"))
            } else {
                Ok(format!("artifact for {}", unit.id))
            }
        }
    }

    /// Tracks the maximum number of concurrently running generate calls
    struct ConcurrencyProbe {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ConcurrencyProbe {
        fn new() -> Self {
            Self {
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl UnitGenerator for ConcurrencyProbe {
        async fn generate(
            &self,
            unit: &WorkUnit,
            _attempt: u32,
            _exploration: f64,
            _feedback: &str,
        ) -> Result<String, GenerationError> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(active, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(format!("artifact for {}", unit.id))
        }
    }

    struct HangForever;

    #[async_trait]
    impl UnitGenerator for HangForever {
        async fn generate(
            &self,
            _unit: &WorkUnit,
            _attempt: u32,
            _exploration: f64,
            _feedback: &str,
        ) -> Result<String, GenerationError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("never".to_string())
        }
    }

    #[tokio::test]
    async fn test_wave_executes_all_units() {
        let store = store_with(vec![WorkUnit::new("a", "A"), WorkUnit::new("b", "B")]);
        let executor = test_executor(10);

        let result = executor
            .execute_wave(&wave_of(&["a", "b"]), &store, Arc::new(SucceedAll), 0.7)
            .await;

        assert_eq!(result.total, 2);
        assert_eq!(result.successful, 2);
        assert_eq!(result.failed, 0);
        assert_eq!(store.get("a").unwrap().status, UnitStatus::Success);
        assert_eq!(
            store.get("a").unwrap().artifact.as_deref(),
            Some("artifact for a")
        );
    }

    #[tokio::test]
    async fn test_failure_is_isolated_from_siblings() {
        let store = store_with(vec![WorkUnit::new("a", "A"), WorkUnit::new("b", "B")]);
        let executor = test_executor(10);

        let result = executor
            .execute_wave(
                &wave_of(&["a", "b"]),
                &store,
                Arc::new(FailMatching("a")),
                0.7,
            )
            .await;

        assert_eq!(result.successful, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(store.get("a").unwrap().status, UnitStatus::Failed);
        assert!(store
            .get("a")
            .unwrap()
            .error
            .as_deref()
            .unwrap()
            .contains("logic error"));
        assert_eq!(store.get("b").unwrap().status, UnitStatus::Success);
    }

    #[tokio::test]
    async fn test_unsatisfied_dependency_skips_without_invocation() {
        let mut failed_dep = WorkUnit::new("a", "A");
        failed_dep.status = UnitStatus::Failed;
        let dependent =
            WorkUnit::new("b", "B").with_dependencies(vec!["a".to_string()]);
        let store = store_with(vec![failed_dep, dependent]);
        let executor = test_executor(10);

        let probe = Arc::new(ConcurrencyProbe::new());
        let result = executor
            .execute_wave(&wave_of(&["b"]), &store, probe.clone(), 0.7)
            .await;

        assert_eq!(result.skipped, 1);
        assert_eq!(store.get("b").unwrap().status, UnitStatus::Skipped);
        assert!(store
            .get("b")
            .unwrap()
            .error
            .as_deref()
            .unwrap()
            .contains("dependency not satisfied"));
        assert_eq!(probe.peak.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_limit() {
        let units: Vec<WorkUnit> = (0..6)
            .map(|i| WorkUnit::new(format!("u{i}"), format!("unit {i}")))
            .collect();
        let ids: Vec<String> = units.iter().map(|u| u.id.clone()).collect();
        let store = store_with(units);
        let executor = test_executor(2);

        let probe = Arc::new(ConcurrencyProbe::new());
        let wave = Wave {
            index: 0,
            unit_ids: ids,
        };
        let result = executor.execute_wave(&wave, &store, probe.clone(), 0.7).await;

        assert_eq!(result.successful, 6);
        assert!(probe.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_marks_unit_failed() {
        let store = store_with(vec![WorkUnit::new("a", "A")]);
        let executor = test_executor(10);

        let result = executor
            .execute_wave(&wave_of(&["a"]), &store, Arc::new(HangForever), 0.7)
            .await;

        assert_eq!(result.failed, 1);
        let unit = store.get("a").unwrap();
        assert_eq!(unit.status, UnitStatus::Failed);
        assert!(unit.error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_non_pending_unit_is_not_run_twice() {
        let mut running = WorkUnit::new("a", "A");
        running.status = UnitStatus::Running;
        let store = store_with(vec![running]);
        let executor = test_executor(10);

        let probe = Arc::new(ConcurrencyProbe::new());
        let result = executor
            .execute_wave(&wave_of(&["a"]), &store, probe.clone(), 0.7)
            .await;

        assert_eq!(probe.peak.load(Ordering::SeqCst), 0);
        assert_eq!(result.successful, 0);
        assert_eq!(store.get("a").unwrap().status, UnitStatus::Running);
    }

    #[tokio::test]
    async fn test_stats_reflect_capacity() {
        let executor = test_executor(4);
        let stats = executor.stats();
        assert_eq!(stats.max_concurrent_units, 4);
        assert_eq!(stats.available_capacity, 4);
        assert_eq!(stats.capacity_used, 0);
    }
}
