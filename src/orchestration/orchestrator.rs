//! # Execution Orchestrator
//!
//! Top-level driver: layers the dependency graph into waves, executes them
//! strictly sequentially, then drives error-aware retries for everything
//! left failed and reports a summary.
//!
//! Only an unsatisfiable dependency graph aborts a run; every other failure
//! is captured per unit, and a run always completes with a summary. Retries
//! for different units run concurrently (attempts for one unit stay
//! sequential). A global run-cancellation token is a natural extension not
//! carried by the source behavior.

use crate::cache::GenerationCache;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::orchestration::executor::ConcurrentExecutor;
use crate::orchestration::retry_coordinator::{RetryCoordinator, RetryStatistics};
use crate::orchestration::wave_scheduler::WaveScheduler;
use crate::types::{CompletionHook, ExecutionResult, UnitGenerator, UnitStatus, UnitStore, WorkUnit};
use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

/// Final accounting for one orchestration run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total_units: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub waves_executed: usize,
    /// Per-unit outcomes, sorted by unit id
    pub results: Vec<ExecutionResult>,
    pub retry_statistics: RetryStatistics,
    pub total_duration: Duration,
}

/// Point-in-time status counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub pending: usize,
    pub running: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Drives WaveScheduler -> ConcurrentExecutor -> RetryCoordinator
pub struct ExecutionOrchestrator {
    config: EngineConfig,
    executor: ConcurrentExecutor,
    retry: RetryCoordinator,
    hook: Option<Arc<dyn CompletionHook>>,
    store: UnitStore,
}

impl ExecutionOrchestrator {
    pub fn new(config: EngineConfig) -> Self {
        let executor = ConcurrentExecutor::new(config.execution.clone());
        let retry = RetryCoordinator::new(config.retry.clone());
        Self {
            config,
            executor,
            retry,
            hook: None,
            store: Arc::new(DashMap::new()),
        }
    }

    /// Attach a shared generation cache consulted during wave execution
    pub fn with_cache(mut self, cache: Arc<GenerationCache>) -> Self {
        self.executor = ConcurrentExecutor::new(self.config.execution.clone()).with_cache(cache);
        self
    }

    /// Attach a fire-and-forget completion hook for final unit status
    pub fn with_completion_hook(mut self, hook: Arc<dyn CompletionHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Execute a full run over the given units.
    ///
    /// Fails only when the dependency graph is cyclic or references unknown
    /// units; every other outcome is reported in the summary.
    #[instrument(skip(self, units, generator), fields(units = units.len()))]
    pub async fn run(
        &self,
        units: Vec<WorkUnit>,
        generator: Arc<dyn UnitGenerator>,
    ) -> Result<RunSummary> {
        let run_start = Instant::now();

        self.store.clear();
        for mut unit in units {
            unit.status = UnitStatus::Pending;
            unit.retry_count = 0;
            self.store.insert(unit.id.clone(), unit);
        }

        let mut snapshot: Vec<WorkUnit> =
            self.store.iter().map(|entry| entry.clone()).collect();
        snapshot.sort_by(|a, b| a.id.cmp(&b.id));

        // Fail fast on an unsatisfiable graph, before any unit executes
        let waves = WaveScheduler::build_waves(&snapshot)?;
        info!(
            waves = waves.len(),
            units = snapshot.len(),
            "starting orchestration run"
        );

        let initial_exploration = self
            .config
            .retry
            .exploration_schedule
            .first()
            .copied()
            .unwrap_or(0.7);

        // Waves run strictly sequentially; units inside a wave run
        // concurrently under the executor's semaphore.
        let mut durations: HashMap<String, Duration> = HashMap::new();
        for wave in &waves {
            let wave_result = self
                .executor
                .execute_wave(wave, &self.store, generator.clone(), initial_exploration)
                .await;
            for result in &wave_result.results {
                durations.insert(result.unit_id.clone(), result.duration);
            }
        }

        let mut failed_ids: Vec<String> = self
            .store
            .iter()
            .filter(|entry| entry.status == UnitStatus::Failed)
            .map(|entry| entry.id.clone())
            .collect();
        failed_ids.sort();

        if !failed_ids.is_empty() {
            info!(failed = failed_ids.len(), "driving retries for failed units");
            let retry_loops = failed_ids
                .iter()
                .map(|unit_id| self.retry_failed_unit(unit_id.clone(), generator.clone()));
            join_all(retry_loops).await;
        }

        self.fire_completion_hooks();

        let mut results: Vec<ExecutionResult> = self
            .store
            .iter()
            .map(|entry| ExecutionResult {
                unit_id: entry.id.clone(),
                status: entry.status,
                artifact: entry.artifact.clone(),
                error: entry.error.clone(),
                duration: durations.get(&entry.id).copied().unwrap_or_default(),
                retry_count: entry.retry_count,
            })
            .collect();
        results.sort_by(|a, b| a.unit_id.cmp(&b.unit_id));

        let summary = RunSummary {
            total_units: results.len(),
            successful: results
                .iter()
                .filter(|r| r.status == UnitStatus::Success)
                .count(),
            failed: results
                .iter()
                .filter(|r| r.status == UnitStatus::Failed)
                .count(),
            skipped: results
                .iter()
                .filter(|r| r.status == UnitStatus::Skipped)
                .count(),
            waves_executed: waves.len(),
            results,
            retry_statistics: self.retry.statistics(),
            total_duration: run_start.elapsed(),
        };

        info!(
            successful = summary.successful,
            failed = summary.failed,
            skipped = summary.skipped,
            duration_ms = summary.total_duration.as_millis() as u64,
            "orchestration run completed"
        );
        Ok(summary)
    }

    /// Sequential retry loop for one failed unit, stopping at first success
    async fn retry_failed_unit(&self, unit_id: String, generator: Arc<dyn UnitGenerator>) {
        let mut last_error = self
            .store
            .get(&unit_id)
            .and_then(|entry| entry.error.clone())
            .unwrap_or_else(|| "unknown error".to_string());

        for attempt in 1..=self.config.retry.max_attempts {
            let unit_snapshot = match self.store.get(&unit_id) {
                Some(entry) => entry.clone(),
                None => return,
            };

            let outcome = self
                .retry
                .retry_unit(&unit_snapshot, &last_error, attempt, generator.clone())
                .await;

            if let Some(mut entry) = self.store.get_mut(&unit_id) {
                entry.retry_count = attempt;
                if outcome.success {
                    entry.status = UnitStatus::Success;
                    entry.artifact = outcome.artifact.clone();
                    entry.error = None;
                } else if let Some(error) = &outcome.error {
                    entry.error = Some(error.clone());
                }
            }

            if outcome.success {
                info!(unit_id = %unit_id, attempt = attempt, "unit recovered via retry");
                return;
            }
            if let Some(error) = outcome.error {
                last_error = error;
            }
        }
        debug!(unit_id = %unit_id, "retries exhausted, unit stays failed");
    }

    /// Notify the completion hook for every unit's final status.
    ///
    /// Fire-and-forget: hook latency and failures never affect the run.
    fn fire_completion_hooks(&self) {
        let Some(hook) = &self.hook else {
            return;
        };
        for entry in self.store.iter() {
            let unit = entry.clone();
            let hook = hook.clone();
            tokio::spawn(async move {
                hook.on_unit_complete(&unit).await;
            });
        }
    }

    /// Point-in-time status counts across the current unit set
    pub fn track_progress(&self) -> ProgressSnapshot {
        let mut progress = ProgressSnapshot::default();
        for entry in self.store.iter() {
            match entry.status {
                UnitStatus::Pending => progress.pending += 1,
                UnitStatus::Running => progress.running += 1,
                UnitStatus::Success => progress.success += 1,
                UnitStatus::Failed => progress.failed += 1,
                UnitStatus::Skipped => progress.skipped += 1,
            }
        }
        progress
    }

    /// Retry statistics accumulated so far
    pub fn retry_statistics(&self) -> RetryStatistics {
        self.retry.statistics()
    }

    /// Clear all execution and retry state for a fresh run
    pub fn reset(&self) {
        self.store.clear();
        self.retry.reset();
    }
}
