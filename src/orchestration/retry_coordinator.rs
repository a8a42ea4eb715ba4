//! # Retry Coordinator
//!
//! Decides whether, how, and with what parameters a failed unit is retried,
//! and tracks the full attempt history.
//!
//! Each attempt: classify the last error, pick the exploration parameter
//! from the configured schedule, pause for the capped exponential backoff
//! (cooperative sleep — a blocking sleep here would stall a worker slot),
//! build category-specific feedback, and invoke the callback under a
//! per-attempt timeout. Every attempt, successful or not, is appended to the
//! unit's history; attempts beyond the cap return failure without invoking
//! the callback.

use crate::config::RetryConfig;
use crate::orchestration::error_classifier::{build_feedback, classify_error, ErrorCategory};
use crate::types::{UnitGenerator, WorkUnit};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// One retry attempt for one unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryRecord {
    /// 1-indexed attempt number
    pub attempt: u32,
    pub exploration: f64,
    pub category: ErrorCategory,
    pub feedback: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
}

/// Outcome of a single retry attempt
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    pub success: bool,
    pub artifact: Option<String>,
    pub feedback: String,
    /// Error message from this attempt, used as `last_error` for the next
    pub error: Option<String>,
}

impl RetryOutcome {
    fn failed(feedback: String, error: Option<String>) -> Self {
        Self {
            success: false,
            artifact: None,
            feedback,
            error,
        }
    }
}

/// Aggregate retry statistics across all units
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetryStatistics {
    pub units_retried: usize,
    pub total_attempts: usize,
    /// Units that eventually succeeded via retry / units retried
    pub success_rate: f64,
    /// Mean attempt number at first success, over recovered units
    pub average_attempts_to_success: f64,
    /// Attempt counts per error category
    pub category_counts: HashMap<ErrorCategory, usize>,
}

/// Error-aware retry driver with append-only per-unit history
pub struct RetryCoordinator {
    config: RetryConfig,
    history: DashMap<String, Vec<RetryRecord>>,
}

impl RetryCoordinator {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            history: DashMap::new(),
        }
    }

    /// Exploration parameter for a 1-indexed attempt; attempts beyond the
    /// schedule reuse the last entry.
    pub fn exploration_for_attempt(&self, attempt: u32) -> f64 {
        let schedule = &self.config.exploration_schedule;
        match schedule.last() {
            Some(last) => {
                let index = (attempt.max(1) as usize - 1).min(schedule.len() - 1);
                *schedule.get(index).unwrap_or(last)
            }
            None => 0.3,
        }
    }

    /// Backoff delay before a 1-indexed attempt: `min(base * multiplier^(n-1), cap)`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let backoff = &self.config.backoff;
        let cap = Duration::from_millis(backoff.max_delay_ms);
        let delay = Duration::from_millis(backoff.base_delay_ms)
            .mul_f64(backoff.multiplier.powi(attempt.saturating_sub(1) as i32))
            .min(cap);

        if backoff.jitter_enabled {
            let jitter = fastrand::f64() * backoff.max_jitter;
            delay.mul_f64(1.0 + jitter).min(cap)
        } else {
            delay
        }
    }

    /// Run one retry attempt for a failed unit.
    ///
    /// Attempts beyond `max_attempts` return failure immediately without
    /// invoking the callback and without recording history.
    #[instrument(skip(self, generator), fields(unit_id = %unit.id, attempt = attempt))]
    pub async fn retry_unit(
        &self,
        unit: &WorkUnit,
        last_error: &str,
        attempt: u32,
        generator: Arc<dyn UnitGenerator>,
    ) -> RetryOutcome {
        if attempt > self.config.max_attempts {
            debug!("attempt beyond retry cap, not invoking callback");
            return RetryOutcome::failed(String::new(), None);
        }

        let category = classify_error(last_error);
        let exploration = self.exploration_for_attempt(attempt);
        let feedback = build_feedback(category, last_error, unit);

        if self.config.backoff.enabled {
            tokio::time::sleep(self.backoff_delay(attempt)).await;
        }

        let result = tokio::time::timeout(
            self.config.attempt_timeout(),
            generator.generate(unit, attempt, exploration, &feedback),
        )
        .await;

        let (success, artifact, error) = match result {
            Ok(Ok(artifact)) => (true, Some(artifact), None),
            Ok(Err(e)) => (false, None, Some(e.to_string())),
            Err(_) => (
                false,
                None,
                Some(format!(
                    "retry attempt timed out after {:?}",
                    self.config.attempt_timeout()
                )),
            ),
        };

        self.history
            .entry(unit.id.clone())
            .or_default()
            .push(RetryRecord {
                attempt,
                exploration,
                category,
                feedback: feedback.clone(),
                timestamp: Utc::now(),
                success,
            });

        if success {
            info!(category = %category, "retry attempt succeeded");
        } else {
            debug!(category = %category, error = ?error, "retry attempt failed");
        }

        RetryOutcome {
            success,
            artifact,
            feedback,
            error,
        }
    }

    /// Full attempt history for one unit (empty if never retried)
    pub fn history_for(&self, unit_id: &str) -> Vec<RetryRecord> {
        self.history
            .get(unit_id)
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Aggregate statistics over every recorded attempt
    pub fn statistics(&self) -> RetryStatistics {
        let mut stats = RetryStatistics {
            units_retried: self.history.len(),
            ..RetryStatistics::default()
        };

        let mut recovered = 0usize;
        let mut attempts_to_success = 0u64;

        for entry in self.history.iter() {
            stats.total_attempts += entry.len();
            for record in entry.iter() {
                *stats.category_counts.entry(record.category).or_insert(0) += 1;
            }
            if let Some(first_success) = entry.iter().find(|record| record.success) {
                recovered += 1;
                attempts_to_success += u64::from(first_success.attempt);
            }
        }

        if stats.units_retried > 0 {
            stats.success_rate = recovered as f64 / stats.units_retried as f64;
        }
        if recovered > 0 {
            stats.average_attempts_to_success = attempts_to_success as f64 / recovered as f64;
        }
        stats
    }

    /// Clear all retry history
    pub fn reset(&self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackoffConfig;
    use crate::error::GenerationError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_config() -> RetryConfig {
        RetryConfig {
            backoff: BackoffConfig {
                enabled: false,
                ..BackoffConfig::default()
            },
            ..RetryConfig::default()
        }
    }

    struct FailNTimes {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl UnitGenerator for FailNTimes {
        async fn generate(
            &self,
            _unit: &WorkUnit,
            _attempt: u32,
            _exploration: f64,
            _feedback: &str,
        ) -> Result<String, GenerationError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(GenerationError::new("syntax error near line 1"))
            } else {
                Ok("fixed artifact".to_string())
            }
        }
    }

    #[test]
    fn test_exploration_schedule() {
        let coordinator = RetryCoordinator::new(test_config());
        assert_eq!(coordinator.exploration_for_attempt(1), 0.7);
        assert_eq!(coordinator.exploration_for_attempt(2), 0.5);
        assert_eq!(coordinator.exploration_for_attempt(3), 0.3);
        // Beyond the table: reuse the last entry
        assert_eq!(coordinator.exploration_for_attempt(4), 0.3);
        assert_eq!(coordinator.exploration_for_attempt(9), 0.3);
    }

    #[test]
    fn test_backoff_schedule_is_capped() {
        let coordinator = RetryCoordinator::new(RetryConfig::default());
        assert_eq!(coordinator.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(coordinator.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(coordinator.backoff_delay(3), Duration::from_secs(4));
        // Cap holds beyond the schedule
        assert_eq!(coordinator.backoff_delay(4), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_jitter_stays_within_cap() {
        let config = RetryConfig {
            backoff: BackoffConfig {
                jitter_enabled: true,
                ..BackoffConfig::default()
            },
            ..RetryConfig::default()
        };
        let coordinator = RetryCoordinator::new(config);
        for attempt in 1..=5 {
            assert!(coordinator.backoff_delay(attempt) <= Duration::from_secs(4));
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_and_records_history() {
        let coordinator = RetryCoordinator::new(test_config());
        let generator = Arc::new(FailNTimes {
            failures: 1,
            calls: AtomicU32::new(0),
        });
        let unit = WorkUnit::new("u1", "compute totals");

        let first = coordinator
            .retry_unit(&unit, "syntax error in output", 1, generator.clone())
            .await;
        assert!(!first.success);

        let second = coordinator
            .retry_unit(&unit, first.error.as_deref().unwrap(), 2, generator)
            .await;
        assert!(second.success);
        assert_eq!(second.artifact.as_deref(), Some("fixed artifact"));

        let history = coordinator.history_for("u1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].attempt, 1);
        assert_eq!(history[0].exploration, 0.7);
        assert!(!history[0].success);
        assert_eq!(history[1].exploration, 0.5);
        assert!(history[1].success);
        assert_eq!(history[0].category, ErrorCategory::Syntax);
    }

    #[tokio::test]
    async fn test_attempt_beyond_cap_does_not_invoke_callback() {
        let coordinator = RetryCoordinator::new(test_config());
        let generator = Arc::new(FailNTimes {
            failures: 0,
            calls: AtomicU32::new(0),
        });
        let unit = WorkUnit::new("u1", "anything");

        let outcome = coordinator
            .retry_unit(&unit, "some error", 4, generator.clone())
            .await;
        assert!(!outcome.success);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
        assert!(coordinator.history_for("u1").is_empty());
    }

    #[tokio::test]
    async fn test_feedback_carries_category_hint() {
        let coordinator = RetryCoordinator::new(test_config());
        let generator = Arc::new(FailNTimes {
            failures: 0,
            calls: AtomicU32::new(0),
        });
        let unit = WorkUnit::new("u1", "fetch records");

        let outcome = coordinator
            .retry_unit(&unit, "deadline exceeded upstream", 1, generator)
            .await;
        assert!(outcome.feedback.contains("reduce complexity"));
        assert!(outcome.feedback.contains("deadline exceeded upstream"));
        assert!(outcome.feedback.contains("fetch records"));
    }

    #[tokio::test]
    async fn test_statistics_and_reset() {
        let coordinator = RetryCoordinator::new(test_config());
        let generator = Arc::new(FailNTimes {
            failures: 1,
            calls: AtomicU32::new(0),
        });
        let unit = WorkUnit::new("u1", "compute");

        let first = coordinator
            .retry_unit(&unit, "timeout while generating", 1, generator.clone())
            .await;
        let _second = coordinator
            .retry_unit(&unit, first.error.as_deref().unwrap_or("timeout"), 2, generator)
            .await;

        let stats = coordinator.statistics();
        assert_eq!(stats.units_retried, 1);
        assert_eq!(stats.total_attempts, 2);
        assert_eq!(stats.success_rate, 1.0);
        assert_eq!(stats.average_attempts_to_success, 2.0);
        assert_eq!(stats.category_counts[&ErrorCategory::Timeout], 1);

        coordinator.reset();
        assert_eq!(coordinator.statistics().units_retried, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleep_is_applied_when_enabled() {
        let config = RetryConfig {
            backoff: BackoffConfig {
                enabled: true,
                base_delay_ms: 1_000,
                ..BackoffConfig::default()
            },
            ..RetryConfig::default()
        };
        let coordinator = RetryCoordinator::new(config);
        let generator = Arc::new(FailNTimes {
            failures: 0,
            calls: AtomicU32::new(0),
        });
        let unit = WorkUnit::new("u1", "anything");

        let before = tokio::time::Instant::now();
        let outcome = coordinator.retry_unit(&unit, "oops", 1, generator).await;
        assert!(outcome.success);
        assert!(before.elapsed() >= Duration::from_secs(1));
    }
}
