//! # Core Data Model
//!
//! Shared types for the execution engine: work units, waves, per-unit
//! results, and the collaborator traits the engine consumes but does not
//! implement (generation callback, completion hook).
//!
//! The caller owns its `WorkUnit`s; during a run the engine mutates only
//! status, artifact, error, and retry count.

use crate::error::GenerationError;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle status of a work unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl UnitStatus {
    /// Whether this status is final for the current run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UnitStatus::Success | UnitStatus::Failed | UnitStatus::Skipped
        )
    }
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitStatus::Pending => write!(f, "pending"),
            UnitStatus::Running => write!(f, "running"),
            UnitStatus::Success => write!(f, "success"),
            UnitStatus::Failed => write!(f, "failed"),
            UnitStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// The smallest schedulable item of work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkUnit {
    /// Unique identifier within one run
    pub id: String,

    /// Human-readable description; also the cache key content for the
    /// exact-match generation cache
    pub description: String,

    /// Ids of units that must reach `Success` before this unit may run
    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub status: UnitStatus,

    #[serde(default)]
    pub artifact: Option<String>,

    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub retry_count: u32,
}

impl WorkUnit {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            dependencies: Vec::new(),
            status: UnitStatus::Pending,
            artifact: None,
            error: None,
            retry_count: 0,
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

/// A topological layer of work units that can run concurrently.
///
/// Invariant: every dependency of a unit in wave `k` belongs to a unit in
/// some wave `j < k`. Waves are derived by the scheduler, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wave {
    pub index: usize,
    /// Sorted by unit id for reproducible execution order
    pub unit_ids: Vec<String>,
}

/// Per-unit outcome of an orchestration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub unit_id: String,
    pub status: UnitStatus,
    pub artifact: Option<String>,
    pub error: Option<String>,
    /// Wall-clock duration of the unit's initial execution
    pub duration: Duration,
    /// Retry count at completion
    pub retry_count: u32,
}

/// Shared, concurrently mutated view of all units in a run.
///
/// Status mutations during wave execution are visible to later waves, which
/// is what lets the executor re-check dependencies at dispatch time.
pub type UnitStore = Arc<DashMap<String, WorkUnit>>;

/// The expensive external generation call.
///
/// `attempt` is 0 for the initial wave execution and 1-indexed for retries.
/// `exploration` is an opaque tuning parameter; `feedback` is empty on the
/// initial attempt and carries the retry coordinator's hint text afterwards.
#[async_trait]
pub trait UnitGenerator: Send + Sync {
    async fn generate(
        &self,
        unit: &WorkUnit,
        attempt: u32,
        exploration: f64,
        feedback: &str,
    ) -> std::result::Result<String, GenerationError>;
}

/// Fire-and-forget persistence notification for a unit's final status.
///
/// Implementations must tolerate being called once per unit per run;
/// failures never affect the run's outcome.
#[async_trait]
pub trait CompletionHook: Send + Sync {
    async fn on_unit_complete(&self, unit: &WorkUnit);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_status_terminal() {
        assert!(!UnitStatus::Pending.is_terminal());
        assert!(!UnitStatus::Running.is_terminal());
        assert!(UnitStatus::Success.is_terminal());
        assert!(UnitStatus::Failed.is_terminal());
        assert!(UnitStatus::Skipped.is_terminal());
    }

    #[test]
    fn test_work_unit_builder() {
        let unit = WorkUnit::new("u1", "parse the config file")
            .with_dependencies(vec!["u0".to_string()]);
        assert_eq!(unit.id, "u1");
        assert_eq!(unit.status, UnitStatus::Pending);
        assert_eq!(unit.dependencies, vec!["u0".to_string()]);
        assert_eq!(unit.retry_count, 0);
    }

    #[test]
    fn test_work_unit_serde_round_trip() {
        let unit = WorkUnit::new("u1", "emit the report");
        let json = serde_json::to_string(&unit).expect("serialize");
        let back: WorkUnit = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.id, unit.id);
        assert_eq!(back.status, UnitStatus::Pending);
    }
}
