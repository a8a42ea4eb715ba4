//! # Wave Scheduler
//!
//! Turns a dependency graph of work units into an ordered list of waves via
//! topological layering: wave 0 holds units with no dependencies, wave `k`
//! holds units whose dependencies all live in waves `< k`.
//!
//! A cycle — or a dependency id absent from the input set, which is an
//! unsatisfiable cycle of size 1 — is fatal and reported before any unit
//! executes. Within a wave, units are sorted by id so execution order is
//! reproducible for a given input.

use crate::error::{EngineError, Result};
use crate::types::{Wave, WorkUnit};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Topological wave layering over a set of work units
pub struct WaveScheduler;

impl WaveScheduler {
    /// Build the ordered wave list for the given units.
    ///
    /// Fails with `EngineError::CyclicDependency` when units remain but none
    /// can be placed, naming the remaining unit ids. Duplicate unit ids are
    /// a configuration error.
    pub fn build_waves(units: &[WorkUnit]) -> Result<Vec<Wave>> {
        let mut remaining: BTreeMap<&str, &WorkUnit> = BTreeMap::new();
        for unit in units {
            if remaining.insert(unit.id.as_str(), unit).is_some() {
                return Err(EngineError::Configuration(format!(
                    "duplicate unit id: {}",
                    unit.id
                )));
            }
        }

        let mut placed: HashSet<&str> = HashSet::new();
        let mut waves: Vec<Wave> = Vec::new();

        while !remaining.is_empty() {
            // BTreeMap iteration keeps each wave sorted by unit id
            let ready: Vec<String> = remaining
                .values()
                .filter(|unit| {
                    unit.dependencies
                        .iter()
                        .all(|dep| placed.contains(dep.as_str()))
                })
                .map(|unit| unit.id.clone())
                .collect();

            if ready.is_empty() {
                let stuck: Vec<String> = remaining.keys().map(|id| id.to_string()).collect();
                return Err(EngineError::CyclicDependency { remaining: stuck });
            }

            for id in &ready {
                let unit = remaining.remove(id.as_str());
                if let Some(unit) = unit {
                    placed.insert(unit.id.as_str());
                }
            }

            waves.push(Wave {
                index: waves.len(),
                unit_ids: ready,
            });
        }

        debug!(
            waves = waves.len(),
            units = units.len(),
            "dependency graph layered into waves"
        );
        Ok(waves)
    }
}
