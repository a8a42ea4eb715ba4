#![allow(clippy::doc_markdown)] // Allow technical terms like LruCache, DashMap in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Waveflow Core
//!
//! Work-unit execution engine: takes a set of small, independently
//! describable units of work organized by a dependency graph, executes them
//! in dependency-respecting parallel batches ("waves"), retries failures
//! with an adaptive, error-aware strategy, and accelerates repeated
//! invocations through a two-level cache with exact and semantic-similarity
//! matching.
//!
//! ## Architecture
//!
//! ```text
//! ExecutionOrchestrator
//!   ├── WaveScheduler        <- dependency graph -> ordered waves
//!   ├── ConcurrentExecutor   <- one wave, bounded parallelism, timeouts
//!   │     └── GenerationCache  <- L1 LRU -> exact -> similarity
//!   └── RetryCoordinator     <- classify, backoff, feedback, history
//!
//! RequestBatcher             <- optional accelerator in front of the
//!                               generation callback
//! ```
//!
//! ## Module Organization
//!
//! - [`types`] - Work units, waves, results, and collaborator traits
//! - [`config`] - Engine configuration with environment presets
//! - [`error`] - Structured error handling
//! - [`orchestration`] - Wave scheduling, execution, and retries
//! - [`cache`] - Two-level generation cache
//! - [`batch`] - Request batching for the generation callback
//! - [`metrics`] - Abstract metrics sink
//! - [`logging`] - Structured logging bootstrap
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use waveflow_core::config::EngineConfig;
//! use waveflow_core::error::GenerationError;
//! use waveflow_core::orchestration::ExecutionOrchestrator;
//! use waveflow_core::types::{UnitGenerator, WorkUnit};
//!
//! struct MyGenerator;
//!
//! #[async_trait::async_trait]
//! impl UnitGenerator for MyGenerator {
//!     async fn generate(
//!         &self,
//!         unit: &WorkUnit,
//!         _attempt: u32,
//!         _exploration: f64,
//!         _feedback: &str,
//!     ) -> Result<String, GenerationError> {
//!         Ok(format!("artifact for {}", unit.id))
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = ExecutionOrchestrator::new(EngineConfig::default());
//! let units = vec![
//!     WorkUnit::new("parse", "parse the input"),
//!     WorkUnit::new("emit", "emit the output").with_dependencies(vec!["parse".into()]),
//! ];
//! let summary = orchestrator.run(units, Arc::new(MyGenerator)).await?;
//! println!("{} of {} units succeeded", summary.successful, summary.total_units);
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency Model
//!
//! Waves execute strictly sequentially; units within one wave execute
//! concurrently, gated by a semaphore of configurable size. Per-unit
//! timeouts cancel a unit without affecting siblings; backoff pauses are
//! cooperative sleeps. Shared components (cache, metrics) are explicitly
//! constructed and passed by handle — no process-wide mutable state.

pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod orchestration;
pub mod types;

pub use batch::{BatchDispatch, BatchError, RequestBatcher};
pub use cache::{CacheCategory, GenerationCache, GenerationRequest};
pub use config::EngineConfig;
pub use error::{EngineError, GenerationError, Result};
pub use metrics::{InMemoryMetricsSink, MetricsSink, NoopMetricsSink};
pub use orchestration::{
    ErrorCategory, ExecutionOrchestrator, ProgressSnapshot, RetryCoordinator, RetryStatistics,
    RunSummary, WaveScheduler,
};
pub use types::{CompletionHook, ExecutionResult, UnitGenerator, UnitStatus, Wave, WorkUnit};
