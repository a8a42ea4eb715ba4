//! # Engine Configuration
//!
//! Configuration for all engine subsystems, with environment-specific
//! presets. Defaults match production behavior; `for_test()` shrinks
//! timeouts and disables backoff so test suites stay fast.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Top-level configuration for the execution engine
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    pub execution: ExecutionConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub batch: BatchConfig,
}

/// Wave execution behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Maximum number of units executing concurrently within one wave
    pub max_concurrent_units: usize,
    /// Per-unit execution timeout
    pub unit_timeout_ms: u64,
    /// Model identifier folded into cache keys
    pub model_id: String,
}

impl ExecutionConfig {
    pub fn unit_timeout(&self) -> Duration {
        Duration::from_millis(self.unit_timeout_ms)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_units: 100,
            unit_timeout_ms: 300_000, // 5 minutes
            model_id: "default".to_string(),
        }
    }
}

/// Retry behavior for failed units
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum retry attempts per unit
    pub max_attempts: u32,
    /// Exploration parameter per attempt (1-indexed); attempts beyond the
    /// table reuse the last value
    pub exploration_schedule: Vec<f64>,
    /// Per-attempt timeout for the retry callback
    pub attempt_timeout_ms: u64,
    pub backoff: BackoffConfig,
}

impl RetryConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            exploration_schedule: vec![0.7, 0.5, 0.3],
            attempt_timeout_ms: 300_000,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Exponential backoff applied before each retry attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub enabled: bool,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    /// Randomize delays to avoid synchronized retries
    pub jitter_enabled: bool,
    /// Maximum jitter fraction (0.0 to 1.0)
    pub max_jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 4_000,
            jitter_enabled: false,
            max_jitter: 0.1,
        }
    }
}

/// Two-level generation cache behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Prefix for every cache key
    pub namespace: String,
    /// In-process LRU capacity
    pub l1_capacity: usize,
    /// Minimum cosine similarity for a semantic hit
    pub similarity_threshold: f64,
    /// Half-width of the coarse bucket-score range query
    pub bucket_window: f64,
    /// Number of leading embedding dimensions averaged into the bucket score
    pub bucket_prefix_dims: usize,
    pub ttl: CategoryTtlConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: "waveflow".to_string(),
            l1_capacity: 100,
            similarity_threshold: 0.95,
            bucket_window: 0.1,
            bucket_prefix_dims: 8,
            ttl: CategoryTtlConfig::default(),
        }
    }
}

/// Content-category dependent TTLs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryTtlConfig {
    pub generation_seconds: u64,
    pub validation_seconds: u64,
    pub test_seconds: u64,
    pub review_seconds: u64,
    /// Used when no category keyword is found in the content
    pub default_seconds: u64,
}

impl CategoryTtlConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_seconds)
    }
}

impl Default for CategoryTtlConfig {
    fn default() -> Self {
        Self {
            generation_seconds: 86_400, // 24h
            validation_seconds: 43_200, // 12h
            test_seconds: 21_600,       // 6h
            review_seconds: 10_800,     // 3h
            default_seconds: 86_400,
        }
    }
}

/// Request batching behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Collection window opened by the first submission
    pub window_ms: u64,
    /// A full batch flushes without waiting for the window
    pub max_size: usize,
}

impl BatchConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            window_ms: 500,
            max_size: 5,
        }
    }
}

impl EngineConfig {
    /// Test-optimized configuration: tight timeouts, no backoff sleeps
    pub fn for_test() -> Self {
        Self {
            execution: ExecutionConfig {
                max_concurrent_units: 10,
                unit_timeout_ms: 1_000,
                model_id: "test-model".to_string(),
            },
            retry: RetryConfig {
                max_attempts: 3,
                exploration_schedule: vec![0.7, 0.5, 0.3],
                attempt_timeout_ms: 1_000,
                backoff: BackoffConfig {
                    enabled: false,
                    ..BackoffConfig::default()
                },
            },
            cache: CacheConfig {
                l1_capacity: 10,
                ..CacheConfig::default()
            },
            batch: BatchConfig {
                window_ms: 50,
                max_size: 5,
            },
        }
    }

    /// Development configuration: production shape with shorter timeouts
    pub fn for_development() -> Self {
        Self {
            execution: ExecutionConfig {
                max_concurrent_units: 20,
                unit_timeout_ms: 60_000,
                model_id: "default".to_string(),
            },
            ..Self::default()
        }
    }

    /// Select a preset from common environment variables
    pub fn from_environment() -> Self {
        let environment = env::var("WAVEFLOW_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "production".to_string());

        match environment.as_str() {
            "test" => Self::for_test(),
            "development" => Self::for_development(),
            _ => Self::default(),
        }
    }
}
