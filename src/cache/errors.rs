//! Cache error types

use thiserror::Error;

/// Errors that can occur during cache operations.
///
/// Callers of the cache tier never see these: any backend error is logged,
/// counted, and degraded to a cache miss.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Failed to serialize or deserialize a cache value
    #[error("cache serialization error: {0}")]
    SerializationError(String),

    /// Cache operation timed out
    #[error("cache operation timed out: {0}")]
    Timeout(String),

    /// Generic backend error
    #[error("cache backend error: {0}")]
    BackendError(String),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;
