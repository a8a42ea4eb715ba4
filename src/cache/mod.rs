//! # Generation Cache Module
//!
//! Two-level caching for expensive generation calls.
//!
//! ## Architecture
//!
//! ```text
//! GenerationCache
//!   ├── L1: lru::LruCache            <- in-process, bounded, move-to-front
//!   └── CacheProvider (enum)         <- zero-cost dispatch
//!         ├── Memory(MemoryCacheService)  <- DashMap + scored BTreeMap index
//!         └── NoOp(NoOpCacheService)      <- always-miss fallback
//! ```
//!
//! ## Design Decisions
//!
//! - **Enum dispatch**: no vtable overhead on the hot lookup path
//! - **Graceful degradation**: backend errors are logged and become misses,
//!   never caller failures
//! - **Best-effort writes**: cache errors never propagate
//! - **Category TTLs**: content keywords pick the TTL
//!   (generation/validation/test/review)
//! - **Similarity lookup**: coarse bucket score over the sorted index, then
//!   true cosine comparison against a configurable threshold

pub mod errors;
pub mod key;
pub mod provider;
pub mod providers;
pub mod similarity;
pub mod tier;
pub mod traits;

pub use errors::{CacheError, CacheResult};
pub use key::{build_cache_key, detect_category, normalize_content, CacheCategory};
pub use provider::CacheProvider;
pub use providers::{MemoryCacheService, NoOpCacheService};
pub use similarity::{bucket_score, cosine_similarity, SimilarityEntry};
pub use tier::{GenerationCache, GenerationRequest};
pub use traits::{CacheService, ScoredIndexService, ScoredKey};
