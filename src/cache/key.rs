//! # Cache Key Construction
//!
//! Deterministic, cross-implementation-stable cache keys:
//!
//! ```text
//! "<namespace>:" + hex(sha256(normalize(content) + "|" + model_id + "|" + parameter))
//! ```
//!
//! Normalization collapses whitespace, strips code-fence lines, and
//! lowercases a fixed set of structural keywords so superficially different
//! but semantically identical inputs share a key.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::CategoryTtlConfig;

/// Structural keywords lowercased during normalization (matched as whole
/// whitespace-delimited tokens, case-insensitively)
const STRUCTURAL_KEYWORDS: &[&str] = &[
    "function", "class", "def", "return", "import", "const", "async", "await",
];

/// Content categories with distinct TTLs, detected by keyword inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheCategory {
    Generation,
    Validation,
    Test,
    Review,
}

impl CacheCategory {
    pub fn ttl(&self, config: &CategoryTtlConfig) -> Duration {
        let seconds = match self {
            CacheCategory::Generation => config.generation_seconds,
            CacheCategory::Validation => config.validation_seconds,
            CacheCategory::Test => config.test_seconds,
            CacheCategory::Review => config.review_seconds,
        };
        Duration::from_secs(seconds)
    }
}

impl std::fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheCategory::Generation => write!(f, "generation"),
            CacheCategory::Validation => write!(f, "validation"),
            CacheCategory::Test => write!(f, "test"),
            CacheCategory::Review => write!(f, "review"),
        }
    }
}

/// Detect a content category by case-insensitive keyword inspection.
///
/// First matching category in declaration order wins; `None` means the
/// caller falls back to the default TTL.
pub fn detect_category(content: &str) -> Option<CacheCategory> {
    let lowered = content.to_lowercase();
    if lowered.contains("generation") {
        Some(CacheCategory::Generation)
    } else if lowered.contains("validation") {
        Some(CacheCategory::Validation)
    } else if lowered.contains("test") {
        Some(CacheCategory::Test)
    } else if lowered.contains("review") {
        Some(CacheCategory::Review)
    } else {
        None
    }
}

/// Normalize content before hashing: drop code-fence lines, collapse
/// whitespace runs to single spaces, lowercase structural keywords.
pub fn normalize_content(content: &str) -> String {
    let without_fences: Vec<&str> = content
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect();

    without_fences
        .join(" ")
        .split_whitespace()
        .map(|token| {
            if STRUCTURAL_KEYWORDS
                .iter()
                .any(|keyword| token.eq_ignore_ascii_case(keyword))
            {
                token.to_ascii_lowercase()
            } else {
                token.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build the namespaced exact-match cache key
pub fn build_cache_key(namespace: &str, content: &str, model_id: &str, parameter: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_content(content).as_bytes());
    hasher.update(b"|");
    hasher.update(model_id.as_bytes());
    hasher.update(b"|");
    hasher.update(parameter.as_bytes());
    format!("{namespace}:{:x}", hasher.finalize())
}

/// Glob-style match supporting `*` wildcards, used for scoped invalidation
pub(crate) fn glob_match(pattern: &str, key: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == key;
    }

    let segments: Vec<&str> = pattern.split('*').collect();
    let mut rest = key;

    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(segment) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == segments.len() - 1 && !pattern.ends_with('*') {
            return rest.ends_with(segment);
        } else {
            match rest.find(segment) {
                Some(pos) => rest = &rest[pos + segment.len()..],
                None => return false,
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(
            normalize_content("emit   the\n\treport"),
            "emit the report"
        );
    }

    #[test]
    fn test_normalize_strips_code_fences() {
        let content = "```python\nx = 1\n```\ndone";
        assert_eq!(normalize_content(content), "x = 1 done");
    }

    #[test]
    fn test_normalize_lowercases_structural_keywords() {
        assert_eq!(
            normalize_content("DEF compute RETURN value"),
            "def compute return value"
        );
        // Non-keyword tokens keep their case
        assert_eq!(normalize_content("Compute VALUE"), "Compute VALUE");
    }

    #[test]
    fn test_key_format() {
        let key = build_cache_key("waveflow", "some content", "model-a", "0.70");
        let (namespace, digest) = key.split_once(':').expect("namespaced key");
        assert_eq!(namespace, "waveflow");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_key_is_deterministic_and_input_sensitive() {
        let a = build_cache_key("ns", "content", "m", "p");
        let b = build_cache_key("ns", "content", "m", "p");
        assert_eq!(a, b);
        assert_ne!(a, build_cache_key("ns", "content", "m2", "p"));
        assert_ne!(a, build_cache_key("ns", "content", "m", "p2"));
        assert_ne!(a, build_cache_key("ns", "other content", "m", "p"));
    }

    #[test]
    fn test_normalization_equivalent_inputs_share_a_key() {
        let a = build_cache_key("ns", "DEF   f\nRETURN 1", "m", "p");
        let b = build_cache_key("ns", "def f return 1", "m", "p");
        assert_eq!(a, b);
    }

    #[test]
    fn test_detect_category_first_match_wins() {
        assert_eq!(
            detect_category("run the generation step"),
            Some(CacheCategory::Generation)
        );
        assert_eq!(
            detect_category("schema VALIDATION pass"),
            Some(CacheCategory::Validation)
        );
        assert_eq!(detect_category("unit test suite"), Some(CacheCategory::Test));
        assert_eq!(detect_category("code review notes"), Some(CacheCategory::Review));
        assert_eq!(detect_category("plain content"), None);
    }

    #[test]
    fn test_category_ttls() {
        let config = CategoryTtlConfig::default();
        assert_eq!(
            CacheCategory::Validation.ttl(&config),
            Duration::from_secs(43_200)
        );
        assert_eq!(
            CacheCategory::Review.ttl(&config),
            Duration::from_secs(10_800)
        );
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("waveflow:*", "waveflow:abc"));
        assert!(glob_match("*:abc", "waveflow:abc"));
        assert!(glob_match("waveflow:*:unit1", "waveflow:sim:unit1"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exact2"));
        assert!(!glob_match("waveflow:*", "other:abc"));
        assert!(glob_match("*", "anything"));
    }
}
