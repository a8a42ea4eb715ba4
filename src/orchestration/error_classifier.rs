//! # Generation Error Classification
//!
//! Classifies generation failures into a fixed taxonomy by case-insensitive
//! substring matching against per-category keyword sets, and produces the
//! category-specific feedback hint handed to the generation callback on
//! retry.
//!
//! The first matching category in declaration order wins; messages matching
//! nothing classify as `Unknown`.

use crate::types::WorkUnit;
use serde::{Deserialize, Serialize};

/// Fixed error taxonomy for generation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Syntax,
    Type,
    Logic,
    Timeout,
    Dependency,
    ContextInsufficient,
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Syntax => write!(f, "syntax"),
            ErrorCategory::Type => write!(f, "type"),
            ErrorCategory::Logic => write!(f, "logic"),
            ErrorCategory::Timeout => write!(f, "timeout"),
            ErrorCategory::Dependency => write!(f, "dependency"),
            ErrorCategory::ContextInsufficient => write!(f, "context_insufficient"),
            ErrorCategory::Unknown => write!(f, "unknown"),
        }
    }
}

/// Keyword sets per category; declaration order is match priority
const CATEGORY_KEYWORDS: &[(ErrorCategory, &[&str])] = &[
    (
        ErrorCategory::Syntax,
        &["syntax error", "unexpected token", "parse error", "invalid syntax"],
    ),
    (
        ErrorCategory::Type,
        &["type error", "type mismatch", "cannot convert", "incompatible type"],
    ),
    (
        ErrorCategory::Logic,
        &["assertion failed", "logic error", "wrong result", "incorrect output"],
    ),
    (
        ErrorCategory::Timeout,
        &["timeout", "timed out", "deadline exceeded"],
    ),
    (
        ErrorCategory::Dependency,
        &["module not found", "import error", "cannot import", "dependency", "unresolved reference"],
    ),
    (
        ErrorCategory::ContextInsufficient,
        &["insufficient context", "missing context", "ambiguous", "underspecified"],
    ),
];

/// Classify an error message into the fixed taxonomy
pub fn classify_error(message: &str) -> ErrorCategory {
    let lowered = message.to_lowercase();
    for (category, keywords) in CATEGORY_KEYWORDS {
        if keywords.iter().any(|keyword| lowered.contains(keyword)) {
            return *category;
        }
    }
    ErrorCategory::Unknown
}

/// Category-specific hint for the retry feedback text
pub fn feedback_hint(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::Syntax => "check for unbalanced brackets and malformed statements",
        ErrorCategory::Type => "verify argument and return types match their declarations",
        ErrorCategory::Logic => "re-check the expected behavior against the unit description",
        ErrorCategory::Timeout => "reduce complexity, avoid nested loops",
        ErrorCategory::Dependency => "check imports/module availability",
        ErrorCategory::ContextInsufficient => {
            "restate the requirements explicitly and include the definitions the unit needs"
        }
        ErrorCategory::Unknown => "review the error and adjust the implementation",
    }
}

/// Build the feedback text for a retry attempt: hint, raw error, unit
/// description.
pub fn build_feedback(category: ErrorCategory, error: &str, unit: &WorkUnit) -> String {
    format!(
        "{}. Previous error: {}. Unit: {}",
        feedback_hint(category),
        error,
        unit.description
    )
}
