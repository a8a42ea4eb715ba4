//! Crate-wide error types.
//!
//! Only a cyclic or otherwise unsatisfiable dependency graph is fatal to a
//! run; every other failure is captured in per-unit or per-subsystem state
//! and surfaced through result and statistics objects.

use thiserror::Error;

/// Errors that abort an orchestration run before execution starts
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// The dependency graph contains a cycle, or a unit references a
    /// dependency id that is not part of the input set.
    #[error("cyclic or unsatisfiable dependencies among units: {}", remaining.join(", "))]
    CyclicDependency { remaining: Vec<String> },

    /// The input set or configuration is malformed (duplicate unit ids,
    /// empty exploration schedule, etc.)
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error returned by the external generation callback.
///
/// The engine never inspects this beyond its message: the message feeds the
/// retry coordinator's keyword-based classification.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct GenerationError {
    pub message: String,
}

impl GenerationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for GenerationError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for GenerationError {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cyclic_dependency_names_remaining_units() {
        let err = EngineError::CyclicDependency {
            remaining: vec!["b".to_string(), "c".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("b, c"));
    }

    #[test]
    fn test_generation_error_displays_message() {
        let err = GenerationError::new("syntax error near line 3");
        assert_eq!(err.to_string(), "syntax error near line 3");
    }
}
