//! Unified error types for the domain layer
//!
//! `DomainError` covers recoverable rule violations (bad input, unknown
//! entities, constraint breaches). `MechanicsError` covers arithmetic
//! invariant failures inside the mechanics engine; those indicate a program
//! bug and callers are expected to abort the session rather than recover.

use thiserror::Error;

/// Unified error type for domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Validation failed (e.g., invalid field values)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Entity not found
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Business rule violation
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Unknown attribute name
    #[error("Unknown attribute '{name}'; expected one of the canonical eight{}", suggestion_suffix(.suggestion))]
    UnknownAttribute {
        name: String,
        suggestion: Option<String>,
    },

    /// State transition not allowed
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" (did you mean '{}'?)", s),
        None => String::new(),
    }
}

impl DomainError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Create a constraint violation error
    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::Constraint(msg.into())
    }
}

/// Arithmetic invariant failure inside the mechanics engine.
///
/// Every resolution re-derives its own arithmetic; a mismatch means the
/// engine itself is broken, not that the table rolled badly. Sessions abort
/// on these.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MechanicsError {
    #[error("Math check failed: {check} (expected {expected}, got {actual})")]
    MathCheckFailed {
        check: &'static str,
        expected: i32,
        actual: i32,
    },

    #[error("Die roll out of range: {0} (expected 1-20)")]
    RollOutOfRange(i32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = DomainError::validation("name cannot be empty");
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(err.to_string(), "Validation failed: name cannot be empty");
    }

    #[test]
    fn test_not_found_error() {
        let err = DomainError::not_found("Character", "Riven");
        assert!(err.to_string().contains("Character"));
        assert!(err.to_string().contains("Riven"));
    }

    #[test]
    fn test_unknown_attribute_with_suggestion() {
        let err = DomainError::UnknownAttribute {
            name: "Wits".into(),
            suggestion: Some("Willpower".into()),
        };
        assert!(err.to_string().contains("did you mean 'Willpower'"));
    }

    #[test]
    fn test_math_check_failed_display() {
        let err = MechanicsError::MathCheckFailed {
            check: "total == base_total + modifier_sum",
            expected: 27,
            actual: 25,
        };
        assert!(err.to_string().contains("expected 27"));
    }
}
