//! Error types for the policy gate engine
//!
//! Every failure in the engine is per-operation and recoverable by the caller.
//! Rejections carry enough context (failing field, failing constraint) to
//! retry or escalate.

use thiserror::Error;
use uuid::Uuid;

use crate::constraints::Constraint;
use crate::signal::SystemKey;

/// Main error type for engine operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GateError {
    /// Malformed Signal or Care-Case input; never stored
    #[error("Validation failed for '{field}': {reason}")]
    Validation {
        /// Offending field, dotted path for nested fields
        field: String,
        /// What was wrong with it
        reason: String,
    },

    /// Unknown signal or care-case id
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record that was looked up
        entity: &'static str,
        /// The id that was not found
        id: Uuid,
    },

    /// A signal with this id is already stored. Safe to ignore on redelivery.
    #[error("Duplicate signal id: {0}")]
    DuplicateId(Uuid),

    /// The evidence behind a staged transition changed before commit
    #[error("Stale proposal on case {case_id}: staged at revision {staged_revision}, evidence is now at {current_revision}")]
    StaleProposal {
        case_id: Uuid,
        staged_revision: u64,
        current_revision: u64,
    },

    /// A declared constraint blocked the transition
    #[error("Constraint violation on case {case_id}: {constraint}")]
    ConstraintViolation {
        case_id: Uuid,
        constraint: Constraint,
    },

    /// An active case already exists for this system key
    #[error("Active case {active_case} already exists for {key}")]
    ConflictingActiveCase { key: SystemKey, active_case: Uuid },

    /// The case is closed and no longer accepts links or transitions
    #[error("Case is closed: {0}")]
    CaseClosed(Uuid),

    /// Commit was requested with nothing staged
    #[error("No staged transition on case {0}")]
    NoStagedTransition(Uuid),

    /// The actor is not allowed to perform this operation
    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },

    /// Invalid engine configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal state could not be accessed (poisoned lock)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GateError {
    /// Create a validation error
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        GateError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a not-found error for a signal
    pub fn signal_not_found(id: Uuid) -> Self {
        GateError::NotFound {
            entity: "signal",
            id,
        }
    }

    /// Create a not-found error for a care-case
    pub fn case_not_found(id: Uuid) -> Self {
        GateError::NotFound {
            entity: "care-case",
            id,
        }
    }

    /// Create an unauthorized error
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        GateError::Unauthorized {
            reason: reason.into(),
        }
    }

    /// Duplicate delivery is a no-op, not a failure
    pub fn is_safe_noop(&self) -> bool {
        matches!(self, GateError::DuplicateId(_))
    }

    /// The caller should recompute and try again
    pub fn is_retryable(&self) -> bool {
        matches!(self, GateError::StaleProposal { .. })
    }

    /// The constraint that blocked a transition, if this is a violation
    pub fn constraint(&self) -> Option<Constraint> {
        match self {
            GateError::ConstraintViolation { constraint, .. } => Some(*constraint),
            _ => None,
        }
    }

    /// The failing field, if this is a validation error
    pub fn field(&self) -> Option<&str> {
        match self {
            GateError::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for GateError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        GateError::Internal(format!("lock poisoned: {}", err))
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, GateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GateError::validation("tension", "must be within [0, 1]");
        assert_eq!(
            err.to_string(),
            "Validation failed for 'tension': must be within [0, 1]"
        );

        let id = Uuid::nil();
        let err = GateError::ConstraintViolation {
            case_id: id,
            constraint: Constraint::CanaryRequired,
        };
        assert!(err.to_string().contains("canary-required"));
    }

    #[test]
    fn test_classification() {
        assert!(GateError::DuplicateId(Uuid::nil()).is_safe_noop());
        assert!(!GateError::case_not_found(Uuid::nil()).is_safe_noop());

        let stale = GateError::StaleProposal {
            case_id: Uuid::nil(),
            staged_revision: 1,
            current_revision: 2,
        };
        assert!(stale.is_retryable());
        assert!(!GateError::CaseClosed(Uuid::nil()).is_retryable());
    }

    #[test]
    fn test_accessors() {
        let err = GateError::ConstraintViolation {
            case_id: Uuid::nil(),
            constraint: Constraint::NoSecrets,
        };
        assert_eq!(err.constraint(), Some(Constraint::NoSecrets));
        assert_eq!(err.field(), None);

        let err = GateError::validation("system.env", "required field missing");
        assert_eq!(err.field(), Some("system.env"));
        assert_eq!(err.constraint(), None);
    }
}
