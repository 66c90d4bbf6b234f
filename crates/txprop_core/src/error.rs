//! Error types for txprop core.

use crate::propagation::Propagation;
use crate::store::StoreError;
use crate::types::ContextId;
use thiserror::Error;

/// Result type for propagation operations.
pub type PropagationResult<T> = Result<T, PropagationError>;

/// Failure signalled by an operation body.
///
/// This is the explicit stand-in for a thrown application error: the body
/// returns it, the manager applies the completion rule, and the failure
/// keeps travelling outward until a caller handles it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct OperationFailure {
    /// Why the operation failed.
    pub reason: String,
}

/// Errors that can occur while running operations under a propagation mode.
#[derive(Debug, Error)]
pub enum PropagationError {
    /// `MANDATORY` was requested but no transaction is active.
    #[error("no existing transaction found for transaction marked with propagation '{mode}'")]
    NoTransaction {
        /// The requested mode.
        mode: Propagation,
    },

    /// `NEVER` was requested but a transaction is active.
    #[error("existing transaction {context} found for transaction marked with propagation '{mode}'")]
    ExistingTransaction {
        /// The requested mode.
        mode: Propagation,
        /// The ambient context that was found.
        context: ContextId,
    },

    /// The operation body failed.
    #[error("operation failed: {0}")]
    Operation(#[from] OperationFailure),

    /// A context completed successfully but had been marked rollback-only
    /// by a failed participant, so it was rolled back instead of committed.
    #[error("transaction {context} silently rolled back because it has been marked as rollback-only")]
    UnexpectedRollback {
        /// The context that was rolled back.
        context: ContextId,
    },

    /// Operation frames nested deeper than the configured maximum.
    #[error("propagation depth {depth} exceeds maximum of {max}")]
    DepthExceeded {
        /// Depth the call would have reached.
        depth: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// Durable store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl PropagationError {
    /// Creates an operation failure with the given reason.
    pub fn operation(reason: impl Into<String>) -> Self {
        Self::Operation(OperationFailure {
            reason: reason.into(),
        })
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if this error came from an operation body.
    #[must_use]
    pub fn is_operation_failure(&self) -> bool {
        matches!(self, Self::Operation(_))
    }

    /// Returns true if this error was raised by the resolver before the
    /// operation body ran.
    #[must_use]
    pub fn is_illegal_state(&self) -> bool {
        matches!(
            self,
            Self::NoTransaction { .. } | Self::ExistingTransaction { .. }
        )
    }

    /// Returns the body's failure reason, if this is an operation failure.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Operation(failure) => Some(&failure.reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_helper_carries_reason() {
        let err = PropagationError::operation("Simulated log save error");
        assert!(err.is_operation_failure());
        assert_eq!(err.reason(), Some("Simulated log save error"));
        assert_eq!(err.to_string(), "operation failed: Simulated log save error");
    }

    #[test]
    fn illegal_state_errors_are_classified() {
        let mandatory = PropagationError::NoTransaction {
            mode: Propagation::Mandatory,
        };
        let never = PropagationError::ExistingTransaction {
            mode: Propagation::Never,
            context: ContextId::new(3),
        };
        assert!(mandatory.is_illegal_state());
        assert!(never.is_illegal_state());
        assert!(mandatory.reason().is_none());
        assert_eq!(
            never.to_string(),
            "existing transaction ctx:3 found for transaction marked with propagation 'NEVER'"
        );
    }

    #[test]
    fn store_errors_convert() {
        let err: PropagationError = StoreError::Unavailable.into();
        assert!(matches!(err, PropagationError::Store(StoreError::Unavailable)));
    }
}
