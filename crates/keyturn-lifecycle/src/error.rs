//! Error types for lifecycle operations.

use keyturn_store::StoreError;
use thiserror::Error;

use crate::types::{OperationKind, OperationState};

/// Result type alias for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Errors that can occur while creating, rotating, updating or deleting
/// bundles.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The store rejected or could not serve a request.
    #[error("{operation} of bundle '{bundle}' failed: {source}")]
    Store {
        /// Operation being performed
        operation: OperationKind,
        /// Bundle involved
        bundle: String,
        /// Underlying store error
        #[source]
        source: StoreError,
    },

    /// `create` found a bundle that is already stored.
    #[error("bundle '{bundle}' already exists at version {version}; use rotate or update")]
    AlreadyExists {
        /// Bundle involved
        bundle: String,
        /// Version currently stored
        version: u64,
    },

    /// A workload did not report ready before the deadline.
    #[error("workload '{workload}' did not become ready within {timeout_secs}s")]
    RolloutTimeout {
        /// Workload that timed out
        workload: String,
        /// Deadline that was exceeded, in seconds
        timeout_secs: u64,
    },

    /// The workload controller failed to restart or query a workload.
    #[error("controller error for workload '{workload}': {reason}")]
    Controller {
        /// Workload involved
        workload: String,
        /// Failure description
        reason: String,
    },

    /// Invalid operation state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition {
        /// Current state
        from: OperationState,
        /// Attempted target state
        to: OperationState,
    },

    /// Some bundles of a multi-bundle operation failed.
    #[error("{operation} finished with {failed} of {total} bundles failed")]
    Incomplete {
        /// Operation being performed
        operation: OperationKind,
        /// Number of failed bundles
        failed: usize,
        /// Number of bundles in the operation
        total: usize,
    },

    /// The audit log could not be read or appended to.
    #[error("audit log error: {0}")]
    Audit(String),

    /// A workload definition is malformed.
    #[error("invalid workload: {0}")]
    InvalidWorkload(String),
}

impl LifecycleError {
    /// Wraps a store error with the operation and bundle it occurred in.
    #[must_use]
    pub fn store(operation: OperationKind, bundle: impl std::fmt::Display, source: StoreError) -> Self {
        Self::Store {
            operation,
            bundle: bundle.to_string(),
            source,
        }
    }

    /// Creates a controller error.
    #[must_use]
    pub fn controller(workload: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Controller {
            workload: workload.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid state transition error.
    #[must_use]
    pub const fn invalid_transition(from: OperationState, to: OperationState) -> Self {
        Self::InvalidTransition { from, to }
    }
}

impl From<std::io::Error> for LifecycleError {
    fn from(err: std::io::Error) -> Self {
        Self::Audit(err.to_string())
    }
}

impl From<serde_json::Error> for LifecycleError {
    fn from(err: serde_json::Error) -> Self {
        Self::Audit(err.to_string())
    }
}
