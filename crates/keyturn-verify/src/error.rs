//! Verification error types.

use keyturn_lifecycle::LifecycleError;
use keyturn_store::StoreError;
use thiserror::Error;

/// Result type alias for verification operations.
pub type VerifyResult<T> = Result<T, VerifyError>;

/// Errors produced while verifying references or reading the audit trail.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// One or more declared references do not resolve.
    #[error("{} dangling reference(s): {}", .dangling.len(), .dangling.join("; "))]
    ReferenceDrift {
        /// Description of each dangling reference
        dangling: Vec<String>,
    },

    /// The store could not be queried.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The audit log or workload controller failed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl VerifyError {
    /// Returns true if this error reports drift rather than a failure to
    /// verify.
    #[must_use]
    pub const fn is_drift(&self) -> bool {
        matches!(self, Self::ReferenceDrift { .. })
    }
}
