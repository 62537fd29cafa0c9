//! CLI error types.

use keyturn_lifecycle::{LifecycleError, OperationKind, OperationState};
use keyturn_store::StoreError;
use keyturn_verify::VerifyError;
use thiserror::Error;

/// Result type alias for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid configuration or manifest.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The bundle exists but lacks the requested key.
    #[error("bundle '{bundle}' has no key '{key}'")]
    KeyNotFound {
        /// Bundle name
        bundle: String,
        /// Missing key
        key: String,
    },

    /// Output formatting error.
    #[error("format error: {0}")]
    Format(String),

    /// An operation reached the failed state. The report has already been
    /// printed.
    #[error("{kind} operation {id} failed while {stage}")]
    OperationFailed {
        /// Operation kind
        kind: OperationKind,
        /// Operation identifier
        id: String,
        /// Stage at which it failed
        stage: OperationState,
    },

    /// Store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Lifecycle error.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Verification error.
    #[error(transparent)]
    Verify(#[from] VerifyError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
