//! Error types for the bundle store.

use thiserror::Error;

/// Errors that can occur while reading or writing secret bundles.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The bundle name, type or keys are malformed. Never retried.
    #[error("invalid bundle '{bundle}': {reason}")]
    Validation {
        /// The bundle the caller tried to write.
        bundle: String,
        /// Why the bundle was rejected.
        reason: String,
    },

    /// The bundle does not exist.
    #[error("bundle not found: {bundle}")]
    NotFound {
        /// The missing bundle.
        bundle: String,
    },

    /// The backing store could not be reached.
    #[error("store unavailable during {operation} of '{bundle}' after {attempts} attempt(s): {reason}")]
    Unavailable {
        /// The store operation that failed (`put`, `get`, ...).
        operation: String,
        /// The bundle the operation targeted (empty for `list`).
        bundle: String,
        /// How many attempts were made before giving up.
        attempts: u32,
        /// The last transport error.
        reason: String,
    },

    /// The backend rejected the request for a reason retrying won't fix.
    #[error("backend error: {reason}")]
    Backend {
        /// The backend's explanation.
        reason: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {reason}")]
    Serialization {
        /// The reason serialization failed.
        reason: String,
    },

    /// Local I/O failed (file backend).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Creates a validation error for a bundle.
    #[must_use]
    pub fn validation(bundle: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            bundle: bundle.into(),
            reason: reason.into(),
        }
    }

    /// Creates a not found error for a bundle.
    #[must_use]
    pub fn not_found(bundle: impl Into<String>) -> Self {
        Self::NotFound {
            bundle: bundle.into(),
        }
    }

    /// Creates an unavailable error for a single failed attempt.
    ///
    /// The retry layer rewrites `operation`, `bundle` and `attempts` once the
    /// budget is exhausted.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            operation: String::new(),
            bundle: String::new(),
            attempts: 1,
            reason: reason.into(),
        }
    }

    /// Returns true if the error is a transient backend fault worth retrying.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Returns true if the error means the bundle does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            reason: err.to_string(),
        }
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats_correctly() {
        let err = StoreError::validation("db-credentials", "missing key 'password'");
        assert_eq!(
            err.to_string(),
            "invalid bundle 'db-credentials': missing key 'password'"
        );

        let err = StoreError::not_found("api-keys");
        assert_eq!(err.to_string(), "bundle not found: api-keys");

        let err = StoreError::Unavailable {
            operation: "put".into(),
            bundle: "api-keys".into(),
            attempts: 3,
            reason: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "store unavailable during put of 'api-keys' after 3 attempt(s): connection refused"
        );
    }

    #[test]
    fn only_unavailable_is_transient() {
        assert!(StoreError::unavailable("timeout").is_transient());
        assert!(!StoreError::not_found("x").is_transient());
        assert!(!StoreError::validation("x", "bad").is_transient());
        assert!(!StoreError::Backend { reason: "403".into() }.is_transient());
    }

    #[test]
    fn json_errors_convert_to_serialization() {
        let json_err = serde_json::from_str::<u32>("nope").expect_err("invalid json");
        let err = StoreError::from(json_err);
        assert!(matches!(err, StoreError::Serialization { .. }));
    }
}
