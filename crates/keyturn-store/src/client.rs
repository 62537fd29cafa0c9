//! The store client used by every other component.

use tracing::{debug, info};

use crate::backend::SecretBackend;
use crate::error::{StoreError, StoreResult};
use crate::retry::{RetryPolicy, retry_transient};
use crate::types::{BundleMetadata, BundleName, BundleType, KeyPresence, SecretBundle, SecretKeys};

/// Validated, retrying access to a [`SecretBackend`].
///
/// - `put` validates the keys against the bundle type before touching the
///   backend; validation failures are never retried.
/// - transient backend faults are retried per the [`RetryPolicy`].
/// - `delete` is idempotent.
/// - `list` returns metadata only.
#[derive(Debug)]
pub struct StoreClient<B> {
    backend: B,
    retry: RetryPolicy,
}

impl<B: SecretBackend> StoreClient<B> {
    /// Creates a client with the default retry policy.
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            retry: RetryPolicy::default(),
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the underlying backend.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Writes or overwrites a bundle.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Validation`] if `keys` does not satisfy `bundle_type`
    /// - [`StoreError::Unavailable`] once the retry budget is spent
    pub async fn put(
        &self,
        name: &BundleName,
        bundle_type: BundleType,
        keys: &SecretKeys,
    ) -> StoreResult<SecretBundle> {
        bundle_type.validate_keys(name, keys)?;

        let bundle = retry_transient(&self.retry, "put", name.as_str(), || {
            self.backend.write(name, bundle_type, keys)
        })
        .await?;

        info!(
            bundle = %name,
            bundle_type = %bundle_type,
            version = bundle.version,
            backend = self.backend.kind(),
            "bundle written"
        );
        Ok(bundle)
    }

    /// Reads a bundle.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if the bundle is absent
    /// - [`StoreError::Unavailable`] once the retry budget is spent
    pub async fn get(&self, name: &BundleName) -> StoreResult<SecretBundle> {
        retry_transient(&self.retry, "get", name.as_str(), || self.backend.read(name))
            .await?
            .ok_or_else(|| StoreError::not_found(name.as_str()))
    }

    /// Deletes a bundle. Deleting an absent bundle succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] once the retry budget is spent.
    pub async fn delete(&self, name: &BundleName) -> StoreResult<()> {
        let existed =
            retry_transient(&self.retry, "delete", name.as_str(), || self.backend.remove(name))
                .await?;
        if existed {
            info!(bundle = %name, backend = self.backend.kind(), "bundle deleted");
        } else {
            debug!(bundle = %name, "delete of absent bundle ignored");
        }
        Ok(())
    }

    /// Lists every bundle's metadata, sorted by name. Never returns values.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] once the retry budget is spent.
    pub async fn list(&self) -> StoreResult<Vec<BundleMetadata>> {
        retry_transient(&self.retry, "list", "", || self.backend.list()).await
    }

    /// Checks whether `(name, key)` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] once the retry budget is spent.
    pub async fn contains_key(&self, name: &BundleName, key: &str) -> StoreResult<KeyPresence> {
        let bundle =
            retry_transient(&self.retry, "get", name.as_str(), || self.backend.read(name)).await?;
        Ok(match bundle {
            None => KeyPresence::BundleMissing,
            Some(b) if b.keys.contains_key(key) => KeyPresence::Present,
            Some(_) => KeyPresence::KeyMissing,
        })
    }
}
