//! Backing store abstraction.
//!
//! A [`SecretBackend`] performs raw bundle reads and writes. It owns version
//! assignment so that concurrent writers can never hand out the same
//! version twice. Validation and retries live one layer up, in
//! [`StoreClient`](crate::StoreClient).

use std::collections::HashMap;
use std::future::Future;
use std::sync::{PoisonError, RwLock};

use crate::error::StoreResult;
use crate::types::{BundleMetadata, BundleName, BundleType, SecretBundle, SecretKeys};

/// A place secret bundles are kept.
pub trait SecretBackend: Send + Sync {
    /// Short backend name for logs and output.
    fn kind(&self) -> &'static str;

    /// Writes `keys` as the next version of `name` and returns the result.
    fn write(
        &self,
        name: &BundleName,
        bundle_type: BundleType,
        keys: &SecretKeys,
    ) -> impl Future<Output = StoreResult<SecretBundle>> + Send;

    /// Reads the current version of `name`, `None` if absent.
    fn read(
        &self,
        name: &BundleName,
    ) -> impl Future<Output = StoreResult<Option<SecretBundle>>> + Send;

    /// Removes `name`. Returns whether it existed.
    fn remove(&self, name: &BundleName) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Lists every bundle's metadata.
    fn list(&self) -> impl Future<Output = StoreResult<Vec<BundleMetadata>>> + Send;
}

/// An in-process backend.
///
/// Useful for tests and dry runs; contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    bundles: RwLock<HashMap<BundleName, SecretBundle>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored bundles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bundles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if no bundles are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SecretBackend for MemoryBackend {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn write(
        &self,
        name: &BundleName,
        bundle_type: BundleType,
        keys: &SecretKeys,
    ) -> StoreResult<SecretBundle> {
        let mut bundles = self
            .bundles
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let bundle = SecretBundle::successor(bundles.get(name), name, bundle_type, keys);
        bundles.insert(name.clone(), bundle.clone());
        Ok(bundle)
    }

    async fn read(&self, name: &BundleName) -> StoreResult<Option<SecretBundle>> {
        let bundles = self.bundles.read().unwrap_or_else(PoisonError::into_inner);
        Ok(bundles.get(name).cloned())
    }

    async fn remove(&self, name: &BundleName) -> StoreResult<bool> {
        let mut bundles = self
            .bundles
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(bundles.remove(name).is_some())
    }

    async fn list(&self) -> StoreResult<Vec<BundleMetadata>> {
        let bundles = self.bundles.read().unwrap_or_else(PoisonError::into_inner);
        let mut listed: Vec<BundleMetadata> = bundles.values().map(SecretBundle::metadata).collect();
        listed.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listed)
    }
}
