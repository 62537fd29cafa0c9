//! Per-bundle operation serialization.

use std::collections::HashMap;
use std::sync::Arc;

use keyturn_store::BundleName;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Hands out one async mutex per bundle name.
///
/// Operations on the same bundle queue behind each other; operations on
/// different bundles never contend.
#[derive(Debug, Default)]
pub struct BundleLocks {
    locks: Mutex<HashMap<BundleName, Arc<AsyncMutex<()>>>>,
}

impl BundleLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `name`.
    pub async fn acquire(&self, name: &BundleName) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(name.clone()).or_default())
        };
        lock.lock_owned().await
    }

    /// Returns the number of names that have been locked at least once.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Returns true if no name has been locked yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
