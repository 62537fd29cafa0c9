//! # keyturn-store
//!
//! Named, versioned secret bundles behind a pluggable backend:
//!
//! - **Validated writes**: every bundle type has a required-key set that is
//!   checked before anything reaches the backend
//! - **Versioning**: each successful write increments the bundle version
//! - **Bounded retries**: transient backend faults are retried with
//!   exponential backoff before surfacing as [`StoreError::Unavailable`]
//! - **Safe enumeration**: [`StoreClient::list`] returns metadata only
//!
//! ## Example
//!
//! ```rust
//! use keyturn_store::{BundleName, BundleType, MemoryBackend, SecretKeys, SecretValue, StoreClient};
//!
//! # async fn example() -> keyturn_store::StoreResult<()> {
//! let client = StoreClient::new(MemoryBackend::new());
//! let name = BundleName::new("db-credentials")?;
//! let keys = SecretKeys::from([("password".to_string(), SecretValue::from("p"))]);
//!
//! let bundle = client.put(&name, BundleType::Opaque, &keys).await?;
//! assert_eq!(bundle.version, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Backends
//!
//! - [`MemoryBackend`]: in-process, for tests and dry runs
//! - [`FileBackend`]: JSON snapshot in a local state directory
//! - `VaultBackend`: Vault KV v2 (requires the `vault` feature)

#![forbid(unsafe_code)]

pub mod backend;
pub mod client;
pub mod error;
pub mod file;
pub mod retry;
pub mod types;
#[cfg(feature = "vault")]
pub mod vault;

pub use backend::{MemoryBackend, SecretBackend};
pub use client::StoreClient;
pub use error::{StoreError, StoreResult};
pub use file::FileBackend;
pub use retry::{RetryPolicy, retry_transient};
pub use types::{
    BundleMetadata, BundleName, BundleType, KeyPresence, SecretBundle, SecretKeys, SecretValue,
};
#[cfg(feature = "vault")]
pub use vault::{VaultBackend, VaultConfig};
