//! File-backed bundle storage.
//!
//! Bundles are held in memory and snapshotted to `bundles.json` in the
//! state directory after every mutation. A snapshot is written to a
//! temporary file and renamed into place, so a crash never leaves a torn
//! file behind.

use std::collections::HashMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use crate::backend::SecretBackend;
use crate::error::StoreResult;
use crate::types::{BundleMetadata, BundleName, BundleType, SecretBundle, SecretKeys};

const SNAPSHOT_FILE: &str = "bundles.json";

/// A backend persisted as a JSON snapshot on local disk.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    bundles: RwLock<HashMap<BundleName, SecretBundle>>,
}

impl FileBackend {
    /// Opens (or creates) the store in `state_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or an existing
    /// snapshot cannot be parsed.
    pub fn open(state_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = state_dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(SNAPSHOT_FILE);

        let bundles = if path.exists() {
            let raw = fs::read(&path)?;
            let stored: Vec<SecretBundle> = serde_json::from_slice(&raw)?;
            stored.into_iter().map(|b| (b.name.clone(), b)).collect()
        } else {
            HashMap::new()
        };

        debug!(path = %path.display(), count = bundles.len(), "opened file store");

        Ok(Self {
            path,
            bundles: RwLock::new(bundles),
        })
    }

    /// Returns the snapshot file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, bundles: &HashMap<BundleName, SecretBundle>) -> StoreResult<()> {
        let mut ordered: Vec<&SecretBundle> = bundles.values().collect();
        ordered.sort_by(|a, b| a.name.cmp(&b.name));
        let json = serde_json::to_vec_pretty(&ordered)?;

        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            restrict_permissions(&file)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(file: &fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &fs::File) -> std::io::Result<()> {
    Ok(())
}

impl SecretBackend for FileBackend {
    fn kind(&self) -> &'static str {
        "file"
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

        let mut next = bundles.clone();
        next.insert(name.clone(), bundle.clone());
        self.persist(&next)?;
        *bundles = next;

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
        if !bundles.contains_key(name) {
            return Ok(false);
        }

        let mut next = bundles.clone();
        next.remove(name);
        self.persist(&next)?;
        *bundles = next;

        Ok(true)
    }

    async fn list(&self) -> StoreResult<Vec<BundleMetadata>> {
        let bundles = self.bundles.read().unwrap_or_else(PoisonError::into_inner);
        let mut listed: Vec<BundleMetadata> = bundles.values().map(SecretBundle::metadata).collect();
        listed.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SecretValue;

    fn name(s: &str) -> BundleName {
        BundleName::new(s).expect("valid name")
    }

    fn keys(value: &str) -> SecretKeys {
        SecretKeys::from([("password".to_string(), SecretValue::from(value))])
    }

    #[tokio::test]
    async fn bundles_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let store = FileBackend::open(dir.path()).expect("open");
            store
                .write(&name("db"), BundleType::Opaque, &keys("one"))
                .await
                .expect("write");
            store
                .write(&name("db"), BundleType::Opaque, &keys("two"))
                .await
                .expect("write");
        }

        let reopened = FileBackend::open(dir.path()).expect("reopen");
        let bundle = reopened
            .read(&name("db"))
            .await
            .expect("read")
            .expect("present");
        assert_eq!(bundle.version, 2);
        assert_eq!(bundle.value("password"), Some(&SecretValue::from("two")));
    }

    #[tokio::test]
    async fn remove_is_persisted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileBackend::open(dir.path()).expect("open");
        store
            .write(&name("db"), BundleType::Opaque, &keys("one"))
            .await
            .expect("write");
        assert!(store.remove(&name("db")).await.expect("remove"));
        assert!(!store.remove(&name("db")).await.expect("remove"));

        let reopened = FileBackend::open(dir.path()).expect("reopen");
        assert!(reopened.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn snapshot_holds_values_base64_encoded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileBackend::open(dir.path()).expect("open");
        store
            .write(&name("db"), BundleType::Opaque, &keys("plain-text"))
            .await
            .expect("write");

        let raw = fs::read_to_string(store.path()).expect("read snapshot");
        assert!(!raw.contains("plain-text"));
        assert!(raw.contains(&SecretValue::from("plain-text").to_base64()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn snapshot_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileBackend::open(dir.path()).expect("open");
        store
            .write(&name("db"), BundleType::Opaque, &keys("v"))
            .await
            .expect("write");

        let mode = fs::metadata(store.path()).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn corrupt_snapshot_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(SNAPSHOT_FILE), "not json").expect("write");
        assert!(FileBackend::open(dir.path()).is_err());
    }
}
