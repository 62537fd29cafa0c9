//! Bundle manifests for `keyturn create`.
//!
//! ```toml
//! [[bundle]]
//! name = "db-credentials"
//! type = "basic-auth"
//! keys = { username = "app", password = "s3cret" }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use keyturn_lifecycle::{BundleSpec, CreateEntry};
use keyturn_store::{BundleName, BundleType, SecretValue};
use serde::Deserialize;

use crate::error::{CliError, CliResult};

/// One bundle entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestBundle {
    /// Bundle name.
    pub name: String,
    /// Bundle type.
    #[serde(rename = "type", default)]
    pub bundle_type: BundleType,
    /// Key/value pairs, as UTF-8 text.
    #[serde(default)]
    pub keys: BTreeMap<String, String>,
}

/// A list of bundles to create.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
pub struct Manifest {
    /// Bundles in declaration order.
    #[serde(rename = "bundle", default)]
    pub bundles: Vec<ManifestBundle>,
}

impl Manifest {
    /// Reads a manifest file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> CliResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::InvalidArgument(format!("failed to read manifest '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses a manifest from TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or declares no bundles.
    pub fn from_toml(content: &str) -> CliResult<Self> {
        let manifest: Self = toml::from_str(content)
            .map_err(|e| CliError::InvalidArgument(format!("invalid manifest: {e}")))?;
        if manifest.bundles.is_empty() {
            return Err(CliError::InvalidArgument(
                "manifest declares no bundles".to_string(),
            ));
        }
        Ok(manifest)
    }

    /// Converts the entries to create entries, in declaration order.
    ///
    /// Validation is per entry so one bad bundle does not prevent the
    /// others from being created: an invalid name becomes a rejected
    /// entry, and key validity is left to the store.
    #[must_use]
    pub fn into_entries(self) -> Vec<CreateEntry> {
        self.bundles
            .into_iter()
            .map(|entry| match BundleName::new(entry.name.as_str()) {
                Ok(name) => {
                    let keys = entry
                        .keys
                        .into_iter()
                        .map(|(k, v)| (k, SecretValue::from(v)))
                        .collect();
                    BundleSpec::new(name, keys)
                        .with_type(entry.bundle_type)
                        .into()
                }
                Err(e) => CreateEntry::rejected(entry.name, e),
            })
            .collect()
    }
}
