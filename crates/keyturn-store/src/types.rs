//! Core types for secret bundles.
//!
//! - [`BundleName`]: a validated bundle identifier
//! - [`BundleType`]: the shape a bundle's keys must have
//! - [`SecretValue`]: opaque secret bytes that zeroize on drop
//! - [`SecretBundle`]: a named, versioned set of keys
//! - [`BundleMetadata`]: the value-free view returned by `list`

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{StoreError, StoreResult};

/// A validated bundle name.
///
/// Bundle names follow DNS subdomain rules so they can be mirrored into
/// orchestrator secret objects:
/// - Between 1 and 253 characters
/// - Only lowercase alphanumeric characters, hyphens, and periods
/// - Start and end with an alphanumeric character
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BundleName(String);

impl BundleName {
    /// Maximum length of a bundle name.
    pub const MAX_LENGTH: usize = 253;

    /// Creates a new `BundleName` after validating the input.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if the name is malformed.
    pub fn new(name: impl Into<String>) -> StoreResult<Self> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(name: &str) -> StoreResult<()> {
        let reject = |reason: String| Err(StoreError::validation(name, reason));

        let (Some(first), Some(last)) = (name.chars().next(), name.chars().last()) else {
            return reject("name cannot be empty".to_string());
        };

        if name.len() > Self::MAX_LENGTH {
            return reject(format!(
                "name exceeds maximum length of {} characters",
                Self::MAX_LENGTH
            ));
        }

        if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
            return reject("name must start and end with an alphanumeric character".to_string());
        }

        if let Some(c) = name
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '.'))
        {
            return reject(format!(
                "name contains invalid character '{c}'; only lowercase alphanumeric, hyphens, and periods are allowed"
            ));
        }

        Ok(())
    }
}

impl fmt::Display for BundleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BundleName {
    type Err = StoreError;

    fn from_str(s: &str) -> StoreResult<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for BundleName {
    type Error = StoreError;

    fn try_from(value: String) -> StoreResult<Self> {
        Self::new(value)
    }
}

impl From<BundleName> for String {
    fn from(name: BundleName) -> Self {
        name.0
    }
}

impl AsRef<str> for BundleName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The kind of a bundle, which fixes the keys it must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BundleType {
    /// Generic key-value data.
    #[default]
    #[serde(rename = "opaque")]
    Opaque,
    /// Container registry credentials: a single `.dockerconfigjson` blob.
    #[serde(rename = "dockerconfigjson")]
    DockerConfigJson,
    /// Username and/or password.
    #[serde(rename = "basic-auth")]
    BasicAuth,
    /// An SSH private key.
    #[serde(rename = "ssh-auth")]
    SshAuth,
}

impl BundleType {
    /// Key holding the registry config blob.
    pub const DOCKER_CONFIG_KEY: &'static str = ".dockerconfigjson";
    /// Key holding the basic-auth username.
    pub const USERNAME_KEY: &'static str = "username";
    /// Key holding the basic-auth password.
    pub const PASSWORD_KEY: &'static str = "password";
    /// Key holding the SSH private key.
    pub const SSH_PRIVATE_KEY: &'static str = "ssh-privatekey";

    /// All bundle types.
    pub const ALL: [Self; 4] = [
        Self::Opaque,
        Self::DockerConfigJson,
        Self::BasicAuth,
        Self::SshAuth,
    ];

    /// Returns the short name used in manifests and output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Opaque => "opaque",
            Self::DockerConfigJson => "dockerconfigjson",
            Self::BasicAuth => "basic-auth",
            Self::SshAuth => "ssh-auth",
        }
    }

    /// Checks that `keys` satisfies this type's required-key set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] describing the first violation.
    pub fn validate_keys(self, bundle: &BundleName, keys: &SecretKeys) -> StoreResult<()> {
        let reject = |reason: String| Err(StoreError::validation(bundle.as_str(), reason));

        if keys.is_empty() {
            return reject("bundle must contain at least one key".to_string());
        }

        if let Some(key) = keys.keys().find(|k| !is_valid_key_name(k)) {
            return reject(format!(
                "key '{key}' is invalid; keys must match [-._a-zA-Z0-9]+"
            ));
        }

        match self {
            Self::Opaque => Ok(()),
            Self::DockerConfigJson => {
                let Some(blob) = keys.get(Self::DOCKER_CONFIG_KEY) else {
                    return reject(format!(
                        "{} bundles require the '{}' key",
                        self.as_str(),
                        Self::DOCKER_CONFIG_KEY
                    ));
                };
                if keys.len() != 1 {
                    return reject(format!(
                        "{} bundles must contain only the '{}' key",
                        self.as_str(),
                        Self::DOCKER_CONFIG_KEY
                    ));
                }
                let parsed: serde_json::Value = match serde_json::from_slice(blob.as_bytes()) {
                    Ok(v) => v,
                    Err(e) => return reject(format!("'{}' is not valid JSON: {e}", Self::DOCKER_CONFIG_KEY)),
                };
                if !parsed.get("auths").is_some_and(serde_json::Value::is_object) {
                    return reject(format!(
                        "'{}' must contain an 'auths' object",
                        Self::DOCKER_CONFIG_KEY
                    ));
                }
                Ok(())
            }
            Self::BasicAuth => {
                if !keys.contains_key(Self::USERNAME_KEY) && !keys.contains_key(Self::PASSWORD_KEY) {
                    return reject(format!(
                        "{} bundles require '{}' or '{}'",
                        self.as_str(),
                        Self::USERNAME_KEY,
                        Self::PASSWORD_KEY
                    ));
                }
                if let Some(extra) = keys
                    .keys()
                    .find(|k| *k != Self::USERNAME_KEY && *k != Self::PASSWORD_KEY)
                {
                    return reject(format!(
                        "{} bundles may only contain '{}' and '{}', found '{extra}'",
                        self.as_str(),
                        Self::USERNAME_KEY,
                        Self::PASSWORD_KEY
                    ));
                }
                Ok(())
            }
            Self::SshAuth => {
                if keys.contains_key(Self::SSH_PRIVATE_KEY) {
                    Ok(())
                } else {
                    reject(format!(
                        "{} bundles require the '{}' key",
                        self.as_str(),
                        Self::SSH_PRIVATE_KEY
                    ))
                }
            }
        }
    }
}

impl fmt::Display for BundleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BundleType {
    type Err = StoreError;

    fn from_str(s: &str) -> StoreResult<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| StoreError::validation("", format!("unknown bundle type '{s}'")))
    }
}

fn is_valid_key_name(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
}

/// Secret bytes that securely zeroize on drop.
///
/// Serialized as base64. `Debug` output never shows the bytes and equality
/// is constant-time.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretValue {
    data: Vec<u8>,
}

impl SecretValue {
    /// Creates a new `SecretValue` from raw bytes.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Decodes a base64 string into a value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if the input is not valid base64.
    pub fn from_base64(encoded: &str) -> StoreResult<Self> {
        BASE64
            .decode(encoded)
            .map(Self::new)
            .map_err(|e| StoreError::Serialization {
                reason: format!("invalid base64 value: {e}"),
            })
    }

    /// Returns the value base64-encoded.
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.data)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the number of bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the value is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consumes the value and returns the bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        // The caller takes ownership of the bytes, so skip the zeroizing drop.
        let mut this = std::mem::ManuallyDrop::new(self);
        std::mem::take(&mut this.data)
    }
}

impl From<&str> for SecretValue {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes().to_vec())
    }
}

impl From<String> for SecretValue {
    fn from(value: String) -> Self {
        Self::new(value.into_bytes())
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretValue")
            .field("len", &self.data.len())
            .field("data", &"[REDACTED]")
            .finish()
    }
}

impl PartialEq for SecretValue {
    fn eq(&self, other: &Self) -> bool {
        use subtle::ConstantTimeEq;
        self.data.ct_eq(&other.data).into()
    }
}

impl Eq for SecretValue {}

impl Serialize for SecretValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for SecretValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

/// The keys of a bundle, ordered by key name.
pub type SecretKeys = BTreeMap<String, SecretValue>;

/// A named, versioned set of secret keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretBundle {
    /// Unique bundle name.
    pub name: BundleName,
    /// The shape of the bundle.
    #[serde(rename = "type")]
    pub bundle_type: BundleType,
    /// Key to value mapping.
    pub keys: SecretKeys,
    /// Incremented on every successful write; `1` on creation.
    pub version: u64,
    /// When the bundle was first written.
    pub created_at: DateTime<Utc>,
    /// When the bundle was last written.
    pub updated_at: DateTime<Utc>,
}

impl SecretBundle {
    /// Builds the bundle that results from writing `keys` over `previous`.
    ///
    /// A fresh bundle starts at version 1; an overwrite keeps the creation
    /// time and increments the version by exactly one.
    #[must_use]
    pub fn successor(
        previous: Option<&Self>,
        name: &BundleName,
        bundle_type: BundleType,
        keys: &SecretKeys,
    ) -> Self {
        let now = Utc::now();
        let (version, created_at) = previous.map_or((1, now), |p| (p.version + 1, p.created_at));
        Self {
            name: name.clone(),
            bundle_type,
            keys: keys.clone(),
            version,
            created_at,
            updated_at: now,
        }
    }

    /// Returns the value of a key, if present.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&SecretValue> {
        self.keys.get(key)
    }

    /// Returns the key names in order.
    pub fn key_names(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    /// Returns the value-free metadata for this bundle.
    #[must_use]
    pub fn metadata(&self) -> BundleMetadata {
        BundleMetadata {
            name: self.name.clone(),
            bundle_type: self.bundle_type,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Bundle metadata as returned by bulk enumeration.
///
/// Deliberately carries no keys or values so that listing can never leak
/// secret material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMetadata {
    /// Unique bundle name.
    pub name: BundleName,
    /// The shape of the bundle.
    #[serde(rename = "type")]
    pub bundle_type: BundleType,
    /// Current version.
    pub version: u64,
    /// When the bundle was first written.
    pub created_at: DateTime<Utc>,
    /// When the bundle was last written.
    pub updated_at: DateTime<Utc>,
}

/// Whether a `(bundle, key)` pair resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyPresence {
    /// Both the bundle and the key exist.
    Present,
    /// The bundle does not exist.
    BundleMissing,
    /// The bundle exists but does not contain the key.
    KeyMissing,
}
