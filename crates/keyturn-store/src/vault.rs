//! Vault KV v2 backend.
//!
//! Each bundle is stored at `<mount>/<bundle name>` as a document holding the
//! bundle type, the base64-encoded keys and the creation time. Versions come
//! from KV v2's own version counter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;
use vaultrs::kv2;

use crate::backend::SecretBackend;
use crate::error::{StoreError, StoreResult};
use crate::types::{BundleMetadata, BundleName, BundleType, SecretBundle, SecretKeys};

/// Connection settings for a Vault server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Server address, e.g. `https://vault.example.com:8200`.
    pub address: String,
    /// Authentication token.
    #[serde(default)]
    pub token: Option<String>,
    /// Enterprise namespace.
    #[serde(default)]
    pub namespace: Option<String>,
    /// KV v2 mount path.
    #[serde(default = "default_mount_path")]
    pub mount_path: String,
}

fn default_mount_path() -> String {
    "secret".to_string()
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8200".to_string(),
            token: None,
            namespace: None,
            mount_path: default_mount_path(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct VaultDocument {
    #[serde(rename = "type")]
    bundle_type: BundleType,
    keys: SecretKeys,
    created_at: DateTime<Utc>,
}

/// A backend storing bundles in a Vault KV v2 engine.
pub struct VaultBackend {
    client: VaultClient,
    mount_path: String,
}

impl VaultBackend {
    /// Builds a client for the configured server.
    ///
    /// No request is made; connectivity problems surface on first use.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the settings are invalid.
    pub fn connect(config: &VaultConfig) -> StoreResult<Self> {
        if config.address.is_empty() {
            return Err(StoreError::Backend {
                reason: "vault address cannot be empty".to_string(),
            });
        }

        let mut settings = VaultClientSettingsBuilder::default();
        settings.address(&config.address);
        if let Some(token) = &config.token {
            settings.token(token);
        }
        if let Some(namespace) = &config.namespace {
            settings.namespace(Some(namespace.clone()));
        }

        let settings = settings.build().map_err(|e| StoreError::Backend {
            reason: format!("invalid vault settings: {e}"),
        })?;
        let client = VaultClient::new(settings).map_err(|e| StoreError::Backend {
            reason: format!("failed to create vault client: {e}"),
        })?;

        Ok(Self {
            client,
            mount_path: config.mount_path.clone(),
        })
    }

    async fn read_document(&self, name: &BundleName) -> StoreResult<Option<VaultDocument>> {
        match kv2::read::<VaultDocument>(&self.client, &self.mount_path, name.as_str()).await {
            Ok(doc) => Ok(Some(doc)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(map_client_error(e)),
        }
    }

    async fn current_version(&self, name: &BundleName) -> StoreResult<Option<(u64, DateTime<Utc>)>> {
        match kv2::read_metadata(&self.client, &self.mount_path, name.as_str()).await {
            Ok(meta) => Ok(Some((meta.current_version, parse_time(&meta.updated_time)))),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(map_client_error(e)),
        }
    }
}

impl std::fmt::Debug for VaultBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultBackend")
            .field("mount_path", &self.mount_path)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

fn is_not_found(err: &ClientError) -> bool {
    matches!(err, ClientError::APIError { code: 404, .. })
}

fn map_client_error(err: ClientError) -> StoreError {
    match err {
        ClientError::APIError { code, errors } if code < 500 && code != 429 => StoreError::Backend {
            reason: format!("vault returned {code}: {}", errors.join("; ")),
        },
        other => StoreError::unavailable(other.to_string()),
    }
}

fn parse_time(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl SecretBackend for VaultBackend {
    fn kind(&self) -> &'static str {
        "vault"
    }

    async fn write(
        &self,
        name: &BundleName,
        bundle_type: BundleType,
        keys: &SecretKeys,
    ) -> StoreResult<SecretBundle> {
        let created_at = self
            .read_document(name)
            .await?
            .map_or_else(Utc::now, |doc| doc.created_at);
        let doc = VaultDocument {
            bundle_type,
            keys: keys.clone(),
            created_at,
        };

        let written = kv2::set(&self.client, &self.mount_path, name.as_str(), &doc)
            .await
            .map_err(map_client_error)?;

        Ok(SecretBundle {
            name: name.clone(),
            bundle_type,
            keys: doc.keys,
            version: written.version,
            created_at,
            updated_at: parse_time(&written.created_time),
        })
    }

    async fn read(&self, name: &BundleName) -> StoreResult<Option<SecretBundle>> {
        let Some(doc) = self.read_document(name).await? else {
            return Ok(None);
        };
        let (version, updated_at) = self
            .current_version(name)
            .await?
            .ok_or_else(|| StoreError::unavailable("metadata vanished during read"))?;

        Ok(Some(SecretBundle {
            name: name.clone(),
            bundle_type: doc.bundle_type,
            keys: doc.keys,
            version,
            created_at: doc.created_at,
            updated_at,
        }))
    }

    async fn remove(&self, name: &BundleName) -> StoreResult<bool> {
        if self.current_version(name).await?.is_none() {
            return Ok(false);
        }
        match kv2::delete_metadata(&self.client, &self.mount_path, name.as_str()).await {
            Ok(()) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(map_client_error(e)),
        }
    }

    async fn list(&self) -> StoreResult<Vec<BundleMetadata>> {
        let names = match kv2::list(&self.client, &self.mount_path, "").await {
            Ok(names) => names,
            Err(e) if is_not_found(&e) => Vec::new(),
            Err(e) => return Err(map_client_error(e)),
        };

        let mut listed = Vec::with_capacity(names.len());
        for raw in names {
            // Nested paths and foreign entries are not bundles.
            let Ok(name) = BundleName::new(raw) else {
                continue;
            };
            if let Some(bundle) = self.read(&name).await? {
                listed.push(bundle.metadata());
            }
        }
        listed.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listed)
    }
}
