//! Controller configuration.
//!
//! Loaded from a TOML file:
//! - `[store]`: which backend holds the bundles, and its retry policy
//! - `[rollout]`: how workloads are restarted and how long to wait
//! - `[[workload]]`: the declared workloads and their bundle references

use std::path::{Path, PathBuf};
use std::time::Duration;

use keyturn_lifecycle::{RolloutPolicy, Workload, WorkloadInventory};
use keyturn_store::RetryPolicy;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, CliResult};

/// File read when `--config` is not given, if it exists.
pub const DEFAULT_CONFIG_FILE: &str = "keyturn.toml";

/// Which backend holds the bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// JSON snapshot in the state directory.
    #[default]
    File,
    /// In-process only; nothing survives the command.
    Memory,
    /// Vault KV v2 (requires the `vault` feature).
    Vault,
}

/// Retry settings for transient store faults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplier applied after each failed attempt.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_ms: u64::try_from(policy.initial_delay.as_millis()).unwrap_or(u64::MAX),
            max_delay_ms: u64::try_from(policy.max_delay.as_millis()).unwrap_or(u64::MAX),
            backoff_multiplier: policy.backoff_multiplier,
        }
    }
}

impl RetryConfig {
    /// Converts to the store's retry policy.
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

/// Store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend kind.
    pub backend: BackendKind,
    /// Directory for the file store and the audit log.
    pub state_dir: PathBuf,
    /// Retry policy.
    pub retry: RetryConfig,
    /// Vault connection settings.
    #[cfg(feature = "vault")]
    pub vault: Option<keyturn_store::VaultConfig>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            state_dir: PathBuf::from(".keyturn"),
            retry: RetryConfig::default(),
            #[cfg(feature = "vault")]
            vault: None,
        }
    }
}

impl StoreConfig {
    /// Path of the audit log inside the state directory.
    #[must_use]
    pub fn audit_path(&self) -> PathBuf {
        self.state_dir.join("audit.jsonl")
    }
}

/// How workloads are restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// `kubectl rollout restart` / `kubectl rollout status`.
    #[default]
    Kubectl,
    /// Do nothing; every workload is always ready.
    None,
}

/// Rollout settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutConfig {
    /// Restart driver.
    pub driver: DriverKind,
    /// Default namespace for workloads without their own.
    pub namespace: Option<String>,
    /// How long a tier may take to become ready, in seconds.
    pub timeout_secs: u64,
    /// Interval between readiness polls, in seconds.
    pub poll_interval_secs: u64,
    /// Path to the kubectl binary.
    pub kubectl: PathBuf,
    /// Bundles `create` applies at once.
    pub create_concurrency: usize,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            driver: DriverKind::default(),
            namespace: None,
            timeout_secs: 300,
            poll_interval_secs: 2,
            kubectl: PathBuf::from("kubectl"),
            create_concurrency: 4,
        }
    }
}

impl RolloutConfig {
    /// Converts to the orchestrator's rollout policy.
    #[must_use]
    pub const fn policy(&self) -> RolloutPolicy {
        RolloutPolicy {
            tier_timeout: Duration::from_secs(self.timeout_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Store settings.
    pub store: StoreConfig,
    /// Rollout settings.
    pub rollout: RolloutConfig,
    /// Declared workloads.
    #[serde(rename = "workload")]
    pub workloads: Vec<Workload>,
}

impl Config {
    /// Loads the configuration.
    ///
    /// With an explicit path the file must exist. Without one,
    /// [`DEFAULT_CONFIG_FILE`] is read if present, otherwise defaults apply.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Config`] if the file cannot be read, parsed or
    /// validated.
    pub fn load(path: Option<&Path>) -> CliResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> CliResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!(
                "failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> CliResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| CliError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is out of range or a workload is
    /// malformed.
    pub fn validate(&self) -> CliResult<()> {
        if self.rollout.timeout_secs == 0 {
            return Err(CliError::Config("rollout.timeout_secs must be positive".to_string()));
        }
        if self.rollout.poll_interval_secs == 0 {
            return Err(CliError::Config(
                "rollout.poll_interval_secs must be positive".to_string(),
            ));
        }
        if self.rollout.poll_interval_secs > self.rollout.timeout_secs {
            return Err(CliError::Config(
                "rollout.poll_interval_secs cannot exceed rollout.timeout_secs".to_string(),
            ));
        }
        if self.rollout.create_concurrency == 0 {
            return Err(CliError::Config(
                "rollout.create_concurrency must be positive".to_string(),
            ));
        }
        if self.store.retry.max_attempts == 0 {
            return Err(CliError::Config(
                "store.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        let multiplier = self.store.retry.backoff_multiplier;
        if multiplier.is_nan() || multiplier < 1.0 {
            return Err(CliError::Config(
                "store.retry.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }
        if self.store.backend == BackendKind::Vault && !cfg!(feature = "vault") {
            return Err(CliError::Config(
                "store.backend = \"vault\" requires keyturn to be built with the `vault` feature"
                    .to_string(),
            ));
        }
        #[cfg(feature = "vault")]
        if self.store.backend == BackendKind::Vault && self.store.vault.is_none() {
            return Err(CliError::Config(
                "store.backend = \"vault\" requires a [store.vault] table".to_string(),
            ));
        }
        self.inventory()?;
        Ok(())
    }

    /// Builds the workload inventory.
    ///
    /// # Errors
    ///
    /// Returns an error if a workload is malformed or declared twice.
    pub fn inventory(&self) -> CliResult<WorkloadInventory> {
        WorkloadInventory::new(self.workloads.clone()).map_err(|e| CliError::Config(e.to_string()))
    }
}
