//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;

use chrono::{DateTime, SecondsFormat, Utc};
use keyturn_lifecycle::{BundleStatus, OperationReport, RestartStatus, RotationRecord};
use keyturn_store::{BundleMetadata, BundleName, BundleType, SecretBundle};
use keyturn_verify::VerificationReport;
use serde::Serialize;

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Get the current format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    /// Check if JSON format is selected.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => {
                value.write_table(writer)?;
            }
        }
        Ok(())
    }

    /// Write a serializable value to a string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TableDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

fn timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Bundle metadata for listing.
#[derive(Debug, Clone, Serialize)]
pub struct BundleList {
    /// Bundles, sorted by name.
    pub bundles: Vec<BundleMetadata>,
}

impl TableDisplay for BundleList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.bundles.is_empty() {
            writeln!(writer, "No bundles")?;
            return Ok(());
        }

        writeln!(
            writer,
            "{:<32}  {:<16}  {:>7}  {:<20}",
            "NAME", "TYPE", "VERSION", "UPDATED"
        )?;
        writeln!(writer, "{}", "─".repeat(81))?;

        for bundle in &self.bundles {
            writeln!(
                writer,
                "{:<32}  {:<16}  {:>7}  {:<20}",
                truncate(bundle.name.as_str(), 32),
                bundle.bundle_type,
                bundle.version,
                timestamp(&bundle.updated_at)
            )?;
        }

        writeln!(writer)?;
        writeln!(writer, "Total: {} bundle(s)", self.bundles.len())?;
        Ok(())
    }
}

/// Name and size of one key. Values are never shown.
#[derive(Debug, Clone, Serialize)]
pub struct KeyInfo {
    /// Key name.
    pub name: String,
    /// Value length in bytes.
    pub size: usize,
}

/// A bundle without its values.
#[derive(Debug, Clone, Serialize)]
pub struct BundleDetail {
    /// Bundle name.
    pub name: BundleName,
    /// Bundle type.
    #[serde(rename = "type")]
    pub bundle_type: BundleType,
    /// Current version.
    pub version: u64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the last write.
    pub updated_at: DateTime<Utc>,
    /// Keys in name order.
    pub keys: Vec<KeyInfo>,
}

impl From<&SecretBundle> for BundleDetail {
    fn from(bundle: &SecretBundle) -> Self {
        Self {
            name: bundle.name.clone(),
            bundle_type: bundle.bundle_type,
            version: bundle.version,
            created_at: bundle.created_at,
            updated_at: bundle.updated_at,
            keys: bundle
                .keys
                .iter()
                .map(|(name, value)| KeyInfo {
                    name: name.clone(),
                    size: value.len(),
                })
                .collect(),
        }
    }
}

impl TableDisplay for BundleDetail {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Bundle: {}", self.name)?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Type:       {}", self.bundle_type)?;
        writeln!(writer, "Version:    {}", self.version)?;
        writeln!(writer, "Created:    {}", timestamp(&self.created_at))?;
        writeln!(writer, "Updated:    {}", timestamp(&self.updated_at))?;
        writeln!(writer)?;

        if self.keys.is_empty() {
            writeln!(writer, "Keys: None")?;
        } else {
            writeln!(writer, "Keys ({}):", self.keys.len())?;
            for key in &self.keys {
                writeln!(writer, "  {:<32}  {} bytes", key.name, key.size)?;
            }
        }
        Ok(())
    }
}

/// One decoded value.
///
/// Tables print the raw bytes; JSON carries UTF-8 text or, for binary
/// values, base64.
#[derive(Clone, Serialize)]
pub struct DecodedValue {
    /// Bundle name.
    pub bundle: BundleName,
    /// Key name.
    pub key: String,
    /// `utf8` or `base64`.
    pub encoding: &'static str,
    /// The value in `encoding`.
    pub value: String,
    #[serde(skip)]
    raw: Vec<u8>,
}

impl DecodedValue {
    /// Wraps a value read from `bundle`.
    #[must_use]
    pub fn new(bundle: BundleName, key: impl Into<String>, raw: &[u8]) -> Self {
        let (encoding, value) = match std::str::from_utf8(raw) {
            Ok(text) => ("utf8", text.to_string()),
            Err(_) => ("base64", keyturn_store::SecretValue::new(raw.to_vec()).to_base64()),
        };
        Self {
            bundle,
            key: key.into(),
            encoding,
            value,
            raw: raw.to_vec(),
        }
    }
}

impl TableDisplay for DecodedValue {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writer.write_all(&self.raw)?;
        if !self.raw.ends_with(b"\n") {
            writeln!(writer)?;
        }
        Ok(())
    }
}

fn bundle_status(status: &BundleStatus) -> String {
    match status {
        BundleStatus::Applied {
            previous_version: Some(prev),
            version,
        } => format!("applied v{prev} -> v{version}"),
        BundleStatus::Applied {
            previous_version: None,
            version,
        } => format!("applied v{version}"),
        BundleStatus::Deleted => "deleted".to_string(),
        BundleStatus::Failed { error } => format!("FAILED: {error}"),
        BundleStatus::Skipped => "skipped".to_string(),
    }
}

fn restart_status(status: &RestartStatus) -> String {
    match status {
        RestartStatus::Ready => "ready".to_string(),
        RestartStatus::TimedOut => "TIMED OUT".to_string(),
        RestartStatus::Failed { error } => format!("FAILED: {error}"),
        RestartStatus::Skipped => "skipped".to_string(),
    }
}

impl TableDisplay for OperationReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Operation: {} {}", self.kind, self.id)?;
        writeln!(writer, "══════════════════════════════════════════════════")?;
        match self.failed_stage {
            Some(stage) => writeln!(writer, "State:      {} (while {stage})", self.state)?,
            None => writeln!(writer, "State:      {}", self.state)?,
        }
        if let Some(error) = &self.error {
            writeln!(writer, "Error:      {error}")?;
        }
        writeln!(writer)?;

        if !self.bundles.is_empty() {
            writeln!(writer, "Bundles ({}):", self.bundles.len())?;
            for outcome in &self.bundles {
                writeln!(
                    writer,
                    "  {:<32}  {}",
                    outcome.bundle,
                    bundle_status(&outcome.status)
                )?;
            }
        }

        if !self.restarts.is_empty() {
            writeln!(writer)?;
            writeln!(writer, "Restarts ({}):", self.restarts.len())?;
            for outcome in &self.restarts {
                writeln!(
                    writer,
                    "  [{}] {:<24}  {}",
                    outcome.tier,
                    outcome.workload,
                    restart_status(&outcome.status)
                )?;
            }
        }

        for warning in &self.warnings {
            writeln!(writer)?;
            writeln!(writer, "warning: {warning}")?;
        }
        Ok(())
    }
}

impl TableDisplay for VerificationReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        match &self.bundle {
            Some(bundle) => writeln!(writer, "Verification: {bundle}")?,
            None => writeln!(writer, "Verification: all bundles")?,
        }
        writeln!(writer, "══════════════════════════════════════════════════")?;

        if self.references.is_empty() {
            writeln!(writer, "References: None declared")?;
        } else {
            writeln!(
                writer,
                "{:<24}  {:<40}  {:<13}",
                "WORKLOAD", "REFERENCE", "STATUS"
            )?;
            writeln!(writer, "{}", "─".repeat(81))?;
            for check in &self.references {
                let reference = format!("{}/{}", check.reference.bundle, check.reference.key);
                writeln!(
                    writer,
                    "{:<24}  {:<40}  {:<13}",
                    truncate(&check.workload, 24),
                    truncate(&reference, 40),
                    check.status
                )?;
            }
        }

        if !self.health.is_empty() {
            writeln!(writer)?;
            writeln!(writer, "Workload health:")?;
            for health in &self.health {
                let state = match (&health.error, health.ready) {
                    (Some(error), _) => format!("unknown ({error})"),
                    (None, true) => "ready".to_string(),
                    (None, false) => "not ready".to_string(),
                };
                writeln!(writer, "  [{}] {:<24}  {state}", health.tier, health.workload)?;
            }
        }

        writeln!(writer)?;
        let drift = self.drift().len();
        if drift == 0 {
            writeln!(writer, "✓ All {} reference(s) resolve", self.references.len())?;
        } else {
            writeln!(writer, "✗ {drift} dangling reference(s)")?;
        }
        Ok(())
    }
}

/// Change history of one bundle.
#[derive(Debug, Clone, Serialize)]
pub struct AuditTrail {
    /// Bundle name.
    pub bundle: BundleName,
    /// Records, in append order.
    pub records: Vec<RotationRecord>,
}

impl TableDisplay for AuditTrail {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.records.is_empty() {
            writeln!(writer, "No recorded changes for {}", self.bundle)?;
            return Ok(());
        }

        writeln!(
            writer,
            "{:<20}  {:<6}  {:>7}  {:>7}  {:<16}",
            "TIMESTAMP", "KIND", "FROM", "TO", "INITIATOR"
        )?;
        writeln!(writer, "{}", "─".repeat(64))?;
        for record in &self.records {
            writeln!(
                writer,
                "{:<20}  {:<6}  {:>7}  {:>7}  {:<16}",
                timestamp(&record.timestamp),
                record.kind,
                record.old_version,
                record.new_version,
                truncate(&record.initiator, 16)
            )?;
        }

        writeln!(writer)?;
        writeln!(writer, "Total: {} change(s)", self.records.len())?;
        Ok(())
    }
}

/// Simple message output.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    /// Message text.
    pub message: String,
    /// Whether this is a success message.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub success: bool,
}

impl Message {
    /// Create a success message.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: true,
        }
    }

    /// Create an informational message.
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: false,
        }
    }
}

impl TableDisplay for Message {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.success {
            writeln!(writer, "✓ {}", self.message)?;
        } else {
            writeln!(writer, "{}", self.message)?;
        }
        Ok(())
    }
}

/// Truncate a string to a maximum number of characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len > 3 {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    } else {
        s.chars().take(max_len).collect()
    }
}
