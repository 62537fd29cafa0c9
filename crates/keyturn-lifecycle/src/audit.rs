//! Append-only audit trail of value changes.
//!
//! Every rotate and update appends one [`RotationRecord`]. The log can be
//! held in memory or backed by a JSON-lines file that is appended to before
//! the in-memory copy is updated, so a record visible to readers is always
//! durable. Records are never modified or removed.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use keyturn_store::BundleName;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

use crate::error::{LifecycleError, LifecycleResult};

/// Which operation changed the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Values replaced and propagated
    Rotate,
    /// Values replaced, propagation optional
    Update,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rotate => "rotate",
            Self::Update => "update",
        })
    }
}

/// One audited change of a bundle's values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationRecord {
    /// Record identifier
    pub id: Uuid,
    /// Bundle that changed
    pub bundle: BundleName,
    /// Version before the change
    pub old_version: u64,
    /// Version after the change
    pub new_version: u64,
    /// When the change was written
    pub timestamp: DateTime<Utc>,
    /// Who requested the change
    pub initiator: String,
    /// Kind of change
    pub kind: ChangeKind,
}

impl RotationRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(
        bundle: BundleName,
        old_version: u64,
        new_version: u64,
        initiator: impl Into<String>,
        kind: ChangeKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            bundle,
            old_version,
            new_version,
            timestamp: Utc::now(),
            initiator: initiator.into(),
            kind,
        }
    }
}

/// The audit log.
pub struct AuditLog {
    records: RwLock<Vec<RotationRecord>>,
    sink: Option<PathBuf>,
}

impl AuditLog {
    /// Creates an empty log that is not persisted.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            sink: None,
        }
    }

    /// Opens (or creates) a JSON-lines log at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Audit`] if the file cannot be read or a line
    /// is not a valid record.
    pub fn open(path: impl AsRef<Path>) -> LifecycleResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut records = Vec::new();
        if path.exists() {
            let reader = BufReader::new(fs::File::open(path)?);
            for (index, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let record: RotationRecord = serde_json::from_str(&line).map_err(|e| {
                    LifecycleError::Audit(format!(
                        "{}:{}: malformed record: {e}",
                        path.display(),
                        index + 1
                    ))
                })?;
                records.push(record);
            }
        }

        debug!(path = %path.display(), count = records.len(), "opened audit log");

        Ok(Self {
            records: RwLock::new(records),
            sink: Some(path.to_path_buf()),
        })
    }

    /// Appends a record.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Audit`] if the backing file cannot be
    /// written; the record is then not added.
    pub fn append(&self, record: RotationRecord) -> LifecycleResult<()> {
        let mut records = self
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(path) = &self.sink {
            let mut line = serde_json::to_vec(&record)?;
            line.push(b'\n');
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            file.write_all(&line)?;
            file.sync_data()?;
        }

        debug!(
            bundle = %record.bundle,
            old_version = record.old_version,
            new_version = record.new_version,
            kind = %record.kind,
            "audit record appended"
        );
        records.push(record);
        Ok(())
    }

    /// Returns the records for `bundle` in append order.
    #[must_use]
    pub fn records_for(&self, bundle: &BundleName) -> Vec<RotationRecord> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records
            .iter()
            .filter(|r| &r.bundle == bundle)
            .cloned()
            .collect()
    }

    /// Returns every record in append order.
    ///
    /// Timestamps come from the wall clock and are not used for ordering.
    #[must_use]
    pub fn records(&self) -> Vec<RotationRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Writes every record to `out` as JSON lines, in append order.
    ///
    /// Returns the number of records written.
    ///
    /// # Errors
    ///
    /// Returns an error if `out` cannot be written.
    pub fn export_jsonl<W: Write>(&self, mut out: W) -> LifecycleResult<usize> {
        let records = self.records();
        for record in &records {
            serde_json::to_writer(&mut out, record)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(records.len())
    }

    /// Returns the total number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.sink.as_deref()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLog")
            .field("records", &self.len())
            .field("sink", &self.sink)
            .finish()
    }
}
