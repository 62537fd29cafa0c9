//! The verification and audit reporter.
//!
//! The reporter only reads: it resolves declared references against the
//! store, asks the workload controller for readiness, and reads the audit
//! log. It never writes to any of them.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use keyturn_lifecycle::{
    AuditLog, Orchestrator, Reference, RotationRecord, Tier, Workload, WorkloadController,
    WorkloadInventory,
};
use keyturn_store::{BundleName, KeyPresence, SecretBackend, StoreClient};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{VerifyError, VerifyResult};

/// Whether a reference resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceStatus {
    /// Bundle and key both exist
    #[serde(rename = "OK")]
    Ok,
    /// The bundle does not exist
    MissingBundle,
    /// The bundle exists but lacks the key
    MissingKey,
}

impl ReferenceStatus {
    /// Returns true for [`ReferenceStatus::Ok`].
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for ReferenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "OK",
            Self::MissingBundle => "MissingBundle",
            Self::MissingKey => "MissingKey",
        })
    }
}

/// The result of resolving one reference of one workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceCheck {
    /// Workload declaring the reference
    pub workload: String,
    /// The reference
    pub reference: Reference,
    /// Resolution result
    pub status: ReferenceStatus,
}

impl fmt::Display for ReferenceCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}/{}: {}",
            self.workload, self.reference.bundle, self.reference.key, self.status
        )
    }
}

/// Readiness of a workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadHealth {
    /// Workload name
    pub workload: String,
    /// Restart tier
    pub tier: Tier,
    /// Whether the latest rollout is complete
    pub ready: bool,
    /// Controller error, if readiness could not be determined
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated verification results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Bundle the verification was limited to, if any
    pub bundle: Option<BundleName>,
    /// One entry per declared reference
    pub references: Vec<ReferenceCheck>,
    /// One entry per workload that was health-checked
    pub health: Vec<WorkloadHealth>,
    /// When verification ran
    pub checked_at: DateTime<Utc>,
}

impl VerificationReport {
    /// Returns true if every reference resolves.
    #[must_use]
    pub fn is_compliant(&self) -> bool {
        self.references.iter().all(|c| c.status.is_ok())
    }

    /// Returns true if every checked workload is ready.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.health.iter().all(|h| h.ready)
    }

    /// Returns the references that do not resolve.
    #[must_use]
    pub fn drift(&self) -> Vec<&ReferenceCheck> {
        self.references.iter().filter(|c| !c.status.is_ok()).collect()
    }

    /// Fails with every dangling reference if the report is not compliant.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::ReferenceDrift`] listing each dangling
    /// reference.
    pub fn ensure_compliant(&self) -> VerifyResult<()> {
        let dangling: Vec<String> = self.drift().iter().map(ToString::to_string).collect();
        if dangling.is_empty() {
            Ok(())
        } else {
            Err(VerifyError::ReferenceDrift { dangling })
        }
    }
}

/// Read-only view over the store, the workloads and the audit log.
#[derive(Debug)]
pub struct Reporter<B, W> {
    store: Arc<StoreClient<B>>,
    controller: Arc<W>,
    inventory: Arc<WorkloadInventory>,
    audit: Arc<AuditLog>,
}

impl<B, W> Clone for Reporter<B, W> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            controller: Arc::clone(&self.controller),
            inventory: Arc::clone(&self.inventory),
            audit: Arc::clone(&self.audit),
        }
    }
}

impl<B: SecretBackend, W: WorkloadController> Reporter<B, W> {
    /// Creates a reporter.
    #[must_use]
    pub const fn new(
        store: Arc<StoreClient<B>>,
        controller: Arc<W>,
        inventory: Arc<WorkloadInventory>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            store,
            controller,
            inventory,
            audit,
        }
    }

    /// Creates a reporter sharing an orchestrator's collaborators.
    #[must_use]
    pub fn for_orchestrator(orchestrator: &Orchestrator<B, W>) -> Self {
        Self::new(
            Arc::clone(orchestrator.store()),
            Arc::clone(orchestrator.controller()),
            Arc::clone(orchestrator.inventory()),
            Arc::clone(orchestrator.audit()),
        )
    }

    /// Resolves every declared reference.
    ///
    /// Checks are returned in workload declaration order, then reference
    /// order. Each distinct `(bundle, key)` pair is checked once, without
    /// loading any value.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Store`] if the store cannot be queried. A
    /// missing bundle is a [`ReferenceStatus::MissingBundle`] result, not an
    /// error.
    pub async fn verify_references(&self) -> VerifyResult<Vec<ReferenceCheck>> {
        self.check_references(|_| true).await
    }

    /// Resolves the references pointing at `bundle`.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Store`] if the store cannot be queried.
    pub async fn verify_bundle_references(
        &self,
        bundle: &BundleName,
    ) -> VerifyResult<Vec<ReferenceCheck>> {
        self.check_references(|r| &r.bundle == bundle).await
    }

    async fn check_references(
        &self,
        include: impl Fn(&Reference) -> bool,
    ) -> VerifyResult<Vec<ReferenceCheck>> {
        let mut presence: BTreeMap<(BundleName, String), KeyPresence> = BTreeMap::new();
        let mut checks = Vec::new();

        for workload in self.inventory.iter() {
            for reference in workload.references.iter().filter(|r| include(*r)) {
                let pair = (reference.bundle.clone(), reference.key.clone());
                let found = match presence.get(&pair) {
                    Some(found) => *found,
                    None => {
                        let found = self
                            .store
                            .contains_key(&reference.bundle, &reference.key)
                            .await?;
                        presence.insert(pair, found);
                        found
                    }
                };

                let status = match found {
                    KeyPresence::Present => ReferenceStatus::Ok,
                    KeyPresence::KeyMissing => ReferenceStatus::MissingKey,
                    KeyPresence::BundleMissing => ReferenceStatus::MissingBundle,
                };
                if !status.is_ok() {
                    warn!(workload = %workload.name, reference = %reference, status = %status, "dangling reference");
                }
                checks.push(ReferenceCheck {
                    workload: workload.name.clone(),
                    reference: reference.clone(),
                    status,
                });
            }
        }

        debug!(checked = checks.len(), distinct = presence.len(), "references verified");
        Ok(checks)
    }

    /// Reports readiness of every workload referencing `bundle`.
    ///
    /// A controller failure for one workload is reported as not ready with
    /// the error attached; it does not abort the check.
    pub async fn verify_workload_health(&self, bundle: &BundleName) -> Vec<WorkloadHealth> {
        let workloads = self.inventory.referencing(bundle);
        self.health_of(workloads).await
    }

    async fn health_of(&self, workloads: Vec<&Workload>) -> Vec<WorkloadHealth> {
        let mut health = Vec::with_capacity(workloads.len());
        for workload in workloads {
            let entry = match self.controller.is_ready(workload).await {
                Ok(ready) => WorkloadHealth {
                    workload: workload.name.clone(),
                    tier: workload.tier,
                    ready,
                    error: None,
                },
                Err(e) => {
                    warn!(workload = %workload.name, error = %e, "readiness query failed");
                    WorkloadHealth {
                        workload: workload.name.clone(),
                        tier: workload.tier,
                        ready: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            health.push(entry);
        }
        health
    }

    /// Runs reference and health checks, for one bundle or for everything.
    ///
    /// Without a bundle, every workload declaring at least one reference is
    /// health-checked.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Store`] if the store cannot be queried.
    pub async fn verify(&self, bundle: Option<&BundleName>) -> VerifyResult<VerificationReport> {
        let (references, health) = match bundle {
            Some(name) => (
                self.verify_bundle_references(name).await?,
                self.verify_workload_health(name).await,
            ),
            None => {
                let referencing: Vec<&Workload> = self
                    .inventory
                    .iter()
                    .filter(|w| !w.references.is_empty())
                    .collect();
                (self.verify_references().await?, self.health_of(referencing).await)
            }
        };

        Ok(VerificationReport {
            bundle: bundle.cloned(),
            references,
            health,
            checked_at: Utc::now(),
        })
    }

    /// Returns the change history of `bundle` in append order.
    #[must_use]
    pub fn audit_trail(&self, bundle: &BundleName) -> Vec<RotationRecord> {
        self.audit.records_for(bundle)
    }

    /// Writes the whole audit log to `out` as JSON lines, in append order.
    ///
    /// Returns the number of records written.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Lifecycle`] if `out` cannot be written.
    pub fn export_audit<O: Write>(&self, out: O) -> VerifyResult<usize> {
        Ok(self.audit.export_jsonl(out)?)
    }
}
