//! The lifecycle orchestrator.
//!
//! Every operation walks the same state machine
//! (`pending -> applying -> verifying -> complete | failed`) and returns an
//! [`OperationReport`]. Store and rollout failures end up in the report; an
//! `Err` is only returned when the state machine itself is violated.
//!
//! A written bundle version is never rolled back. If restart propagation
//! fails, the operation is `failed` at `verifying` and only the propagation
//! phase may be retried (see [`Orchestrator::restart`]).

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use keyturn_store::{BundleName, SecretBackend, SecretKeys, StoreClient};
use tracing::{error, info, warn};

use crate::audit::{AuditLog, ChangeKind, RotationRecord};
use crate::error::{LifecycleError, LifecycleResult};
use crate::locks::BundleLocks;
use crate::rollout::{RolloutPolicy, propagate};
use crate::types::{
    BundleSpec, BundleStatus, CreateEntry, OperationKind, OperationReport, OperationState,
};
use crate::workload::{WorkloadController, WorkloadInventory};

/// How `create_all` reacts to a failing spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreatePolicy {
    /// Attempt every spec and report each outcome
    #[default]
    AttemptAll,
    /// Stop at the first failure; later specs are skipped
    HaltOnFirstFailure,
}

/// Orchestrator tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Restart timing
    pub rollout: RolloutPolicy,
    /// Maximum specs applied at once by `create_all`
    pub create_concurrency: usize,
    /// Failure handling for `create_all`
    pub create_policy: CreatePolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            rollout: RolloutPolicy::default(),
            create_concurrency: 4,
            create_policy: CreatePolicy::default(),
        }
    }
}

/// Creates, rotates, updates and deletes bundles.
#[derive(Debug)]
pub struct Orchestrator<B, W> {
    store: Arc<StoreClient<B>>,
    controller: Arc<W>,
    inventory: Arc<WorkloadInventory>,
    audit: Arc<AuditLog>,
    locks: BundleLocks,
    config: OrchestratorConfig,
}

impl<B: SecretBackend, W: WorkloadController> Orchestrator<B, W> {
    /// Creates an orchestrator with the default configuration.
    #[must_use]
    pub fn new(
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
            locks: BundleLocks::new(),
            config: OrchestratorConfig::default(),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub const fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the store client.
    #[must_use]
    pub fn store(&self) -> &Arc<StoreClient<B>> {
        &self.store
    }

    /// Returns the workload controller.
    #[must_use]
    pub fn controller(&self) -> &Arc<W> {
        &self.controller
    }

    /// Returns the workload inventory.
    #[must_use]
    pub fn inventory(&self) -> &Arc<WorkloadInventory> {
        &self.inventory
    }

    /// Returns the audit log.
    #[must_use]
    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Writes every new bundle. Outcomes are reported in input order.
    ///
    /// Accepts [`BundleSpec`]s or [`CreateEntry`]s; rejected entries are
    /// reported as failed without touching the store. A bundle that already
    /// exists is left untouched and reported as failed, since changes to an
    /// existing bundle go through [`rotate`](Self::rotate) or
    /// [`update`](Self::update).
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] only on an internal
    /// state machine violation.
    pub async fn create_all<I>(&self, entries: I) -> LifecycleResult<OperationReport>
    where
        I: IntoIterator,
        I::Item: Into<CreateEntry>,
    {
        let entries: Vec<CreateEntry> = entries.into_iter().map(Into::into).collect();
        let mut report = OperationReport::new(OperationKind::Create);
        report.transition(OperationState::Applying)?;
        info!(operation = %report.id, count = entries.len(), policy = ?self.config.create_policy, "creating bundles");

        let attempted: Vec<BundleName> = entries
            .iter()
            .filter_map(|entry| match entry {
                CreateEntry::Spec(spec) => Some(spec.name.clone()),
                CreateEntry::Rejected { .. } => None,
            })
            .collect();

        match self.config.create_policy {
            CreatePolicy::AttemptAll => {
                let outcomes: Vec<(String, BundleStatus)> = stream::iter(entries)
                    .map(|entry| self.apply_entry(entry))
                    .buffered(self.config.create_concurrency.max(1))
                    .collect()
                    .await;
                for (name, status) in outcomes {
                    report.record_bundle(name, status);
                }
            }
            CreatePolicy::HaltOnFirstFailure => {
                let mut halted = false;
                for entry in entries {
                    if halted {
                        report.record_bundle(entry.name(), BundleStatus::Skipped);
                        continue;
                    }
                    let (name, status) = self.apply_entry(entry).await;
                    halted = matches!(status, BundleStatus::Failed { .. });
                    report.record_bundle(name, status);
                }
            }
        }

        let failed = report.failed().len();
        if failed > 0 {
            let err = LifecycleError::Incomplete {
                operation: OperationKind::Create,
                failed,
                total: report.bundles.len(),
            };
            error!(operation = %report.id, failed, "create finished with failures");
            report.fail(&err);
            return Ok(report);
        }

        report.transition(OperationState::Verifying)?;
        for name in &attempted {
            if let Err(e) = self.store.get(name).await {
                let err = LifecycleError::store(OperationKind::Create, name, e);
                error!(operation = %report.id, error = %err, "created bundle not readable");
                report.fail(&err);
                return Ok(report);
            }
        }
        report.transition(OperationState::Complete)?;
        Ok(report)
    }

    async fn apply_entry(&self, entry: CreateEntry) -> (String, BundleStatus) {
        match entry {
            CreateEntry::Spec(spec) => {
                let status = self.apply_spec(&spec).await;
                (spec.name.into(), status)
            }
            CreateEntry::Rejected { name, error } => {
                warn!(bundle = %name, error = %error, "bundle entry rejected");
                (name, BundleStatus::Failed { error })
            }
        }
    }

    async fn apply_spec(&self, spec: &BundleSpec) -> BundleStatus {
        let _guard = self.locks.acquire(&spec.name).await;

        let existing = match self.store.get(&spec.name).await {
            Ok(bundle) => Err(LifecycleError::AlreadyExists {
                bundle: spec.name.to_string(),
                version: bundle.version,
            }),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(LifecycleError::store(OperationKind::Create, &spec.name, e)),
        };
        if let Err(err) = existing {
            warn!(bundle = %spec.name, error = %err, "bundle create refused");
            return BundleStatus::Failed {
                error: err.to_string(),
            };
        }

        match self.store.put(&spec.name, spec.bundle_type, &spec.keys).await {
            Ok(bundle) => BundleStatus::Applied {
                previous_version: None,
                version: bundle.version,
            },
            Err(e) => {
                warn!(bundle = %spec.name, error = %e, "bundle create failed");
                BundleStatus::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Replaces keys of an existing bundle and restarts every referencing
    /// workload in tier order.
    ///
    /// `new_keys` are merged over the current keys; keys not mentioned keep
    /// their value.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] only on an internal
    /// state machine violation.
    pub async fn rotate(
        &self,
        name: &BundleName,
        new_keys: SecretKeys,
        initiator: &str,
    ) -> LifecycleResult<OperationReport> {
        self.change(OperationKind::Rotate, name, new_keys, initiator, true)
            .await
    }

    /// Replaces keys of an existing bundle. Workloads are restarted only
    /// when `propagate` is set.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] only on an internal
    /// state machine violation.
    pub async fn update(
        &self,
        name: &BundleName,
        keys: SecretKeys,
        initiator: &str,
        propagate: bool,
    ) -> LifecycleResult<OperationReport> {
        self.change(OperationKind::Update, name, keys, initiator, propagate)
            .await
    }

    async fn change(
        &self,
        kind: OperationKind,
        name: &BundleName,
        keys: SecretKeys,
        initiator: &str,
        restart: bool,
    ) -> LifecycleResult<OperationReport> {
        let mut report = OperationReport::new(kind);
        let _guard = self.locks.acquire(name).await;
        report.transition(OperationState::Applying)?;

        let current = match self.store.get(name).await {
            Ok(bundle) => bundle,
            Err(e) => {
                let err = LifecycleError::store(kind, name, e);
                error!(operation = %report.id, bundle = %name, error = %err, "cannot read current bundle");
                report.record_bundle(name.clone(), BundleStatus::Failed { error: err.to_string() });
                report.fail(&err);
                return Ok(report);
            }
        };

        let mut merged = current.keys.clone();
        merged.extend(keys);
        let written = match self.store.put(name, current.bundle_type, &merged).await {
            Ok(bundle) => bundle,
            Err(e) => {
                let err = LifecycleError::store(kind, name, e);
                error!(operation = %report.id, bundle = %name, error = %err, "write failed");
                report.record_bundle(name.clone(), BundleStatus::Failed { error: err.to_string() });
                report.fail(&err);
                return Ok(report);
            }
        };
        report.record_bundle(
            name.clone(),
            BundleStatus::Applied {
                previous_version: Some(current.version),
                version: written.version,
            },
        );

        let change_kind = if kind == OperationKind::Rotate {
            ChangeKind::Rotate
        } else {
            ChangeKind::Update
        };
        let record = RotationRecord::new(
            name.clone(),
            current.version,
            written.version,
            initiator,
            change_kind,
        );
        if let Err(e) = self.audit.append(record) {
            error!(operation = %report.id, bundle = %name, version = written.version, error = %e, "audit append failed after write");
            report.fail(&e);
            return Ok(report);
        }
        info!(
            operation = %report.id,
            bundle = %name,
            old_version = current.version,
            new_version = written.version,
            initiator,
            kind = %kind,
            "bundle value changed"
        );

        report.transition(OperationState::Verifying)?;
        if restart {
            self.propagate_into(&mut report, name).await;
            if report.state.is_terminal() {
                return Ok(report);
            }
        }
        report.transition(OperationState::Complete)?;
        Ok(report)
    }

    /// Re-runs restart propagation for an existing bundle without writing.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] only on an internal
    /// state machine violation.
    pub async fn restart(&self, name: &BundleName) -> LifecycleResult<OperationReport> {
        let mut report = OperationReport::new(OperationKind::Restart);
        let _guard = self.locks.acquire(name).await;
        report.transition(OperationState::Applying)?;

        if let Err(e) = self.store.get(name).await {
            let err = LifecycleError::store(OperationKind::Restart, name, e);
            report.fail(&err);
            return Ok(report);
        }

        report.transition(OperationState::Verifying)?;
        self.propagate_into(&mut report, name).await;
        if report.state.is_terminal() {
            return Ok(report);
        }
        report.transition(OperationState::Complete)?;
        Ok(report)
    }

    async fn propagate_into(&self, report: &mut OperationReport, name: &BundleName) {
        let propagation = propagate(
            self.controller.as_ref(),
            &self.inventory,
            name,
            self.config.rollout,
        )
        .await;
        report.restarts = propagation.outcomes;
        if let Some(err) = propagation.failure {
            error!(operation = %report.id, bundle = %name, error = %err, "restart propagation failed; bundle change is kept");
            report.fail(&err);
        }
    }

    /// Removes bundles. Absent bundles count as deleted.
    ///
    /// Bundles still referenced by a declared workload are deleted anyway and
    /// reported as `still_referenced` warnings.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] only on an internal
    /// state machine violation.
    pub async fn delete(&self, names: &[BundleName]) -> LifecycleResult<OperationReport> {
        let mut report = OperationReport::new(OperationKind::Delete);
        report.transition(OperationState::Applying)?;
        let mut first_error = None;

        for name in names {
            let _guard = self.locks.acquire(name).await;

            let referencing: Vec<String> = self
                .inventory
                .referencing(name)
                .iter()
                .map(|w| w.name.clone())
                .collect();
            if !referencing.is_empty() {
                warn!(bundle = %name, workloads = ?referencing, "deleting bundle that is still referenced");
                report.warn(format!(
                    "still_referenced: bundle '{name}' is referenced by {}",
                    referencing.join(", ")
                ));
            }

            match self.store.delete(name).await {
                Ok(()) => report.record_bundle(name.clone(), BundleStatus::Deleted),
                Err(e) => {
                    let err = LifecycleError::store(OperationKind::Delete, name, e);
                    warn!(bundle = %name, error = %err, "delete failed");
                    report.record_bundle(name.clone(), BundleStatus::Failed { error: err.to_string() });
                    first_error.get_or_insert(err);
                }
            }
        }

        if let Some(err) = first_error {
            report.fail(&err);
            return Ok(report);
        }
        report.transition(OperationState::Verifying)?;
        report.transition(OperationState::Complete)?;
        Ok(report)
    }
}
