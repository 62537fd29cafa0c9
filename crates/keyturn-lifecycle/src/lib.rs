//! # keyturn-lifecycle
//!
//! Lifecycle orchestration for secret bundles.
//!
//! ## Features
//!
//! - **State machine**: every operation moves through
//!   `pending -> applying -> verifying -> complete | failed` and returns an
//!   [`OperationReport`]
//! - **Ordered propagation**: data-tier workloads are restarted and ready
//!   before any consumer-tier workload is restarted
//! - **Per-bundle serialization**: concurrent operations on one bundle
//!   queue, different bundles proceed in parallel
//! - **Audit trail**: every value change appends a [`RotationRecord`]
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use keyturn_lifecycle::{AuditLog, BundleSpec, Orchestrator, WorkloadController, WorkloadInventory, Workload, LifecycleResult};
//! use keyturn_store::{BundleName, MemoryBackend, SecretKeys, SecretValue, StoreClient};
//!
//! struct NoRestart;
//!
//! impl WorkloadController for NoRestart {
//!     fn kind(&self) -> &'static str { "none" }
//!     async fn restart(&self, _: &Workload) -> LifecycleResult<()> { Ok(()) }
//!     async fn is_ready(&self, _: &Workload) -> LifecycleResult<bool> { Ok(true) }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = Orchestrator::new(
//!     Arc::new(StoreClient::new(MemoryBackend::new())),
//!     Arc::new(NoRestart),
//!     Arc::new(WorkloadInventory::default()),
//!     Arc::new(AuditLog::in_memory()),
//! );
//!
//! let name = BundleName::new("db-credentials")?;
//! let keys = SecretKeys::from([("password".to_string(), SecretValue::from("v1"))]);
//! let report = orchestrator.create_all(vec![BundleSpec::new(name.clone(), keys)]).await?;
//! assert!(report.is_success());
//!
//! let rotated = SecretKeys::from([("password".to_string(), SecretValue::from("v2"))]);
//! let report = orchestrator.rotate(&name, rotated, "ops").await?;
//! assert!(report.is_success());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`types`]: operation identifiers, states and reports
//! - [`workload`]: workloads, references and the controller trait
//! - [`orchestrator`]: create / rotate / update / delete
//! - [`rollout`]: tier-ordered restart propagation
//! - [`audit`]: append-only change log
//! - [`locks`]: per-bundle serialization
//! - [`error`]: error types and results

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod error;
pub mod locks;
pub mod orchestrator;
pub mod rollout;
pub mod types;
pub mod workload;

pub use audit::{AuditLog, ChangeKind, RotationRecord};
pub use error::{LifecycleError, LifecycleResult};
pub use locks::BundleLocks;
pub use orchestrator::{CreatePolicy, Orchestrator, OrchestratorConfig};
pub use rollout::{Propagation, RolloutPolicy, propagate};
pub use types::{
    BundleOutcome, BundleSpec, BundleStatus, CreateEntry, OperationId, OperationKind,
    OperationReport, OperationState, RestartOutcome, RestartStatus,
};
pub use workload::{
    Reference, ReferenceTarget, Tier, Workload, WorkloadController, WorkloadInventory,
    WorkloadKind, wait_until_ready,
};
