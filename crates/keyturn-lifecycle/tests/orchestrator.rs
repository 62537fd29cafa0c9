//! Integration tests for the lifecycle orchestrator.
//!
//! These tests verify:
//! 1. Rotation writes a new version, audits it and restarts dependents
//! 2. Data-tier workloads are ready before consumer restarts are issued
//! 3. Rollout failures leave the written version in place
//! 4. `create_all` failure policies
//! 5. Concurrent rotations of one bundle are serialized
//! 6. Delete semantics

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use keyturn_lifecycle::{
    AuditLog, BundleSpec, BundleStatus, ChangeKind, CreateEntry, CreatePolicy, LifecycleError,
    LifecycleResult, OperationKind, OperationState, Orchestrator, OrchestratorConfig,
    Reference, RestartStatus, Tier, Workload, WorkloadController, WorkloadInventory,
    WorkloadKind,
};
use keyturn_store::{BundleName, BundleType, MemoryBackend, SecretKeys, SecretValue, StoreClient};
use parking_lot::Mutex;

// ============================================================================
// Helpers
// ============================================================================

/// Records every restart and successful readiness poll as an event.
#[derive(Default)]
struct RecordingController {
    events: Mutex<Vec<String>>,
    never_ready: Mutex<HashSet<String>>,
    failing_restart: Mutex<HashSet<String>>,
}

impl RecordingController {
    fn never_ready(self, workload: &str) -> Self {
        self.never_ready.lock().insert(workload.to_string());
        self
    }

    fn failing_restart(self, workload: &str) -> Self {
        self.failing_restart.lock().insert(workload.to_string());
        self
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn position(&self, event: &str) -> usize {
        self.events()
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("event {event} not recorded"))
    }
}

impl WorkloadController for RecordingController {
    fn kind(&self) -> &'static str {
        "recording"
    }

    async fn restart(&self, workload: &Workload) -> LifecycleResult<()> {
        tokio::task::yield_now().await;
        if self.failing_restart.lock().contains(&workload.name) {
            return Err(LifecycleError::controller(&workload.name, "rollout restart rejected"));
        }
        self.events.lock().push(format!("restart:{}", workload.name));
        Ok(())
    }

    async fn is_ready(&self, workload: &Workload) -> LifecycleResult<bool> {
        tokio::task::yield_now().await;
        if self.never_ready.lock().contains(&workload.name) {
            return Ok(false);
        }
        self.events.lock().push(format!("ready:{}", workload.name));
        Ok(true)
    }
}

fn name(s: &str) -> BundleName {
    BundleName::new(s).expect("valid name")
}

fn keys(pairs: &[(&str, &str)]) -> SecretKeys {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), SecretValue::from(*v)))
        .collect()
}

/// postgres (data) and backend (consumer) both read `db-credentials`;
/// frontend reads nothing.
fn health_tracker() -> WorkloadInventory {
    WorkloadInventory::new(vec![
        Workload::new("frontend", WorkloadKind::Deployment, Tier::Consumer),
        Workload::new("backend", WorkloadKind::Deployment, Tier::Consumer)
            .with_reference(Reference::env(name("db-credentials"), "password", "DB_PASSWORD"))
            .with_reference(Reference::env(name("api-keys"), "jwt-secret", "JWT_SECRET")),
        Workload::new("postgres", WorkloadKind::StatefulSet, Tier::Data).with_reference(
            Reference::env(name("db-credentials"), "password", "POSTGRES_PASSWORD"),
        ),
    ])
    .expect("inventory")
}

fn orchestrator(
    controller: RecordingController,
    inventory: WorkloadInventory,
) -> Orchestrator<MemoryBackend, RecordingController> {
    Orchestrator::new(
        Arc::new(StoreClient::new(MemoryBackend::new())),
        Arc::new(controller),
        Arc::new(inventory),
        Arc::new(AuditLog::in_memory()),
    )
}

async fn seed(orch: &Orchestrator<MemoryBackend, RecordingController>, bundle: &str) {
    let report = orch
        .create_all(vec![BundleSpec::new(
            name(bundle),
            keys(&[("username", "tracker"), ("password", "v1")]),
        )])
        .await
        .expect("create");
    assert!(report.is_success());
}

// ============================================================================
// Rotation
// ============================================================================

#[tokio::test]
async fn db_credentials_rotation_restarts_data_tier_first() {
    let orch = orchestrator(RecordingController::default(), health_tracker());
    seed(&orch, "db-credentials").await;

    let report = orch
        .rotate(&name("db-credentials"), keys(&[("password", "v2")]), "alice")
        .await
        .expect("rotate");

    assert_eq!(report.kind, OperationKind::Rotate);
    assert_eq!(report.state, OperationState::Complete);
    assert_eq!(
        report.bundles[0].status,
        BundleStatus::Applied {
            previous_version: Some(1),
            version: 2
        }
    );

    let bundle = orch.store().get(&name("db-credentials")).await.expect("get");
    assert_eq!(bundle.version, 2);
    assert_eq!(bundle.value("password"), Some(&SecretValue::from("v2")));
    assert_eq!(bundle.value("username"), Some(&SecretValue::from("tracker")));

    let trail = orch.audit().records_for(&name("db-credentials"));
    assert_eq!(trail.len(), 1);
    assert_eq!((trail[0].old_version, trail[0].new_version), (1, 2));
    assert_eq!(trail[0].initiator, "alice");
    assert_eq!(trail[0].kind, ChangeKind::Rotate);

    let controller = orch.controller();
    assert_eq!(
        controller.events(),
        vec![
            "restart:postgres",
            "ready:postgres",
            "restart:backend",
            "ready:backend"
        ]
    );
    assert!(!controller.events().iter().any(|e| e.ends_with("frontend")));

    let restarted: Vec<(&str, Tier)> = report
        .restarts
        .iter()
        .map(|r| (r.workload.as_str(), r.tier))
        .collect();
    assert_eq!(restarted, vec![("postgres", Tier::Data), ("backend", Tier::Consumer)]);
}

#[tokio::test]
async fn every_data_workload_is_ready_before_any_consumer_restart() {
    let inventory = WorkloadInventory::new(vec![
        Workload::new("backend", WorkloadKind::Deployment, Tier::Consumer)
            .with_reference(Reference::env(name("shared"), "token", "TOKEN")),
        Workload::new("postgres", WorkloadKind::StatefulSet, Tier::Data)
            .with_reference(Reference::env(name("shared"), "token", "TOKEN")),
        Workload::new("worker", WorkloadKind::Deployment, Tier::Consumer)
            .with_reference(Reference::file(name("shared"), "token", "/run/token")),
        Workload::new("redis", WorkloadKind::StatefulSet, Tier::Data)
            .with_reference(Reference::env(name("shared"), "token", "REDIS_TOKEN")),
    ])
    .expect("inventory");
    let orch = orchestrator(RecordingController::default(), inventory);
    seed(&orch, "shared").await;

    let report = orch
        .rotate(&name("shared"), keys(&[("token", "t2")]), "ci")
        .await
        .expect("rotate");
    assert!(report.is_success());

    let c = orch.controller();
    let last_data_ready = c.position("ready:postgres").max(c.position("ready:redis"));
    let first_consumer_restart = c.position("restart:backend").min(c.position("restart:worker"));
    assert!(last_data_ready < first_consumer_restart);
}

#[tokio::test]
async fn rotate_without_dependents_completes() {
    let orch = orchestrator(RecordingController::default(), health_tracker());
    seed(&orch, "unused").await;

    let report = orch
        .rotate(&name("unused"), keys(&[("password", "v2")]), "ops")
        .await
        .expect("rotate");
    assert!(report.is_success());
    assert!(report.restarts.is_empty());
}

#[tokio::test]
async fn rotate_of_missing_bundle_fails_while_applying() {
    let orch = orchestrator(RecordingController::default(), health_tracker());

    let report = orch
        .rotate(&name("db-credentials"), keys(&[("password", "v2")]), "ops")
        .await
        .expect("rotate");

    assert_eq!(report.state, OperationState::Failed);
    assert_eq!(report.failed_stage, Some(OperationState::Applying));
    assert!(report.error.as_deref().is_some_and(|e| e.contains("db-credentials")));
    assert!(orch.audit().is_empty());
    assert!(orch.controller().events().is_empty());
}

#[tokio::test]
async fn invalid_merged_keys_are_rejected_before_write() {
    let orch = orchestrator(RecordingController::default(), health_tracker());
    seed(&orch, "db-credentials").await;

    let report = orch
        .rotate(&name("db-credentials"), keys(&[("bad key!", "x")]), "ops")
        .await
        .expect("rotate");

    assert_eq!(report.failed_stage, Some(OperationState::Applying));
    let bundle = orch.store().get(&name("db-credentials")).await.expect("get");
    assert_eq!(bundle.version, 1);
    assert!(orch.audit().is_empty());
}

// ============================================================================
// Rollout failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn data_tier_timeout_fails_without_rollback() {
    let controller = RecordingController::default().never_ready("postgres");
    let orch = orchestrator(controller, health_tracker());
    seed(&orch, "db-credentials").await;

    let report = orch
        .rotate(&name("db-credentials"), keys(&[("password", "v2")]), "ops")
        .await
        .expect("rotate");

    assert_eq!(report.state, OperationState::Failed);
    assert_eq!(report.failed_stage, Some(OperationState::Verifying));
    assert!(report.error.as_deref().is_some_and(|e| e.contains("within 300s")));

    assert_eq!(report.restarts[0].workload, "postgres");
    assert_eq!(report.restarts[0].status, RestartStatus::TimedOut);
    assert_eq!(report.restarts[1].workload, "backend");
    assert_eq!(report.restarts[1].status, RestartStatus::Skipped);
    assert!(!orch.controller().events().contains(&"restart:backend".to_string()));

    let bundle = orch.store().get(&name("db-credentials")).await.expect("get");
    assert_eq!(bundle.version, 2, "written version is kept");
    assert_eq!(orch.audit().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stuck_workload_does_not_starve_its_tier_neighbours() {
    let inventory = WorkloadInventory::new(vec![
        Workload::new("pg-a", WorkloadKind::StatefulSet, Tier::Data)
            .with_reference(Reference::env(name("db-credentials"), "password", "PASSWORD")),
        Workload::new("pg-b", WorkloadKind::StatefulSet, Tier::Data)
            .with_reference(Reference::env(name("db-credentials"), "password", "PASSWORD")),
        Workload::new("backend", WorkloadKind::Deployment, Tier::Consumer)
            .with_reference(Reference::env(name("db-credentials"), "password", "DB_PASSWORD")),
    ])
    .expect("inventory");
    let orch = orchestrator(RecordingController::default().never_ready("pg-a"), inventory);
    seed(&orch, "db-credentials").await;

    let report = orch
        .rotate(&name("db-credentials"), keys(&[("password", "v2")]), "ops")
        .await
        .expect("rotate");

    assert_eq!(report.failed_stage, Some(OperationState::Verifying));
    let restarts: Vec<(&str, &RestartStatus)> = report
        .restarts
        .iter()
        .map(|r| (r.workload.as_str(), &r.status))
        .collect();
    assert_eq!(
        restarts,
        vec![
            ("pg-a", &RestartStatus::TimedOut),
            ("pg-b", &RestartStatus::Ready),
            ("backend", &RestartStatus::Skipped),
        ]
    );
    assert!(orch.controller().events().contains(&"ready:pg-b".to_string()));
}

#[tokio::test]
async fn restart_failure_skips_later_tiers() {
    let controller = RecordingController::default().failing_restart("postgres");
    let orch = orchestrator(controller, health_tracker());
    seed(&orch, "db-credentials").await;

    let report = orch
        .rotate(&name("db-credentials"), keys(&[("password", "v2")]), "ops")
        .await
        .expect("rotate");

    assert_eq!(report.failed_stage, Some(OperationState::Verifying));
    assert!(matches!(report.restarts[0].status, RestartStatus::Failed { .. }));
    assert_eq!(report.restarts[1].status, RestartStatus::Skipped);
}

#[tokio::test(start_paused = true)]
async fn propagation_can_be_retried_alone() {
    let controller = RecordingController::default().never_ready("postgres");
    let orch = orchestrator(controller, health_tracker());
    seed(&orch, "db-credentials").await;

    let failed = orch
        .rotate(&name("db-credentials"), keys(&[("password", "v2")]), "ops")
        .await
        .expect("rotate");
    assert_eq!(failed.state, OperationState::Failed);

    orch.controller().never_ready.lock().clear();
    let retried = orch.restart(&name("db-credentials")).await.expect("restart");

    assert_eq!(retried.kind, OperationKind::Restart);
    assert!(retried.is_success());
    assert!(retried.bundles.is_empty());
    assert_eq!(retried.restarts.len(), 2);
    let bundle = orch.store().get(&name("db-credentials")).await.expect("get");
    assert_eq!(bundle.version, 2, "restart does not write");
}

// ============================================================================
// Update
// ============================================================================

#[tokio::test]
async fn update_without_propagation_skips_restarts_but_is_audited() {
    let orch = orchestrator(RecordingController::default(), health_tracker());
    seed(&orch, "db-credentials").await;

    let report = orch
        .update(&name("db-credentials"), keys(&[("host", "db.internal")]), "bob", false)
        .await
        .expect("update");

    assert!(report.is_success());
    assert!(report.restarts.is_empty());
    assert!(orch.controller().events().is_empty());

    let trail = orch.audit().records_for(&name("db-credentials"));
    assert_eq!(trail[0].kind, ChangeKind::Update);
    let bundle = orch.store().get(&name("db-credentials")).await.expect("get");
    assert_eq!(bundle.key_names().collect::<Vec<_>>(), vec!["host", "password", "username"]);
}

#[tokio::test]
async fn update_with_propagation_restarts_dependents() {
    let orch = orchestrator(RecordingController::default(), health_tracker());
    seed(&orch, "db-credentials").await;

    let report = orch
        .update(&name("db-credentials"), keys(&[("password", "v9")]), "bob", true)
        .await
        .expect("update");

    assert!(report.is_success());
    assert_eq!(report.restarts.len(), 2);
}

// ============================================================================
// Create
// ============================================================================

fn three_specs() -> Vec<BundleSpec> {
    vec![
        BundleSpec::new(name("spec1"), keys(&[("a", "1")])),
        BundleSpec::new(name("spec2"), keys(&[("not-the-docker-key", "x")]))
            .with_type(BundleType::DockerConfigJson),
        BundleSpec::new(name("spec3"), keys(&[("c", "3")])),
    ]
}

#[tokio::test]
async fn create_all_attempts_every_spec() {
    let orch = orchestrator(RecordingController::default(), WorkloadInventory::default());

    let report = orch.create_all(three_specs()).await.expect("create");

    assert_eq!(report.state, OperationState::Failed);
    assert_eq!(report.failed_stage, Some(OperationState::Applying));
    assert_eq!(report.succeeded(), vec!["spec1", "spec3"]);
    assert_eq!(report.failed(), vec!["spec2"]);
    assert!(report.skipped().is_empty());
    assert!(orch.store().get(&name("spec3")).await.is_ok());
}

#[tokio::test]
async fn create_all_can_halt_on_first_failure() {
    let orch = orchestrator(RecordingController::default(), WorkloadInventory::default())
        .with_config(OrchestratorConfig {
            create_policy: CreatePolicy::HaltOnFirstFailure,
            ..OrchestratorConfig::default()
        });

    let report = orch.create_all(three_specs()).await.expect("create");

    assert_eq!(report.succeeded(), vec!["spec1"]);
    assert_eq!(report.failed(), vec!["spec2"]);
    assert_eq!(report.skipped(), vec!["spec3"]);
    assert!(orch.store().get(&name("spec3")).await.is_err());
}

#[tokio::test]
async fn create_all_preserves_input_order() {
    let orch = orchestrator(RecordingController::default(), WorkloadInventory::default());
    let specs: Vec<BundleSpec> = (0..10)
        .map(|i| BundleSpec::new(name(&format!("bundle-{i}")), keys(&[("k", "v")])))
        .collect();

    let report = orch.create_all(specs).await.expect("create");

    assert!(report.is_success());
    let names: Vec<String> = report.bundles.iter().map(|o| o.bundle.clone()).collect();
    let expected: Vec<String> = (0..10).map(|i| format!("bundle-{i}")).collect();
    assert_eq!(names, expected);
}

#[tokio::test]
async fn create_refuses_an_existing_bundle() {
    let orch = orchestrator(RecordingController::default(), WorkloadInventory::default());
    seed(&orch, "db-credentials").await;

    let report = orch
        .create_all(vec![BundleSpec::new(name("db-credentials"), keys(&[("password", "x")]))])
        .await
        .expect("create");

    assert_eq!(report.state, OperationState::Failed);
    assert_eq!(report.failed_stage, Some(OperationState::Applying));
    assert!(matches!(
        &report.bundles[0].status,
        BundleStatus::Failed { error } if error.contains("already exists")
    ));

    let stored = orch.store().get(&name("db-credentials")).await.expect("still stored");
    assert_eq!(stored.version, 1);
    assert_eq!(stored.value("password").map(SecretValue::as_bytes), Some(&b"v1"[..]));
    assert!(orch.audit().records().is_empty());
    assert!(orch.controller().events().is_empty());
}

#[tokio::test]
async fn create_reports_rejected_entries_in_order() {
    let orch = orchestrator(RecordingController::default(), WorkloadInventory::default());
    let entries = vec![
        CreateEntry::from(BundleSpec::new(name("one"), keys(&[("a", "1")]))),
        CreateEntry::rejected("Bad_Name", "invalid bundle name"),
        CreateEntry::from(BundleSpec::new(name("three"), keys(&[("c", "3")]))),
    ];

    let report = orch.create_all(entries).await.expect("create");

    assert_eq!(report.state, OperationState::Failed);
    assert_eq!(report.succeeded(), vec!["one", "three"]);
    assert_eq!(report.failed(), vec!["Bad_Name"]);
    assert_eq!(report.bundles[1].bundle, "Bad_Name");
    assert!(orch.store().get(&name("three")).await.is_ok());
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn concurrent_rotations_produce_gap_free_versions() {
    let orch = orchestrator(RecordingController::default(), health_tracker());
    seed(&orch, "db-credentials").await;
    let bundle = name("db-credentials");

    let rotations = (0..10).map(|i| {
        let value = format!("v{}", i + 2);
        let orch = &orch;
        let bundle = &bundle;
        async move {
            orch.rotate(bundle, keys(&[("password", value.as_str())]), "load-test")
                .await
                .expect("rotate")
        }
    });
    let reports = join_all(rotations).await;
    assert!(reports.iter().all(|r| r.is_success()));

    let trail = orch.audit().records_for(&bundle);
    let mut pairs: Vec<(u64, u64)> = trail.iter().map(|r| (r.old_version, r.new_version)).collect();
    pairs.sort_unstable();
    let expected: Vec<(u64, u64)> = (1..=10).map(|v| (v, v + 1)).collect();
    assert_eq!(pairs, expected);

    let current = orch.store().get(&bundle).await.expect("get");
    assert_eq!(current.version, 11);
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn delete_referenced_bundle_warns_but_deletes() {
    let orch = orchestrator(RecordingController::default(), health_tracker());
    seed(&orch, "db-credentials").await;

    let report = orch
        .delete(&[name("db-credentials"), name("never-existed")])
        .await
        .expect("delete");

    assert!(report.is_success());
    assert_eq!(report.succeeded().len(), 2);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].starts_with("still_referenced"));
    assert!(report.warnings[0].contains("backend"));
    assert!(report.warnings[0].contains("postgres"));
    assert!(orch.store().get(&name("db-credentials")).await.is_err());
}

#[tokio::test]
async fn delete_twice_is_idempotent() {
    let orch = orchestrator(RecordingController::default(), WorkloadInventory::default());
    seed(&orch, "tmp").await;

    assert!(orch.delete(&[name("tmp")]).await.expect("delete").is_success());
    assert!(orch.delete(&[name("tmp")]).await.expect("delete").is_success());
}
