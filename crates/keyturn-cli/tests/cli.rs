//! End-to-end tests of the `keyturn` binary against a file store.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

const CONFIG: &str = r#"
[rollout]
driver = "none"
timeout_secs = 5
poll_interval_secs = 1

[[workload]]
name = "postgres"
kind = "statefulset"
tier = "data"

[[workload.reference]]
bundle = "db-credentials"
key = "password"
env = "POSTGRES_PASSWORD"

[[workload]]
name = "backend"
kind = "deployment"
tier = "consumer"

[[workload.reference]]
bundle = "db-credentials"
key = "password"
env = "DB_PASSWORD"

[[workload.reference]]
bundle = "api-keys"
key = "jwt-secret"
file = "/etc/secrets/jwt"
"#;

const MANIFEST: &str = r#"
[[bundle]]
name = "db-credentials"
type = "basic-auth"
keys = { username = "app", password = "s3cret" }
"#;

struct Env {
    dir: TempDir,
}

impl Env {
    fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("keyturn.toml"), CONFIG).expect("config");
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, content).expect("write");
        path
    }

    fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("keyturn");
        cmd.current_dir(self.dir.path())
            .env_remove("KEYTURN_CONFIG")
            .env_remove("KEYTURN_LOG")
            .env("KEYTURN_STATE_DIR", self.path("state"))
            .env("KEYTURN_INITIATOR", "ci")
            .arg("--config")
            .arg(self.path("keyturn.toml"));
        cmd
    }

    fn create(&self, manifest: &Path) {
        self.cmd()
            .arg("create")
            .arg("--manifest")
            .arg(manifest)
            .assert()
            .success();
    }
}

// ============================================================================
// Bundle commands
// ============================================================================

#[test]
fn create_then_list_and_describe() {
    let env = Env::new();
    let manifest = env.write("bundles.toml", MANIFEST);
    env.create(&manifest);

    env.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("db-credentials"))
        .stdout(predicate::str::contains("basic-auth"));

    env.cmd()
        .args(["describe", "db-credentials"])
        .assert()
        .success()
        .stdout(predicate::str::contains("password"))
        .stdout(predicate::str::contains("6 bytes"))
        .stdout(predicate::str::contains("s3cret").not());
}

#[test]
fn decode_prints_the_raw_value() {
    let env = Env::new();
    let manifest = env.write("bundles.toml", MANIFEST);
    env.create(&manifest);

    env.cmd()
        .args(["decode", "db-credentials", "password"])
        .assert()
        .success()
        .stdout("s3cret\n");

    env.cmd()
        .args(["decode", "db-credentials", "token"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("has no key 'token'"));
}

#[test]
fn describe_missing_bundle_fails() {
    let env = Env::new();
    env.cmd()
        .args(["describe", "api-keys"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("api-keys"));
}

#[test]
fn partial_create_failure_exits_non_zero() {
    let env = Env::new();
    let manifest = env.write(
        "bundles.toml",
        r#"
[[bundle]]
name = "spec1"
keys = { a = "1" }

[[bundle]]
name = "spec2"
type = "ssh-auth"
keys = { wrong = "x" }

[[bundle]]
name = "spec3"
keys = { b = "2" }
"#,
    );

    env.cmd()
        .args(["--format", "json", "create", "--manifest"])
        .arg(&manifest)
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"state\": \"failed\""))
        .stderr(predicate::str::contains("create operation"));

    env.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("spec1"))
        .stdout(predicate::str::contains("spec3"))
        .stdout(predicate::str::contains("spec2").not());
}

#[test]
fn invalid_bundle_name_fails_only_that_entry() {
    let env = Env::new();
    let manifest = env.write(
        "bundles.toml",
        r#"
[[bundle]]
name = "one"
keys = { a = "1" }

[[bundle]]
name = "Bad_Name"
keys = { b = "2" }

[[bundle]]
name = "three"
keys = { c = "3" }
"#,
    );

    env.cmd()
        .arg("create")
        .arg("--manifest")
        .arg(&manifest)
        .assert()
        .failure()
        .stdout(predicate::str::contains("Bundles (3):"))
        .stdout(predicate::str::is_match(r"Bad_Name\s+FAILED").expect("regex"))
        .stdout(predicate::str::is_match(r"one\s+applied v1").expect("regex"))
        .stdout(predicate::str::is_match(r"three\s+applied v1").expect("regex"));

    env.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("one"))
        .stdout(predicate::str::contains("three"))
        .stdout(predicate::str::contains("Bad_Name").not());
}

#[test]
fn create_leaves_an_existing_bundle_untouched() {
    let env = Env::new();
    let manifest = env.write("bundles.toml", MANIFEST);
    env.create(&manifest);

    let replacement = env.write(
        "replacement.toml",
        r#"
[[bundle]]
name = "db-credentials"
type = "basic-auth"
keys = { username = "app", password = "other" }
"#,
    );
    env.cmd()
        .arg("create")
        .arg("--manifest")
        .arg(&replacement)
        .assert()
        .failure()
        .stdout(predicate::str::contains("already exists"));

    env.cmd()
        .args(["decode", "db-credentials", "password"])
        .assert()
        .success()
        .stdout("s3cret\n");
}

// ============================================================================
// Rotation and audit
// ============================================================================

#[test]
fn rotate_records_an_audit_entry() {
    let env = Env::new();
    let manifest = env.write("bundles.toml", MANIFEST);
    env.create(&manifest);

    env.cmd()
        .args(["rotate", "db-credentials", "--generate", "password"])
        .assert()
        .success()
        .stdout(predicate::str::contains("applied v1 -> v2"))
        .stdout(predicate::str::contains("postgres"))
        .stdout(predicate::str::contains("backend"));

    env.cmd()
        .args(["decode", "db-credentials", "password"])
        .assert()
        .success()
        .stdout(predicate::str::contains("s3cret").not());

    env.cmd()
        .args(["audit", "db-credentials"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rotate"))
        .stdout(predicate::str::contains("ci"))
        .stdout(predicate::str::contains("Total: 1 change(s)"));

    let export = env.path("audit-export.jsonl");
    env.cmd()
        .args(["audit", "--export"])
        .arg(&export)
        .assert()
        .success()
        .stdout(predicate::str::contains("exported 1 record(s)"));
    let exported = std::fs::read_to_string(&export).expect("export written");
    assert_eq!(exported.lines().count(), 1);
    assert!(exported.contains("\"new_version\":2"));
}

#[test]
fn rotate_without_changes_is_rejected() {
    let env = Env::new();
    env.cmd()
        .args(["rotate", "db-credentials"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to change"));
}

#[test]
fn delete_is_idempotent() {
    let env = Env::new();
    let manifest = env.write("bundles.toml", MANIFEST);
    env.create(&manifest);

    for _ in 0..2 {
        env.cmd()
            .args(["delete", "db-credentials"])
            .assert()
            .success()
            .stdout(predicate::str::contains("still_referenced"));
    }
}

// ============================================================================
// Verification
// ============================================================================

#[test]
fn verify_reports_drift_and_fails() {
    let env = Env::new();
    let manifest = env.write("bundles.toml", MANIFEST);
    env.create(&manifest);

    env.cmd()
        .arg("verify")
        .assert()
        .failure()
        .stdout(predicate::str::contains("api-keys/jwt-secret"))
        .stdout(predicate::str::contains("MissingBundle"))
        .stderr(predicate::str::contains(
            "backend -> api-keys/jwt-secret: MissingBundle",
        ));
}

#[test]
fn verify_scoped_to_healthy_bundle_passes() {
    let env = Env::new();
    let manifest = env.write("bundles.toml", MANIFEST);
    env.create(&manifest);

    env.cmd()
        .args(["verify", "--bundle", "db-credentials"])
        .assert()
        .success()
        .stdout(predicate::str::contains("All 2 reference(s) resolve"));
}

#[test]
fn invalid_config_is_reported() {
    let env = Env::new();
    let config = env.write("bad.toml", "[rollout]\ntimeout_secs = 0\n");
    let mut cmd = cargo_bin_cmd!("keyturn");
    cmd.current_dir(env.dir.path())
        .arg("--config")
        .arg(config)
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration error"));
}
