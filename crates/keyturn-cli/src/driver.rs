//! Workload restart drivers.
//!
//! [`KubectlController`] shells out to `kubectl rollout restart` and
//! `kubectl rollout status`. The program is executed directly, never through
//! a shell, and every argument is checked for control characters first.

use std::path::PathBuf;
use std::process::Stdio;

use keyturn_lifecycle::{LifecycleError, LifecycleResult, Workload, WorkloadController};
use tokio::process::Command;
use tracing::debug;

use crate::config::{DriverKind, RolloutConfig};

/// Characters never passed to a child process.
const FORBIDDEN_CHARS: &[char] = &['\0', '\n', '\r'];

/// `kubectl rollout status` phrases that mean the rollout finished.
const READY_MARKERS: &[&str] = &[
    "successfully rolled out",
    "roll out complete",
    "rolling update complete",
];

/// Restarts workloads through `kubectl`.
#[derive(Debug, Clone)]
pub struct KubectlController {
    program: PathBuf,
    namespace: Option<String>,
}

impl KubectlController {
    /// Creates a controller running `program`, using `namespace` for
    /// workloads that do not declare one.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, namespace: Option<String>) -> Self {
        Self {
            program: program.into(),
            namespace,
        }
    }

    fn target_args(&self, workload: &Workload) -> Vec<String> {
        let mut args = vec![format!("{}/{}", workload.kind.as_str(), workload.name)];
        if let Some(ns) = workload.namespace.as_ref().or(self.namespace.as_ref()) {
            args.push("-n".to_string());
            args.push(ns.clone());
        }
        args
    }

    /// Arguments for restarting `workload`.
    #[must_use]
    pub fn restart_args(&self, workload: &Workload) -> Vec<String> {
        let mut args = vec!["rollout".to_string(), "restart".to_string()];
        args.extend(self.target_args(workload));
        args
    }

    /// Arguments for a non-blocking readiness query of `workload`.
    #[must_use]
    pub fn status_args(&self, workload: &Workload) -> Vec<String> {
        let mut args = vec!["rollout".to_string(), "status".to_string()];
        args.extend(self.target_args(workload));
        args.push("--watch=false".to_string());
        args
    }

    async fn run(&self, workload: &Workload, args: Vec<String>) -> LifecycleResult<String> {
        if let Some(c) = args
            .iter()
            .flat_map(|a| a.chars())
            .find(|c| FORBIDDEN_CHARS.contains(c))
        {
            return Err(LifecycleError::controller(
                &workload.name,
                format!("refusing to pass control character {c:?} to kubectl"),
            ));
        }

        let description = format!("{} {}", self.program.display(), args.join(" "));
        debug!(command = %description, "running kubectl");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                LifecycleError::controller(&workload.name, format!("failed to run {description}: {e}"))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(LifecycleError::controller(
                &workload.name,
                format!("'{description}' exited with {code}: {}", stderr.trim()),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl WorkloadController for KubectlController {
    fn kind(&self) -> &'static str {
        "kubectl"
    }

    async fn restart(&self, workload: &Workload) -> LifecycleResult<()> {
        self.run(workload, self.restart_args(workload)).await?;
        Ok(())
    }

    async fn is_ready(&self, workload: &Workload) -> LifecycleResult<bool> {
        let stdout = self.run(workload, self.status_args(workload)).await?;
        Ok(READY_MARKERS.iter().any(|m| stdout.contains(m)))
    }
}

/// Controller that restarts nothing and reports every workload ready.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopController;

impl WorkloadController for NoopController {
    fn kind(&self) -> &'static str {
        "none"
    }

    async fn restart(&self, workload: &Workload) -> LifecycleResult<()> {
        debug!(workload = %workload, "restart skipped (driver = none)");
        Ok(())
    }

    async fn is_ready(&self, _workload: &Workload) -> LifecycleResult<bool> {
        Ok(true)
    }
}

/// The restart driver selected by configuration.
#[derive(Debug, Clone)]
pub enum RolloutDriver {
    /// `kubectl`
    Kubectl(KubectlController),
    /// No-op
    Noop(NoopController),
}

impl RolloutDriver {
    /// Builds the driver named in `config`.
    #[must_use]
    pub fn from_config(config: &RolloutConfig) -> Self {
        match config.driver {
            DriverKind::Kubectl => Self::Kubectl(KubectlController::new(
                config.kubectl.clone(),
                config.namespace.clone(),
            )),
            DriverKind::None => Self::Noop(NoopController),
        }
    }
}

impl WorkloadController for RolloutDriver {
    fn kind(&self) -> &'static str {
        match self {
            Self::Kubectl(c) => c.kind(),
            Self::Noop(c) => c.kind(),
        }
    }

    async fn restart(&self, workload: &Workload) -> LifecycleResult<()> {
        match self {
            Self::Kubectl(c) => c.restart(workload).await,
            Self::Noop(c) => c.restart(workload).await,
        }
    }

    async fn is_ready(&self, workload: &Workload) -> LifecycleResult<bool> {
        match self {
            Self::Kubectl(c) => c.is_ready(workload).await,
            Self::Noop(c) => c.is_ready(workload).await,
        }
    }
}
