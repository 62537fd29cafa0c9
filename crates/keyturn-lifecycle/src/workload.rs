//! Workloads, their bundle references and the controller seam.
//!
//! A [`Workload`] declares which `(bundle, key)` pairs it consumes. Values
//! are not hot-reloaded, so a workload must be restarted through a
//! [`WorkloadController`] to observe a new bundle version. Restarts follow
//! tier order: every [`Tier::Data`] workload is restarted and ready before
//! any [`Tier::Consumer`] workload is touched.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::future::Future;
use std::time::Duration;

use keyturn_store::BundleName;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::error::{LifecycleError, LifecycleResult};

/// The orchestrator object kind of a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadKind {
    /// Stateless replicated workload
    Deployment,
    /// Stateful workload with stable identity
    StatefulSet,
}

impl WorkloadKind {
    /// Returns the kind as used on the orchestrator command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deployment => "deployment",
            Self::StatefulSet => "statefulset",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Restart tier. Data workloads are restarted before consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Owns persistent state (databases, queues)
    Data,
    /// Connects to the data tier
    Consumer,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Data => "data",
            Self::Consumer => "consumer",
        })
    }
}

/// Where a referenced value is surfaced inside the workload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceTarget {
    /// An environment variable
    Env(String),
    /// A mounted file path
    File(String),
}

impl fmt::Display for ReferenceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Env(name) => write!(f, "env {name}"),
            Self::File(path) => write!(f, "file {path}"),
        }
    }
}

/// A workload's dependency on one key of one bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    /// Referenced bundle
    pub bundle: BundleName,
    /// Referenced key
    pub key: String,
    /// Where the value is surfaced
    #[serde(flatten)]
    pub target: ReferenceTarget,
}

impl Reference {
    /// Creates an environment-variable reference.
    #[must_use]
    pub fn env(bundle: BundleName, key: impl Into<String>, var: impl Into<String>) -> Self {
        Self {
            bundle,
            key: key.into(),
            target: ReferenceTarget::Env(var.into()),
        }
    }

    /// Creates a file-mount reference.
    #[must_use]
    pub fn file(bundle: BundleName, key: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            bundle,
            key: key.into(),
            target: ReferenceTarget::File(path.into()),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.bundle, self.key, self.target)
    }
}

/// A deployable unit that consumes bundle values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    /// Workload name
    pub name: String,
    /// Object kind
    pub kind: WorkloadKind,
    /// Restart tier
    pub tier: Tier,
    /// Namespace override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Declared references
    #[serde(default, rename = "reference")]
    pub references: Vec<Reference>,
}

impl Workload {
    /// Creates a workload with no references.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: WorkloadKind, tier: Tier) -> Self {
        Self {
            name: name.into(),
            kind,
            tier,
            namespace: None,
            references: Vec::new(),
        }
    }

    /// Sets the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Adds a reference.
    #[must_use]
    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.references.push(reference);
        self
    }

    /// Returns `kind/name`, e.g. `statefulset/postgres`.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }

    /// Returns true if any reference points at `bundle`.
    #[must_use]
    pub fn references_bundle(&self, bundle: &BundleName) -> bool {
        self.references.iter().any(|r| &r.bundle == bundle)
    }

    /// Checks the workload definition.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidWorkload`] if the name is empty or
    /// not a DNS label, or a reference has an empty key or target.
    pub fn validate(&self) -> LifecycleResult<()> {
        let invalid = |reason: String| Err(LifecycleError::InvalidWorkload(reason));

        if self.name.is_empty() || self.name.len() > 63 {
            return invalid(format!(
                "workload name '{}' must be between 1 and 63 characters",
                self.name
            ));
        }
        let label_ok = self
            .name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && !self.name.starts_with('-')
            && !self.name.ends_with('-');
        if !label_ok {
            return invalid(format!(
                "workload name '{}' must be lowercase alphanumerics and hyphens",
                self.name
            ));
        }

        for reference in &self.references {
            if reference.key.is_empty() {
                return invalid(format!(
                    "workload '{}' references bundle '{}' with an empty key",
                    self.name, reference.bundle
                ));
            }
            let target_empty = match &reference.target {
                ReferenceTarget::Env(var) => var.is_empty(),
                ReferenceTarget::File(path) => path.is_empty(),
            };
            if target_empty {
                return invalid(format!(
                    "workload '{}' reference {}/{} has an empty target",
                    self.name, reference.bundle, reference.key
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// The declared set of workloads, fixed at configuration load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadInventory {
    workloads: Vec<Workload>,
}

impl WorkloadInventory {
    /// Builds an inventory after validating every workload.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidWorkload`] for a malformed workload
    /// or a duplicate `(namespace, name)` pair.
    pub fn new(workloads: Vec<Workload>) -> LifecycleResult<Self> {
        let mut seen = HashSet::new();
        for workload in &workloads {
            workload.validate()?;
            if !seen.insert((workload.namespace.clone(), workload.name.clone())) {
                return Err(LifecycleError::InvalidWorkload(format!(
                    "workload '{}' is declared more than once",
                    workload.name
                )));
            }
        }
        Ok(Self { workloads })
    }

    /// Returns every workload in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Workload> {
        self.workloads.iter()
    }

    /// Returns the number of workloads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workloads.len()
    }

    /// Returns true if no workloads are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workloads.is_empty()
    }

    /// Returns the workloads referencing `bundle`, in declaration order.
    #[must_use]
    pub fn referencing(&self, bundle: &BundleName) -> Vec<&Workload> {
        self.workloads
            .iter()
            .filter(|w| w.references_bundle(bundle))
            .collect()
    }

    /// Groups the workloads referencing `bundle` by tier, data tier first.
    #[must_use]
    pub fn tiers_referencing(&self, bundle: &BundleName) -> Vec<(Tier, Vec<&Workload>)> {
        let mut tiers: BTreeMap<Tier, Vec<&Workload>> = BTreeMap::new();
        for workload in self.referencing(bundle) {
            tiers.entry(workload.tier).or_default().push(workload);
        }
        tiers.into_iter().collect()
    }
}

/// Restarts workloads and reports their rollout status.
pub trait WorkloadController: Send + Sync {
    /// Short driver name for logs and output.
    fn kind(&self) -> &'static str;

    /// Triggers a rolling restart. Returns once the restart is issued.
    fn restart(&self, workload: &Workload) -> impl Future<Output = LifecycleResult<()>> + Send;

    /// Returns whether the workload's latest rollout is complete.
    fn is_ready(&self, workload: &Workload) -> impl Future<Output = LifecycleResult<bool>> + Send;
}

/// Polls `controller` until `workload` is ready or `deadline` elapses.
///
/// # Errors
///
/// Returns [`LifecycleError::RolloutTimeout`] once the deadline passes, or
/// the controller's error if a readiness query fails.
pub async fn wait_until_ready<W: WorkloadController>(
    controller: &W,
    workload: &Workload,
    deadline: Duration,
    poll_interval: Duration,
) -> LifecycleResult<()> {
    let poll = async {
        loop {
            if controller.is_ready(workload).await? {
                return Ok(());
            }
            debug!(workload = %workload.name, "not ready yet");
            sleep(poll_interval).await;
        }
    };

    timeout(deadline, poll)
        .await
        .unwrap_or_else(|_| {
            Err(LifecycleError::RolloutTimeout {
                workload: workload.name.clone(),
                timeout_secs: deadline.as_secs(),
            })
        })
}
