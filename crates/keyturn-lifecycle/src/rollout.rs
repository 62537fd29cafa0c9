//! Tier-ordered restart propagation.

use std::time::Duration;

use futures::future::join_all;
use keyturn_store::BundleName;
use tracing::{error, info, warn};

use crate::error::LifecycleError;
use crate::types::{RestartOutcome, RestartStatus};
use crate::workload::{Workload, WorkloadController, WorkloadInventory, wait_until_ready};

/// Rollout timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolloutPolicy {
    /// How long one tier may take to become ready
    pub tier_timeout: Duration,
    /// Interval between readiness polls
    pub poll_interval: Duration,
}

impl Default for RolloutPolicy {
    fn default() -> Self {
        Self {
            tier_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Result of propagating a bundle change.
#[derive(Debug, Default)]
pub struct Propagation {
    /// One outcome per referencing workload, in restart order
    pub outcomes: Vec<RestartOutcome>,
    /// First failure, if any
    pub failure: Option<LifecycleError>,
}

impl Propagation {
    fn record(&mut self, workload: &Workload, status: RestartStatus) {
        self.outcomes.push(RestartOutcome {
            workload: workload.name.clone(),
            tier: workload.tier,
            status,
        });
    }

    fn fail(&mut self, workload: &Workload, err: LifecycleError) {
        let status = match err {
            LifecycleError::RolloutTimeout { .. } => RestartStatus::TimedOut,
            ref other => RestartStatus::Failed {
                error: other.to_string(),
            },
        };
        self.record(workload, status);
        if self.failure.is_none() {
            self.failure = Some(err);
        }
    }
}

/// Restarts every workload referencing `bundle`, one tier at a time.
///
/// All workloads of a tier are restarted, then polled concurrently against
/// the tier deadline; the next tier starts only once every workload of the
/// current tier is ready. After a failure the remaining tiers are skipped.
pub async fn propagate<W: WorkloadController>(
    controller: &W,
    inventory: &WorkloadInventory,
    bundle: &BundleName,
    policy: RolloutPolicy,
) -> Propagation {
    let mut result = Propagation::default();

    for (tier, workloads) in inventory.tiers_referencing(bundle) {
        if result.failure.is_some() {
            for workload in workloads {
                warn!(bundle = %bundle, workload = %workload.name, tier = %tier, "restart skipped after earlier failure");
                result.record(workload, RestartStatus::Skipped);
            }
            continue;
        }

        let mut restarted = Vec::with_capacity(workloads.len());
        for workload in workloads {
            match controller.restart(workload).await {
                Ok(()) => {
                    info!(bundle = %bundle, workload = %workload.qualified_name(), tier = %tier, "restart issued");
                    restarted.push(workload);
                }
                Err(e) => {
                    error!(bundle = %bundle, workload = %workload.name, error = %e, "restart failed");
                    result.fail(workload, e);
                }
            }
        }

        let waits = restarted.iter().map(|workload| {
            wait_until_ready(controller, workload, policy.tier_timeout, policy.poll_interval)
        });
        let waited = join_all(waits).await;

        for (workload, outcome) in restarted.into_iter().zip(waited) {
            match outcome {
                Ok(()) => {
                    info!(bundle = %bundle, workload = %workload.name, tier = %tier, "workload ready");
                    result.record(workload, RestartStatus::Ready);
                }
                Err(e) => {
                    error!(bundle = %bundle, workload = %workload.name, error = %e, "workload not ready");
                    result.fail(workload, e);
                }
            }
        }
    }

    result
}
