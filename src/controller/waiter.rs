//! Bounded wait for a StatefulSet to roll out a target generation

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::apps::v1::StatefulSetStatus;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::rollout::{describe_status, has_reached_generation};
use crate::client::WorkloadClient;
use crate::config::ReconcileConfig;
use crate::host::ResourceRef;
use crate::Error;

/// Result of waiting for a generation to roll out
#[derive(Debug)]
pub enum WaitOutcome {
    /// The generation is fully rolled out
    Converged,
    /// The deadline passed while the StatefulSet was still rolling out
    TimedOut {
        /// Status seen on the last poll
        last_status: Option<StatefulSetStatus>,
    },
    /// The deadline passed and the StatefulSet never showed up
    NotFound,
    /// Reading the StatefulSet failed with something other than a 404
    Failed(Error),
    /// The pass was cancelled while waiting
    Cancelled,
}

impl WaitOutcome {
    /// Whether the rollout completed
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }

    /// Short description used in failure messages
    pub fn describe(&self, target_generation: i64, timeout: Duration) -> String {
        match self {
            Self::Converged => format!("generation {target_generation} rolled out"),
            Self::TimedOut { last_status } => format!(
                "generation {target_generation} not rolled out within {}s ({})",
                timeout.as_secs(),
                describe_status(last_status.as_ref())
            ),
            Self::NotFound => format!(
                "StatefulSet did not appear within {}s",
                timeout.as_secs()
            ),
            Self::Failed(e) => format!("failed to read StatefulSet: {e}"),
            Self::Cancelled => "wait cancelled".to_string(),
        }
    }
}

/// Polls a StatefulSet until it converges, fails, times out or is cancelled
#[derive(Clone)]
pub struct ConvergenceWaiter {
    client: Arc<dyn WorkloadClient>,
    timeout: Duration,
    poll_interval: Duration,
    log_grace_period: Duration,
}

impl ConvergenceWaiter {
    /// Create a waiter with explicit timings
    pub fn new(
        client: Arc<dyn WorkloadClient>,
        timeout: Duration,
        poll_interval: Duration,
        log_grace_period: Duration,
    ) -> Self {
        Self {
            client,
            timeout,
            poll_interval,
            log_grace_period,
        }
    }

    /// Create a waiter with timings taken from configuration
    pub fn from_config(client: Arc<dyn WorkloadClient>, config: &ReconcileConfig) -> Self {
        Self::new(
            client,
            config.convergence_timeout(),
            config.convergence_poll_interval(),
            config.status_log_grace_period(),
        )
    }

    /// Configured timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait for `resource` to fully roll out `target_generation`
    ///
    /// A 404 keeps polling since a fresh create may not be visible yet,
    /// especially through the watch cache. Any other read error ends the
    /// wait at once. The sleep between polls is raced against `cancel`.
    pub async fn wait_for_generation(
        &self,
        resource: &ResourceRef,
        target_generation: i64,
        cancel: &CancellationToken,
    ) -> WaitOutcome {
        let start = Instant::now();
        let mut last_status: Option<StatefulSetStatus> = None;
        let mut seen = false;

        loop {
            if cancel.is_cancelled() {
                debug!(%resource, "wait cancelled");
                return WaitOutcome::Cancelled;
            }

            match self.client.observe_stateful_set(resource).await {
                Ok(Some(sts)) => {
                    if has_reached_generation(&sts, target_generation) {
                        info!(
                            %resource,
                            generation = target_generation,
                            status = %describe_status(sts.status.as_ref()),
                            "StatefulSet reached target generation"
                        );
                        return WaitOutcome::Converged;
                    }
                    if start.elapsed() >= self.log_grace_period {
                        info!(
                            %resource,
                            generation = target_generation,
                            status = %describe_status(sts.status.as_ref()),
                            "waiting for StatefulSet rollout"
                        );
                    }
                    seen = true;
                    last_status = sts.status;
                }
                Ok(None) => {
                    debug!(%resource, "StatefulSet not visible yet, waiting");
                }
                Err(e) => {
                    warn!(%resource, error = %e, "failed to read StatefulSet while waiting");
                    return WaitOutcome::Failed(e);
                }
            }

            if start.elapsed() >= self.timeout {
                warn!(
                    %resource,
                    generation = target_generation,
                    timeout_secs = self.timeout.as_secs(),
                    "timed out waiting for StatefulSet rollout"
                );
                return if seen {
                    WaitOutcome::TimedOut { last_status }
                } else {
                    WaitOutcome::NotFound
                };
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(%resource, "wait cancelled");
                    return WaitOutcome::Cancelled;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
