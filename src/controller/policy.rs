//! What to do when a StatefulSet rollout does not converge
//!
//! Create and update failures have independent policies. Remediation is
//! best-effort: a failed delete or rollback is logged and the continuation
//! verdict still applies, since remediation is already recovery from an
//! earlier failure.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::StatefulSetSpec;
use tracing::{info, instrument, warn};

use crate::client::WorkloadClient;
use crate::config::{CreateFailureAction, ReconcileConfig, UpdateFailureAction};
use crate::error::RolloutPhase;
use crate::host::{HostHandle, ResourceRef};
use crate::Error;

/// Applies the configured create/update failure actions
#[derive(Clone)]
pub struct FailurePolicy {
    client: Arc<dyn WorkloadClient>,
    on_create_failure: CreateFailureAction,
    on_update_failure: UpdateFailureAction,
    continue_on_failure: bool,
}

impl FailurePolicy {
    /// Create a policy with explicit settings
    pub fn new(
        client: Arc<dyn WorkloadClient>,
        on_create_failure: CreateFailureAction,
        on_update_failure: UpdateFailureAction,
        continue_on_failure: bool,
    ) -> Self {
        Self {
            client,
            on_create_failure,
            on_update_failure,
            continue_on_failure,
        }
    }

    /// Create a policy with settings taken from configuration
    pub fn from_config(client: Arc<dyn WorkloadClient>, config: &ReconcileConfig) -> Self {
        Self::new(
            client,
            config.on_create_failure_action,
            config.on_update_failure_action,
            config.continue_on_failure,
        )
    }

    /// Handle a created StatefulSet that did not converge
    ///
    /// `reason` describes how the wait ended and is carried into the abort error.
    #[instrument(skip(self, resource, host, reason), fields(resource = %resource, host = %host.name))]
    pub async fn on_create_failed(
        &self,
        resource: &ResourceRef,
        host: &HostHandle,
        reason: String,
    ) -> Result<(), Error> {
        match self.on_create_failure {
            CreateFailureAction::Abort => {
                info!(action = %self.on_create_failure, "create failed, aborting");
                Err(Error::rollout_failed(
                    RolloutPhase::Create,
                    resource.clone(),
                    reason,
                ))
            }
            CreateFailureAction::Delete => {
                info!(action = %self.on_create_failure, "create failed, deleting StatefulSet");
                if let Err(e) = self.client.delete_stateful_set(resource).await {
                    warn!(error = %e, "failed to delete StatefulSet after create failure");
                }
                self.continuation(RolloutPhase::Create, resource)
            }
        }
    }

    /// Handle an updated StatefulSet that did not converge
    ///
    /// `previous_spec` is the spec captured before the update was submitted;
    /// rollback writes it back over the live object.
    #[instrument(skip(self, resource, previous_spec, reason), fields(resource = %resource))]
    pub async fn on_update_failed(
        &self,
        resource: &ResourceRef,
        previous_spec: Option<StatefulSetSpec>,
        reason: String,
    ) -> Result<(), Error> {
        match self.on_update_failure {
            UpdateFailureAction::Abort => {
                info!(action = %self.on_update_failure, "update failed, aborting");
                Err(Error::rollout_failed(
                    RolloutPhase::Update,
                    resource.clone(),
                    reason,
                ))
            }
            UpdateFailureAction::Rollback => {
                info!(action = %self.on_update_failure, "update failed, rolling back StatefulSet");
                self.rollback(resource, previous_spec).await;
                self.continuation(RolloutPhase::Update, resource)
            }
        }
    }

    /// Restore `previous_spec` and recycle the pod
    ///
    /// The object is re-read from the API server, not the watch cache: the
    /// replace must carry the latest resourceVersion or it is rejected.
    /// The pod is deleted because a badly broken pod may never pick up the
    /// reverted template on its own; the StatefulSet recreates it.
    async fn rollback(&self, resource: &ResourceRef, previous_spec: Option<StatefulSetSpec>) {
        let mut live = match self.client.get_stateful_set(resource).await {
            Ok(Some(sts)) => sts,
            Ok(None) => {
                warn!("StatefulSet disappeared before rollback, nothing to restore");
                return;
            }
            Err(e) => {
                warn!(error = %e, "failed to read StatefulSet for rollback");
                return;
            }
        };

        live.spec = previous_spec;
        match self.client.update_stateful_set(&live).await {
            Ok(sts) => info!(generation = ?sts.metadata.generation, "StatefulSet spec rolled back"),
            Err(e) => warn!(error = %e, "failed to roll back StatefulSet spec"),
        }

        let pod = ResourceRef::new(&resource.namespace, resource.first_pod_name());
        if let Err(e) = self.client.delete_pod(&pod).await {
            warn!(pod = %pod, error = %e, "failed to delete pod after rollback");
        }
    }

    /// Verdict on whether the pass may move on to the next host
    fn continuation(&self, phase: RolloutPhase, resource: &ResourceRef) -> Result<(), Error> {
        if self.continue_on_failure {
            info!(%phase, "continuing with the next host after remediation");
            Ok(())
        } else {
            Err(Error::halted(phase, resource.clone()))
        }
    }
}
