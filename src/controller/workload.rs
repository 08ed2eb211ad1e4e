//! Create and update paths for a host's StatefulSet
//!
//! Each path submits the desired object, waits for the platform to roll out
//! the resulting generation and hands non-convergence to the failure policy.
//! Host counters on the installation are recorded whatever the outcome.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::StatefulSet;
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::policy::FailurePolicy;
use super::rollout::generation;
use super::status::StatusAggregator;
use super::waiter::{ConvergenceWaiter, WaitOutcome};
use super::Context;
use crate::client::WorkloadClient;
use crate::host::{HostHandle, ResourceRef};
use crate::Error;

/// Generation assumed for a freshly created StatefulSet whose response lacks one
const INITIAL_GENERATION: i64 = 1;

/// Drives one host's StatefulSet to convergence
#[derive(Clone)]
pub struct WorkloadReconciler {
    client: Arc<dyn WorkloadClient>,
    waiter: ConvergenceWaiter,
    policy: FailurePolicy,
    status: Arc<StatusAggregator>,
}

impl WorkloadReconciler {
    /// Create a reconciler from its parts
    pub fn new(
        client: Arc<dyn WorkloadClient>,
        waiter: ConvergenceWaiter,
        policy: FailurePolicy,
        status: Arc<StatusAggregator>,
    ) -> Self {
        Self {
            client,
            waiter,
            policy,
            status,
        }
    }

    /// Create a reconciler wired from the shared context
    pub fn from_context(ctx: &Context, status: Arc<StatusAggregator>) -> Self {
        let client = ctx.clients.workload.clone();
        Self::new(
            client.clone(),
            ConvergenceWaiter::from_config(client.clone(), &ctx.config),
            FailurePolicy::from_config(client, &ctx.config),
            status,
        )
    }

    /// Status aggregator the paths report into
    pub fn status(&self) -> &Arc<StatusAggregator> {
        &self.status
    }

    /// Create or update `desired` depending on whether it already exists
    ///
    /// The existence check is a live read, never the watch cache, so a
    /// StatefulSet deleted moments ago is not mistaken for present.
    #[instrument(skip(self, desired, host, cancel), fields(statefulset = %desired.name_any(), host = %host.name))]
    pub async fn reconcile_stateful_set(
        &self,
        desired: StatefulSet,
        host: &HostHandle,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let resource = ResourceRef::from_object(&desired)?;
        match self.client.get_stateful_set(&resource).await? {
            Some(current) => self.update_and_converge(&current, desired, cancel).await,
            None => self.create_and_converge(&desired, host, cancel).await,
        }
    }

    /// Create `desired` and wait for it to roll out
    ///
    /// An "already exists" rejection is returned as is. `addedHostsCount` is
    /// recorded after the attempt whether or not it succeeded.
    pub async fn create_and_converge(
        &self,
        desired: &StatefulSet,
        host: &HostHandle,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let result = self.create(desired, host, cancel).await;
        self.status.record_added().await;
        result
    }

    async fn create(
        &self,
        desired: &StatefulSet,
        host: &HostHandle,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let resource = ResourceRef::from_object(desired)?;
        info!(%resource, "creating StatefulSet");

        let created = self.client.create_stateful_set(desired).await?;
        let target = generation(&created).unwrap_or(INITIAL_GENERATION);

        match self.waiter.wait_for_generation(&resource, target, cancel).await {
            WaitOutcome::Converged => Ok(()),
            WaitOutcome::Cancelled => Err(Error::cancelled(resource)),
            outcome => {
                let reason = outcome.describe(target, self.waiter.timeout());
                self.policy.on_create_failed(&resource, host, reason).await
            }
        }
    }

    /// Replace `current` with `desired` and wait for the new generation
    ///
    /// `desired` must name the same object as `current`. When `desired`
    /// carries no resourceVersion the live one is used, so the API server
    /// rejects the write if someone else changed the object in between.
    /// `updatedHostsCount` is recorded after the attempt whether or not it
    /// succeeded.
    pub async fn update_and_converge(
        &self,
        current: &StatefulSet,
        desired: StatefulSet,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let resource = ResourceRef::from_object(current)?;
        let target = ResourceRef::from_object(&desired)?;
        if target != resource {
            return Err(Error::validation_for(
                &resource,
                format!("desired StatefulSet {target} does not match the live object"),
            ));
        }

        let result = self.update(current, desired, resource, cancel).await;
        self.status.record_updated().await;
        result
    }

    async fn update(
        &self,
        current: &StatefulSet,
        mut desired: StatefulSet,
        resource: ResourceRef,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        // Captured before anything is submitted; rollback writes this back
        let previous_spec = current.spec.clone();

        if desired.metadata.resource_version.is_none() {
            desired.metadata.resource_version = current.metadata.resource_version.clone();
        }

        let updated = self.client.update_stateful_set(&desired).await?;
        let old_generation = generation(current);
        let target = match generation(&updated) {
            Some(new) if Some(new) != old_generation => new,
            _ => {
                debug!(%resource, generation = ?old_generation, "no spec change, generation unchanged");
                return Ok(());
            }
        };

        info!(
            %resource,
            from = ?old_generation,
            to = target,
            "StatefulSet generation changed, waiting for rollout"
        );

        match self.waiter.wait_for_generation(&resource, target, cancel).await {
            WaitOutcome::Converged => Ok(()),
            WaitOutcome::Cancelled => Err(Error::cancelled(resource)),
            outcome => {
                let reason = outcome.describe(target, self.waiter.timeout());
                self.policy
                    .on_update_failed(&resource, previous_spec, reason)
                    .await
            }
        }
    }
}
