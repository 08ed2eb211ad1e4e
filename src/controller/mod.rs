//! Convergence engine for ClickHouse host workloads
//!
//! This module drives each host's StatefulSet toward its desired spec: it
//! submits the object, waits for the platform to roll it out, applies the
//! configured failure policy and reports host counters on the owning
//! installation.

mod auxiliary;
mod pass;
mod policy;
pub mod rollout;
mod status;
mod waiter;
mod workload;

use std::sync::Arc;

use k8s_openapi::api::apps::v1::StatefulSet;
use kube::runtime::reflector::Store;
use kube::Client;

pub use auxiliary::AuxiliaryReconciler;
pub use pass::{apply_manifest, run_pass, PassSummary};
pub use policy::FailurePolicy;
pub use status::StatusAggregator;
pub use waiter::{ConvergenceWaiter, WaitOutcome};
pub use workload::WorkloadReconciler;

use crate::client::Clients;
use crate::config::ReconcileConfig;
use crate::crd::ClickHouseInstallationStatus;
use crate::host::ResourceRef;

/// Shared state for reconciling installations
///
/// Use [`ContextBuilder`] to construct instances:
///
/// ```ignore
/// let ctx = Context::builder(client)
///     .config(config)
///     .watch_cache(store)
///     .build();
/// ```
#[derive(Clone)]
pub struct Context {
    /// Platform clients (trait objects for testability)
    pub clients: Clients,
    /// Policy and timing settings for the current pass
    pub config: Arc<ReconcileConfig>,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a context from already-built clients
    ///
    /// Used by tests, where a real Kubernetes client is not available.
    pub fn new(clients: Clients, config: ReconcileConfig) -> Self {
        Self {
            clients,
            config: Arc::new(config),
        }
    }

    /// Same clients, different configuration
    ///
    /// Configuration is reloaded between passes; clients and the watch
    /// cache outlive any single pass.
    pub fn with_config(&self, config: ReconcileConfig) -> Self {
        Self {
            clients: self.clients.clone(),
            config: Arc::new(config),
        }
    }

    /// Workload reconciler reporting into a fresh status for `installation`
    pub fn workload_reconciler(&self, installation: ResourceRef) -> WorkloadReconciler {
        let status = Arc::new(StatusAggregator::new(
            self.clients.status.clone(),
            installation,
            ClickHouseInstallationStatus::default(),
        ));
        WorkloadReconciler::from_context(self, status)
    }

    /// Reconciler for ConfigMaps and Services
    pub fn auxiliary_reconciler(&self) -> AuxiliaryReconciler {
        AuxiliaryReconciler::new(self.clients.auxiliary.clone())
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    client: Client,
    config: ReconcileConfig,
    cache: Option<Store<StatefulSet>>,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            config: ReconcileConfig::default(),
            cache: None,
        }
    }

    /// Set the reconcile configuration
    pub fn config(mut self, config: ReconcileConfig) -> Self {
        self.config = config;
        self
    }

    /// Poll StatefulSet status from a reflector store instead of the API server
    pub fn watch_cache(mut self, cache: Store<StatefulSet>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context::new(Clients::from_kube(self.client, self.cache), self.config)
    }
}
