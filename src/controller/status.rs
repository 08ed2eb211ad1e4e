//! Host counters on the owning ClickHouseInstallation
//!
//! Counters live in memory for the duration of a pass and the whole status is
//! persisted after every change. Persisting happens under the same lock as the
//! increment, so concurrent hosts never write an older count over a newer one.
//! A failed persist is logged and forgotten: the next successful one carries
//! the cumulative value.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::client::StatusClient;
use crate::crd::{ClickHouseInstallationStatus, ReconcilePhase};
use crate::host::ResourceRef;

/// Records pass progress on an installation's status
pub struct StatusAggregator {
    client: Arc<dyn StatusClient>,
    installation: ResourceRef,
    status: Mutex<ClickHouseInstallationStatus>,
}

impl StatusAggregator {
    /// Create an aggregator seeded with `initial`
    pub fn new(
        client: Arc<dyn StatusClient>,
        installation: ResourceRef,
        initial: ClickHouseInstallationStatus,
    ) -> Self {
        Self {
            client,
            installation,
            status: Mutex::new(initial),
        }
    }

    /// The installation whose status this aggregator writes
    pub fn installation(&self) -> &ResourceRef {
        &self.installation
    }

    /// Reset counters for a new pass over `hosts_count` hosts and persist
    pub async fn begin(&self, hosts_count: u32) {
        let mut status = self.status.lock().await;
        *status = ClickHouseInstallationStatus::starting(hosts_count);
        self.persist(&status).await;
    }

    /// Count a host whose StatefulSet was created and persist
    pub async fn record_added(&self) {
        let mut status = self.status.lock().await;
        status.added_hosts_count += 1;
        debug!(installation = %self.installation, added = status.added_hosts_count, "host added");
        self.persist(&status).await;
    }

    /// Count a host whose StatefulSet was updated and persist
    pub async fn record_updated(&self) {
        let mut status = self.status.lock().await;
        status.updated_hosts_count += 1;
        debug!(installation = %self.installation, updated = status.updated_hosts_count, "host updated");
        self.persist(&status).await;
    }

    /// Mark the pass as finished, with the error that stopped it if any
    pub async fn finish(&self, error: Option<String>) {
        let mut status = self.status.lock().await;
        status.status = if error.is_some() {
            ReconcilePhase::Aborted
        } else {
            ReconcilePhase::Completed
        };
        status.error = error;
        self.persist(&status).await;
    }

    /// Copy of the in-memory status
    pub async fn snapshot(&self) -> ClickHouseInstallationStatus {
        self.status.lock().await.clone()
    }

    async fn persist(&self, status: &ClickHouseInstallationStatus) {
        if let Err(e) = self
            .client
            .patch_installation_status(&self.installation, status)
            .await
        {
            warn!(
                installation = %self.installation,
                error = %e,
                "failed to persist installation status, will retry with next update"
            );
        }
    }
}
