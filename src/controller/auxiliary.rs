//! Upsert of the ConfigMaps and Services that accompany each host
//!
//! No convergence wait: these objects take effect as soon as they are stored.

use std::sync::Arc;

use k8s_openapi::api::core::v1::{ConfigMap, Service};
use tracing::{debug, info};

use crate::client::AuxiliaryClient;
use crate::host::ResourceRef;
use crate::Error;

/// Creates or replaces auxiliary objects by name
#[derive(Clone)]
pub struct AuxiliaryReconciler {
    client: Arc<dyn AuxiliaryClient>,
}

impl AuxiliaryReconciler {
    /// Create a reconciler over the given client
    pub fn new(client: Arc<dyn AuxiliaryClient>) -> Self {
        Self { client }
    }

    /// Create `desired` or replace the existing ConfigMap of the same name
    pub async fn upsert_config_map(&self, desired: ConfigMap) -> Result<ConfigMap, Error> {
        let resource = ResourceRef::from_object(&desired)?;
        match self.client.get_config_map(&resource).await? {
            Some(_) => {
                debug!(%resource, "updating ConfigMap");
                self.client.update_config_map(&desired).await
            }
            None => {
                info!(%resource, "creating ConfigMap");
                self.client.create_config_map(&desired).await
            }
        }
    }

    /// Create `desired` or replace the existing Service of the same name
    ///
    /// The live resourceVersion and cluster IPs are copied into `desired`
    /// before the replace: the API server requires the former and refuses
    /// to change the latter.
    pub async fn upsert_service(&self, mut desired: Service) -> Result<Service, Error> {
        let resource = ResourceRef::from_object(&desired)?;
        match self.client.get_service(&resource).await? {
            Some(current) => {
                debug!(%resource, "updating Service");
                preserve_service_fields(&current, &mut desired);
                self.client.update_service(&desired).await
            }
            None => {
                info!(%resource, "creating Service");
                self.client.create_service(&desired).await
            }
        }
    }
}

fn preserve_service_fields(current: &Service, desired: &mut Service) {
    desired.metadata.resource_version = current.metadata.resource_version.clone();
    let Some(live) = current.spec.as_ref() else {
        return;
    };
    let spec = desired.spec.get_or_insert_with(Default::default);
    spec.cluster_ip = live.cluster_ip.clone();
    spec.cluster_ips = live.cluster_ips.clone();
}
