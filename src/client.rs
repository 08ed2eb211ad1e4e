//! Platform seam: traits over the Kubernetes API used by the engine
//!
//! Each trait has a kube-rs implementation for production and a `mockall`
//! mock for tests. Getters return `Ok(None)` for a 404 so callers can tell
//! "not there yet" apart from a failed call without inspecting error codes.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service};
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::Client;
use tracing::trace;

#[cfg(test)]
use mockall::automock;

use crate::crd::{ClickHouseInstallation, ClickHouseInstallationStatus};
use crate::host::ResourceRef;
use crate::{Error, FIELD_MANAGER};

/// StatefulSet and pod operations used by the create, update and rollback paths
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkloadClient: Send + Sync {
    /// Read a StatefulSet directly from the API server
    async fn get_stateful_set(&self, resource: &ResourceRef)
        -> Result<Option<StatefulSet>, Error>;

    /// Read a StatefulSet for status polling
    ///
    /// Served from the watch cache when one is available, otherwise the same
    /// as [`WorkloadClient::get_stateful_set`].
    async fn observe_stateful_set(
        &self,
        resource: &ResourceRef,
    ) -> Result<Option<StatefulSet>, Error>;

    /// Create a StatefulSet, returning the object with server-populated fields
    async fn create_stateful_set(&self, sts: &StatefulSet) -> Result<StatefulSet, Error>;

    /// Replace a StatefulSet, returning the object with its new generation
    async fn update_stateful_set(&self, sts: &StatefulSet) -> Result<StatefulSet, Error>;

    /// Delete a StatefulSet
    async fn delete_stateful_set(&self, resource: &ResourceRef) -> Result<(), Error>;

    /// Delete a pod so its StatefulSet recreates it from the current template
    async fn delete_pod(&self, resource: &ResourceRef) -> Result<(), Error>;
}

/// ConfigMap and Service operations used by the auxiliary upsert
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AuxiliaryClient: Send + Sync {
    /// Read a ConfigMap
    async fn get_config_map(&self, resource: &ResourceRef) -> Result<Option<ConfigMap>, Error>;

    /// Create a ConfigMap
    async fn create_config_map(&self, cm: &ConfigMap) -> Result<ConfigMap, Error>;

    /// Replace a ConfigMap
    async fn update_config_map(&self, cm: &ConfigMap) -> Result<ConfigMap, Error>;

    /// Read a Service
    async fn get_service(&self, resource: &ResourceRef) -> Result<Option<Service>, Error>;

    /// Create a Service
    async fn create_service(&self, svc: &Service) -> Result<Service, Error>;

    /// Replace a Service
    async fn update_service(&self, svc: &Service) -> Result<Service, Error>;
}

/// Status writes on the owning ClickHouseInstallation
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusClient: Send + Sync {
    /// Merge-patch the status subresource of an installation
    async fn patch_installation_status(
        &self,
        installation: &ResourceRef,
        status: &ClickHouseInstallationStatus,
    ) -> Result<(), Error>;
}

/// Real workload client backed by the API server and an optional watch cache
pub struct WorkloadClientImpl {
    client: Client,
    cache: Option<Store<StatefulSet>>,
}

impl WorkloadClientImpl {
    /// Create a client that always reads from the API server
    pub fn new(client: Client) -> Self {
        Self {
            client,
            cache: None,
        }
    }

    /// Create a client that polls status from a reflector store
    pub fn with_cache(client: Client, cache: Store<StatefulSet>) -> Self {
        Self {
            client,
            cache: Some(cache),
        }
    }

    fn stateful_sets(&self, namespace: &str) -> Api<StatefulSet> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn namespace_of(sts: &StatefulSet) -> Result<&str, Error> {
        sts.metadata
            .namespace
            .as_deref()
            .ok_or_else(|| Error::validation("StatefulSet has no metadata.namespace"))
    }

    fn name_of(sts: &StatefulSet) -> Result<&str, Error> {
        sts.metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::validation("StatefulSet has no metadata.name"))
    }
}

#[async_trait]
impl WorkloadClient for WorkloadClientImpl {
    async fn get_stateful_set(
        &self,
        resource: &ResourceRef,
    ) -> Result<Option<StatefulSet>, Error> {
        Ok(self
            .stateful_sets(&resource.namespace)
            .get_opt(&resource.name)
            .await?)
    }

    async fn observe_stateful_set(
        &self,
        resource: &ResourceRef,
    ) -> Result<Option<StatefulSet>, Error> {
        match &self.cache {
            Some(store) => {
                let key = ObjectRef::new(&resource.name).within(&resource.namespace);
                trace!(%resource, "reading StatefulSet from watch cache");
                Ok(store.get(&key).map(|sts| (*sts).clone()))
            }
            None => self.get_stateful_set(resource).await,
        }
    }

    async fn create_stateful_set(&self, sts: &StatefulSet) -> Result<StatefulSet, Error> {
        let api = self.stateful_sets(Self::namespace_of(sts)?);
        Ok(api.create(&PostParams::default(), sts).await?)
    }

    async fn update_stateful_set(&self, sts: &StatefulSet) -> Result<StatefulSet, Error> {
        let api = self.stateful_sets(Self::namespace_of(sts)?);
        Ok(api
            .replace(Self::name_of(sts)?, &PostParams::default(), sts)
            .await?)
    }

    async fn delete_stateful_set(&self, resource: &ResourceRef) -> Result<(), Error> {
        self.stateful_sets(&resource.namespace)
            .delete(&resource.name, &DeleteParams::foreground())
            .await?;
        Ok(())
    }

    async fn delete_pod(&self, resource: &ResourceRef) -> Result<(), Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &resource.namespace);
        api.delete(&resource.name, &DeleteParams::default()).await?;
        Ok(())
    }
}

/// Real auxiliary client backed by the API server
pub struct AuxiliaryClientImpl {
    client: Client,
}

impl AuxiliaryClientImpl {
    /// Create a new AuxiliaryClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: Option<&str>) -> Result<Api<K>, Error>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        let namespace = namespace.ok_or_else(|| Error::validation("object has no namespace"))?;
        Ok(Api::namespaced(self.client.clone(), namespace))
    }
}

#[async_trait]
impl AuxiliaryClient for AuxiliaryClientImpl {
    async fn get_config_map(&self, resource: &ResourceRef) -> Result<Option<ConfigMap>, Error> {
        let api: Api<ConfigMap> = self.api(Some(&resource.namespace))?;
        Ok(api.get_opt(&resource.name).await?)
    }

    async fn create_config_map(&self, cm: &ConfigMap) -> Result<ConfigMap, Error> {
        let api: Api<ConfigMap> = self.api(cm.metadata.namespace.as_deref())?;
        Ok(api.create(&PostParams::default(), cm).await?)
    }

    async fn update_config_map(&self, cm: &ConfigMap) -> Result<ConfigMap, Error> {
        let api: Api<ConfigMap> = self.api(cm.metadata.namespace.as_deref())?;
        let name = cm
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::validation("ConfigMap has no metadata.name"))?;
        Ok(api.replace(name, &PostParams::default(), cm).await?)
    }

    async fn get_service(&self, resource: &ResourceRef) -> Result<Option<Service>, Error> {
        let api: Api<Service> = self.api(Some(&resource.namespace))?;
        Ok(api.get_opt(&resource.name).await?)
    }

    async fn create_service(&self, svc: &Service) -> Result<Service, Error> {
        let api: Api<Service> = self.api(svc.metadata.namespace.as_deref())?;
        Ok(api.create(&PostParams::default(), svc).await?)
    }

    async fn update_service(&self, svc: &Service) -> Result<Service, Error> {
        let api: Api<Service> = self.api(svc.metadata.namespace.as_deref())?;
        let name = svc
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::validation("Service has no metadata.name"))?;
        Ok(api.replace(name, &PostParams::default(), svc).await?)
    }
}

/// Real status client backed by the API server
pub struct StatusClientImpl {
    client: Client,
}

impl StatusClientImpl {
    /// Create a new StatusClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatusClient for StatusClientImpl {
    async fn patch_installation_status(
        &self,
        installation: &ResourceRef,
        status: &ClickHouseInstallationStatus,
    ) -> Result<(), Error> {
        let api: Api<ClickHouseInstallation> =
            Api::namespaced(self.client.clone(), &installation.namespace);

        let body = status_patch(status);

        api.patch_status(
            &installation.name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&body),
        )
        .await?;

        Ok(())
    }
}

/// Merge-patch body for the status subresource
pub(crate) fn status_patch(status: &ClickHouseInstallationStatus) -> serde_json::Value {
    serde_json::json!({
        "status": status
    })
}

/// The three platform clients the engine needs, shareable across tasks
#[derive(Clone)]
pub struct Clients {
    /// StatefulSet and pod operations
    pub workload: Arc<dyn WorkloadClient>,
    /// ConfigMap and Service operations
    pub auxiliary: Arc<dyn AuxiliaryClient>,
    /// Installation status writes
    pub status: Arc<dyn StatusClient>,
}

impl Clients {
    /// Build real clients from a kube Client, optionally polling through a watch cache
    pub fn from_kube(client: Client, cache: Option<Store<StatefulSet>>) -> Self {
        let workload: Arc<dyn WorkloadClient> = match cache {
            Some(store) => Arc::new(WorkloadClientImpl::with_cache(client.clone(), store)),
            None => Arc::new(WorkloadClientImpl::new(client.clone())),
        };
        Self {
            workload,
            auxiliary: Arc::new(AuxiliaryClientImpl::new(client.clone())),
            status: Arc::new(StatusClientImpl::new(client)),
        }
    }
}
