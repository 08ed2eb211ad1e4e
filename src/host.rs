//! Identity types linking workloads back to the hosts and installations that own them

use k8s_openapi::api::apps::v1::StatefulSet;
use kube::ResourceExt;

use crate::Error;

/// Namespace-qualified name of a Kubernetes object
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    /// Object namespace
    pub namespace: String,
    /// Object name
    pub name: String,
}

impl ResourceRef {
    /// Create a reference from namespace and name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Build a reference from an object's metadata
    ///
    /// Fails when the object has no name or no namespace, since every
    /// workload this engine touches is namespaced.
    pub fn from_object<K: kube::Resource>(obj: &K) -> Result<Self, Error> {
        let name = obj
            .meta()
            .name
            .clone()
            .ok_or_else(|| Error::validation("object has no metadata.name"))?;
        let namespace = obj
            .namespace()
            .ok_or_else(|| Error::validation_for(&name, "object has no metadata.namespace"))?;
        Ok(Self { namespace, name })
    }

    /// Name of the first (and only) pod of a single-replica StatefulSet
    pub fn first_pod_name(&self) -> String {
        format!("{}-0", self.name)
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl std::str::FromStr for ResourceRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(ns, name))
            }
            _ => Err(Error::validation(format!(
                "invalid resource reference: {s}, expected <namespace>/<name>"
            ))),
        }
    }
}

/// Back-reference from a StatefulSet to the host it backs
///
/// One handle per host. The handle never owns the StatefulSet: deleting a
/// workload is the failure policy's decision, not the host's.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostHandle {
    /// Host name within the installation (e.g. "0-1" for shard 0, replica 1)
    pub name: String,
    /// The owning ClickHouseInstallation
    pub installation: ResourceRef,
}

impl HostHandle {
    /// Create a handle for a host of the given installation
    pub fn new(name: impl Into<String>, installation: ResourceRef) -> Self {
        Self {
            name: name.into(),
            installation,
        }
    }
}

/// Desired StatefulSet for one host, as produced by the model builder
#[derive(Clone, Debug)]
pub struct HostTask {
    /// Host the StatefulSet belongs to
    pub host: HostHandle,
    /// Desired workload object
    pub desired: StatefulSet,
}
