//! Desired objects for one installation, read from a multi-document manifest
//!
//! Stands in for the model builder: every document is a ConfigMap, a Service
//! or a StatefulSet, each StatefulSet backing one host.

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::host::{HostHandle, HostTask, ResourceRef};
use crate::Error;

/// Label naming the host a StatefulSet backs; defaults to the StatefulSet name
pub const HOST_LABEL: &str = "clickhouse.altinity.com/host";

/// Desired objects grouped in the order they are reconciled
#[derive(Clone, Debug, Default)]
pub struct Manifest {
    /// Configuration blobs, reconciled first
    pub config_maps: Vec<ConfigMap>,
    /// Network endpoints, reconciled after ConfigMaps
    pub services: Vec<Service>,
    /// One workload per host, reconciled last
    pub stateful_sets: Vec<StatefulSet>,
}

impl Manifest {
    /// Parse a multi-document YAML manifest
    ///
    /// Objects without a namespace are placed in `default_namespace`.
    /// Documents without an apiVersion (comments, blanks) are skipped.
    pub fn from_yaml(yaml: &str, default_namespace: &str) -> Result<Self, Error> {
        let mut manifest = Self::default();
        for doc in yaml.split("\n---") {
            let doc = doc.trim();
            if !doc.contains("apiVersion") {
                continue;
            }
            let mut value: serde_json::Value = serde_yaml::from_str(doc)
                .map_err(|e| Error::serialization(format!("invalid manifest document: {e}")))?;

            let kind = value
                .get("kind")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::serialization("manifest document missing kind"))?
                .to_string();

            if value.pointer("/metadata/namespace").is_none() {
                if let Some(metadata) = value.get_mut("metadata").and_then(|m| m.as_object_mut()) {
                    metadata.insert(
                        "namespace".to_string(),
                        serde_json::Value::String(default_namespace.to_string()),
                    );
                }
            }

            match kind.as_str() {
                "ConfigMap" => manifest.config_maps.push(decode(&kind, value)?),
                "Service" => manifest.services.push(decode(&kind, value)?),
                "StatefulSet" => manifest.stateful_sets.push(decode(&kind, value)?),
                other => {
                    return Err(Error::serialization_for_kind(
                        other,
                        "unsupported kind, expected ConfigMap, Service or StatefulSet",
                    ))
                }
            }
        }
        debug!(
            config_maps = manifest.config_maps.len(),
            services = manifest.services.len(),
            stateful_sets = manifest.stateful_sets.len(),
            "parsed manifest"
        );
        Ok(manifest)
    }

    /// One host task per StatefulSet, owned by `installation`
    pub fn host_tasks(&self, installation: &ResourceRef) -> Result<Vec<HostTask>, Error> {
        self.stateful_sets
            .iter()
            .map(|sts| {
                let resource = ResourceRef::from_object(sts)?;
                let name = sts
                    .metadata
                    .labels
                    .as_ref()
                    .and_then(|labels| labels.get(HOST_LABEL))
                    .cloned()
                    .unwrap_or(resource.name);
                Ok(HostTask {
                    host: HostHandle::new(name, installation.clone()),
                    desired: sts.clone(),
                })
            })
            .collect()
    }
}

fn decode<K: DeserializeOwned>(kind: &str, value: serde_json::Value) -> Result<K, Error> {
    serde_json::from_value(value).map_err(|e| Error::serialization_for_kind(kind, e.to_string()))
}
