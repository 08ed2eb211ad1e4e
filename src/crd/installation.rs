//! ClickHouseInstallation Custom Resource Definition
//!
//! Only the parts the convergence engine touches are modelled: the status
//! counters written during a reconciliation pass. Cluster layout, templates
//! and settings are kept opaque in the spec and handled by the model builder.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for a ClickHouseInstallation
///
/// The engine never reads the spec; it is preserved as-is so the CRD can be
/// served and round-tripped without losing fields.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "clickhouse.altinity.com",
    version = "v1",
    kind = "ClickHouseInstallation",
    plural = "clickhouseinstallations",
    shortname = "chi",
    status = "ClickHouseInstallationStatus",
    namespaced,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.status"}"#,
    printcolumn = r#"{"name":"Hosts","type":"integer","jsonPath":".status.hostsCount"}"#,
    printcolumn = r#"{"name":"Added","type":"integer","jsonPath":".status.addedHostsCount"}"#,
    printcolumn = r#"{"name":"Updated","type":"integer","jsonPath":".status.updatedHostsCount"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClickHouseInstallationSpec {
    /// Cluster layout, templates and settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub configuration: Option<serde_json::Value>,
}

fn preserve_unknown_fields(_: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
    use schemars::schema::{InstanceType, Schema, SchemaObject};

    let mut schema = SchemaObject {
        instance_type: Some(InstanceType::Object.into()),
        ..Default::default()
    };
    schema.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".to_string(),
        serde_json::Value::Bool(true),
    );
    Schema::Object(schema)
}

/// Progress of the reconciliation pass over an installation
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ReconcilePhase {
    /// A pass is running
    #[default]
    InProgress,
    /// The last pass reconciled every host
    Completed,
    /// The last pass stopped before reconciling every host
    Aborted,
}

impl std::fmt::Display for ReconcilePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProgress => write!(f, "InProgress"),
            Self::Completed => write!(f, "Completed"),
            Self::Aborted => write!(f, "Aborted"),
        }
    }
}

/// Status for a ClickHouseInstallation
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClickHouseInstallationStatus {
    /// Phase of the current or last reconciliation pass
    #[serde(default)]
    pub status: ReconcilePhase,

    /// Number of hosts scheduled in the current pass
    #[serde(default)]
    pub hosts_count: u32,

    /// Hosts whose StatefulSet was created in the current pass
    #[serde(default)]
    pub added_hosts_count: u32,

    /// Hosts whose StatefulSet was updated in the current pass
    #[serde(default)]
    pub updated_hosts_count: u32,

    /// Last error that stopped a pass
    ///
    /// Always serialized: a `null` in a merge patch clears the error left by
    /// an earlier pass.
    #[serde(default)]
    pub error: Option<String>,
}

impl ClickHouseInstallationStatus {
    /// Status at the start of a pass over `hosts_count` hosts
    pub fn starting(hosts_count: u32) -> Self {
        Self {
            status: ReconcilePhase::InProgress,
            hosts_count,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_status_serializes_camel_case() {
        let status = ClickHouseInstallationStatus {
            added_hosts_count: 2,
            updated_hosts_count: 3,
            ..ClickHouseInstallationStatus::starting(5)
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "InProgress");
        assert_eq!(json["hostsCount"], 5);
        assert_eq!(json["addedHostsCount"], 2);
        assert_eq!(json["updatedHostsCount"], 3);
        assert_eq!(json.get("error"), Some(&serde_json::Value::Null));
    }

    #[test]
    fn test_spec_configuration_round_trips_unknown_fields() {
        let yaml = r#"
configuration:
  clusters:
    - name: prod
      layout:
        shardsCount: 2
        replicasCount: 2
"#;
        let spec: ClickHouseInstallationSpec = serde_yaml::from_str(yaml).unwrap();
        let config = spec.configuration.as_ref().unwrap();
        assert_eq!(config["clusters"][0]["layout"]["shardsCount"], 2);
    }

    #[test]
    fn test_crd_metadata() {
        let crd = ClickHouseInstallation::crd();
        assert_eq!(
            crd.metadata.name.as_deref(),
            Some("clickhouseinstallations.clickhouse.altinity.com")
        );
        assert_eq!(crd.spec.names.short_names, Some(vec!["chi".to_string()]));
        assert_eq!(crd.spec.scope, "Namespaced");
    }
}
