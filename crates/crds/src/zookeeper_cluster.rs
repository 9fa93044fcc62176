//! ZookeeperCluster CRD
//!
//! Declares a ZooKeeper ensemble: how many members to run and how much
//! CPU/memory each member gets.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group of the ZookeeperCluster CRD
pub const GROUP: &str = "zookeeper.microscaler.io";

/// Kind of the ZookeeperCluster CRD
pub const KIND: &str = "ZookeeperCluster";

/// Full CRD name (`<plural>.<group>`), used for registration and rollback
pub const CRD_NAME: &str = "zookeeperclusters.zookeeper.microscaler.io";

/// Namespace assumed when a cluster carries none
pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "zookeeper.microscaler.io",
    version = "v1alpha1",
    kind = "ZookeeperCluster",
    plural = "zookeeperclusters",
    shortname = "zkc",
    namespaced,
    derive = "PartialEq",
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".spec.replicas"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ZookeeperClusterSpec {
    /// Number of ensemble members
    #[serde(default = "default_replicas")]
    #[schemars(range(min = 0))]
    pub replicas: i32,

    /// Per-member resource request (defaults apply to absent fields)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ClusterResources>,
}

/// CPU and memory for each ensemble member.
///
/// Values are Kubernetes quantity strings ("500m", "1Gi", ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterResources {
    /// CPU quantity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    /// Memory quantity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

fn default_replicas() -> i32 {
    3
}

impl ZookeeperCluster {
    /// Namespace of the cluster, falling back to `default`.
    pub fn namespace_or_default(&self) -> String {
        self.namespace().unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
    }

    /// `namespace/name` identity used for logging and event ordering.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace_or_default(), self.name_any())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_crd_name_matches_constant() {
        let crd = ZookeeperCluster::crd();
        assert_eq!(crd.metadata.name.as_deref(), Some(CRD_NAME));
        assert_eq!(crd.spec.group, GROUP);
        assert_eq!(crd.spec.names.kind, KIND);
    }

    #[test]
    fn test_replicas_default_when_omitted() {
        let spec: ZookeeperClusterSpec = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(spec.replicas, 3);
        assert!(spec.resources.is_none());
    }

    #[test]
    fn test_clusters_compare_by_value() {
        let spec = ZookeeperClusterSpec { replicas: 3, resources: None };
        let a = ZookeeperCluster::new("zk", spec.clone());
        let b = ZookeeperCluster::new("zk", spec);
        assert_eq!(a, b);
        let scaled = ZookeeperClusterSpec { replicas: 5, resources: None };
        assert_ne!(a, ZookeeperCluster::new("zk", scaled));
    }

    #[test]
    fn test_key_defaults_namespace() {
        let spec = ZookeeperClusterSpec { replicas: 1, resources: None };
        let cluster = ZookeeperCluster::new("zk", spec);
        assert_eq!(cluster.key(), "default/zk");
    }
}
