//! Desired-state translation.
//!
//! Turns a `ZookeeperCluster` into the three child objects that make up a
//! running ensemble: a headless Service for peer discovery, a ConfigMap with
//! the ensemble settings, and the StatefulSet running the members. Translation
//! is pure: the same cluster always yields the same objects.

pub mod config_map;
pub mod service;
pub mod stateful_set;

use crate::error::ReconcileError;
use crds::ZookeeperCluster;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

pub use stateful_set::scaled_to_zero;

/// Default ZooKeeper container image
pub const DEFAULT_IMAGE: &str = "gcr.io/google_samples/k8szk:v1";

/// Client connections
pub const CLIENT_PORT: i32 = 2181;
/// Follower-to-leader traffic
pub const SERVER_PORT: i32 = 2888;
/// Leader election
pub const ELECTION_PORT: i32 = 3888;

/// Value of the `app.kubernetes.io/managed-by` label
pub const MANAGED_BY: &str = "zookeeper-controller";

/// Knobs that are not part of the cluster resource itself.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatorSettings {
    /// Container image for ensemble members
    pub image: String,
}

impl Default for TranslatorSettings {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
        }
    }
}

/// Child objects derived from one cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildResourceSet {
    /// Headless peer-discovery Service
    pub service: Service,
    /// Ensemble configuration
    pub config_map: ConfigMap,
    /// Ensemble members
    pub stateful_set: StatefulSet,
}

/// Name of the headless Service for a cluster.
pub fn headless_service_name(cluster: &str) -> String {
    format!("{cluster}-headless")
}

/// Name of the ConfigMap for a cluster.
pub fn config_map_name(cluster: &str) -> String {
    format!("{cluster}-config")
}

/// Name of the StatefulSet for a cluster.
pub fn stateful_set_name(cluster: &str) -> String {
    cluster.to_string()
}

/// Labels stamped on every child object and used as pod selector.
pub fn labels(cluster: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_string(), "zookeeper".to_string()),
        ("app.kubernetes.io/instance".to_string(), cluster.to_string()),
        ("app.kubernetes.io/managed-by".to_string(), MANAGED_BY.to_string()),
    ])
}

pub(crate) fn object_meta(
    name: String,
    namespace: &str,
    labels: &BTreeMap<String, String>,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: Some(namespace.to_string()),
        labels: Some(labels.clone()),
        ..Default::default()
    }
}

/// Translate a cluster into its child resources.
///
/// Fails with `TranslationInvalid` only when the cluster has no name or a
/// negative replica count; malformed resource quantities fall back to defaults.
pub fn translate(
    cluster: &ZookeeperCluster,
    settings: &TranslatorSettings,
) -> Result<ChildResourceSet, ReconcileError> {
    let name = cluster
        .metadata
        .name
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ReconcileError::TranslationInvalid("cluster has no name".to_string()))?;

    let replicas = cluster.spec.replicas;
    if replicas < 0 {
        return Err(ReconcileError::TranslationInvalid(format!(
            "cluster {name} has negative replica count {replicas}"
        )));
    }

    let namespace = cluster.namespace_or_default();
    let labels = labels(name);

    Ok(ChildResourceSet {
        service: service::build(name, &namespace, &labels),
        config_map: config_map::build(name, &namespace, replicas, &labels),
        stateful_set: stateful_set::build(
            name,
            &namespace,
            replicas,
            cluster.spec.resources.as_ref(),
            &labels,
            settings,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_cluster;

    #[test]
    fn test_translate_is_deterministic() {
        let cluster = create_test_cluster("zk", "zookeeper", 3);
        let settings = TranslatorSettings::default();

        let first = translate(&cluster, &settings).unwrap();
        let second = translate(&cluster, &settings).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_child_names_and_namespace() {
        let cluster = create_test_cluster("zk", "zookeeper", 3);
        let children = translate(&cluster, &TranslatorSettings::default()).unwrap();

        assert_eq!(children.service.metadata.name.as_deref(), Some("zk-headless"));
        assert_eq!(children.config_map.metadata.name.as_deref(), Some("zk-config"));
        assert_eq!(children.stateful_set.metadata.name.as_deref(), Some("zk"));
        for ns in [
            &children.service.metadata.namespace,
            &children.config_map.metadata.namespace,
            &children.stateful_set.metadata.namespace,
        ] {
            assert_eq!(ns.as_deref(), Some("zookeeper"));
        }
    }

    #[test]
    fn test_missing_namespace_defaults() {
        let mut cluster = create_test_cluster("zk", "zookeeper", 1);
        cluster.metadata.namespace = None;
        let children = translate(&cluster, &TranslatorSettings::default()).unwrap();
        assert_eq!(children.service.metadata.namespace.as_deref(), Some("default"));
    }

    #[test]
    fn test_labels_on_every_child() {
        let cluster = create_test_cluster("zk", "zookeeper", 3);
        let children = translate(&cluster, &TranslatorSettings::default()).unwrap();
        let expected = labels("zk");

        assert_eq!(children.service.metadata.labels.as_ref(), Some(&expected));
        assert_eq!(children.config_map.metadata.labels.as_ref(), Some(&expected));
        assert_eq!(children.stateful_set.metadata.labels.as_ref(), Some(&expected));
        assert_eq!(expected.get("app.kubernetes.io/instance").map(String::as_str), Some("zk"));
    }

    #[test]
    fn test_negative_replicas_rejected() {
        let cluster = create_test_cluster("zk", "zookeeper", -1);
        let err = translate(&cluster, &TranslatorSettings::default()).unwrap_err();
        assert!(matches!(err, ReconcileError::TranslationInvalid(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_nameless_cluster_rejected() {
        let mut cluster = create_test_cluster("zk", "zookeeper", 3);
        cluster.metadata.name = None;
        assert!(matches!(
            translate(&cluster, &TranslatorSettings::default()),
            Err(ReconcileError::TranslationInvalid(_))
        ));
    }

    #[test]
    fn test_zero_replicas_is_valid() {
        let cluster = create_test_cluster("zk", "zookeeper", 0);
        let children = translate(&cluster, &TranslatorSettings::default()).unwrap();
        let spec = children.stateful_set.spec.unwrap();
        assert_eq!(spec.replicas, Some(0));
    }
}
