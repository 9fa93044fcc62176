//! StatefulSet running the ensemble members.

use super::config_map::ENV_KEYS;
use super::{
    CLIENT_PORT, ELECTION_PORT, SERVER_PORT, TranslatorSettings, config_map_name,
    headless_service_name, object_meta, stateful_set_name,
};
use crds::ClusterResources;
use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Affinity, ConfigMapKeySelector, Container, ContainerPort, EmptyDirVolumeSource, EnvVar,
    EnvVarSource, ExecAction, PodAffinityTerm, PodAntiAffinity, PodSpec, PodTemplateSpec, Probe,
    ResourceRequirements, Volume, VolumeMount, WeightedPodAffinityTerm,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use std::collections::BTreeMap;

/// CPU per member when the cluster does not set a valid one
pub const DEFAULT_CPU: &str = "500m";
/// Memory per member when the cluster does not set a valid one
pub const DEFAULT_MEMORY: &str = "200Mi";

const CONTAINER_NAME: &str = "k8szk";
const DATA_VOLUME: &str = "datadir";
const DATA_DIR: &str = "/var/lib/zookeeper";
const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";

const QUANTITY_SUFFIXES: [&str; 15] = [
    "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "n", "u", "m", "k", "M", "G", "T", "P", "E",
];

/// Whether `value` is a well-formed Kubernetes quantity ("500m", "1.5Gi", "1e3").
pub fn is_valid_quantity(value: &str) -> bool {
    let unsigned = value.strip_prefix(['+', '-']).unwrap_or(value);

    let number_end = unsigned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(unsigned.len());
    let (number, suffix) = unsigned.split_at(number_end);

    let mut parts = number.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let fraction = parts.next();
    let has_digits = !whole.is_empty() || fraction.is_some_and(|f| !f.is_empty());
    if !has_digits || fraction.is_some_and(|f| f.contains('.')) {
        return false;
    }

    if suffix.is_empty() || QUANTITY_SUFFIXES.contains(&suffix) {
        return true;
    }
    // Decimal exponent, e.g. 1e3 or 5E-2
    suffix
        .strip_prefix(['e', 'E'])
        .map(|exp| exp.strip_prefix(['+', '-']).unwrap_or(exp))
        .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
}

fn quantity_or_default(value: Option<&str>, default: &str) -> Quantity {
    let value = value.map(str::trim).filter(|v| is_valid_quantity(v)).unwrap_or(default);
    Quantity(value.to_string())
}

fn resource_list(resources: Option<&ClusterResources>) -> BTreeMap<String, Quantity> {
    let cpu = resources.and_then(|r| r.cpu.as_deref());
    let memory = resources.and_then(|r| r.memory.as_deref());
    BTreeMap::from([
        ("cpu".to_string(), quantity_or_default(cpu, DEFAULT_CPU)),
        ("memory".to_string(), quantity_or_default(memory, DEFAULT_MEMORY)),
    ])
}

fn env(config_map: &str) -> Vec<EnvVar> {
    let from_config = ENV_KEYS.iter().map(|(var, key)| EnvVar {
        name: (*var).to_string(),
        value_from: Some(EnvVarSource {
            config_map_key_ref: Some(ConfigMapKeySelector {
                name: config_map.to_string().into(),
                key: (*key).to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    });

    let ports = [
        ("ZK_CLIENT_PORT", CLIENT_PORT),
        ("ZK_SERVER_PORT", SERVER_PORT),
        ("ZK_ELECTION_PORT", ELECTION_PORT),
    ]
    .into_iter()
    .map(|(var, port)| EnvVar {
        name: var.to_string(),
        value: Some(port.to_string()),
        ..Default::default()
    });

    from_config.chain(ports).collect()
}

fn zk_ok_probe() -> Probe {
    Probe {
        exec: Some(ExecAction {
            command: Some(vec!["zkOk.sh".to_string()]),
        }),
        initial_delay_seconds: Some(10),
        timeout_seconds: Some(5),
        ..Default::default()
    }
}

fn container_port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

fn container(
    cluster: &str,
    resources: Option<&ClusterResources>,
    settings: &TranslatorSettings,
) -> Container {
    let limits = resource_list(resources);
    Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(settings.image.clone()),
        image_pull_policy: Some("Always".to_string()),
        ports: Some(vec![
            container_port("client", CLIENT_PORT),
            container_port("server", SERVER_PORT),
            container_port("leader-election", ELECTION_PORT),
        ]),
        env: Some(env(&config_map_name(cluster))),
        command: Some(vec![
            "sh".to_string(),
            "-c".to_string(),
            "zkGenConfig.sh && zkServer.sh start-foreground".to_string(),
        ]),
        readiness_probe: Some(zk_ok_probe()),
        liveness_probe: Some(zk_ok_probe()),
        resources: Some(ResourceRequirements {
            requests: Some(limits.clone()),
            limits: Some(limits),
            ..Default::default()
        }),
        volume_mounts: Some(vec![VolumeMount {
            name: DATA_VOLUME.to_string(),
            mount_path: DATA_DIR.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

fn anti_affinity(namespace: &str, labels: &BTreeMap<String, String>) -> Affinity {
    let spread = WeightedPodAffinityTerm {
        weight: 100,
        pod_affinity_term: PodAffinityTerm {
            namespaces: Some(vec![namespace.to_string()]),
            label_selector: Some(LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            }),
            topology_key: HOSTNAME_TOPOLOGY_KEY.to_string(),
            ..Default::default()
        },
    };
    Affinity {
        pod_anti_affinity: Some(PodAntiAffinity {
            preferred_during_scheduling_ignored_during_execution: Some(vec![spread]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build the StatefulSet for a cluster.
pub fn build(
    cluster: &str,
    namespace: &str,
    replicas: i32,
    resources: Option<&ClusterResources>,
    labels: &BTreeMap<String, String>,
    settings: &TranslatorSettings,
) -> StatefulSet {
    StatefulSet {
        metadata: object_meta(stateful_set_name(cluster), namespace, labels),
        spec: Some(StatefulSetSpec {
            replicas: Some(replicas),
            service_name: headless_service_name(cluster).into(),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels.clone()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    affinity: Some(anti_affinity(namespace, labels)),
                    containers: vec![container(cluster, resources, settings)],
                    volumes: Some(vec![Volume {
                        name: DATA_VOLUME.to_string(),
                        empty_dir: Some(EmptyDirVolumeSource::default()),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Copy of `stateful_set` with its replica count forced to zero.
///
/// Used by teardown so members stop before the StatefulSet is removed.
pub fn scaled_to_zero(mut stateful_set: StatefulSet) -> StatefulSet {
    if let Some(spec) = stateful_set.spec.as_mut() {
        spec.replicas = Some(0);
    }
    stateful_set
}
