//! Headless Service giving each ensemble member a stable DNS name.

use super::{CLIENT_PORT, ELECTION_PORT, SERVER_PORT, headless_service_name, object_meta};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use std::collections::BTreeMap;

fn port(name: &str, port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        ..Default::default()
    }
}

/// Build the headless Service (`clusterIP: None`) for a cluster.
pub fn build(cluster: &str, namespace: &str, labels: &BTreeMap<String, String>) -> Service {
    Service {
        metadata: object_meta(headless_service_name(cluster), namespace, labels),
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            ports: Some(vec![
                port("server", SERVER_PORT),
                port("leader-election", ELECTION_PORT),
                port("client", CLIENT_PORT),
            ]),
            selector: Some(labels.clone()),
            ..Default::default()
        }),
        ..Default::default()
    }
}
