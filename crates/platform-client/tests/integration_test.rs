//! Integration tests for the Kubernetes platform client
//!
//! These tests require a reachable cluster (kubeconfig or in-cluster
//! credentials) and write to the namespace in `ZK_TEST_NAMESPACE`
//! (default `default`).

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use platform_client::{ChildKind, ChildResource, KubePlatformClient, PlatformClient};
use std::collections::BTreeMap;

fn namespace() -> String {
    std::env::var("ZK_TEST_NAMESPACE").unwrap_or_else(|_| "default".to_string())
}

fn config_map(name: &str, value: &str) -> ChildResource {
    ChildResource::ConfigMap(ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([("tick".to_string(), value.to_string())])),
        ..Default::default()
    })
}

#[tokio::test]
#[ignore] // Requires running cluster
async fn test_config_map_lifecycle() {
    let client = kube::Client::try_default().await.expect("Failed to create kube client");
    let platform = KubePlatformClient::new(client);
    let ns = namespace();
    let name = "zk-integration-config";

    platform.delete(ChildKind::ConfigMap, name, &ns).await.expect("Cleanup failed");
    assert!(!platform.exists(ChildKind::ConfigMap, name, &ns).await.unwrap());

    platform.create(&config_map(name, "2000")).await.expect("Create failed");
    assert!(platform.exists(ChildKind::ConfigMap, name, &ns).await.unwrap());

    let err = platform.create(&config_map(name, "2000")).await.unwrap_err();
    assert!(err.is_already_exists(), "Second create should conflict: {err}");

    // Server-side apply twice: idempotent
    platform.update(&config_map(name, "3000")).await.expect("Update failed");
    platform.update(&config_map(name, "3000")).await.expect("Repeated update failed");

    platform.delete(ChildKind::ConfigMap, name, &ns).await.expect("Delete failed");
    // Deleting an absent object is a success
    platform.delete(ChildKind::ConfigMap, name, &ns).await.expect("Repeated delete failed");
}

#[tokio::test]
#[ignore]
async fn test_missing_crd_lookup() {
    let client = kube::Client::try_default().await.expect("Failed to create kube client");
    let platform = KubePlatformClient::new(client);

    let crd = platform
        .get_custom_resource_definition("nothing.zookeeper.microscaler.io")
        .await
        .expect("Lookup failed");
    assert!(crd.is_none());
}
