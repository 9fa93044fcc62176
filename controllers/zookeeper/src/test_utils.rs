//! Test utilities for unit testing the controller
//!
//! This module provides helpers for creating test data and setting up test scenarios.

use crate::metrics::Metrics;
use crate::processor::{Processor, RetryPolicy};
use crate::resources::TranslatorSettings;
use crds::{ClusterResources, ZookeeperCluster, ZookeeperClusterSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use platform_client::MockPlatformClient;
use std::sync::Arc;

/// Helper to create a test ZookeeperCluster
pub fn create_test_cluster(name: &str, namespace: &str, replicas: i32) -> ZookeeperCluster {
    ZookeeperCluster {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            resource_version: Some("1".to_string()),
            ..Default::default()
        },
        spec: ZookeeperClusterSpec {
            replicas,
            resources: Some(ClusterResources::default()),
        },
    }
}

/// Same cluster at a new resource version with a different replica count
pub fn bump(cluster: &ZookeeperCluster, resource_version: &str, replicas: i32) -> ZookeeperCluster {
    let mut next = cluster.clone();
    next.metadata.resource_version = Some(resource_version.to_string());
    next.spec.replicas = replicas;
    next
}

/// Processor over a fresh mock with a fast retry policy
pub fn create_test_processor(
    max_attempts: u32,
) -> (Processor<MockPlatformClient>, MockPlatformClient) {
    let mock = MockPlatformClient::new();
    let metrics = Metrics::new().unwrap();
    let retry = RetryPolicy {
        max_attempts,
        ..RetryPolicy::default()
    };
    let processor =
        Processor::new(Arc::new(mock.clone()), TranslatorSettings::default(), retry, metrics);
    (processor, mock)
}
