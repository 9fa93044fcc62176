//! Ensemble configuration consumed by the member pods as environment.

use super::{config_map_name, object_meta, stateful_set_name};
use k8s_openapi::api::core::v1::ConfigMap;
use std::collections::BTreeMap;

/// JVM heap size of each member
pub const JVM_HEAP: &str = "512M";
/// Tick length in milliseconds
pub const TICK_TIME: &str = "2000";
/// Ticks a follower may take to connect and sync
pub const INIT_LIMIT: &str = "10";
/// Ticks a follower may lag behind the leader
pub const SYNC_LIMIT: &str = "5";
/// Concurrent connections per client address
pub const MAX_CLIENT_CNXNS: &str = "60";
/// Snapshots kept by autopurge
pub const SNAP_RETAIN_COUNT: &str = "3";
/// Autopurge interval in hours
pub const PURGE_INTERVAL: &str = "1";

/// ConfigMap keys, paired with the `ZK_*` variable each one feeds.
pub const ENV_KEYS: [(&str, &str); 8] = [
    ("ZK_ENSEMBLE", "ensemble"),
    ("ZK_HEAP_SIZE", "jvm.heap"),
    ("ZK_TICK_TIME", "tick"),
    ("ZK_INIT_LIMIT", "init"),
    ("ZK_SYNC_LIMIT", "sync"),
    ("ZK_MAX_CLIENT_CNXNS", "client.cnxns"),
    ("ZK_SNAP_RETAIN_COUNT", "snap.retain"),
    ("ZK_PURGE_INTERVAL", "purge.interval"),
];

/// Ensemble member list: one StatefulSet pod name per replica, `;`-separated.
pub fn ensemble(cluster: &str, replicas: i32) -> String {
    let base = stateful_set_name(cluster);
    (0..replicas)
        .map(|ordinal| format!("{base}-{ordinal}"))
        .collect::<Vec<_>>()
        .join(";")
}

/// Build the ConfigMap for a cluster.
pub fn build(
    cluster: &str,
    namespace: &str,
    replicas: i32,
    labels: &BTreeMap<String, String>,
) -> ConfigMap {
    let data = BTreeMap::from([
        ("ensemble".to_string(), ensemble(cluster, replicas)),
        ("jvm.heap".to_string(), JVM_HEAP.to_string()),
        ("tick".to_string(), TICK_TIME.to_string()),
        ("init".to_string(), INIT_LIMIT.to_string()),
        ("sync".to_string(), SYNC_LIMIT.to_string()),
        ("client.cnxns".to_string(), MAX_CLIENT_CNXNS.to_string()),
        ("snap.retain".to_string(), SNAP_RETAIN_COUNT.to_string()),
        ("purge.interval".to_string(), PURGE_INTERVAL.to_string()),
    ]);

    ConfigMap {
        metadata: object_meta(config_map_name(cluster), namespace, labels),
        data: Some(data),
        ..Default::default()
    }
}
