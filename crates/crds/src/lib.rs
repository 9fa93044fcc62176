//! ZooKeeper CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the ZooKeeper controller.

pub mod zookeeper_cluster;

pub use zookeeper_cluster::*;
