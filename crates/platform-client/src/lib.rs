//! Kubernetes Platform Client
//!
//! The narrow slice of the Kubernetes API the ZooKeeper controller needs:
//! registering its CRD and managing the child resources (headless Service,
//! ConfigMap, StatefulSet) derived from each `ZookeeperCluster`.
//!
//! # Example
//!
//! ```no_run
//! use platform_client::{ChildKind, KubePlatformClient, PlatformClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = KubePlatformClient::new(kube::Client::try_default().await?);
//!
//! if client.exists(ChildKind::StatefulSet, "zk", "default").await? {
//!     client.delete(ChildKind::StatefulSet, "zk", "default").await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `test-util`: enables `MockPlatformClient`, an in-memory implementation
//!   that records every call for ordering assertions.

pub mod client;
pub mod error;
#[cfg(feature = "test-util")]
pub mod mock;
#[path = "trait.rs"]
pub mod platform_trait;
pub mod resources;

pub use client::KubePlatformClient;
pub use error::PlatformError;
pub use platform_trait::PlatformClient;
pub use resources::{ChildKind, ChildResource};
#[cfg(feature = "test-util")]
pub use mock::{MockPlatformClient, Operation, PlatformCall, crd_condition};
