//! Lifecycle events and the channels connecting watcher and processor.
//!
//! Events flow through a bounded channel: when the processor falls behind the
//! watcher blocks instead of dropping notifications. Errors from background
//! tasks travel on a separate unbounded path so they never wait behind events.

use crate::error::ControllerError;
use crds::ZookeeperCluster;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Capacity of the watcher-to-processor channel
pub const EVENT_PIPELINE_CAPACITY: usize = 100;

/// A change to a ZookeeperCluster, as observed by the watcher.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// First sighting of a cluster
    Added(Arc<ZookeeperCluster>),
    /// A known cluster changed
    Updated {
        /// Previous snapshot
        old: Arc<ZookeeperCluster>,
        /// Current snapshot
        new: Arc<ZookeeperCluster>,
    },
    /// The cluster is gone; carries its last known snapshot
    Deleted(Arc<ZookeeperCluster>),
}

impl LifecycleEvent {
    /// The snapshot this event acts on (`new` for updates).
    pub fn cluster(&self) -> &Arc<ZookeeperCluster> {
        match self {
            LifecycleEvent::Added(cluster) | LifecycleEvent::Deleted(cluster) => cluster,
            LifecycleEvent::Updated { new, .. } => new,
        }
    }

    /// `namespace/name` of the cluster.
    pub fn key(&self) -> String {
        self.cluster().key()
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::Added(_) => "added",
            LifecycleEvent::Updated { .. } => "updated",
            LifecycleEvent::Deleted(_) => "deleted",
        }
    }
}

/// Producer side of the event pipeline
pub type EventSender = mpsc::Sender<LifecycleEvent>;
/// Consumer side of the event pipeline
pub type EventReceiver = mpsc::Receiver<LifecycleEvent>;

/// Create the bounded event pipeline.
pub fn pipeline() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_PIPELINE_CAPACITY)
}

/// Cloneable handle for reporting errors from background tasks to the processor.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    sender: mpsc::UnboundedSender<ControllerError>,
}

impl ErrorReporter {
    /// Report an error. Never blocks; dropped if the processor is gone.
    pub fn report(&self, error: ControllerError) {
        if let Err(e) = self.sender.send(error) {
            debug!("Error path closed, dropping report: {}", e.0);
        }
    }
}

/// Create the auxiliary error path.
pub fn error_channel() -> (ErrorReporter, mpsc::UnboundedReceiver<ControllerError>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (ErrorReporter { sender }, receiver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WatchError;
    use crate::test_utils::{bump, create_test_cluster};
    use tokio::sync::mpsc::error::TrySendError;

    fn added(name: &str) -> LifecycleEvent {
        LifecycleEvent::Added(Arc::new(create_test_cluster(name, "default", 3)))
    }

    #[test]
    fn test_event_key_and_kind() {
        let old = create_test_cluster("zk", "zookeeper", 3);
        let new = bump(&old, "2", 5);
        let updated = LifecycleEvent::Updated {
            old: Arc::new(old),
            new: Arc::new(new),
        };
        assert_eq!(updated.key(), "zookeeper/zk");
        assert_eq!(updated.kind(), "updated");
        assert_eq!(updated.cluster().spec.replicas, 5);
    }

    #[test]
    fn test_events_compare_by_snapshot() {
        assert_eq!(added("zk"), added("zk"));
        assert_ne!(added("zk"), added("other"));

        let cluster = Arc::new(create_test_cluster("zk", "default", 3));
        assert_ne!(
            LifecycleEvent::Added(Arc::clone(&cluster)),
            LifecycleEvent::Deleted(cluster)
        );
    }

    #[tokio::test]
    async fn test_pipeline_preserves_order() {
        let (tx, mut rx) = pipeline();
        for i in 0..10 {
            tx.send(added(&format!("zk-{i}"))).await.unwrap();
        }
        drop(tx);

        let mut keys = Vec::new();
        while let Some(event) = rx.recv().await {
            keys.push(event.key());
        }
        let expected: Vec<String> = (0..10).map(|i| format!("default/zk-{i}")).collect();
        assert_eq!(keys, expected);
    }

    #[tokio::test]
    async fn test_full_pipeline_blocks_without_loss() {
        let (tx, mut rx) = pipeline();
        for i in 0..EVENT_PIPELINE_CAPACITY {
            tx.try_send(added(&format!("zk-{i}"))).unwrap();
        }
        assert!(matches!(tx.try_send(added("overflow")), Err(TrySendError::Full(_))));

        let extra = 50;
        let producer = tokio::spawn(async move {
            for i in EVENT_PIPELINE_CAPACITY..EVENT_PIPELINE_CAPACITY + extra {
                tx.send(added(&format!("zk-{i}"))).await.unwrap();
            }
        });

        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event.key());
        }
        producer.await.unwrap();

        assert_eq!(received.len(), EVENT_PIPELINE_CAPACITY + extra);
        for (i, key) in received.iter().enumerate() {
            assert_eq!(key, &format!("default/zk-{i}"));
        }
    }

    #[tokio::test]
    async fn test_error_reporter_after_receiver_dropped() {
        let (reporter, receiver) = error_channel();
        drop(receiver);
        // Must not panic
        reporter.report(ControllerError::Watch(WatchError::StreamBroken));
    }
}
