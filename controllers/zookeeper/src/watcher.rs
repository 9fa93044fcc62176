//! ZookeeperCluster watcher.
//!
//! Wraps the `kube_runtime` watch stream (which reconnects with backoff on
//! its own) and turns its raw notifications into `LifecycleEvent`s. The task
//! owns a snapshot of every cluster it has seen, which is what lets it
//! report `Updated { old, new }` and notice clusters deleted while the
//! stream was disconnected.

use crate::error::{ControllerError, WatchError};
use crate::event::{ErrorReporter, EventReceiver, EventSender, LifecycleEvent, pipeline};
use crate::metrics::Metrics;
use crate::registration::Registration;
use crds::ZookeeperCluster;
use futures::{Stream, StreamExt};
use kube::{Api, Client};
use kube_runtime::WatchStreamExt;
use kube_runtime::watcher::{self, Event};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Stops a running watcher.
///
/// Dropping the handle stops the watcher as well.
#[derive(Debug)]
pub struct StopHandle {
    sender: oneshot::Sender<()>,
}

impl StopHandle {
    /// Ask the watcher to stop and release its stream.
    pub fn stop(self) {
        if self.sender.send(()).is_err() {
            debug!("Watcher already finished");
        }
    }
}

/// Last known snapshot of every observed cluster.
#[derive(Debug, Default)]
struct SnapshotCache {
    known: BTreeMap<String, Arc<ZookeeperCluster>>,
    // Keys seen since the current relist started
    relist: Option<BTreeSet<String>>,
}

impl SnapshotCache {
    fn apply(&mut self, event: Event<ZookeeperCluster>) -> Vec<LifecycleEvent> {
        match event {
            Event::Apply(cluster) => self.upsert(cluster).into_iter().collect(),
            Event::InitApply(cluster) => {
                if let Some(seen) = self.relist.as_mut() {
                    seen.insert(cluster.key());
                }
                self.upsert(cluster).into_iter().collect()
            }
            Event::Delete(cluster) => {
                let key = cluster.key();
                self.known.remove(&key);
                if let Some(seen) = self.relist.as_mut() {
                    seen.remove(&key);
                }
                vec![LifecycleEvent::Deleted(Arc::new(cluster))]
            }
            Event::Init => {
                debug!("ZookeeperCluster relist started");
                self.relist = Some(BTreeSet::new());
                Vec::new()
            }
            Event::InitDone => {
                let Some(seen) = self.relist.take() else {
                    return Vec::new();
                };
                let missing: Vec<String> = self
                    .known
                    .keys()
                    .filter(|key| !seen.contains(*key))
                    .cloned()
                    .collect();
                debug!(
                    "ZookeeperCluster relist done, {} vanished while disconnected",
                    missing.len()
                );
                missing
                    .into_iter()
                    .filter_map(|key| self.known.remove(&key))
                    .map(LifecycleEvent::Deleted)
                    .collect()
            }
        }
    }

    fn upsert(&mut self, cluster: ZookeeperCluster) -> Option<LifecycleEvent> {
        let new = Arc::new(cluster);
        match self.known.insert(new.key(), Arc::clone(&new)) {
            None => Some(LifecycleEvent::Added(new)),
            // Redelivery of the same snapshot during a relist
            Some(old)
                if old.metadata.resource_version.is_some()
                    && old.metadata.resource_version == new.metadata.resource_version =>
            {
                None
            }
            Some(old) => Some(LifecycleEvent::Updated { old, new }),
        }
    }
}

/// Drive a watch stream into the pipeline until stopped or the stream ends.
pub(crate) async fn drive<S>(
    stream: S,
    events: EventSender,
    mut stop: oneshot::Receiver<()>,
    errors: ErrorReporter,
    metrics: Metrics,
) -> Result<(), WatchError>
where
    S: Stream<Item = Result<Event<ZookeeperCluster>, watcher::Error>> + Send,
{
    let mut cache = SnapshotCache::default();
    let mut stream = std::pin::pin!(stream);
    metrics.set_watcher_up(true);

    loop {
        let next = tokio::select! {
            biased;
            _ = &mut stop => {
                info!("ZookeeperCluster watcher stopped");
                return Ok(());
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(event)) => {
                metrics.set_watcher_up(true);
                for lifecycle in cache.apply(event) {
                    debug!(
                        "Observed {} event for ZookeeperCluster {}",
                        lifecycle.kind(),
                        lifecycle.key()
                    );
                    tokio::select! {
                        biased;
                        _ = &mut stop => {
                            info!("ZookeeperCluster watcher stopped");
                            return Ok(());
                        }
                        sent = events.send(lifecycle) => {
                            if sent.is_err() {
                                info!("Event pipeline closed, stopping ZookeeperCluster watcher");
                                return Ok(());
                            }
                        }
                    }
                }
            }
            Some(Err(e)) => {
                warn!("ZookeeperCluster watch error (will reconnect): {}", e);
                metrics.set_watcher_up(false);
                errors.report(ControllerError::Watch(WatchError::Interrupted(e.to_string())));
            }
            None => {
                warn!("ZookeeperCluster watch stream ended");
                metrics.set_watcher_up(false);
                return Err(WatchError::StreamBroken);
            }
        }
    }
}

/// Watches ZookeeperCluster resources.
pub struct Watcher {
    client: Client,
    errors: ErrorReporter,
    metrics: Metrics,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher").finish_non_exhaustive()
    }
}

impl Watcher {
    /// Creates a new watcher. Requires proof that the resource type is established.
    pub fn new(
        client: Client,
        registration: &Registration,
        errors: ErrorReporter,
        metrics: Metrics,
    ) -> Self {
        debug!("Watcher bound to {}", registration.crd_name());
        Self { client, errors, metrics }
    }

    /// Start watching `namespace` (all namespaces for `None`).
    ///
    /// Returns the consumer end of the event pipeline, a stop handle, and the
    /// watcher task.
    pub fn observe(
        &self,
        namespace: Option<&str>,
    ) -> (EventReceiver, StopHandle, JoinHandle<Result<(), WatchError>>) {
        let api: Api<ZookeeperCluster> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        info!("Starting ZookeeperCluster watcher ({})", namespace.unwrap_or("all namespaces"));

        let stream = watcher::watcher(api, watcher::Config::default()).default_backoff();
        let (tx, rx) = pipeline();
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(drive(
            stream,
            tx,
            stop_rx,
            self.errors.clone(),
            self.metrics.clone(),
        ));

        (rx, StopHandle { sender: stop_tx }, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::error_channel;
    use crate::test_utils::{bump, create_test_cluster};
    use futures::channel::mpsc as stream_channel;

    type WatchItem = Result<Event<ZookeeperCluster>, watcher::Error>;

    fn kinds_and_keys(events: &[LifecycleEvent]) -> Vec<(&'static str, String)> {
        events.iter().map(|e| (e.kind(), e.key())).collect()
    }

    #[test]
    fn test_apply_classification() {
        let mut cache = SnapshotCache::default();
        let v1 = create_test_cluster("zk", "default", 3);
        let v2 = bump(&v1, "2", 5);

        let added = cache.apply(Event::Apply(v1.clone()));
        assert!(matches!(added.as_slice(), [LifecycleEvent::Added(_)]));

        let updated = cache.apply(Event::Apply(v2));
        match updated.as_slice() {
            [LifecycleEvent::Updated { old, new }] => {
                assert_eq!(old.spec.replicas, 3);
                assert_eq!(new.spec.replicas, 5);
            }
            other => panic!("expected one update, got {other:?}"),
        }

        let deleted = cache.apply(Event::Delete(v1));
        assert!(matches!(deleted.as_slice(), [LifecycleEvent::Deleted(_)]));
        assert!(cache.known.is_empty());
    }

    #[test]
    fn test_relist_skips_unchanged_and_reports_vanished() {
        let mut cache = SnapshotCache::default();
        let a = create_test_cluster("a", "default", 3);
        let b = create_test_cluster("b", "default", 3);
        let c = create_test_cluster("c", "default", 3);
        for cluster in [&a, &b, &c] {
            cache.apply(Event::Apply(cluster.clone()));
        }

        // Reconnect: a unchanged, b changed, c deleted while disconnected
        let mut emitted = cache.apply(Event::Init);
        emitted.extend(cache.apply(Event::InitApply(a.clone())));
        emitted.extend(cache.apply(Event::InitApply(bump(&b, "7", 1))));
        emitted.extend(cache.apply(Event::InitDone));

        assert_eq!(
            kinds_and_keys(&emitted),
            vec![("updated", "default/b".to_string()), ("deleted", "default/c".to_string())]
        );
        assert_eq!(cache.known.len(), 2);
    }

    #[test]
    fn test_initial_list_adds_everything() {
        let mut cache = SnapshotCache::default();
        let mut emitted = cache.apply(Event::Init);
        emitted.extend(cache.apply(Event::InitApply(create_test_cluster("a", "ns1", 3))));
        emitted.extend(cache.apply(Event::InitApply(create_test_cluster("a", "ns2", 3))));
        emitted.extend(cache.apply(Event::InitDone));

        assert_eq!(
            kinds_and_keys(&emitted),
            vec![("added", "ns1/a".to_string()), ("added", "ns2/a".to_string())]
        );
    }

    #[tokio::test]
    async fn test_drive_forwards_in_order_and_ends_with_stream_broken() {
        let v1 = create_test_cluster("zk", "default", 3);
        let items: Vec<WatchItem> = vec![
            Ok(Event::Apply(v1.clone())),
            Ok(Event::Apply(bump(&v1, "2", 5))),
            Ok(Event::Delete(bump(&v1, "3", 5))),
        ];
        let (tx, mut rx) = pipeline();
        let (_stop_tx, stop_rx) = oneshot::channel();
        let (reporter, _errors) = error_channel();
        let metrics = Metrics::new().unwrap();

        let result =
            drive(futures::stream::iter(items), tx, stop_rx, reporter, metrics.clone()).await;

        assert!(matches!(result, Err(WatchError::StreamBroken)));
        assert!(!metrics.watcher_up());
        let mut kinds = Vec::new();
        while let Some(event) = rx.recv().await {
            kinds.push(event.kind());
        }
        assert_eq!(kinds, vec!["added", "updated", "deleted"]);
    }

    #[tokio::test]
    async fn test_stream_error_reported_and_liveness_recovers() {
        let (mut feed, stream) = stream_channel::unbounded::<WatchItem>();
        let (tx, mut rx) = pipeline();
        let (stop_tx, stop_rx) = oneshot::channel();
        let (reporter, mut errors) = error_channel();
        let metrics = Metrics::new().unwrap();
        let task = tokio::spawn(drive(stream, tx, stop_rx, reporter, metrics.clone()));

        feed.unbounded_send(Err(watcher::Error::NoResourceVersion)).unwrap();
        let reported = errors.recv().await.unwrap();
        assert!(matches!(reported, ControllerError::Watch(WatchError::Interrupted(_))));
        assert!(!metrics.watcher_up());

        feed.unbounded_send(Ok(Event::Apply(create_test_cluster("zk", "default", 3)))).unwrap();
        assert_eq!(rx.recv().await.unwrap().kind(), "added");
        assert!(metrics.watcher_up());

        StopHandle { sender: stop_tx }.stop();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_dropping_stop_handle_stops_watcher() {
        let (_feed, stream) = stream_channel::unbounded::<WatchItem>();
        let (tx, _rx) = pipeline();
        let (stop_tx, stop_rx) = oneshot::channel();
        let (reporter, _errors) = error_channel();
        let task = tokio::spawn(drive(stream, tx, stop_rx, reporter, Metrics::new().unwrap()));

        drop(StopHandle { sender: stop_tx });
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_stop_while_blocked_on_full_pipeline() {
        let (feed, stream) = stream_channel::unbounded::<WatchItem>();
        for i in 0..=crate::event::EVENT_PIPELINE_CAPACITY {
            let cluster = create_test_cluster(&format!("zk-{i}"), "default", 1);
            feed.unbounded_send(Ok(Event::Apply(cluster))).unwrap();
        }
        let (tx, mut rx) = pipeline();
        let (stop_tx, stop_rx) = oneshot::channel();
        let (reporter, _errors) = error_channel();
        let task = tokio::spawn(drive(stream, tx, stop_rx, reporter, Metrics::new().unwrap()));

        // Wait until the pipeline is full and the watcher is blocked
        while rx.len() < crate::event::EVENT_PIPELINE_CAPACITY {
            tokio::task::yield_now().await;
        }
        StopHandle { sender: stop_tx }.stop();
        assert!(task.await.unwrap().is_ok());
        assert_eq!(rx.len(), crate::event::EVENT_PIPELINE_CAPACITY);
    }
}
