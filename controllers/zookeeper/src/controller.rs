//! Main controller implementation.
//!
//! Startup runs in a fixed order: register the ZookeeperCluster type and wait
//! until it is established, then start the metrics endpoint, the watcher and
//! the event processor. The controller runs until a shutdown signal arrives or
//! one of its tasks exits.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::event::error_channel;
use crate::metrics::{self, Metrics};
use crate::processor::{Processor, RetryPolicy};
use crate::registration::{RegistrationManager, RegistrationSettings};
use crate::resources::TranslatorSettings;
use crate::watcher::Watcher;
use crds::ZookeeperCluster;
use kube::{Client, CustomResourceExt};
use platform_client::KubePlatformClient;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Main controller for ZooKeeper ensembles.
pub struct Controller {
    config: ControllerConfig,
    client: Client,
    metrics: Metrics,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller").field("config", &self.config).finish_non_exhaustive()
    }
}

/// Resolves on Ctrl-C, or SIGTERM where available.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing ZooKeeper Controller");

        let client = Client::try_default().await?;
        let metrics = Metrics::new()?;

        Ok(Self { config, client, metrics })
    }

    /// Runs the controller until shutdown.
    pub async fn run(self) -> Result<(), ControllerError> {
        let platform = Arc::new(KubePlatformClient::new(self.client.clone()));

        let mut registrar =
            RegistrationManager::new(Arc::clone(&platform), RegistrationSettings::default());
        let registration = registrar.ensure_registered(&ZookeeperCluster::crd()).await?;
        info!(
            "{} established ({})",
            registration.crd_name(),
            if registration.created() { "created" } else { "adopted" }
        );
        debug!("Registration state: {}", registrar.state());

        let mut metrics_server =
            tokio::spawn(metrics::serve(self.config.metrics_addr, self.metrics.clone()));

        let (reporter, errors) = error_channel();
        let watcher = Watcher::new(
            platform.kube_client().clone(),
            &registration,
            reporter,
            self.metrics.clone(),
        );
        let (events, stop, mut watcher_task) = watcher.observe(self.config.namespace.as_deref());

        let processor = Processor::new(
            platform,
            TranslatorSettings {
                image: self.config.image.clone(),
            },
            RetryPolicy {
                max_attempts: self.config.max_attempts,
                ..RetryPolicy::default()
            },
            self.metrics.clone(),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut processor_task = tokio::spawn(processor.run(events, errors, shutdown_rx));

        info!("ZooKeeper Controller running");

        let outcome = tokio::select! {
            signal = shutdown_signal() => {
                info!("Shutdown signal received");
                signal.map_err(ControllerError::from)
            }
            result = &mut watcher_task => {
                error!("ZookeeperCluster watcher exited");
                match result {
                    Ok(inner) => inner.map_err(ControllerError::from),
                    Err(e) => Err(e.into()),
                }
            }
            result = &mut processor_task => {
                warn!("Event processor exited");
                result.map_err(ControllerError::from)
            }
            result = &mut metrics_server => {
                error!("Metrics endpoint exited");
                match result {
                    Ok(inner) => inner,
                    Err(e) => Err(e.into()),
                }
            }
        };

        stop.stop();
        if shutdown_tx.send(true).is_err() {
            debug!("Event processor already stopped");
        }
        if !processor_task.is_finished() {
            // Finishes the event in flight, then exits
            if let Err(e) = processor_task.await {
                warn!("Event processor did not stop cleanly: {}", e);
            }
        }
        metrics_server.abort();

        info!("ZooKeeper Controller stopped");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use crate::error::WatchError;
    use crate::event::{LifecycleEvent, error_channel, pipeline};
    use crate::metrics::Metrics;
    use crate::registration::{RegistrationManager, RegistrationSettings};
    use crate::test_utils::{bump, create_test_cluster, create_test_processor};
    use crate::watcher::drive;
    use crds::ZookeeperCluster;
    use kube::CustomResourceExt;
    use kube_runtime::watcher::{self, Event};
    use platform_client::{ChildKind, ChildResource, PlatformCall, PlatformClient};
    use std::sync::Arc;
    use tokio::sync::{oneshot, watch};

    // Registration, watch stream, pipeline and processor wired together over the mock
    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_cluster_lifecycle() {
        let (processor, mock) = create_test_processor(3);

        let mut registrar =
            RegistrationManager::new(Arc::new(mock.clone()), RegistrationSettings::default());
        let registration = registrar.ensure_registered(&ZookeeperCluster::crd()).await.unwrap();
        assert!(registration.created());

        let v1 = create_test_cluster("zk", "zookeeper", 3);
        let v2 = bump(&v1, "2", 5);
        let other = create_test_cluster("other", "zookeeper", 1);
        let items: Vec<Result<Event<ZookeeperCluster>, watcher::Error>> = vec![
            Ok(Event::Init),
            Ok(Event::InitApply(v1.clone())),
            Ok(Event::InitApply(other.clone())),
            Ok(Event::InitDone),
            Ok(Event::Apply(v2.clone())),
            // Unchanged redelivery after a reconnect; `other` vanished meanwhile
            Ok(Event::Init),
            Ok(Event::InitApply(v2.clone())),
            Ok(Event::InitDone),
        ];
        let stream = futures::stream::iter(items);

        let (tx, rx) = pipeline();
        let (reporter, errors) = error_channel();
        let (_stop_tx, stop_rx) = oneshot::channel();
        let (_shutdown_tx, shutdown) = watch::channel(false);

        let watch_task =
            tokio::spawn(drive(stream, tx, stop_rx, reporter, Metrics::new().unwrap()));
        processor.run(rx, errors, shutdown).await;

        assert!(matches!(watch_task.await.unwrap(), Err(WatchError::StreamBroken)));

        // `zk` converged at 5 replicas, `other` created then torn down
        assert_eq!(mock.object_count(), 3);
        match mock.object(ChildKind::StatefulSet, "zk", "zookeeper") {
            Some(ChildResource::StatefulSet(sts)) => {
                assert_eq!(sts.spec.and_then(|s| s.replicas), Some(5));
            }
            other => panic!("unexpected StatefulSet: {other:?}"),
        }
        match mock.object(ChildKind::ConfigMap, "zk-config", "zookeeper") {
            Some(ChildResource::ConfigMap(cm)) => {
                let data = cm.data.unwrap_or_default();
                assert_eq!(
                    data.get("ensemble").map(String::as_str),
                    Some("zk-0;zk-1;zk-2;zk-3;zk-4")
                );
            }
            other => panic!("unexpected ConfigMap: {other:?}"),
        }
        assert!(
            mock.calls()
                .contains(&PlatformCall::Delete(ChildKind::StatefulSet, "other".to_string()))
        );

        // The unchanged redelivery caused no extra StatefulSet update
        let zk_updates = mock
            .updates()
            .iter()
            .filter(|r| r.kind() == ChildKind::StatefulSet && r.name() == Some("zk"))
            .count();
        assert_eq!(zk_updates, 1);
    }

    // One cluster created at three replicas, then deleted
    #[tokio::test]
    async fn test_create_then_delete_scenario() {
        let (processor, mock) = create_test_processor(1);

        let mut registrar =
            RegistrationManager::new(Arc::new(mock.clone()), RegistrationSettings::default());
        registrar.ensure_registered(&ZookeeperCluster::crd()).await.unwrap();
        assert!(mock.has_crd(crds::CRD_NAME));
        mock.clear_calls();

        let cluster = Arc::new(create_test_cluster("zk", "zookeeper", 3));
        let (tx, rx) = pipeline();
        let (_reporter, errors) = error_channel();
        let (_shutdown_tx, shutdown) = watch::channel(false);
        tx.send(LifecycleEvent::Added(Arc::clone(&cluster))).await.unwrap();
        tx.send(LifecycleEvent::Deleted(cluster)).await.unwrap();
        drop(tx);

        processor.run(rx, errors, shutdown).await;

        let named = |name: &str| name.to_string();
        assert_eq!(
            mock.mutations(),
            vec![
                PlatformCall::Create(ChildKind::Service, named("zk-headless")),
                PlatformCall::Create(ChildKind::ConfigMap, named("zk-config")),
                PlatformCall::Create(ChildKind::StatefulSet, named("zk")),
                PlatformCall::Update(ChildKind::StatefulSet, named("zk")),
                PlatformCall::Delete(ChildKind::StatefulSet, named("zk")),
                PlatformCall::Delete(ChildKind::ConfigMap, named("zk-config")),
                PlatformCall::Delete(ChildKind::Service, named("zk-headless")),
            ]
        );

        // The single update is the scale-down
        match mock.updates().as_slice() {
            [ChildResource::StatefulSet(sts)] => {
                assert_eq!(sts.spec.as_ref().and_then(|s| s.replicas), Some(0));
            }
            other => panic!("expected a single scale-down, got {other:?}"),
        }
        for (kind, name) in [
            (ChildKind::Service, "zk-headless"),
            (ChildKind::ConfigMap, "zk-config"),
            (ChildKind::StatefulSet, "zk"),
        ] {
            assert!(!mock.exists(kind, name, "zookeeper").await.unwrap());
        }
    }
}
