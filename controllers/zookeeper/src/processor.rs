//! Event processor.
//!
//! The only component that writes to the platform. Events are handled one at
//! a time in arrival order, so two events for the same cluster can never
//! race. Each event either converges the cluster's child resources towards
//! the desired state or tears them down.

use crate::backoff::FibonacciBackoff;
use crate::error::{ControllerError, ReconcileError};
use crate::event::{EventReceiver, LifecycleEvent};
use crate::metrics::Metrics;
use crate::resources::{TranslatorSettings, scaled_to_zero, translate};
use crds::ZookeeperCluster;
use platform_client::{ChildKind, ChildResource, PlatformClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// How often a failing reconcile is attempted before giving up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per event, including the first
    pub max_attempts: u32,
    /// First backoff in seconds
    pub min_backoff_secs: u64,
    /// Backoff cap in seconds
    pub max_backoff_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_backoff_secs: 1,
            max_backoff_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Converge,
    Teardown,
}

impl Action {
    fn as_str(self) -> &'static str {
        match self {
            Action::Converge => "converge",
            Action::Teardown => "teardown",
        }
    }
}

/// Applies lifecycle events to the platform.
pub struct Processor<C: PlatformClient> {
    client: Arc<C>,
    settings: TranslatorSettings,
    retry: RetryPolicy,
    metrics: Metrics,
}

impl<C: PlatformClient> std::fmt::Debug for Processor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("settings", &self.settings)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Sleep for `delay`, returning true as soon as shutdown is signalled.
async fn stopped_during(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    tokio::select! {
        () = &mut sleep => false,
        signalled = async { shutdown.wait_for(|stop| *stop).await.is_ok() } => {
            if signalled {
                return true;
            }
            // Sender gone: nobody can signal shutdown any more
            sleep.await;
            false
        }
    }
}

fn child_identity(resource: &ChildResource) -> (ChildKind, String, String) {
    (
        resource.kind(),
        resource.name().unwrap_or_default().to_string(),
        resource.namespace().unwrap_or_default().to_string(),
    )
}

impl<C: PlatformClient> Processor<C> {
    /// Creates a new processor.
    pub fn new(
        client: Arc<C>,
        settings: TranslatorSettings,
        retry: RetryPolicy,
        metrics: Metrics,
    ) -> Self {
        Self {
            client,
            settings,
            retry,
            metrics,
        }
    }

    /// Consume events until shutdown is signalled or the pipeline closes.
    ///
    /// Shutdown wins over pending work: queued events are not drained.
    pub async fn run(
        self,
        mut events: EventReceiver,
        mut errors: mpsc::UnboundedReceiver<ControllerError>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Event processor running");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                Some(reported) = errors.recv() => {
                    warn!("Background task reported: {}", reported);
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        info!("Event pipeline closed");
                        break;
                    };
                    let key = event.key();
                    if let Err(e) = self.process_event(event, &shutdown).await {
                        error!("Giving up on ZookeeperCluster {}: {}", key, e);
                    }
                }
            }
        }

        info!("Event processor stopped");
    }

    /// Handle one lifecycle event, retrying transient failures.
    ///
    /// Backoff waits end early once `shutdown` turns true; the last error is
    /// returned without further attempts.
    pub async fn process_event(
        &self,
        event: LifecycleEvent,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<(), ReconcileError> {
        self.metrics.record_event(event.kind());
        info!("Processing {} event for ZookeeperCluster {}", event.kind(), event.key());

        match event {
            LifecycleEvent::Added(cluster) | LifecycleEvent::Updated { new: cluster, .. } => {
                self.with_retry(Action::Converge, &cluster, shutdown.clone()).await
            }
            LifecycleEvent::Deleted(cluster) => {
                self.with_retry(Action::Teardown, &cluster, shutdown.clone()).await
            }
        }
    }

    async fn with_retry(
        &self,
        action: Action,
        cluster: &ZookeeperCluster,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ReconcileError> {
        let mut backoff =
            FibonacciBackoff::new(self.retry.min_backoff_secs, self.retry.max_backoff_secs);
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = match action {
                Action::Converge => self.converge(cluster).await,
                Action::Teardown => self.teardown(cluster).await,
            };

            let err = match result {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            if !err.is_retryable() || attempt >= max_attempts {
                self.metrics.record_reconcile_error(err.operation());
                return Err(err);
            }

            let delay = backoff.next_backoff();
            warn!(
                "{} of {} failed (attempt {}/{}), retrying in {:?}: {}",
                action.as_str(),
                cluster.key(),
                attempt,
                max_attempts,
                delay,
                err
            );
            if stopped_during(delay, &mut shutdown).await {
                info!("Shutting down, abandoning {} of {}", action.as_str(), cluster.key());
                return Err(err);
            }
            attempt += 1;
        }
    }

    /// Create or update the cluster's children: Service, ConfigMap, StatefulSet.
    ///
    /// Stops at the first failure.
    pub async fn converge(&self, cluster: &ZookeeperCluster) -> Result<(), ReconcileError> {
        let children = translate(cluster, &self.settings)?;

        // Updating a Service resubmits spec.clusterIP, which the API server treats as immutable
        self.apply(children.service.into(), false).await?;
        self.apply(children.config_map.into(), true).await?;
        self.apply(children.stateful_set.into(), true).await?;

        debug!("ZookeeperCluster {} converged", cluster.key());
        Ok(())
    }

    async fn apply(
        &self,
        resource: ChildResource,
        update_existing: bool,
    ) -> Result<(), ReconcileError> {
        let (kind, name, namespace) = child_identity(&resource);

        let exists = self
            .client
            .exists(kind, &name, &namespace)
            .await
            .map_err(|source| ReconcileError::ChildResourceCreateFailed {
                kind,
                name: name.clone(),
                source,
            })?;

        if !exists {
            info!("Creating {} {}/{}", kind, namespace, name);
            self.client
                .create(&resource)
                .await
                .map_err(|source| ReconcileError::ChildResourceCreateFailed { kind, name, source })
        } else if update_existing {
            debug!("Updating {} {}/{}", kind, namespace, name);
            self.client
                .update(&resource)
                .await
                .map_err(|source| ReconcileError::ChildResourceUpdateFailed { kind, name, source })
        } else {
            debug!("{} {}/{} exists, leaving it as is", kind, namespace, name);
            Ok(())
        }
    }

    /// Remove the cluster's children: StatefulSet, ConfigMap, Service.
    ///
    /// The StatefulSet is scaled to zero before deletion. Absent children are
    /// skipped; a missing StatefulSet does not stop the ConfigMap or Service
    /// from being removed.
    pub async fn teardown(&self, cluster: &ZookeeperCluster) -> Result<(), ReconcileError> {
        let children = translate(cluster, &self.settings)?;

        let stateful_set: ChildResource = scaled_to_zero(children.stateful_set).into();
        let (kind, name, namespace) = child_identity(&stateful_set);
        if self.present(kind, &name, &namespace).await? {
            info!("Scaling {} {}/{} to 0", kind, namespace, name);
            self.client.update(&stateful_set).await.map_err(|source| {
                ReconcileError::ChildResourceUpdateFailed {
                    kind,
                    name: name.clone(),
                    source,
                }
            })?;
            self.delete(kind, name, namespace).await?;
        }

        for child in [ChildResource::from(children.config_map), children.service.into()] {
            let (kind, name, namespace) = child_identity(&child);
            if self.present(kind, &name, &namespace).await? {
                self.delete(kind, name, namespace).await?;
            }
        }

        debug!("ZookeeperCluster {} torn down", cluster.key());
        Ok(())
    }

    async fn present(
        &self,
        kind: ChildKind,
        name: &str,
        namespace: &str,
    ) -> Result<bool, ReconcileError> {
        let exists = self
            .client
            .exists(kind, name, namespace)
            .await
            .map_err(|source| ReconcileError::ChildResourceDeleteFailed {
                kind,
                name: name.to_string(),
                source,
            })?;
        if !exists {
            debug!("{} {}/{} already absent", kind, namespace, name);
        }
        Ok(exists)
    }

    async fn delete(
        &self,
        kind: ChildKind,
        name: String,
        namespace: String,
    ) -> Result<(), ReconcileError> {
        info!("Deleting {} {}/{}", kind, namespace, name);
        self.client
            .delete(kind, &name, &namespace)
            .await
            .map_err(|source| ReconcileError::ChildResourceDeleteFailed { kind, name, source })
    }
}

#[cfg(test)]
#[path = "processor_test.rs"]
mod processor_test;
