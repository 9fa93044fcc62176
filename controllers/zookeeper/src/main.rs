//! ZooKeeper Controller
//!
//! Keeps ZooKeeper ensembles in sync with `ZookeeperCluster` custom resources.
//! For every cluster it manages a headless Service, a ConfigMap with the
//! ensemble settings, and the StatefulSet running the members.

mod backoff;
mod config;
mod controller;
mod error;
mod event;
mod metrics;
mod processor;
mod registration;
mod resources;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed");
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting ZooKeeper Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Image: {}", config.image);
    info!("  Metrics address: {}", config.metrics_addr);
    info!("  Reconcile attempts: {}", config.max_attempts);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
