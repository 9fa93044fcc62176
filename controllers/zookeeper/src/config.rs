//! Controller configuration loaded from environment variables.

use crate::error::ControllerError;
use crate::resources::DEFAULT_IMAGE;
use std::env;
use std::net::SocketAddr;

/// Default listen address of the metrics and health endpoint
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:9090";

/// Default number of attempts per reconcile before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Runtime configuration of the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Namespace to watch; `None` watches all namespaces
    pub namespace: Option<String>,
    /// ZooKeeper container image
    pub image: String,
    /// Metrics and health listen address
    pub metrics_addr: SocketAddr,
    /// Reconcile attempts per event (at least 1)
    pub max_attempts: u32,
}

impl ControllerConfig {
    /// Load configuration from `WATCH_NAMESPACE`, `ZOOKEEPER_IMAGE`,
    /// `METRICS_ADDR` and `RECONCILE_MAX_ATTEMPTS`.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty());
        let image = lookup("ZOOKEEPER_IMAGE")
            .filter(|image| !image.is_empty())
            .unwrap_or_else(|| DEFAULT_IMAGE.to_string());

        let metrics_addr = lookup("METRICS_ADDR")
            .unwrap_or_else(|| DEFAULT_METRICS_ADDR.to_string());
        let metrics_addr = metrics_addr.parse::<SocketAddr>().map_err(|e| {
            ControllerError::InvalidConfig(format!(
                "METRICS_ADDR '{metrics_addr}' is not a socket address: {e}"
            ))
        })?;

        let max_attempts = match lookup("RECONCILE_MAX_ATTEMPTS") {
            None => DEFAULT_MAX_ATTEMPTS,
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) if n >= 1 => n,
                _ => {
                    return Err(ControllerError::InvalidConfig(format!(
                        "RECONCILE_MAX_ATTEMPTS must be a positive integer, got '{raw}'"
                    )));
                }
            },
        };

        Ok(Self {
            namespace,
            image,
            metrics_addr,
            max_attempts,
        })
    }
}
