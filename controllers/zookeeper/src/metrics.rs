//! Prometheus metrics and the health endpoint.
//!
//! # Metrics
//!
//! - `zookeeper_controller_events_total{kind}` - lifecycle events processed
//! - `zookeeper_controller_reconcile_errors_total{operation}` - reconciles that failed
//!   after all attempts
//! - `zookeeper_controller_watcher_up` - 1 while the watch stream is healthy
//!
//! `GET /healthz` mirrors `watcher_up`: 200 while it is 1, 503 otherwise.

use crate::error::ControllerError;
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use tracing::info;

/// Content type for Prometheus metrics.
const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Controller metrics registry.
///
/// Cheap to clone; clones share the underlying counters.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    events: IntCounterVec,
    reconcile_errors: IntCounterVec,
    watcher_up: IntGauge,
}

impl Metrics {
    /// Create a registry with all controller metrics registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let events = IntCounterVec::new(
            Opts::new("zookeeper_controller_events_total", "Lifecycle events processed"),
            &["kind"],
        )?;
        let reconcile_errors = IntCounterVec::new(
            Opts::new(
                "zookeeper_controller_reconcile_errors_total",
                "Reconciles that failed after exhausting retries",
            ),
            &["operation"],
        )?;
        let watcher_up = IntGauge::with_opts(Opts::new(
            "zookeeper_controller_watcher_up",
            "Whether the ZookeeperCluster watch stream is healthy",
        ))?;

        registry.register(Box::new(events.clone()))?;
        registry.register(Box::new(reconcile_errors.clone()))?;
        registry.register(Box::new(watcher_up.clone()))?;

        Ok(Self {
            registry,
            events,
            reconcile_errors,
            watcher_up,
        })
    }

    /// Count a processed lifecycle event.
    pub fn record_event(&self, kind: &str) {
        self.events.with_label_values(&[kind]).inc();
    }

    /// Count a failed reconcile.
    pub fn record_reconcile_error(&self, operation: &str) {
        self.reconcile_errors.with_label_values(&[operation]).inc();
    }

    /// Flip the watcher liveness flag.
    pub fn set_watcher_up(&self, up: bool) {
        self.watcher_up.set(i64::from(up));
    }

    /// Current watcher liveness.
    pub fn watcher_up(&self) -> bool {
        self.watcher_up.get() == 1
    }

    /// Events counted for `kind`.
    #[cfg(test)]
    pub fn event_count(&self, kind: &str) -> u64 {
        self.events.with_label_values(&[kind]).get()
    }

    /// Reconcile errors counted for `operation`.
    #[cfg(test)]
    pub fn reconcile_error_count(&self, operation: &str) -> u64 {
        self.reconcile_errors.with_label_values(&[operation]).get()
    }

    /// Encode all metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("watcher_up", &self.watcher_up.get())
            .finish_non_exhaustive()
    }
}

async fn metrics_handler(State(metrics): State<Metrics>) -> Response {
    match metrics.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn healthz(State(metrics): State<Metrics>) -> Response {
    if metrics.watcher_up() {
        (StatusCode::OK, "ok").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "watcher down").into_response()
    }
}

/// Build the metrics and health router
pub fn routes(metrics: Metrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz))
        .with_state(metrics)
}

/// Serve metrics and health on `addr` until the task is dropped.
pub async fn serve(addr: SocketAddr, metrics: Metrics) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Metrics endpoint listening on {}", addr);
    axum::serve(listener, routes(metrics)).await?;
    Ok(())
}
