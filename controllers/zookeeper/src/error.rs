//! Controller-specific error types.
//!
//! Registration, reconciliation and watch failures each get their own enum so
//! callers can tell a startup failure from a per-event one. `ControllerError`
//! is the umbrella returned from `main`.

use kube::Error as KubeError;
use platform_client::{ChildKind, PlatformError};
use thiserror::Error;

/// Failures while registering the ZookeeperCluster resource type.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// The CRD name is taken by another type, or the API server refused the names
    #[error("custom resource name conflict: {0}")]
    NameConflict(String),

    /// The CRD never reported `Established`
    #[error("custom resource definition {name} not established: {cause}")]
    EstablishmentTimeout {
        /// CRD name
        name: String,
        /// Why establishment failed (polling error or deadline)
        cause: String,
        /// Compensating delete failure, when rollback also failed
        cleanup: Option<String>,
    },

    /// The API server could not be reached or rejected the request
    #[error("platform unreachable: {0}")]
    PlatformUnreachable(#[source] PlatformError),
}

/// Failures while converging or tearing down a cluster's child resources.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Existence check or creation of a child failed
    #[error("failed to create {kind} {name}: {source}")]
    ChildResourceCreateFailed {
        /// Child kind
        kind: ChildKind,
        /// Child name
        name: String,
        /// Underlying platform error
        #[source]
        source: PlatformError,
    },

    /// Update (or scale-down) of an existing child failed
    #[error("failed to update {kind} {name}: {source}")]
    ChildResourceUpdateFailed {
        /// Child kind
        kind: ChildKind,
        /// Child name
        name: String,
        /// Underlying platform error
        #[source]
        source: PlatformError,
    },

    /// Existence check or deletion of a child failed during teardown
    #[error("failed to delete {kind} {name}: {source}")]
    ChildResourceDeleteFailed {
        /// Child kind
        kind: ChildKind,
        /// Child name
        name: String,
        /// Underlying platform error
        #[source]
        source: PlatformError,
    },

    /// The cluster cannot be translated into child resources
    #[error("invalid ZookeeperCluster: {0}")]
    TranslationInvalid(String),
}

impl ReconcileError {
    /// Label used for the reconcile error counter.
    pub fn operation(&self) -> &'static str {
        match self {
            ReconcileError::ChildResourceCreateFailed { .. } => "create",
            ReconcileError::ChildResourceUpdateFailed { .. } => "update",
            ReconcileError::ChildResourceDeleteFailed { .. } => "delete",
            ReconcileError::TranslationInvalid(_) => "translate",
        }
    }

    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ReconcileError::TranslationInvalid(_))
    }
}

/// Failures of the resource watch stream.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The watch stream ended; no further events will arrive
    #[error("ZookeeperCluster watch stream ended")]
    StreamBroken,

    /// A transient stream error; the stream reconnects on its own
    #[error("ZookeeperCluster watch interrupted: {0}")]
    Interrupted(String),
}

/// Errors that can occur in the ZooKeeper Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Resource type registration failed
    #[error("Registration failed: {0}")]
    Registration(#[from] RegistrationError),

    /// Reconciliation failed
    #[error("Reconciliation failed: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(#[from] WatchError),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// I/O error (metrics listener)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A background task panicked or was cancelled
    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
