//! Platform client errors

use thiserror::Error;

/// Errors that can occur when talking to the Kubernetes API
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Kubernetes API or transport error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Object already exists (HTTP 409 on create)
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Object not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Object is missing fields the API requires (name, namespace)
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// Failure injected by the mock client
    #[error("Injected failure: {0}")]
    Injected(String),
}

impl PlatformError {
    /// Returns true if the API rejected a create because the object exists.
    pub fn is_already_exists(&self) -> bool {
        match self {
            PlatformError::AlreadyExists(_) => true,
            PlatformError::Kube(kube::Error::Api(err)) => err.code == 409,
            _ => false,
        }
    }

    /// Returns true if the API reported the object as absent.
    pub fn is_not_found(&self) -> bool {
        match self {
            PlatformError::NotFound(_) => true,
            PlatformError::Kube(kube::Error::Api(err)) => err.code == 404,
            _ => false,
        }
    }
}
