//! PlatformClient trait for mocking
//!
//! This trait abstracts the Kubernetes API to enable mocking in unit tests.
//! `KubePlatformClient` implements it against a real cluster, tests use
//! `MockPlatformClient` (feature `test-util`).

use crate::error::PlatformError;
use crate::resources::{ChildKind, ChildResource};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceDefinition, CustomResourceDefinitionCondition,
};

/// Trait for the Kubernetes operations the controller performs
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait PlatformClient: Send + Sync {
    // CRD registration

    /// Fetch a CRD by name, `None` when absent.
    async fn get_custom_resource_definition(
        &self,
        name: &str,
    ) -> Result<Option<CustomResourceDefinition>, PlatformError>;

    /// Submit a CRD. Fails with an error for which `is_already_exists()` holds
    /// if a CRD of that name is already registered.
    async fn create_custom_resource_definition(
        &self,
        crd: &CustomResourceDefinition,
    ) -> Result<(), PlatformError>;

    /// Current status conditions of a CRD.
    async fn custom_resource_definition_conditions(
        &self,
        name: &str,
    ) -> Result<Vec<CustomResourceDefinitionCondition>, PlatformError>;

    /// Delete a CRD (registration rollback only).
    async fn delete_custom_resource_definition(&self, name: &str) -> Result<(), PlatformError>;

    // Child resources

    /// Whether `kind` named `name` exists in `namespace`.
    async fn exists(
        &self,
        kind: ChildKind,
        name: &str,
        namespace: &str,
    ) -> Result<bool, PlatformError>;

    /// Create a child resource.
    async fn create(&self, resource: &ChildResource) -> Result<(), PlatformError>;

    /// Update a child resource. Idempotent given an identical object.
    async fn update(&self, resource: &ChildResource) -> Result<(), PlatformError>;

    /// Delete a child resource. Deleting an absent object succeeds.
    async fn delete(
        &self,
        kind: ChildKind,
        name: &str,
        namespace: &str,
    ) -> Result<(), PlatformError>;
}
