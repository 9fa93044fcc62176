//! Mock PlatformClient for unit testing
//!
//! Stores objects in memory and records every call in order, so tests can
//! assert both the resulting state and the exact sequence of API operations.
//! Failures can be injected per (operation, kind) and CRD status conditions
//! can be scripted to exercise the registration handshake.

use crate::error::PlatformError;
use crate::platform_trait::PlatformClient;
use crate::resources::{ChildKind, ChildResource};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceDefinition, CustomResourceDefinitionCondition,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Child resource operation, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Existence check
    Exists,
    /// Create
    Create,
    /// Update
    Update,
    /// Delete
    Delete,
}

/// A recorded call against the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    /// `get_custom_resource_definition`
    GetCrd(String),
    /// `create_custom_resource_definition`
    CreateCrd(String),
    /// `custom_resource_definition_conditions`
    CrdConditions(String),
    /// `delete_custom_resource_definition`
    DeleteCrd(String),
    /// `exists`
    Exists(ChildKind, String),
    /// `create`
    Create(ChildKind, String),
    /// `update`
    Update(ChildKind, String),
    /// `delete`
    Delete(ChildKind, String),
}

type ObjectKey = (ChildKind, String, String);

/// Mock PlatformClient for testing
#[derive(Debug, Clone, Default)]
pub struct MockPlatformClient {
    objects: Arc<Mutex<HashMap<ObjectKey, ChildResource>>>,
    calls: Arc<Mutex<Vec<PlatformCall>>>,
    updates: Arc<Mutex<Vec<ChildResource>>>,
    // Remaining number of failures per (operation, kind)
    failures: Arc<Mutex<HashMap<(Operation, ChildKind), u32>>>,
    crds: Arc<Mutex<HashMap<String, CustomResourceDefinition>>>,
    crd_conditions: Arc<Mutex<VecDeque<Result<Vec<CustomResourceDefinitionCondition>, String>>>>,
    crd_create_failure: Arc<Mutex<Option<String>>>,
    crd_delete_failure: Arc<Mutex<Option<String>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Build a CRD status condition, e.g. `crd_condition("Established", "True")`.
pub fn crd_condition(type_: &str, status: &str) -> CustomResourceDefinitionCondition {
    CustomResourceDefinitionCondition {
        type_: type_.to_string(),
        status: status.to_string(),
        ..Default::default()
    }
}

impl MockPlatformClient {
    /// Create an empty mock whose CRDs report `Established=True` immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing child resource (for test setup)
    pub fn add_object(&self, resource: ChildResource) {
        let key = key_of(&resource);
        lock(&self.objects).insert(key, resource);
    }

    /// Seed an existing CRD (for test setup)
    pub fn add_crd(&self, crd: CustomResourceDefinition) {
        let name = crd.metadata.name.clone().unwrap_or_default();
        lock(&self.crds).insert(name, crd);
    }

    /// Make the next `times` calls of `operation` on `kind` fail.
    pub fn fail_next(&self, operation: Operation, kind: ChildKind, times: u32) {
        lock(&self.failures).insert((operation, kind), times);
    }

    /// Script CRD status responses. Each poll consumes one entry; the last
    /// entry repeats forever. `Err` entries surface as polling errors.
    pub fn script_crd_conditions(
        &self,
        responses: Vec<Result<Vec<CustomResourceDefinitionCondition>, String>>,
    ) {
        *lock(&self.crd_conditions) = responses.into();
    }

    /// Make CRD creation fail with `message`.
    pub fn fail_crd_create(&self, message: &str) {
        *lock(&self.crd_create_failure) = Some(message.to_string());
    }

    /// Make CRD deletion fail with `message`.
    pub fn fail_crd_delete(&self, message: &str) {
        *lock(&self.crd_delete_failure) = Some(message.to_string());
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<PlatformCall> {
        lock(&self.calls).clone()
    }

    /// Calls that mutate child resources (create/update/delete), in order.
    pub fn mutations(&self) -> Vec<PlatformCall> {
        self.calls()
            .into_iter()
            .filter(|c| {
                matches!(
                    c,
                    PlatformCall::Create(..) | PlatformCall::Update(..) | PlatformCall::Delete(..)
                )
            })
            .collect()
    }

    /// Objects passed to `update`, in order.
    pub fn updates(&self) -> Vec<ChildResource> {
        lock(&self.updates).clone()
    }

    /// Forget recorded calls and updates, keeping stored objects.
    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
        lock(&self.updates).clear();
    }

    /// Stored object, if present.
    pub fn object(&self, kind: ChildKind, name: &str, namespace: &str) -> Option<ChildResource> {
        lock(&self.objects)
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Number of stored child resources.
    pub fn object_count(&self) -> usize {
        lock(&self.objects).len()
    }

    /// Whether a CRD of that name is stored.
    pub fn has_crd(&self, name: &str) -> bool {
        lock(&self.crds).contains_key(name)
    }

    fn record(&self, call: PlatformCall) {
        lock(&self.calls).push(call);
    }

    fn injected(&self, operation: Operation, kind: ChildKind) -> Result<(), PlatformError> {
        let mut failures = lock(&self.failures);
        match failures.get_mut(&(operation, kind)) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(PlatformError::Injected(format!("{operation:?} {kind}")))
            }
            _ => Ok(()),
        }
    }
}

fn key_of(resource: &ChildResource) -> ObjectKey {
    (
        resource.kind(),
        resource.namespace().unwrap_or_default().to_string(),
        resource.name().unwrap_or_default().to_string(),
    )
}

#[async_trait::async_trait]
impl PlatformClient for MockPlatformClient {
    async fn get_custom_resource_definition(
        &self,
        name: &str,
    ) -> Result<Option<CustomResourceDefinition>, PlatformError> {
        self.record(PlatformCall::GetCrd(name.to_string()));
        Ok(lock(&self.crds).get(name).cloned())
    }

    async fn create_custom_resource_definition(
        &self,
        crd: &CustomResourceDefinition,
    ) -> Result<(), PlatformError> {
        let name = crd.metadata.name.clone().unwrap_or_default();
        self.record(PlatformCall::CreateCrd(name.clone()));
        if let Some(message) = lock(&self.crd_create_failure).clone() {
            return Err(PlatformError::Injected(message));
        }
        let mut crds = lock(&self.crds);
        if crds.contains_key(&name) {
            return Err(PlatformError::AlreadyExists(name));
        }
        crds.insert(name, crd.clone());
        Ok(())
    }

    async fn custom_resource_definition_conditions(
        &self,
        name: &str,
    ) -> Result<Vec<CustomResourceDefinitionCondition>, PlatformError> {
        self.record(PlatformCall::CrdConditions(name.to_string()));
        if !lock(&self.crds).contains_key(name) {
            return Err(PlatformError::NotFound(name.to_string()));
        }
        let mut script = lock(&self.crd_conditions);
        let response = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        match response {
            Some(Ok(conditions)) => Ok(conditions),
            Some(Err(message)) => Err(PlatformError::Injected(message)),
            None => Ok(vec![
                crd_condition("NamesAccepted", "True"),
                crd_condition("Established", "True"),
            ]),
        }
    }

    async fn delete_custom_resource_definition(&self, name: &str) -> Result<(), PlatformError> {
        self.record(PlatformCall::DeleteCrd(name.to_string()));
        if let Some(message) = lock(&self.crd_delete_failure).clone() {
            return Err(PlatformError::Injected(message));
        }
        lock(&self.crds).remove(name);
        Ok(())
    }

    async fn exists(
        &self,
        kind: ChildKind,
        name: &str,
        namespace: &str,
    ) -> Result<bool, PlatformError> {
        self.record(PlatformCall::Exists(kind, name.to_string()));
        self.injected(Operation::Exists, kind)?;
        Ok(lock(&self.objects).contains_key(&(kind, namespace.to_string(), name.to_string())))
    }

    async fn create(&self, resource: &ChildResource) -> Result<(), PlatformError> {
        let key = key_of(resource);
        self.record(PlatformCall::Create(key.0, key.2.clone()));
        self.injected(Operation::Create, key.0)?;
        let mut objects = lock(&self.objects);
        if objects.contains_key(&key) {
            return Err(PlatformError::AlreadyExists(format!("{} {}/{}", key.0, key.1, key.2)));
        }
        objects.insert(key, resource.clone());
        Ok(())
    }

    async fn update(&self, resource: &ChildResource) -> Result<(), PlatformError> {
        let key = key_of(resource);
        self.record(PlatformCall::Update(key.0, key.2.clone()));
        self.injected(Operation::Update, key.0)?;
        lock(&self.updates).push(resource.clone());
        let mut objects = lock(&self.objects);
        if !objects.contains_key(&key) {
            return Err(PlatformError::NotFound(format!("{} {}/{}", key.0, key.1, key.2)));
        }
        objects.insert(key, resource.clone());
        Ok(())
    }

    async fn delete(
        &self,
        kind: ChildKind,
        name: &str,
        namespace: &str,
    ) -> Result<(), PlatformError> {
        self.record(PlatformCall::Delete(kind, name.to_string()));
        self.injected(Operation::Delete, kind)?;
        lock(&self.objects).remove(&(kind, namespace.to_string(), name.to_string()));
        Ok(())
    }
}
