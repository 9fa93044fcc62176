//! Kubernetes-backed implementation of `PlatformClient`.

use crate::error::PlatformError;
use crate::platform_trait::PlatformClient;
use crate::resources::{ChildKind, ChildResource};
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceDefinition, CustomResourceDefinitionCondition,
};
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

/// Field manager used for server-side apply updates
pub const FIELD_MANAGER: &str = "zookeeper-controller";

/// Platform client talking to a live Kubernetes API server.
#[derive(Clone)]
pub struct KubePlatformClient {
    client: Client,
}

impl Debug for KubePlatformClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubePlatformClient").finish_non_exhaustive()
    }
}

impl KubePlatformClient {
    /// Wrap an existing kube client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// The underlying kube client (shared with the resource watcher).
    pub fn kube_client(&self) -> &Client {
        &self.client
    }

    fn crds(&self) -> Api<CustomResourceDefinition> {
        Api::all(self.client.clone())
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn identity(resource: &ChildResource) -> Result<(&str, &str), PlatformError> {
    let name = resource.name().ok_or_else(|| {
        PlatformError::InvalidObject(format!("{} missing metadata.name", resource.kind()))
    })?;
    let namespace = resource.namespace().ok_or_else(|| {
        PlatformError::InvalidObject(format!(
            "{} {} missing metadata.namespace",
            resource.kind(),
            name
        ))
    })?;
    Ok((name, namespace))
}

async fn exists_in<K>(api: Api<K>, name: &str) -> Result<bool, PlatformError>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    Ok(api.get_opt(name).await?.is_some())
}

async fn create_in<K>(api: Api<K>, object: &K) -> Result<(), PlatformError>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    api.create(&PostParams::default(), object).await?;
    Ok(())
}

async fn apply_in<K>(api: Api<K>, name: &str, object: &K) -> Result<(), PlatformError>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    let params = PatchParams::apply(FIELD_MANAGER).force();
    api.patch(name, &params, &Patch::Apply(object)).await?;
    Ok(())
}

async fn delete_in<K>(api: Api<K>, name: &str) -> Result<(), PlatformError>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    // Foreground propagation so dependents (pods) go before the owner
    match api.delete(name, &DeleteParams::foreground()).await {
        Ok(_) => Ok(()),
        Err(e) => {
            let err = PlatformError::from(e);
            if err.is_not_found() {
                debug!("{} already gone", name);
                Ok(())
            } else {
                Err(err)
            }
        }
    }
}

#[async_trait::async_trait]
impl PlatformClient for KubePlatformClient {
    async fn get_custom_resource_definition(
        &self,
        name: &str,
    ) -> Result<Option<CustomResourceDefinition>, PlatformError> {
        Ok(self.crds().get_opt(name).await?)
    }

    async fn create_custom_resource_definition(
        &self,
        crd: &CustomResourceDefinition,
    ) -> Result<(), PlatformError> {
        create_in(self.crds(), crd).await
    }

    async fn custom_resource_definition_conditions(
        &self,
        name: &str,
    ) -> Result<Vec<CustomResourceDefinitionCondition>, PlatformError> {
        let crd = self.crds().get(name).await?;
        Ok(crd.status.and_then(|s| s.conditions).unwrap_or_default())
    }

    async fn delete_custom_resource_definition(&self, name: &str) -> Result<(), PlatformError> {
        delete_in(self.crds(), name).await
    }

    async fn exists(
        &self,
        kind: ChildKind,
        name: &str,
        namespace: &str,
    ) -> Result<bool, PlatformError> {
        match kind {
            ChildKind::Service => exists_in(self.namespaced::<Service>(namespace), name).await,
            ChildKind::ConfigMap => exists_in(self.namespaced::<ConfigMap>(namespace), name).await,
            ChildKind::StatefulSet => {
                exists_in(self.namespaced::<StatefulSet>(namespace), name).await
            }
        }
    }

    async fn create(&self, resource: &ChildResource) -> Result<(), PlatformError> {
        let (name, namespace) = identity(resource)?;
        debug!("Creating {} {}/{}", resource.kind(), namespace, name);
        match resource {
            ChildResource::Service(o) => create_in(self.namespaced(namespace), o).await,
            ChildResource::ConfigMap(o) => create_in(self.namespaced(namespace), o).await,
            ChildResource::StatefulSet(o) => create_in(self.namespaced(namespace), o).await,
        }
    }

    async fn update(&self, resource: &ChildResource) -> Result<(), PlatformError> {
        let (name, namespace) = identity(resource)?;
        debug!("Applying {} {}/{}", resource.kind(), namespace, name);
        match resource {
            ChildResource::Service(o) => apply_in(self.namespaced(namespace), name, o).await,
            ChildResource::ConfigMap(o) => apply_in(self.namespaced(namespace), name, o).await,
            ChildResource::StatefulSet(o) => apply_in(self.namespaced(namespace), name, o).await,
        }
    }

    async fn delete(
        &self,
        kind: ChildKind,
        name: &str,
        namespace: &str,
    ) -> Result<(), PlatformError> {
        debug!("Deleting {} {}/{}", kind, namespace, name);
        match kind {
            ChildKind::Service => delete_in(self.namespaced::<Service>(namespace), name).await,
            ChildKind::ConfigMap => delete_in(self.namespaced::<ConfigMap>(namespace), name).await,
            ChildKind::StatefulSet => {
                delete_in(self.namespaced::<StatefulSet>(namespace), name).await
            }
        }
    }
}
