//! Child resource kinds managed per ZooKeeper cluster.

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use std::fmt;

/// Kind of a child resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChildKind {
    /// Headless network endpoint for ensemble members
    Service,
    /// Ensemble configuration injected as environment
    ConfigMap,
    /// Replicated ensemble members
    StatefulSet,
}

impl ChildKind {
    /// Kubernetes kind name
    pub fn as_str(self) -> &'static str {
        match self {
            ChildKind::Service => "Service",
            ChildKind::ConfigMap => "ConfigMap",
            ChildKind::StatefulSet => "StatefulSet",
        }
    }
}

impl fmt::Display for ChildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully specified child resource ready to be created or updated.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildResource {
    /// Headless Service
    Service(Service),
    /// ConfigMap
    ConfigMap(ConfigMap),
    /// StatefulSet
    StatefulSet(StatefulSet),
}

impl ChildResource {
    /// Kind of the wrapped object
    pub fn kind(&self) -> ChildKind {
        match self {
            ChildResource::Service(_) => ChildKind::Service,
            ChildResource::ConfigMap(_) => ChildKind::ConfigMap,
            ChildResource::StatefulSet(_) => ChildKind::StatefulSet,
        }
    }

    /// `metadata.name` of the wrapped object
    pub fn name(&self) -> Option<&str> {
        let metadata = match self {
            ChildResource::Service(o) => &o.metadata,
            ChildResource::ConfigMap(o) => &o.metadata,
            ChildResource::StatefulSet(o) => &o.metadata,
        };
        metadata.name.as_deref()
    }

    /// `metadata.namespace` of the wrapped object
    pub fn namespace(&self) -> Option<&str> {
        let metadata = match self {
            ChildResource::Service(o) => &o.metadata,
            ChildResource::ConfigMap(o) => &o.metadata,
            ChildResource::StatefulSet(o) => &o.metadata,
        };
        metadata.namespace.as_deref()
    }
}

impl From<Service> for ChildResource {
    fn from(value: Service) -> Self {
        ChildResource::Service(value)
    }
}

impl From<ConfigMap> for ChildResource {
    fn from(value: ConfigMap) -> Self {
        ChildResource::ConfigMap(value)
    }
}

impl From<StatefulSet> for ChildResource {
    fn from(value: StatefulSet) -> Self {
        ChildResource::StatefulSet(value)
    }
}
