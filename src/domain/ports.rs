//! Domain Ports - Core trait definitions for the backup orchestrator
//!
//! These traits define the boundaries between the orchestration engine and
//! the hub control plane. Adapters implement these traits to provide
//! concrete functionality; tests inject in-memory fakes.

use crate::error::Result;
use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::core::{ApiResource, GroupVersionKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Spoke
// =============================================================================

/// Name of a managed spoke cluster
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Spoke(String);

impl Spoke {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Parse a comma separated list, trimming blanks and dropping empties
    pub fn parse_list(list: &str) -> Vec<Spoke> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Spoke::new)
            .collect()
    }
}

impl std::fmt::Display for Spoke {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Spoke {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Spoke {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// =============================================================================
// Resource Types
// =============================================================================

/// A concrete, addressable resource type on the hub control plane
#[derive(Debug, Clone)]
pub struct ResourceType {
    /// Group, version, kind and plural of the resource
    pub api: ApiResource,
    /// Whether objects of this type live in a namespace
    pub namespaced: bool,
}

impl ResourceType {
    pub fn new(api: ApiResource, namespaced: bool) -> Self {
        Self { api, namespaced }
    }

    /// Build a resource type from its parts
    pub fn from_parts(group: &str, version: &str, kind: &str, plural: &str, namespaced: bool) -> Self {
        let gvk = GroupVersionKind::gvk(group, version, kind);
        Self::new(ApiResource::from_gvk_with_plural(&gvk, plural), namespaced)
    }

    pub fn kind(&self) -> &str {
        &self.api.kind
    }

    pub fn plural(&self) -> &str {
        &self.api.plural
    }
}

/// Split an `apiVersion` string into group and version
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

// =============================================================================
// Control Plane Port
// =============================================================================

/// Port for hub control-plane operations on proxy objects.
///
/// Adapters map "not found" responses to `Error::ResourceNotFound` and
/// "already exists" responses to `Error::ResourceExists`.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Create an object. `namespace` is ignored for cluster-scoped types.
    async fn create(
        &self,
        resource: &ResourceType,
        namespace: Option<&str>,
        object: &DynamicObject,
    ) -> Result<DynamicObject>;

    /// Fetch an object by name
    async fn get(
        &self,
        resource: &ResourceType,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject>;

    /// Delete an object by name
    async fn delete(&self, resource: &ResourceType, namespace: Option<&str>, name: &str) -> Result<()>;

    /// Discover the resource type serving a group/version/kind
    async fn discover(&self, gvk: &GroupVersionKind) -> Result<ResourceType>;
}

// =============================================================================
// Spoke Registry Port
// =============================================================================

/// Port for checking that a spoke is registered and reachable
#[async_trait]
pub trait SpokeRegistry: Send + Sync {
    /// Whether the spoke exists and reports itself available
    async fn exists(&self, spoke: &Spoke) -> Result<bool>;
}

// =============================================================================
// Template Store Port
// =============================================================================

/// Port for looking up named manifest template bodies
pub trait TemplateStore: Send + Sync {
    /// Template body for `name`, if registered
    fn lookup(&self, name: &str) -> Option<&str>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type ControlPlaneRef = Arc<dyn ControlPlane>;
pub type SpokeRegistryRef = Arc<dyn SpokeRegistry>;
pub type TemplateStoreRef = Arc<dyn TemplateStore>;
