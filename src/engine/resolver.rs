//! Resource Type Resolver
//!
//! Maps a manifest's group/version/kind to the concrete resource type served
//! by the hub. Discovery round-trips are expensive and rate limited, so the
//! discovery-backed resolver caches every mapping for the life of the run.

use crate::domain::ports::{ControlPlaneRef, ResourceType};
use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use kube::core::GroupVersionKind;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Port for resolving resource types
#[async_trait]
pub trait ResourceTypeResolver: Send + Sync {
    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<ResourceType>;
}

pub type ResourceTypeResolverRef = Arc<dyn ResourceTypeResolver>;

/// Cache key for a group/version/kind
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GvkKey {
    group: String,
    version: String,
    kind: String,
}

impl From<&GroupVersionKind> for GvkKey {
    fn from(gvk: &GroupVersionKind) -> Self {
        Self {
            group: gvk.group.clone(),
            version: gvk.version.clone(),
            kind: gvk.kind.clone(),
        }
    }
}

fn not_mappable(gvk: &GroupVersionKind, reason: impl Into<String>) -> Error {
    Error::NotMappable {
        kind: gvk.kind.clone(),
        group: gvk.group.clone(),
        version: gvk.version.clone(),
        reason: reason.into(),
    }
}

// =============================================================================
// Discovery Resolver
// =============================================================================

/// Resolver backed by control-plane discovery with a run-long cache
pub struct DiscoveryResolver {
    control_plane: ControlPlaneRef,
    cache: DashMap<GvkKey, ResourceType>,
    lookups: AtomicU64,
}

impl DiscoveryResolver {
    pub fn new(control_plane: ControlPlaneRef) -> Self {
        Self {
            control_plane,
            cache: DashMap::new(),
            lookups: AtomicU64::new(0),
        }
    }

    /// Number of discovery calls issued so far
    pub fn discovery_calls(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    pub fn cached_types(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl ResourceTypeResolver for DiscoveryResolver {
    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<ResourceType> {
        let key = GvkKey::from(gvk);
        if let Some(found) = self.cache.get(&key) {
            return Ok(found.clone());
        }

        self.lookups.fetch_add(1, Ordering::Relaxed);
        let resolved = self.control_plane.discover(gvk).await.map_err(|e| match e {
            e @ Error::NotMappable { .. } => e,
            other => not_mappable(gvk, other.to_string()),
        })?;

        debug!(
            kind = %gvk.kind,
            group = %gvk.group,
            version = %gvk.version,
            plural = %resolved.plural(),
            "Resolved resource type"
        );
        self.cache.insert(key, resolved.clone());

        Ok(resolved)
    }
}

// =============================================================================
// Static Resolver
// =============================================================================

/// Resolver over a fixed mapping, for tests and offline use
#[derive(Default)]
pub struct StaticResolver {
    types: HashMap<GvkKey, ResourceType>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, resource: ResourceType) -> Self {
        let gvk = GroupVersionKind::gvk(&resource.api.group, &resource.api.version, &resource.api.kind);
        self.types.insert(GvkKey::from(&gvk), resource);
        self
    }
}

#[async_trait]
impl ResourceTypeResolver for StaticResolver {
    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<ResourceType> {
        self.types
            .get(&GvkKey::from(gvk))
            .cloned()
            .ok_or_else(|| not_mappable(gvk, "no static mapping"))
    }
}
