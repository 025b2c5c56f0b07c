//! Managed cluster registry
//!
//! A spoke exists when the hub holds a ManagedCluster of that name whose
//! `ManagedClusterConditionAvailable` condition is True.

use crate::config::CONDITION_TRUE;
use crate::domain::ports::{ControlPlaneRef, ResourceType, Spoke, SpokeRegistry};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

pub const AVAILABLE_CONDITION: &str = "ManagedClusterConditionAvailable";

/// Spoke registry reading ManagedCluster objects from the hub
pub struct ManagedClusterRegistry {
    control_plane: ControlPlaneRef,
    resource: ResourceType,
}

impl ManagedClusterRegistry {
    pub fn new(control_plane: ControlPlaneRef) -> Self {
        Self {
            control_plane,
            resource: ResourceType::from_parts(
                "cluster.open-cluster-management.io",
                "v1",
                "ManagedCluster",
                "managedclusters",
                false,
            ),
        }
    }
}

/// Whether the cluster's status reports it available
pub fn is_available(cluster: &Value) -> bool {
    cluster
        .pointer("/status/conditions")
        .and_then(Value::as_array)
        .map(|conditions| {
            conditions.iter().any(|c| {
                c.get("type").and_then(Value::as_str) == Some(AVAILABLE_CONDITION)
                    && c.get("status").and_then(Value::as_str) == Some(CONDITION_TRUE)
            })
        })
        .unwrap_or(false)
}

#[async_trait]
impl SpokeRegistry for ManagedClusterRegistry {
    async fn exists(&self, spoke: &Spoke) -> Result<bool> {
        match self.control_plane.get(&self.resource, None, spoke.name()).await {
            Ok(cluster) => {
                let available = is_available(&cluster.data);
                debug!(spoke = %spoke, available, "Looked up managed cluster");
                Ok(available)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}
