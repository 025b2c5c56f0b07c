//! Kubernetes-backed hub control plane
//!
//! Talks to the hub API server through `kube` dynamic objects, so any kind
//! the hub serves can be created, read or deleted once discovery has mapped
//! it to a resource.

use crate::domain::ports::{ControlPlane, ResourceType};
use crate::error::{Error, Result};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use kube::api::{Api, DeleteParams, DynamicObject, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::GroupVersionKind;
use kube::discovery::{self, Scope};
use kube::{Client, Config};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Build a client from `kubeconfig`, or from the environment when absent
pub async fn connect(kubeconfig: Option<&Path>) -> Result<Client> {
    let config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::Configuration(format!("Cannot read kubeconfig {}: {}", path.display(), e))
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| Error::Configuration(format!("Invalid kubeconfig {}: {}", path.display(), e)))?
        }
        None => Config::infer()
            .await
            .map_err(|e| Error::Configuration(format!("Cannot infer hub cluster config: {}", e)))?,
    };

    info!(cluster_url = %config.cluster_url, "Connecting to hub cluster");
    Ok(Client::try_from(config)?)
}

/// Hub control plane backed by a live API server
#[derive(Clone)]
pub struct KubeControlPlane {
    client: Client,
    discovery_retry: Duration,
}

impl KubeControlPlane {
    pub fn new(client: Client, discovery_retry: Duration) -> Self {
        Self {
            client,
            discovery_retry,
        }
    }

    fn api(&self, resource: &ResourceType, namespace: Option<&str>) -> Api<DynamicObject> {
        match (resource.namespaced, namespace) {
            (true, Some(ns)) => Api::namespaced_with(self.client.clone(), ns, &resource.api),
            (true, None) => Api::default_namespaced_with(self.client.clone(), &resource.api),
            (false, _) => Api::all_with(self.client.clone(), &resource.api),
        }
    }
}

/// Turn API status codes the engine reacts to into typed errors
pub(crate) fn classify(err: kube::Error, kind: &str, name: &str) -> Error {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => Error::ResourceNotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(resp) if resp.code == 409 => Error::ResourceExists {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        other => Error::Kube(other),
    }
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    async fn create(
        &self,
        resource: &ResourceType,
        namespace: Option<&str>,
        object: &DynamicObject,
    ) -> Result<DynamicObject> {
        let name = object.metadata.name.clone().unwrap_or_default();
        self.api(resource, namespace)
            .create(&PostParams::default(), object)
            .await
            .map_err(|e| classify(e, resource.kind(), &name))
    }

    async fn get(
        &self,
        resource: &ResourceType,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject> {
        self.api(resource, namespace)
            .get(name)
            .await
            .map_err(|e| classify(e, resource.kind(), name))
    }

    async fn delete(&self, resource: &ResourceType, namespace: Option<&str>, name: &str) -> Result<()> {
        self.api(resource, namespace)
            .delete(name, &DeleteParams::background())
            .await
            .map(|_| ())
            .map_err(|e| classify(e, resource.kind(), name))
    }

    async fn discover(&self, gvk: &GroupVersionKind) -> Result<ResourceType> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(250))
            .with_max_elapsed_time(Some(self.discovery_retry))
            .build();

        let pinned = backoff::future::retry(policy, || async {
            discovery::pinned_kind(&self.client, gvk).await.map_err(|e| {
                let err = Error::Kube(e);
                if err.is_transient() {
                    warn!(kind = %gvk.kind, error = %err, "Discovery failed, retrying");
                    backoff::Error::transient(err)
                } else {
                    backoff::Error::permanent(err)
                }
            })
        })
        .await;

        match pinned {
            Ok((api, caps)) => {
                debug!(kind = %gvk.kind, plural = %api.plural, "Discovered resource");
                Ok(ResourceType::new(api, caps.scope == Scope::Namespaced))
            }
            Err(e) => Err(Error::NotMappable {
                kind: gvk.kind.clone(),
                group: gvk.group.clone(),
                version: gvk.version.clone(),
                reason: e.to_string(),
            }),
        }
    }
}
