//! Action Dispatcher
//!
//! Submits one proxy object per template to the hub, in the caller's order.
//! A create that hits an existing object counts as success so interrupted
//! runs can be retried. When template *k* fails, the objects this call created
//! before it are deleted again before the error is returned. Objects that were
//! already there are left alone.

use crate::domain::ports::{ControlPlaneRef, ResourceType, Spoke};
use crate::engine::renderer::{ManifestRenderer, TemplateVars};
use crate::engine::resolver::ResourceTypeResolverRef;
use crate::error::{Error, Result};
use crate::metrics::RunMetrics;
use tracing::{debug, info, warn};

/// A proxy object placed on the hub by the dispatcher
#[derive(Debug, Clone)]
pub struct AppliedObject {
    pub template: String,
    pub resource: ResourceType,
    pub namespace: Option<String>,
    pub name: String,
    /// False when the object already existed
    pub created: bool,
}

/// Creates and removes proxy objects on behalf of a spoke
#[derive(Clone)]
pub struct ActionDispatcher {
    control_plane: ControlPlaneRef,
    resolver: ResourceTypeResolverRef,
    renderer: ManifestRenderer,
    metrics: Option<RunMetrics>,
}

impl ActionDispatcher {
    pub fn new(
        control_plane: ControlPlaneRef,
        resolver: ResourceTypeResolverRef,
        renderer: ManifestRenderer,
    ) -> Self {
        Self {
            control_plane,
            resolver,
            renderer,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: RunMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Apply `templates` in order; all-or-nothing
    pub async fn apply(
        &self,
        spoke: &Spoke,
        templates: &[String],
        vars: &TemplateVars,
    ) -> Result<Vec<AppliedObject>> {
        let mut applied: Vec<AppliedObject> = Vec::with_capacity(templates.len());

        for template in templates {
            match self.apply_one(spoke, template, vars).await {
                Ok(object) => applied.push(object),
                Err(err) => {
                    warn!(
                        spoke = %spoke,
                        template = %template,
                        applied = applied.len(),
                        error = %err,
                        "Apply failed, rolling back"
                    );
                    return Err(self.rollback(spoke, &applied, err).await);
                }
            }
        }

        info!(spoke = %spoke, count = applied.len(), "Applied proxy objects");
        Ok(applied)
    }

    /// Delete the objects `templates` render to. Missing objects are fine.
    pub async fn remove(&self, spoke: &Spoke, templates: &[String], vars: &TemplateVars) -> Result<()> {
        let mut failures = Vec::new();

        for template in templates.iter().rev() {
            let located = async {
                let manifest = self.renderer.render(template, vars)?;
                let resource = self.resolver.resolve(&manifest.gvk).await?;
                let namespace = target_namespace(&resource, manifest.namespace(), spoke);
                Ok::<_, Error>(AppliedObject {
                    template: template.clone(),
                    resource,
                    namespace,
                    name: manifest.name().to_string(),
                    created: false,
                })
            }
            .await;

            let result = match located {
                Ok(object) => self.delete_object(&object).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!(spoke = %spoke, template = %template, error = %e, "Failed to remove proxy object");
                failures.push(format!("{}: {}", template, e));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Cleanup {
                spoke: spoke.to_string(),
                failures,
            })
        }
    }

    async fn apply_one(&self, spoke: &Spoke, template: &str, vars: &TemplateVars) -> Result<AppliedObject> {
        let manifest = self.renderer.render(template, vars)?;
        let resource = self.resolver.resolve(&manifest.gvk).await?;
        let namespace = target_namespace(&resource, manifest.namespace(), spoke);

        let created = match self
            .control_plane
            .create(&resource, namespace.as_deref(), &manifest.object)
            .await
        {
            Ok(_) => true,
            Err(e) if e.is_already_exists() => {
                debug!(
                    spoke = %spoke,
                    kind = %resource.kind(),
                    name = %manifest.name(),
                    "Object already exists, reusing it"
                );
                false
            }
            Err(e) => return Err(e),
        };

        Ok(AppliedObject {
            template: template.to_string(),
            name: manifest.name().to_string(),
            resource,
            namespace,
            created,
        })
    }

    async fn rollback(&self, spoke: &Spoke, applied: &[AppliedObject], cause: Error) -> Error {
        let created: Vec<&AppliedObject> = applied.iter().filter(|object| object.created).collect();
        if created.is_empty() {
            return cause;
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_rollback();
        }

        let mut failures = Vec::new();
        for object in created.iter().rev() {
            if let Err(e) = self.delete_object(object).await {
                warn!(
                    spoke = %spoke,
                    kind = %object.resource.kind(),
                    name = %object.name,
                    error = %e,
                    "Rollback delete failed"
                );
                failures.push(format!("delete {}/{}: {}", object.resource.kind(), object.name, e));
            }
        }

        if failures.is_empty() {
            info!(spoke = %spoke, count = created.len(), "Rolled back proxy objects");
            cause
        } else {
            Error::Rollback {
                source: Box::new(cause),
                failures,
            }
        }
    }

    async fn delete_object(&self, object: &AppliedObject) -> Result<()> {
        match self
            .control_plane
            .delete(&object.resource, object.namespace.as_deref(), &object.name)
            .await
        {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }
}

/// Namespace a proxy object goes into: its own, else the spoke's namespace on the hub
pub(crate) fn target_namespace(resource: &ResourceType, declared: Option<&str>, spoke: &Spoke) -> Option<String> {
    if resource.namespaced {
        Some(declared.unwrap_or(spoke.name()).to_string())
    } else {
        None
    }
}
