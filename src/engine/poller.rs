//! View Poller
//!
//! Observes a spoke-side object through a view proxy on the hub. A wait
//! creates the view (reusing one that already exists), reads it once per
//! interval and evaluates its condition list until the expected condition
//! holds or the deadline passes. A view that has not been populated yet is
//! "not yet", never an error; a failed read is returned at once.
//!
//! The view is named after the observed object, so there is never more than
//! one live view per (spoke, target). The caller deletes it when done.

use crate::config::{WaitCondition, CONDITION_TRUE};
use crate::domain::ports::{ControlPlaneRef, ResourceType, Spoke};
use crate::engine::dispatcher::target_namespace;
use crate::engine::renderer::{ManifestRenderer, RenderedManifest, TemplateVars};
use crate::engine::resolver::ResourceTypeResolverRef;
use crate::error::{Error, Result};
use crate::metrics::RunMetrics;
use serde_json::Value;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

// =============================================================================
// Observation
// =============================================================================

/// Result of evaluating one read of a view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// The expected condition holds
    Satisfied,
    /// The view is not populated yet or the condition does not hold yet
    Pending,
    /// The failure condition holds
    Failed(String),
}

/// Evaluate a view body against `condition`
pub fn evaluate(view: &Value, condition: &WaitCondition) -> Observation {
    let conditions = condition
        .conditions_path
        .iter()
        .try_fold(view, |node, key| node.get(key))
        .and_then(Value::as_array);

    let Some(conditions) = conditions else {
        return Observation::Pending;
    };

    let holds = |wanted: &str| {
        conditions.iter().find(|c| {
            c.get("type").and_then(Value::as_str) == Some(wanted)
                && c.get("status").and_then(Value::as_str) == Some(CONDITION_TRUE)
        })
    };

    if let Some(failure_type) = &condition.failure_type {
        if let Some(failed) = holds(failure_type.as_str()) {
            let reason = failed
                .get("message")
                .or_else(|| failed.get("reason"))
                .and_then(Value::as_str)
                .unwrap_or(failure_type.as_str());
            return Observation::Failed(reason.to_string());
        }
    }

    if holds(condition.condition_type.as_str()).is_some() {
        Observation::Satisfied
    } else {
        Observation::Pending
    }
}

// =============================================================================
// View Handle
// =============================================================================

/// Location of a view proxy on the hub
#[derive(Debug, Clone)]
pub struct ViewHandle {
    pub resource: ResourceType,
    pub namespace: Option<String>,
    pub name: String,
    /// Name of the observed object on the spoke
    pub target: String,
}

// =============================================================================
// View Poller
// =============================================================================

/// Waits for conditions on spoke objects through view proxies
#[derive(Clone)]
pub struct ViewPoller {
    control_plane: ControlPlaneRef,
    resolver: ResourceTypeResolverRef,
    renderer: ManifestRenderer,
    view_template: String,
    metrics: Option<RunMetrics>,
}

impl ViewPoller {
    pub fn new(
        control_plane: ControlPlaneRef,
        resolver: ResourceTypeResolverRef,
        renderer: ManifestRenderer,
        view_template: impl Into<String>,
    ) -> Self {
        Self {
            control_plane,
            resolver,
            renderer,
            view_template: view_template.into(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: RunMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Wait until `condition` holds on the object `vars` address.
    ///
    /// Returns within `timeout` plus the duration of one read, view creation
    /// included.
    pub async fn wait_for(
        &self,
        spoke: &Spoke,
        vars: &TemplateVars,
        condition: &WaitCondition,
        interval: Duration,
        timeout: Duration,
    ) -> Result<()> {
        let deadline = Instant::now().checked_add(timeout).ok_or_else(|| {
            Error::Configuration(format!("wait timeout {:?} is out of range", timeout))
        })?;
        let target = vars.resource_name();

        let waiting = async {
            let view = self.ensure_view(spoke, vars).await?;
            debug!(
                spoke = %spoke,
                view = %view.name,
                condition = %condition.label,
                ?interval,
                ?timeout,
                "Polling view"
            );
            self.poll(spoke, &view, condition, interval).await
        };

        match tokio::time::timeout_at(deadline, waiting).await {
            Ok(result) => result,
            Err(_) => {
                warn!(spoke = %spoke, target = %target, condition = %condition.label, "Timed out waiting for condition");
                Err(Error::Timeout {
                    spoke: spoke.to_string(),
                    condition: format!("{} of {}", condition.label, target),
                    after: timeout,
                })
            }
        }
    }

    /// Delete the view `vars` address. A missing view is fine.
    pub async fn delete_view(&self, spoke: &Spoke, vars: &TemplateVars) -> Result<()> {
        let (manifest, resource) = self.render_view(vars).await?;
        let namespace = target_namespace(&resource, manifest.namespace(), spoke);

        match self
            .control_plane
            .delete(&resource, namespace.as_deref(), manifest.name())
            .await
        {
            Ok(()) => {
                debug!(spoke = %spoke, view = %manifest.name(), "Deleted view");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Create the view, or reuse the one already there
    async fn ensure_view(&self, spoke: &Spoke, vars: &TemplateVars) -> Result<ViewHandle> {
        let (manifest, resource) = self.render_view(vars).await?;
        let namespace = target_namespace(&resource, manifest.namespace(), spoke);

        match self
            .control_plane
            .create(&resource, namespace.as_deref(), &manifest.object)
            .await
        {
            Ok(_) => info!(spoke = %spoke, view = %manifest.name(), "Created view"),
            Err(e) if e.is_already_exists() => {
                debug!(spoke = %spoke, view = %manifest.name(), "View already exists, reusing it")
            }
            Err(e) => return Err(e),
        }

        Ok(ViewHandle {
            name: manifest.name().to_string(),
            target: vars.resource_name().to_string(),
            resource,
            namespace,
        })
    }

    async fn render_view(&self, vars: &TemplateVars) -> Result<(RenderedManifest, ResourceType)> {
        let manifest = self.renderer.render(&self.view_template, vars)?;
        let resource = self.resolver.resolve(&manifest.gvk).await?;
        Ok((manifest, resource))
    }

    async fn poll(
        &self,
        spoke: &Spoke,
        view: &ViewHandle,
        condition: &WaitCondition,
        interval: Duration,
    ) -> Result<()> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Some(metrics) = &self.metrics {
                metrics.record_view_poll();
            }

            let object = self
                .control_plane
                .get(&view.resource, view.namespace.as_deref(), &view.name)
                .await
                .map_err(|e| Error::Observation {
                    spoke: spoke.to_string(),
                    view: view.name.clone(),
                    reason: e.to_string(),
                })?;

            match evaluate(&object.data, condition) {
                Observation::Satisfied => {
                    info!(spoke = %spoke, target = %view.target, condition = %condition.label, "Condition satisfied");
                    return Ok(());
                }
                Observation::Failed(reason) => {
                    return Err(Error::JobFailed {
                        spoke: spoke.to_string(),
                        job: view.target.clone(),
                        reason,
                    });
                }
                Observation::Pending => {
                    debug!(spoke = %spoke, view = %view.name, condition = %condition.label, "Condition not met yet");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::renderer::*;
    use crate::domain::ports::ControlPlane;
    use crate::engine::resolver::DiscoveryResolver;
    use crate::engine::templates::{TemplateCatalog, JOB_VIEW};
    use crate::testing::{view_status, FakeControlPlane, VIEW_PLURAL};
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::sync::Arc;

    const INTERVAL: Duration = Duration::from_millis(10);

    fn vars() -> TemplateVars {
        TemplateVars::new()
            .set(VAR_RESOURCE_NAME, "backupresource-k9z0")
            .set(VAR_SPOKE_NAME, "sno-1")
            .set(VAR_NAMESPACE, "backupresource")
    }

    fn poller(cp: Arc<FakeControlPlane>) -> ViewPoller {
        ViewPoller::new(
            cp.clone(),
            Arc::new(DiscoveryResolver::new(cp)),
            ManifestRenderer::new(Arc::new(TemplateCatalog::builtin())),
            JOB_VIEW,
        )
    }

    #[test]
    fn test_evaluate_paths() {
        let launched = WaitCondition::launched();
        let completed = WaitCondition::completed();

        assert_eq!(evaluate(&json!({}), &launched), Observation::Pending);
        assert_eq!(evaluate(&json!({ "status": {} }), &completed), Observation::Pending);
        assert_eq!(
            evaluate(&json!({ "status": view_status(&["Processing"], &[]) }), &launched),
            Observation::Satisfied
        );
        assert_eq!(
            evaluate(&json!({ "status": view_status(&["Processing"], &[]) }), &completed),
            Observation::Pending
        );
        assert_eq!(
            evaluate(&json!({ "status": view_status(&[], &["Complete"]) }), &completed),
            Observation::Satisfied
        );
    }

    #[test]
    fn test_evaluate_requires_true_status() {
        let view = json!({ "status": { "conditions": [{ "type": "Processing", "status": "False" }] } });
        assert_eq!(evaluate(&view, &WaitCondition::launched()), Observation::Pending);
    }

    #[test]
    fn test_evaluate_failure_condition() {
        let view = json!({ "status": { "result": { "status": { "conditions": [
            { "type": "Failed", "status": "True", "message": "BackoffLimitExceeded" }
        ] } } } });
        assert_eq!(
            evaluate(&view, &WaitCondition::completed()),
            Observation::Failed("BackoffLimitExceeded".into())
        );
    }

    #[tokio::test]
    async fn test_populated_on_third_tick() {
        let cp = Arc::new(FakeControlPlane::new());
        cp.script_views("sno-1", 3, view_status(&["Processing"], &[]));
        let p = poller(cp.clone());

        p.wait_for(
            &Spoke::new("sno-1"),
            &vars(),
            &WaitCondition::launched(),
            INTERVAL,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(cp.get_calls(), 3);
        assert!(cp.contains(VIEW_PLURAL, "sno-1", "backupresource-k9z0-view"));
    }

    #[tokio::test]
    async fn test_timeout_is_bounded() {
        let cp = Arc::new(FakeControlPlane::new());
        let p = poller(cp.clone());
        let timeout = Duration::from_millis(80);

        let started = std::time::Instant::now();
        let err = p
            .wait_for(&Spoke::new("sno-1"), &vars(), &WaitCondition::completed(), INTERVAL, timeout)
            .await
            .unwrap_err();

        assert_matches!(err, Error::Timeout { ref spoke, .. } if spoke == "sno-1");
        assert!(started.elapsed() < timeout + INTERVAL + Duration::from_millis(200));
        assert!(cp.get_calls() >= 2);
    }

    /// Control plane whose creates stall
    struct StallingControlPlane {
        inner: FakeControlPlane,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl ControlPlane for StallingControlPlane {
        async fn create(
            &self,
            resource: &ResourceType,
            namespace: Option<&str>,
            object: &kube::api::DynamicObject,
        ) -> Result<kube::api::DynamicObject> {
            tokio::time::sleep(self.delay).await;
            self.inner.create(resource, namespace, object).await
        }

        async fn get(&self, resource: &ResourceType, namespace: Option<&str>, name: &str) -> Result<kube::api::DynamicObject> {
            self.inner.get(resource, namespace, name).await
        }

        async fn delete(&self, resource: &ResourceType, namespace: Option<&str>, name: &str) -> Result<()> {
            self.inner.delete(resource, namespace, name).await
        }

        async fn discover(&self, gvk: &kube::core::GroupVersionKind) -> Result<ResourceType> {
            self.inner.discover(gvk).await
        }
    }

    #[tokio::test]
    async fn test_stalled_view_create_is_bounded() {
        let cp = Arc::new(StallingControlPlane {
            inner: FakeControlPlane::new(),
            delay: Duration::from_secs(2),
        });
        let p = ViewPoller::new(
            cp.clone(),
            Arc::new(DiscoveryResolver::new(cp.clone())),
            ManifestRenderer::new(Arc::new(TemplateCatalog::builtin())),
            JOB_VIEW,
        );
        let timeout = Duration::from_millis(100);

        let started = std::time::Instant::now();
        let err = p
            .wait_for(&Spoke::new("sno-1"), &vars(), &WaitCondition::launched(), INTERVAL, timeout)
            .await
            .unwrap_err();

        assert_matches!(err, Error::Timeout { ref condition, .. } if condition.contains("backupresource-k9z0"));
        assert!(started.elapsed() < timeout + INTERVAL + Duration::from_millis(200));
        assert_eq!(cp.inner.get_calls(), 0);
    }

    #[tokio::test]
    async fn test_out_of_range_timeout_is_rejected() {
        let cp = Arc::new(FakeControlPlane::new());
        let p = poller(cp.clone());

        let err = p
            .wait_for(&Spoke::new("sno-1"), &vars(), &WaitCondition::launched(), INTERVAL, Duration::MAX)
            .await
            .unwrap_err();

        assert_matches!(err, Error::Configuration(_));
        assert_eq!(cp.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_existing_view_is_reused() {
        let cp = Arc::new(FakeControlPlane::new());
        cp.script_views("sno-1", 1, view_status(&["Processing"], &["Complete"]));
        let p = poller(cp.clone());
        let spoke = Spoke::new("sno-1");

        p.wait_for(&spoke, &vars(), &WaitCondition::launched(), INTERVAL, Duration::from_secs(5))
            .await
            .unwrap();
        p.wait_for(&spoke, &vars(), &WaitCondition::completed(), INTERVAL, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(cp.create_calls(), 2);
        assert_eq!(cp.names(VIEW_PLURAL, "sno-1").len(), 1);

        p.delete_view(&spoke, &vars()).await.unwrap();
        assert_eq!(cp.open_objects(), 0);
        // deleting twice is fine
        p.delete_view(&spoke, &vars()).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_error_returns_immediately() {
        let cp = Arc::new(FakeControlPlane::new());
        cp.fail_get_of("backupresource-k9z0-view");
        let p = poller(cp.clone());

        let started = std::time::Instant::now();
        let err = p
            .wait_for(
                &Spoke::new("sno-1"),
                &vars(),
                &WaitCondition::launched(),
                INTERVAL,
                Duration::from_secs(30),
            )
            .await
            .unwrap_err();

        assert_matches!(err, Error::Observation { .. });
        assert_eq!(cp.get_calls(), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_job_failure_stops_waiting() {
        let cp = Arc::new(FakeControlPlane::new());
        cp.script_views("sno-1", 2, view_status(&["Processing"], &["Failed"]));
        let p = poller(cp.clone());

        let err = p
            .wait_for(
                &Spoke::new("sno-1"),
                &vars(),
                &WaitCondition::completed(),
                INTERVAL,
                Duration::from_secs(30),
            )
            .await
            .unwrap_err();

        assert_matches!(err, Error::JobFailed { ref job, .. } if job == "backupresource-k9z0");
        assert_eq!(cp.get_calls(), 2);
    }
}
