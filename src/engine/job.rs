//! Spoke Job Controller
//!
//! Drives one spoke through the full backup life cycle:
//!
//! ```text
//! Created ─► Dispatching ─► AwaitingLaunch ─► AwaitingCompletion ─► CleaningUp ─► Done
//!    │            │                │                   │
//!    ▼            └────────────────┴───────────────────┴──────────────► Failed
//! NonExistent
//! ```
//!
//! Every error is caught here and turned into a status record; nothing
//! propagates to the orchestrator.

use crate::config::OrchestratorConfig;
use crate::domain::ports::{ControlPlaneRef, Spoke, SpokeRegistryRef, TemplateStoreRef};
use crate::engine::dispatcher::ActionDispatcher;
use crate::engine::poller::ViewPoller;
use crate::engine::renderer::*;
use crate::engine::report::{JobOutcome, JobPhase, SpokeStatus};
use crate::engine::resolver::{DiscoveryResolver, ResourceTypeResolverRef};
use crate::error::{Error, Result};
use crate::metrics::RunMetrics;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Runs the backup life cycle for one spoke at a time
#[derive(Clone)]
pub struct SpokeJobController {
    config: Arc<OrchestratorConfig>,
    registry: SpokeRegistryRef,
    dispatcher: ActionDispatcher,
    poller: ViewPoller,
    metrics: Option<RunMetrics>,
}

impl SpokeJobController {
    pub fn new(
        config: Arc<OrchestratorConfig>,
        registry: SpokeRegistryRef,
        dispatcher: ActionDispatcher,
        poller: ViewPoller,
    ) -> Self {
        Self {
            config,
            registry,
            dispatcher,
            poller,
            metrics: None,
        }
    }

    /// Wire a controller whose dispatcher and poller share one discovery cache
    pub fn from_parts(
        config: Arc<OrchestratorConfig>,
        control_plane: ControlPlaneRef,
        registry: SpokeRegistryRef,
        templates: TemplateStoreRef,
    ) -> Self {
        let resolver: ResourceTypeResolverRef = Arc::new(DiscoveryResolver::new(control_plane.clone()));
        let renderer = ManifestRenderer::new(templates);
        let dispatcher = ActionDispatcher::new(control_plane.clone(), resolver.clone(), renderer.clone());
        let poller = ViewPoller::new(control_plane, resolver, renderer, config.templates.view.clone());
        Self::new(config, registry, dispatcher, poller)
    }

    pub fn with_metrics(mut self, metrics: RunMetrics) -> Self {
        self.dispatcher = self.dispatcher.with_metrics(metrics.clone());
        self.poller = self.poller.with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Variables for one attempt on `spoke`, with a fresh job suffix
    pub fn template_vars(&self, spoke: &Spoke) -> TemplateVars {
        let config = &self.config;
        let suffix = config
            .fixed_suffix
            .clone()
            .unwrap_or_else(|| random_suffix(config.suffix_length));

        let vars = TemplateVars::new()
            .set(VAR_RESOURCE_NAME, format!("{}-{}", config.job_name, suffix))
            .set(VAR_SPOKE_NAME, spoke.name())
            .set(VAR_RECOVERY_PATH, config.recovery_path.as_str())
            .set(VAR_IMAGE, config.image.as_str())
            .set(VAR_NAMESPACE, config.backup_namespace.as_str())
            .set(VAR_SERVICE_ACCOUNT, config.service_account.as_str())
            .set(VAR_SUFFIX, suffix);

        config
            .variables
            .iter()
            .fold(vars, |vars, (key, value)| vars.set(key.as_str(), value.as_str()))
    }

    /// Run the life cycle for `spoke` and report how it ended
    pub async fn run(&self, spoke: &Spoke) -> SpokeStatus {
        let started_at = Utc::now();
        let mut phase = JobPhase::Created;

        let result = self.drive(spoke, &mut phase).await;

        let (outcome, phase, error) = match result {
            Ok(()) => (JobOutcome::Done, JobPhase::Done, None),
            Err(e) if phase == JobPhase::Created => {
                warn!(spoke = %spoke, error = %e, "Cluster is not available");
                (JobOutcome::NonExistent, JobPhase::NonExistent, Some(e.to_string()))
            }
            Err(e) => {
                error!(spoke = %spoke, phase = %phase, error = %e, "Backup failed");
                (JobOutcome::Failed, phase, Some(e.to_string()))
            }
        };

        let status = SpokeStatus {
            spoke: spoke.clone(),
            outcome,
            error,
            phase,
            started_at,
            finished_at: Utc::now(),
        };

        if outcome == JobOutcome::Done {
            info!(spoke = %spoke, elapsed = ?status.elapsed(), "Backup finished");
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_outcome(outcome, status.elapsed());
        }

        status
    }

    async fn drive(&self, spoke: &Spoke, phase: &mut JobPhase) -> Result<()> {
        if !self.registry.exists(spoke).await? {
            return Err(Error::SpokeNotFound {
                spoke: spoke.to_string(),
            });
        }
        debug!(spoke = %spoke, "Cluster exists");

        let vars = self.template_vars(spoke);
        let templates = &self.config.templates;

        *phase = JobPhase::Dispatching;
        self.dispatcher.apply(spoke, &templates.create, &vars).await?;

        *phase = JobPhase::AwaitingLaunch;
        if let Err(e) = self.observe(spoke, &vars, phase).await {
            if let Err(cleanup) = self.poller.delete_view(spoke, &vars).await {
                warn!(spoke = %spoke, error = %cleanup, "Failed to delete view after failed wait");
            }
            return Err(e);
        }

        *phase = JobPhase::CleaningUp;
        self.cleanup(spoke, &vars).await;

        Ok(())
    }

    async fn observe(&self, spoke: &Spoke, vars: &TemplateVars, phase: &mut JobPhase) -> Result<()> {
        let config = &self.config;

        self.poller
            .wait_for(
                spoke,
                vars,
                &config.launch_condition,
                config.poll_interval,
                config.launch_timeout,
            )
            .await?;

        *phase = JobPhase::AwaitingCompletion;
        self.poller
            .wait_for(
                spoke,
                vars,
                &config.completion_condition,
                config.poll_interval,
                config.completion_timeout,
            )
            .await
    }

    /// Best-effort: the job's result is already known
    async fn cleanup(&self, spoke: &Spoke, vars: &TemplateVars) {
        let templates = &self.config.templates;

        if let Err(e) = self.poller.delete_view(spoke, vars).await {
            warn!(spoke = %spoke, error = %e, "Failed to delete view");
        }

        if !templates.cleanup.is_empty() {
            match self.dispatcher.apply(spoke, &templates.cleanup, vars).await {
                Ok(_) => info!(spoke = %spoke, "Requested removal of the backup namespace"),
                Err(e) => warn!(spoke = %spoke, error = %e, "Failed to request namespace removal"),
            }
        }

        if let Err(e) = self.dispatcher.remove(spoke, &templates.create, vars).await {
            warn!(spoke = %spoke, error = %e, "Failed to remove creation proxies");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::templates::TemplateCatalog;
    use crate::testing::{view_status, FakeControlPlane, FakeRegistry, ACTION_PLURAL, VIEW_PLURAL};
    use std::time::Duration;

    fn test_config() -> OrchestratorConfig {
        OrchestratorConfig {
            fixed_suffix: Some("test".into()),
            poll_interval: Duration::from_millis(10),
            launch_timeout: Duration::from_millis(150),
            completion_timeout: Duration::from_millis(150),
            ..Default::default()
        }
    }

    fn controller(cp: Arc<FakeControlPlane>, registry: FakeRegistry) -> SpokeJobController {
        SpokeJobController::from_parts(
            Arc::new(test_config()),
            cp,
            Arc::new(registry),
            Arc::new(TemplateCatalog::builtin()),
        )
    }

    #[tokio::test]
    async fn test_nonexistent_spoke_creates_nothing() {
        let cp = Arc::new(FakeControlPlane::new());
        let status = controller(cp.clone(), FakeRegistry::with_spokes(&["other"]))
            .run(&Spoke::new("ghost"))
            .await;

        assert_eq!(status.outcome, JobOutcome::NonExistent);
        assert_eq!(status.phase, JobPhase::NonExistent);
        assert!(status.error_text().contains("ghost"));
        assert_eq!(cp.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_registry_error_is_attached_to_nonexistent() {
        let cp = Arc::new(FakeControlPlane::new());
        let registry = FakeRegistry::with_spokes(&["sno-1"]).failing_on("sno-1");

        let status = controller(cp.clone(), registry).run(&Spoke::new("sno-1")).await;

        assert_eq!(status.outcome, JobOutcome::NonExistent);
        assert!(status.error_text().contains("registry unreachable for sno-1"));
        assert_eq!(cp.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_successful_run_cleans_up() {
        let cp = Arc::new(FakeControlPlane::new());
        cp.script_views("sno-1", 2, view_status(&["Processing"], &["Complete"]));
        let metrics = RunMetrics::new().unwrap();
        let ctl = controller(cp.clone(), FakeRegistry::with_spokes(&["sno-1"])).with_metrics(metrics.clone());

        let status = ctl.run(&Spoke::new("sno-1")).await;

        assert_eq!(status.outcome, JobOutcome::Done, "{:?}", status.error);
        assert_eq!(status.phase, JobPhase::Done);
        assert!(status.error.is_none());
        assert!(cp.names(VIEW_PLURAL, "sno-1").is_empty());
        assert_eq!(cp.names(ACTION_PLURAL, "sno-1"), vec!["backupresource-test-cleanup".to_string()]);
        assert_eq!(metrics.outcome_count(JobOutcome::Done), 1);
        assert!(metrics.view_polls() >= 2);
    }

    #[tokio::test]
    async fn test_completion_timeout_fails_and_drops_view() {
        let cp = Arc::new(FakeControlPlane::new());
        cp.script_views("sno-1", 1, view_status(&["Processing"], &[]));

        let status = controller(cp.clone(), FakeRegistry::with_spokes(&["sno-1"]))
            .run(&Spoke::new("sno-1"))
            .await;

        assert_eq!(status.outcome, JobOutcome::Failed);
        assert_eq!(status.phase, JobPhase::AwaitingCompletion);
        assert!(status.error_text().contains("Timed out"));
        assert!(cp.names(VIEW_PLURAL, "sno-1").is_empty());
        // the job proxies stay, the namespace is not reclaimed
        assert_eq!(cp.names(ACTION_PLURAL, "sno-1").len(), 4);
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_rolled_back() {
        let cp = Arc::new(FakeControlPlane::new());
        cp.fail_create_of("backupresource-test-job");

        let status = controller(cp.clone(), FakeRegistry::with_spokes(&["sno-1"]))
            .run(&Spoke::new("sno-1"))
            .await;

        assert_eq!(status.outcome, JobOutcome::Failed);
        assert_eq!(status.phase, JobPhase::Dispatching);
        assert_eq!(cp.open_objects(), 0);
    }

    #[test]
    fn test_template_vars_carry_suffix() {
        let config = OrchestratorConfig::default();
        let ctl = SpokeJobController::from_parts(
            Arc::new(config),
            Arc::new(FakeControlPlane::new()),
            Arc::new(FakeRegistry::default()),
            Arc::new(TemplateCatalog::builtin()),
        );
        let spoke = Spoke::new("sno-1");

        let vars = ctl.template_vars(&spoke);
        let suffix = vars.get(VAR_SUFFIX).unwrap();
        assert_eq!(suffix.len(), 4);
        assert_eq!(vars.resource_name(), format!("backupresource-{}", suffix));
        assert_eq!(vars.get(VAR_SPOKE_NAME), Some("sno-1"));
        assert_eq!(vars.get(VAR_RECOVERY_PATH), Some("/var/recovery"));
    }

    #[test]
    fn test_configured_variables_override_builtins() {
        let mut config = OrchestratorConfig::default();
        config.variables.insert(VAR_RECOVERY_PATH.into(), "/mnt/recovery".into());
        config.variables.insert("site".into(), "edge-7".into());
        let ctl = SpokeJobController::from_parts(
            Arc::new(config),
            Arc::new(FakeControlPlane::new()),
            Arc::new(FakeRegistry::default()),
            Arc::new(TemplateCatalog::builtin()),
        );

        let vars = ctl.template_vars(&Spoke::new("sno-1"));
        assert_eq!(vars.get(VAR_RECOVERY_PATH), Some("/mnt/recovery"));
        assert_eq!(vars.get("site"), Some("edge-7"));
    }
}
