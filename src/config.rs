//! Orchestrator configuration
//!
//! Every tunable of a backup run lives here and is handed to the engine at
//! construction time. The struct deserializes from a YAML file (durations as
//! integer seconds) and CLI flags override individual fields.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

// =============================================================================
// Defaults
// =============================================================================

/// Interval between two reads of a view
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Time allowed for the job to show up on the spoke
pub const DEFAULT_LAUNCH_TIMEOUT_SECS: u64 = 5 * 60;

/// Time allowed for the job to finish once launched
pub const DEFAULT_COMPLETION_TIMEOUT_SECS: u64 = 15 * 60;

/// Budget for retrying transient discovery failures
pub const DEFAULT_DISCOVERY_RETRY_SECS: u64 = 30;

/// Upper bound for the poll interval and both wait timeouts
pub const MAX_WAIT_SECS: u64 = 7 * 24 * 60 * 60;

/// Value a condition's `status` field carries when it holds
pub const CONDITION_TRUE: &str = "True";

// =============================================================================
// Wait Conditions
// =============================================================================

/// A condition to look for inside a view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitCondition {
    /// Human label used in logs and errors ("launched", "completed")
    pub label: String,
    /// Path from the view root to the condition list
    pub conditions_path: Vec<String>,
    /// Condition type that satisfies the wait
    pub condition_type: String,
    /// Condition type that fails the wait immediately
    #[serde(default)]
    pub failure_type: Option<String>,
}

impl WaitCondition {
    /// The agent found the job on the spoke
    pub fn launched() -> Self {
        Self {
            label: "launched".to_string(),
            conditions_path: vec!["status".into(), "conditions".into()],
            condition_type: "Processing".to_string(),
            failure_type: None,
        }
    }

    /// The job ran to completion on the spoke
    pub fn completed() -> Self {
        Self {
            label: "completed".to_string(),
            conditions_path: vec![
                "status".into(),
                "result".into(),
                "status".into(),
                "conditions".into(),
            ],
            condition_type: "Complete".to_string(),
            failure_type: Some("Failed".to_string()),
        }
    }
}

// =============================================================================
// Template Selection
// =============================================================================

/// Names of the templates used at each stage of a spoke run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TemplateSelection {
    /// Applied in order to launch the job
    pub create: Vec<String>,
    /// View proxy observing the job
    pub view: String,
    /// Applied after completion to reclaim the spoke namespace
    pub cleanup: Vec<String>,
}

impl Default for TemplateSelection {
    fn default() -> Self {
        use crate::engine::templates::*;
        Self {
            create: vec![
                NAMESPACE_ACTION.to_string(),
                SERVICE_ACCOUNT_ACTION.to_string(),
                ROLE_BINDING_ACTION.to_string(),
                BACKUP_JOB_ACTION.to_string(),
            ],
            view: JOB_VIEW.to_string(),
            cleanup: vec![NAMESPACE_DELETE_ACTION.to_string()],
        }
    }
}

// =============================================================================
// Orchestrator Configuration
// =============================================================================

/// Configuration for the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OrchestratorConfig {
    /// Container image running the backup on the spoke
    pub image: String,
    /// Host path of the recovery partition on the spoke
    pub recovery_path: String,
    /// Namespace created on the spoke for the job
    pub backup_namespace: String,
    /// Base name of the job; a random suffix is appended per attempt
    pub job_name: String,
    /// Service account the job runs as
    pub service_account: String,
    /// Length of the random suffix
    pub suffix_length: usize,
    /// Use this suffix instead of a random one
    pub fixed_suffix: Option<String>,
    /// Interval between view reads
    #[serde(rename = "pollIntervalSecs", with = "duration_secs")]
    pub poll_interval: Duration,
    /// Deadline for the launch wait
    #[serde(rename = "launchTimeoutSecs", with = "duration_secs")]
    pub launch_timeout: Duration,
    /// Deadline for the completion wait
    #[serde(rename = "completionTimeoutSecs", with = "duration_secs")]
    pub completion_timeout: Duration,
    /// Budget for retrying transient discovery errors
    #[serde(rename = "discoveryRetrySecs", with = "duration_secs")]
    pub discovery_retry: Duration,
    /// Maximum spokes processed at once; unbounded when unset
    pub max_concurrency: Option<usize>,
    /// Templates used at each stage
    pub templates: TemplateSelection,
    /// Extra template variables; these win over the built-in ones
    pub variables: BTreeMap<String, String>,
    /// Condition marking the job as launched
    pub launch_condition: WaitCondition,
    /// Condition marking the job as completed
    pub completion_condition: WaitCondition,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            image: "quay.io/redhat-ztp/openshift-ai-image-backup:latest".to_string(),
            recovery_path: "/var/recovery".to_string(),
            backup_namespace: "backupresource".to_string(),
            job_name: "backupresource".to_string(),
            service_account: "backupresource".to_string(),
            suffix_length: 4,
            fixed_suffix: None,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            launch_timeout: Duration::from_secs(DEFAULT_LAUNCH_TIMEOUT_SECS),
            completion_timeout: Duration::from_secs(DEFAULT_COMPLETION_TIMEOUT_SECS),
            discovery_retry: Duration::from_secs(DEFAULT_DISCOVERY_RETRY_SECS),
            max_concurrency: None,
            templates: TemplateSelection::default(),
            variables: BTreeMap::new(),
            launch_condition: WaitCondition::launched(),
            completion_condition: WaitCondition::completed(),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::Configuration("poll interval must be positive".into()));
        }
        let max_wait = Duration::from_secs(MAX_WAIT_SECS);
        if self.poll_interval > max_wait || self.launch_timeout > max_wait || self.completion_timeout > max_wait {
            return Err(Error::Configuration(format!(
                "poll interval and timeouts must not exceed {}s",
                MAX_WAIT_SECS
            )));
        }
        if self.launch_timeout < self.poll_interval || self.completion_timeout < self.poll_interval {
            return Err(Error::Configuration(
                "timeouts must be at least one poll interval".into(),
            ));
        }
        if self.max_concurrency == Some(0) {
            return Err(Error::Configuration("max concurrency must be positive".into()));
        }
        if self.templates.create.is_empty() {
            return Err(Error::Configuration("no job creation templates selected".into()));
        }
        if self.fixed_suffix.is_none() && self.suffix_length == 0 {
            return Err(Error::Configuration("suffix length must be positive".into()));
        }
        if self.image.is_empty() || self.recovery_path.is_empty() {
            return Err(Error::Configuration("image and recovery path are required".into()));
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
