//! Error types for the Spoke Backup Orchestrator
//!
//! Provides structured error types for every stage of a spoke backup run:
//! resource resolution, manifest rendering, proxy dispatch, view polling
//! and cleanup.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the orchestrator
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    #[error("Resource already exists: {kind}/{name}")]
    ResourceExists { kind: String, name: String },

    #[error("Cannot map {kind} in {group}/{version} to a resource: {reason}")]
    NotMappable {
        kind: String,
        group: String,
        version: String,
        reason: String,
    },

    // =========================================================================
    // Template Errors
    // =========================================================================
    #[error("Template {name} is not registered")]
    MissingTemplate { name: String },

    #[error("Template {template} failed to render: {reason}")]
    Template { template: String, reason: String },

    // =========================================================================
    // Spoke Job Errors
    // =========================================================================
    #[error("Cluster {spoke} does not exist or is not available")]
    SpokeNotFound { spoke: String },

    #[error("Timed out after {after:?} waiting for {condition} on cluster {spoke}")]
    Timeout {
        spoke: String,
        condition: String,
        after: Duration,
    },

    #[error("Failed to observe view {view} on cluster {spoke}: {reason}")]
    Observation {
        spoke: String,
        view: String,
        reason: String,
    },

    #[error("Job {job} failed on cluster {spoke}: {reason}")]
    JobFailed {
        spoke: String,
        job: String,
        reason: String,
    },

    #[error("{source} (rollback also failed: {})", failures.join("; "))]
    Rollback {
        source: Box<Error>,
        failures: Vec<String>,
    },

    #[error("Cleanup on cluster {spoke} incomplete: {}", failures.join("; "))]
    Cleanup { spoke: String, failures: Vec<String> },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error means the addressed object is absent
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::ResourceNotFound { .. } | Error::SpokeNotFound { .. } => true,
            Error::Kube(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    /// Whether the error means a create hit an existing object
    pub fn is_already_exists(&self) -> bool {
        match self {
            Error::ResourceExists { .. } => true,
            Error::Kube(kube::Error::Api(resp)) => resp.code == 409,
            _ => false,
        }
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Kube(kube::Error::Api(resp)) => resp.code == 429 || resp.code >= 500,
            Error::Kube(kube::Error::HyperError(_)) | Error::Kube(kube::Error::Service(_)) => true,
            _ => false,
        }
    }

    /// The error that started the failure, skipping rollback wrappers
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Rollback { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Result type alias for the orchestrator
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> Error {
        Error::Kube(kube::Error::Api(ErrorResponse {
            status: "Failure".into(),
            message: "boom".into(),
            reason: "Test".into(),
            code,
        }))
    }

    #[test]
    fn test_api_error_classification() {
        assert!(api_error(404).is_not_found());
        assert!(!api_error(404).is_already_exists());
        assert!(api_error(409).is_already_exists());
        assert!(api_error(503).is_transient());
        assert!(api_error(429).is_transient());
        assert!(!api_error(403).is_transient());
    }

    #[test]
    fn test_rollback_keeps_original_cause() {
        let err = Error::Rollback {
            source: Box::new(Error::Internal("create failed".into())),
            failures: vec!["delete a: denied".into(), "delete b: denied".into()],
        };

        let message = err.to_string();
        assert!(message.starts_with("Internal error: create failed"));
        assert!(message.contains("delete a: denied; delete b: denied"));
        assert!(matches!(err.root_cause(), Error::Internal(_)));
    }
}
