//! Spoke Backup Orchestrator - Hub Side
//!
//! Triggers a backup job on many managed spoke clusters at once, watches each
//! job through the hub's cluster proxy objects and reports one outcome per
//! spoke.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                              Orchestrator                                    │
//! │              (one task per spoke, optional concurrency cap)                  │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │                          Spoke Job Controller                                │
//! │   Created ─► Dispatching ─► AwaitingLaunch ─► AwaitingCompletion ─► Done     │
//! ├──────────────────────────────┬──────────────────────────────────────────────┤
//! │      Action Dispatcher       │               View Poller                     │
//! │  (ordered create, rollback)  │   (ManagedClusterView conditions, timeout)    │
//! ├──────────────────────────────┴──────────────────────────────────────────────┤
//! │     Manifest Renderer (templates)      │     Resource Type Resolver (cache)  │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │                        Hub Control Plane (kube)                              │
//! │        ManagedClusterAction · ManagedClusterView · ManagedCluster            │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`engine`]: Rendering, dispatch, polling and the per-spoke life cycle
//! - [`controlplane`]: Hub API server adapters
//! - [`config`]: Run configuration and validation
//! - [`metrics`]: Run metrics
//! - [`domain`]: Core domain types and ports
//! - [`error`]: Error types and handling

pub mod config;
pub mod controlplane;
pub mod domain;
pub mod engine;
pub mod error;
pub mod metrics;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::{OrchestratorConfig, TemplateSelection, WaitCondition};

pub use controlplane::{connect, KubeControlPlane, ManagedClusterRegistry};

pub use domain::ports::{
    ControlPlane, ControlPlaneRef, ResourceType, Spoke, SpokeRegistry, SpokeRegistryRef,
    TemplateStore, TemplateStoreRef,
};

pub use engine::{
    ActionDispatcher, JobOutcome, JobPhase, ManifestRenderer, Orchestrator, SpokeJobController,
    SpokeStatus, StatusReport, TemplateCatalog, TemplateVars, ViewPoller,
};

pub use error::{Error, Result};

pub use metrics::RunMetrics;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
