//! Backup Engine
//!
//! Everything between "back up these spokes" and the final status report:
//! template rendering, kind resolution, proxy dispatch, view polling, the
//! per-spoke life cycle and the concurrent fan-out.

pub mod dispatcher;
pub mod job;
pub mod orchestrator;
pub mod poller;
pub mod renderer;
pub mod report;
pub mod resolver;
pub mod templates;

pub use dispatcher::{ActionDispatcher, AppliedObject};
pub use job::SpokeJobController;
pub use orchestrator::Orchestrator;
pub use poller::{evaluate, Observation, ViewPoller};
pub use renderer::{random_suffix, ManifestRenderer, RenderedManifest, TemplateVars};
pub use report::{JobOutcome, JobPhase, ReportSink, SpokeStatus, StatusReport, NO_ERROR};
pub use resolver::{DiscoveryResolver, ResourceTypeResolver, ResourceTypeResolverRef, StaticResolver};
pub use templates::TemplateCatalog;
