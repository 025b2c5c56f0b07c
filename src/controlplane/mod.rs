//! Hub Control Plane Adapters
//!
//! Live implementations of the domain ports against the hub API server.

pub mod kube_client;
pub mod registry;

pub use kube_client::{connect, KubeControlPlane};
pub use registry::ManagedClusterRegistry;
