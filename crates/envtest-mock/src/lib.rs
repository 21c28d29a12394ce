//! Mock envtest API server for testing.
//!
//! Serves the handful of endpoints the envtest tooling touches (version, health
//! probes, namespaces) over real HTTP, so kubeconfig-based clients can connect to it.

mod responses;
pub mod server;

pub use server::{MockApiServer, RunningMockApiServer, DEFAULT_GIT_VERSION, SEEDED_NAMESPACES};
