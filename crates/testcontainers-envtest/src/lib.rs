//! Testcontainers module that runs a real `kube-apiserver` backed by `etcd`.
//!
//! Unlike a full cluster there is no kubelet, scheduler or controller-manager,
//! which is exactly what controller tests need: a genuine API server that starts
//! in seconds.
//!
//! ```no_run
//! use k8s_openapi::api::core::v1::Namespace;
//! use kube::Api;
//! use testcontainers_envtest::EnvtestContainer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let envtest = EnvtestContainer::run_default().await?;
//! let namespaces: Api<Namespace> = Api::all(envtest.kubernetes_client().await?);
//! let default = namespaces.get("default").await?;
//! # Ok(())
//! # }
//! ```

mod container;
mod error;
mod image;
pub mod kubeconfig;
mod options;

pub use container::EnvtestContainer;
pub use error::{Error, Result};
pub use image::EnvtestImage;
pub use kubeconfig::replace_server_url;
pub use options::{EnvtestOptions, DEFAULT_STARTUP_TIMEOUT};

/// Image published for every supported Kubernetes version.
pub const DEFAULT_IMAGE: &str = "ghcr.io/roma-glushko/testcontainers-envtest";

pub const DEFAULT_TAG: &str = "latest";

/// Version served by the [`DEFAULT_TAG`] image.
pub const DEFAULT_KUBERNETES_VERSION: &str = "1.31.0";

/// Port the API server listens on inside the container.
pub const API_SERVER_PORT: u16 = 6443;

/// Where the entrypoint writes the admin kubeconfig inside the container.
pub const KUBECONFIG_PATH: &str = "/tmp/kubeconfig";

/// Line the entrypoint prints once the control plane is usable.
pub const READY_MESSAGE: &str = "Envtest is ready!";
