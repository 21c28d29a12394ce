//! Boots a single-node Kubernetes control plane (etcd plus kube-apiserver) from
//! the envtest binaries, with TLS material generated on the fly.
//!
//! [`start`] returns once both components are healthy and an admin kubeconfig has
//! been written. The container entrypoint then prints [`READY_MESSAGE`] so that
//! clients watching the log know the API server is usable.

use std::{
	fs,
	path::{Path, PathBuf},
	time::Duration,
};

use tracing::{info, instrument};

pub mod config;
mod error;
pub mod health;
pub mod kubeconfig;
pub mod pki;
pub mod process;
pub mod supervisor;

pub use config::BootstrapConfig;
pub use error::{BootstrapError, Component};
use health::{HealthProbe, DEFAULT_PROBE_INTERVAL};
pub use pki::{PkiError, TlsAssets, TlsPaths};
pub use supervisor::{Exited, Supervisor};

/// Printed on stdout once the control plane accepts requests.
pub const READY_MESSAGE: &str = "Envtest is ready!";

/// A running control plane.
#[derive(Debug)]
pub struct Envtest {
	supervisor: Supervisor,
	tls: TlsPaths,
	kubeconfig_path: PathBuf,
}

impl Envtest {
	pub const fn tls_paths(&self) -> &TlsPaths {
		&self.tls
	}

	pub fn kubeconfig_path(&self) -> &Path {
		&self.kubeconfig_path
	}

	/// Resolves when etcd or kube-apiserver exits. Either one exiting is fatal.
	pub async fn wait(&mut self) -> Exited {
		self.supervisor.wait_any().await
	}

	pub async fn shutdown(mut self, grace: Duration) {
		info!("Shutting down control plane");
		self.supervisor.shutdown(grace).await;
	}
}

fn ensure_binary(config: &BootstrapConfig, component: Component) -> Result<(), BootstrapError> {
	let path = config.binary(component);
	if path.is_file() {
		Ok(())
	} else {
		Err(BootstrapError::MissingBinary { component, path })
	}
}

/// Readiness checks for the two components.
struct Probes {
	etcd: HealthProbe,
	apiserver: HealthProbe,
}

impl Probes {
	fn new(config: &BootstrapConfig, assets: &TlsAssets) -> Result<Self, BootstrapError> {
		Ok(Self {
			etcd: HealthProbe::etcd(config)?,
			apiserver: HealthProbe::apiserver(config, assets)?,
		})
	}
}

/// Generate TLS material, start etcd, then kube-apiserver, and write the kubeconfig.
///
/// On failure every process started so far is killed before the error is returned.
#[instrument(skip_all, fields(secure_port = config.secure_port))]
pub async fn start(config: &BootstrapConfig) -> Result<Envtest, BootstrapError> {
	let mut supervisor = Supervisor::new();
	let tls = bootstrap(config, Probes::new, &mut supervisor).await?;

	Ok(Envtest {
		supervisor,
		tls,
		kubeconfig_path: config.kubeconfig.clone(),
	})
}

async fn bootstrap(
	config: &BootstrapConfig,
	probes: impl FnOnce(&BootstrapConfig, &TlsAssets) -> Result<Probes, BootstrapError>,
	supervisor: &mut Supervisor,
) -> Result<TlsPaths, BootstrapError> {
	ensure_binary(config, Component::Etcd)?;
	ensure_binary(config, Component::KubeApiServer)?;

	let sans = config.apiserver_sans()?;
	let assets = TlsAssets::generate(&sans)?;
	let tls = assets.write_to(&config.cert_dir)?;
	let probes = probes(config, &assets)?;

	fs::create_dir_all(&config.etcd_data_dir).map_err(BootstrapError::io(&config.etcd_data_dir))?;

	if let Err(e) = launch(config, &assets, &tls, &probes, supervisor).await {
		supervisor.shutdown(Duration::ZERO).await;
		return Err(e);
	}

	Ok(tls)
}

/// Everything after this point has processes to clean up when it fails.
async fn launch(
	config: &BootstrapConfig,
	assets: &TlsAssets,
	tls: &TlsPaths,
	probes: &Probes,
	supervisor: &mut Supervisor,
) -> Result<(), BootstrapError> {
	supervisor.spawn(Component::Etcd, process::etcd_command(config))?;
	supervisor
		.wait_healthy(&probes.etcd, config.etcd_timeout(), DEFAULT_PROBE_INTERVAL)
		.await?;
	info!("etcd is healthy");

	supervisor.spawn(
		Component::KubeApiServer,
		process::apiserver_command(config, tls),
	)?;
	supervisor
		.wait_healthy(&probes.apiserver, config.apiserver_timeout(), DEFAULT_PROBE_INTERVAL)
		.await?;
	info!("kube-apiserver is healthy");

	let rendered = kubeconfig::render(&config.local_server_url(), assets)?;
	kubeconfig::write(&config.kubeconfig, &rendered)?;
	info!(path = %config.kubeconfig.display(), "Wrote kubeconfig");

	Ok(())
}
