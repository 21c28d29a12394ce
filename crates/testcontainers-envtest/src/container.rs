use std::time::{Duration, Instant};

use kube::{Client, Config};
use tempfile::NamedTempFile;
use testcontainers::{
	core::{CmdWaitFor, ExecCommand, IntoContainerPort},
	runners::AsyncRunner,
	ContainerAsync, ImageExt,
};
use tokio::net::TcpStream;
use tracing::{debug, info, instrument};

use crate::{
	error::{Error, Result},
	image::EnvtestImage,
	kubeconfig, EnvtestOptions, API_SERVER_PORT, KUBECONFIG_PATH,
};

const PORT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Poll until `host:port` accepts a TCP connection, for at most `timeout`.
pub(crate) async fn wait_for_port(host: &str, port: u16, timeout: Duration) -> Result<()> {
	let poll = async {
		loop {
			match TcpStream::connect((host, port)).await {
				Ok(_) => return,
				Err(e) => debug!(%host, port, error = %e, "API server port not reachable yet"),
			}
			tokio::time::sleep(PORT_POLL_INTERVAL).await;
		}
	};

	tokio::time::timeout(timeout, poll)
		.await
		.map_err(|_| Error::PortNotReady { port, timeout })
}

/// A running envtest container.
///
/// The container is removed when the handle is dropped, or explicitly with
/// [`terminate`](Self::terminate).
#[derive(Debug)]
pub struct EnvtestContainer {
	container: ContainerAsync<EnvtestImage>,
	kubernetes_version: String,
}

impl EnvtestContainer {
	/// Start a container and wait until the API server answers on its mapped port.
	#[instrument(skip_all, fields(version = options.kubernetes_version()))]
	pub async fn run(options: EnvtestOptions) -> Result<Self> {
		let (name, tag) = options.image_reference();
		let image = EnvtestImage::new(&options);
		let timeout = options.startup_timeout();
		let started = Instant::now();

		info!(%name, %tag, "Starting envtest container");
		let container = image
			.with_startup_timeout(timeout)
			.start()
			.await
			.map_err(Error::Start)?;

		let envtest = Self {
			container,
			kubernetes_version: options.kubernetes_version().to_string(),
		};
		envtest
			.wait_for_api_server(timeout.saturating_sub(started.elapsed()))
			.await?;

		info!(id = envtest.container.id(), "Envtest container is ready");
		Ok(envtest)
	}

	/// [`run`](Self::run) with the default image and version.
	pub async fn run_default() -> Result<Self> {
		Self::run(EnvtestOptions::default()).await
	}

	async fn wait_for_api_server(&self, timeout: Duration) -> Result<()> {
		let host = self.container.get_host().await?.to_string();
		let port = self.host_port().await?;
		wait_for_port(&host, port, timeout).await
	}

	async fn host_port(&self) -> Result<u16> {
		Ok(self
			.container
			.get_host_port_ipv4(API_SERVER_PORT.tcp())
			.await?)
	}

	/// `https://<host>:<mapped port>` of the API server.
	pub async fn api_server_url(&self) -> Result<String> {
		let host = self.container.get_host().await?;
		let port = self.host_port().await?;
		Ok(format!("https://{host}:{port}"))
	}

	/// The admin kubeconfig, rewritten to reach the API server from the host.
	#[instrument(skip_all)]
	pub async fn kubeconfig(&self) -> Result<String> {
		let mut result = self
			.container
			.exec(ExecCommand::new(["cat", KUBECONFIG_PATH]).with_cmd_ready_condition(CmdWaitFor::exit()))
			.await
			.map_err(Error::Exec)?;

		let exit_code = result.exit_code().await.map_err(Error::Exec)?;
		if exit_code != Some(0) {
			let stderr = result.stderr_to_vec().await.map_err(Error::Exec)?;
			return Err(Error::ReadKubeconfig {
				exit_code,
				stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
			});
		}

		let stdout = result.stdout_to_vec().await.map_err(Error::Exec)?;
		let raw = String::from_utf8_lossy(&stdout);
		let url = self.api_server_url().await?;
		debug!(%url, "Rewriting kubeconfig server");

		Ok(kubeconfig::replace_server_url(&raw, &url))
	}

	/// The kubeconfig written to a temporary file, deleted when the handle drops.
	pub async fn kubeconfig_file(&self) -> Result<NamedTempFile> {
		let kubeconfig = self.kubeconfig().await?;
		kubeconfig::write_temp(&kubeconfig)
	}

	pub async fn rest_config(&self) -> Result<Config> {
		let kubeconfig = self.kubeconfig().await?;
		kubeconfig::client_config(&kubeconfig).await
	}

	pub async fn kubernetes_client(&self) -> Result<Client> {
		let config = self.rest_config().await?;
		Ok(Client::try_from(config)?)
	}

	/// The Kubernetes version that was asked for.
	pub fn kubernetes_version(&self) -> &str {
		&self.kubernetes_version
	}

	/// Underlying testcontainers handle, for logs or other low level access.
	pub const fn container(&self) -> &ContainerAsync<EnvtestImage> {
		&self.container
	}

	/// Stop and remove the container.
	pub async fn terminate(self) -> Result<()> {
		info!(id = self.container.id(), "Removing envtest container");
		self.container.rm().await?;
		Ok(())
	}
}
