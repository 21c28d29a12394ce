//! Readiness polling for etcd and kube-apiserver.

use std::time::Duration;

use reqwest::{Certificate, Client, Identity};
use tracing::{debug, instrument, trace};

use crate::{config::BootstrapConfig, error::Component, pki::TlsAssets, BootstrapError};

/// Delay between two probes.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(250);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// An HTTP endpoint that answers 2xx once its component can serve.
#[derive(Debug, Clone)]
pub struct HealthProbe {
	component: Component,
	url: String,
	client: Client,
}

impl HealthProbe {
	/// Plain HTTP probe.
	pub fn new(component: Component, url: impl Into<String>) -> Result<Self, BootstrapError> {
		let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
		Ok(Self {
			component,
			url: url.into(),
			client,
		})
	}

	pub fn etcd(config: &BootstrapConfig) -> Result<Self, BootstrapError> {
		Self::new(Component::Etcd, format!("{}/health", config.etcd_url()))
	}

	/// Probe `/healthz` over mTLS, trusting only the generated CA.
	pub fn apiserver(config: &BootstrapConfig, tls: &TlsAssets) -> Result<Self, BootstrapError> {
		let ca = Certificate::from_pem(tls.ca.cert_pem.as_bytes())?;
		let identity_pem = format!("{}{}", tls.admin.cert_pem, tls.admin.key_pem);
		let identity = Identity::from_pem(identity_pem.as_bytes())?;

		let client = Client::builder()
			.use_rustls_tls()
			.tls_built_in_root_certs(false)
			.add_root_certificate(ca)
			.identity(identity)
			.timeout(REQUEST_TIMEOUT)
			.build()?;

		Ok(Self {
			component: Component::KubeApiServer,
			url: format!("{}/healthz", config.local_server_url()),
			client,
		})
	}

	pub const fn component(&self) -> Component {
		self.component
	}

	pub fn url(&self) -> &str {
		&self.url
	}

	/// One probe. Connection failures and non-2xx answers both count as unhealthy.
	pub async fn check(&self) -> bool {
		match self.client.get(&self.url).send().await {
			Ok(response) => {
				let status = response.status();
				trace!(component = %self.component, %status, "Probe answered");
				status.is_success()
			}
			Err(e) => {
				trace!(component = %self.component, error = %e, "Probe failed");
				false
			}
		}
	}
}

/// Poll `probe` every `interval` until it succeeds or `timeout` elapses.
#[instrument(skip_all, fields(component = %probe.component(), url = probe.url()))]
pub async fn wait_until_healthy(
	probe: &HealthProbe,
	timeout: Duration,
	interval: Duration,
) -> Result<(), BootstrapError> {
	let poll = async {
		loop {
			if probe.check().await {
				return;
			}
			tokio::time::sleep(interval).await;
		}
	};

	tokio::time::timeout(timeout, poll)
		.await
		.map_err(|_| BootstrapError::Unhealthy {
			component: probe.component(),
			timeout,
		})?;

	debug!("Component is healthy");
	Ok(())
}
