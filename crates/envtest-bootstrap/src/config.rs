//! Bootstrap settings.
//!
//! Every setting is a CLI flag with an environment variable fallback, so the
//! container image can be tuned with `docker run -e ...` alone.

use std::{
	net::{IpAddr, Ipv4Addr, Ipv6Addr},
	path::PathBuf,
	time::Duration,
};

use clap::Args;

use crate::{error::Component, BootstrapError};

pub const DEFAULT_SECURE_PORT: u16 = 6443;
pub const DEFAULT_ETCD_PORT: u16 = 2379;
pub const DEFAULT_ETCD_PEER_PORT: u16 = 2380;
pub const DEFAULT_ASSETS_DIR: &str = "/usr/local/kubebuilder/bin";
pub const DEFAULT_CERT_DIR: &str = "/tmp/envtest/certs";
pub const DEFAULT_ETCD_DATA_DIR: &str = "/tmp/envtest/etcd";
pub const DEFAULT_KUBECONFIG_PATH: &str = "/tmp/kubeconfig";
pub const DEFAULT_SERVICE_CIDR: &str = "10.0.0.0/24";
pub const DEFAULT_ETCD_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_APISERVER_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Args)]
pub struct BootstrapConfig {
	/// Port kube-apiserver serves HTTPS on
	#[arg(long, env = "ENVTEST_SECURE_PORT", default_value_t = DEFAULT_SECURE_PORT)]
	pub secure_port: u16,

	/// Loopback port for etcd clients
	#[arg(long, env = "ENVTEST_ETCD_PORT", default_value_t = DEFAULT_ETCD_PORT)]
	pub etcd_port: u16,

	/// Loopback port for etcd peers
	#[arg(long, env = "ENVTEST_ETCD_PEER_PORT", default_value_t = DEFAULT_ETCD_PEER_PORT)]
	pub etcd_peer_port: u16,

	/// Directory holding the etcd and kube-apiserver binaries
	#[arg(long, env = "KUBEBUILDER_ASSETS", default_value = DEFAULT_ASSETS_DIR)]
	pub assets_dir: PathBuf,

	/// Where generated certificates and keys are written
	#[arg(long, env = "ENVTEST_CERT_DIR", default_value = DEFAULT_CERT_DIR)]
	pub cert_dir: PathBuf,

	/// etcd data directory
	#[arg(long, env = "ENVTEST_ETCD_DATA_DIR", default_value = DEFAULT_ETCD_DATA_DIR)]
	pub etcd_data_dir: PathBuf,

	/// Where the admin kubeconfig is written
	#[arg(long, env = "ENVTEST_KUBECONFIG", default_value = DEFAULT_KUBECONFIG_PATH)]
	pub kubeconfig: PathBuf,

	/// CIDR services get their cluster IPs from
	#[arg(long, env = "ENVTEST_SERVICE_CIDR", default_value = DEFAULT_SERVICE_CIDR)]
	pub service_cluster_ip_range: String,

	/// Additional DNS names or IPs for the API server certificate
	#[arg(long = "extra-san", env = "ENVTEST_EXTRA_SANS", value_delimiter = ',')]
	pub extra_sans: Vec<String>,

	/// Seconds to wait for etcd to report healthy
	#[arg(long = "etcd-timeout", env = "ENVTEST_ETCD_TIMEOUT", value_name = "SECONDS", default_value_t = DEFAULT_ETCD_TIMEOUT_SECS)]
	pub etcd_timeout_secs: u64,

	/// Seconds to wait for kube-apiserver to report healthy
	#[arg(long = "apiserver-timeout", env = "ENVTEST_APISERVER_TIMEOUT", value_name = "SECONDS", default_value_t = DEFAULT_APISERVER_TIMEOUT_SECS)]
	pub apiserver_timeout_secs: u64,
}

impl Default for BootstrapConfig {
	fn default() -> Self {
		Self {
			secure_port: DEFAULT_SECURE_PORT,
			etcd_port: DEFAULT_ETCD_PORT,
			etcd_peer_port: DEFAULT_ETCD_PEER_PORT,
			assets_dir: PathBuf::from(DEFAULT_ASSETS_DIR),
			cert_dir: PathBuf::from(DEFAULT_CERT_DIR),
			etcd_data_dir: PathBuf::from(DEFAULT_ETCD_DATA_DIR),
			kubeconfig: PathBuf::from(DEFAULT_KUBECONFIG_PATH),
			service_cluster_ip_range: DEFAULT_SERVICE_CIDR.to_string(),
			extra_sans: Vec::new(),
			etcd_timeout_secs: DEFAULT_ETCD_TIMEOUT_SECS,
			apiserver_timeout_secs: DEFAULT_APISERVER_TIMEOUT_SECS,
		}
	}
}

impl BootstrapConfig {
	pub fn binary(&self, component: Component) -> PathBuf {
		self.assets_dir.join(component.binary_name())
	}

	pub fn etcd_url(&self) -> String {
		format!("http://127.0.0.1:{}", self.etcd_port)
	}

	pub fn etcd_peer_url(&self) -> String {
		format!("http://127.0.0.1:{}", self.etcd_peer_port)
	}

	/// The API server address as seen from inside the container.
	pub fn local_server_url(&self) -> String {
		format!("https://127.0.0.1:{}", self.secure_port)
	}

	pub fn etcd_timeout(&self) -> Duration {
		Duration::from_secs(self.etcd_timeout_secs)
	}

	pub fn apiserver_timeout(&self) -> Duration {
		Duration::from_secs(self.apiserver_timeout_secs)
	}

	/// Subject alternative names for the API server certificate.
	///
	/// Covers loopback, the in-cluster `kubernetes` service names and its cluster IP
	/// (first address of the service range), followed by the configured extras.
	pub fn apiserver_sans(&self) -> Result<Vec<String>, BootstrapError> {
		let service_ip = first_service_ip(&self.service_cluster_ip_range)?;

		let mut sans: Vec<String> = [
			"localhost",
			"127.0.0.1",
			"::1",
			"kubernetes",
			"kubernetes.default",
			"kubernetes.default.svc",
			"kubernetes.default.svc.cluster.local",
		]
		.into_iter()
		.map(String::from)
		.collect();
		sans.push(service_ip.to_string());

		for extra in &self.extra_sans {
			let extra = extra.trim();
			if !extra.is_empty() && !sans.iter().any(|s| s == extra) {
				sans.push(extra.to_string());
			}
		}

		Ok(sans)
	}
}

/// The first usable address of a CIDR, which kube-apiserver assigns to the
/// `kubernetes` service.
pub fn first_service_ip(cidr: &str) -> Result<IpAddr, BootstrapError> {
	let invalid = || BootstrapError::InvalidServiceCidr(cidr.to_string());

	let (network, prefix) = cidr.split_once('/').ok_or_else(invalid)?;
	let network: IpAddr = network.parse().map_err(|_| invalid())?;
	let prefix: u32 = prefix.parse().map_err(|_| invalid())?;

	match network {
		IpAddr::V4(addr) if prefix < 32 => {
			let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
			let base = u32::from(addr) & mask;
			Ok(IpAddr::V4(Ipv4Addr::from(base + 1)))
		}
		IpAddr::V6(addr) if prefix < 128 => {
			let mask = u128::MAX.checked_shl(128 - prefix).unwrap_or(0);
			let base = u128::from(addr) & mask;
			Ok(IpAddr::V6(Ipv6Addr::from(base + 1)))
		}
		_ => Err(invalid()),
	}
}
