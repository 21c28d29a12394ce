//! Kubeconfig handling on the host side.

use std::{io::Write, sync::OnceLock};

use kube::{
	config::{KubeConfigOptions, Kubeconfig},
	Client, Config,
};
use regex::{NoExpand, Regex};
use tempfile::NamedTempFile;

use crate::error::Result;

fn loopback_server_line() -> &'static Regex {
	static PATTERN: OnceLock<Regex> = OnceLock::new();
	PATTERN.get_or_init(|| {
		Regex::new(r"server: https://(?:localhost|127\.0\.0\.1):\d+[^\r\n]*")
			.expect("static pattern is valid")
	})
}

/// Point every loopback `server:` entry of `kubeconfig` at `new_url`.
///
/// Inside the container the API server listens on loopback; from the host it is
/// only reachable through the mapped port. Only the matched part of each line is
/// rewritten, everything else is returned untouched. A kubeconfig that talks to
/// some other host comes back unchanged.
pub fn replace_server_url(kubeconfig: &str, new_url: &str) -> String {
	let replacement = format!("server: {new_url}");
	loopback_server_line()
		.replace_all(kubeconfig, NoExpand(&replacement))
		.into_owned()
}

/// Build a client configuration from kubeconfig YAML, using its current context.
pub async fn client_config(kubeconfig: &str) -> Result<Config> {
	let kubeconfig = Kubeconfig::from_yaml(kubeconfig)?;
	Ok(Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?)
}

pub async fn client(kubeconfig: &str) -> Result<Client> {
	let config = client_config(kubeconfig).await?;
	Ok(Client::try_from(config)?)
}

/// Write `kubeconfig` to a temporary file that is deleted when the handle is dropped.
pub fn write_temp(kubeconfig: &str) -> Result<NamedTempFile> {
	let mut file = tempfile::Builder::new()
		.prefix("envtest-kubeconfig-")
		.suffix(".yaml")
		.tempfile()?;
	file.write_all(kubeconfig.as_bytes())?;
	file.flush()?;
	Ok(file)
}
