use std::{fs, path::Path};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::json;

use crate::{pki::TlsAssets, BootstrapError};

/// Name used for the cluster, user and context entries.
pub const ENVTEST_NAME: &str = "envtest";

/// Render an admin kubeconfig pointing at `server`, with all credentials inlined.
pub fn render(server: &str, tls: &TlsAssets) -> Result<String, BootstrapError> {
	let doc = json!({
		"apiVersion": "v1",
		"kind": "Config",
		"clusters": [{
			"name": ENVTEST_NAME,
			"cluster": {
				"server": server,
				"certificate-authority-data": STANDARD.encode(&tls.ca.cert_pem),
			},
		}],
		"contexts": [{
			"name": ENVTEST_NAME,
			"context": {
				"cluster": ENVTEST_NAME,
				"user": ENVTEST_NAME,
			},
		}],
		"current-context": ENVTEST_NAME,
		"preferences": {},
		"users": [{
			"name": ENVTEST_NAME,
			"user": {
				"client-certificate-data": STANDARD.encode(&tls.admin.cert_pem),
				"client-key-data": STANDARD.encode(&tls.admin.key_pem),
			},
		}],
	});

	Ok(serde_yaml::to_string(&doc)?)
}

/// Write a rendered kubeconfig, creating parent directories as needed.
pub fn write(path: &Path, contents: &str) -> Result<(), BootstrapError> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent).map_err(BootstrapError::io(parent))?;
	}
	fs::write(path, contents).map_err(BootstrapError::io(path))
}

#[cfg(test)]
mod tests {
	use kube::config::{KubeConfigOptions, Kubeconfig};

	use super::*;

	fn assets() -> TlsAssets {
		TlsAssets::generate(&["localhost".to_string(), "127.0.0.1".to_string()])
			.expect("generation succeeds")
	}

	#[test]
	fn test_render_is_a_valid_kubeconfig() {
		let tls = assets();
		let rendered = render("https://127.0.0.1:6443", &tls).expect("render succeeds");

		let parsed = Kubeconfig::from_yaml(&rendered).expect("kube can parse it");
		assert_eq!(parsed.current_context.as_deref(), Some(ENVTEST_NAME));

		let cluster = parsed.clusters[0].cluster.as_ref().expect("cluster entry");
		assert_eq!(cluster.server.as_deref(), Some("https://127.0.0.1:6443"));
		let ca = cluster
			.certificate_authority_data
			.as_deref()
			.expect("inline CA");
		let ca = STANDARD.decode(ca).expect("base64");
		assert_eq!(ca, tls.ca.cert_pem.as_bytes());

		let context = parsed.contexts[0].context.as_ref().expect("context entry");
		assert_eq!(context.cluster, ENVTEST_NAME);
		assert_eq!(context.user.as_deref(), Some(ENVTEST_NAME));
	}

	#[tokio::test]
	async fn test_render_loads_as_client_config() {
		let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
		let rendered = render("https://127.0.0.1:6443", &assets()).expect("render succeeds");

		let parsed = Kubeconfig::from_yaml(&rendered).expect("kube can parse it");
		let config = kube::Config::from_custom_kubeconfig(parsed, &KubeConfigOptions::default())
			.await
			.expect("client config loads");
		assert_eq!(config.cluster_url.scheme_str(), Some("https"));
		assert_eq!(config.cluster_url.host(), Some("127.0.0.1"));
		assert_eq!(config.cluster_url.port_u16(), Some(6443));
	}

	#[test]
	fn test_render_has_a_single_server_line() {
		let rendered = render("https://127.0.0.1:6443", &assets()).expect("render succeeds");

		let server_lines: Vec<_> = rendered
			.lines()
			.filter(|line| line.trim_start().starts_with("server:"))
			.collect();
		assert_eq!(server_lines.len(), 1);
		assert_eq!(server_lines[0].trim(), "server: https://127.0.0.1:6443");
	}

	#[test]
	fn test_write_creates_parent_dirs() {
		let dir = tempfile::tempdir().expect("tempdir");
		let path = dir.path().join("nested").join("kubeconfig");

		write(&path, "apiVersion: v1\n").expect("write succeeds");
		assert_eq!(
			fs::read_to_string(&path).expect("readable"),
			"apiVersion: v1\n"
		);
	}
}
