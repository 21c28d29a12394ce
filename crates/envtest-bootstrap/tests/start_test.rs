//! Startup failure paths, exercised with stand-in binaries.

use std::{fs, os::unix::fs::PermissionsExt, path::Path};

use assert_matches::assert_matches;
use envtest_bootstrap::{start, BootstrapConfig, BootstrapError, Component};
use tempfile::TempDir;

fn free_port() -> u16 {
	let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
	listener.local_addr().expect("addr").port()
}

fn config_in(dir: &TempDir) -> BootstrapConfig {
	BootstrapConfig {
		assets_dir: dir.path().join("bin"),
		cert_dir: dir.path().join("certs"),
		etcd_data_dir: dir.path().join("etcd"),
		kubeconfig: dir.path().join("kubeconfig"),
		etcd_port: free_port(),
		etcd_peer_port: free_port(),
		secure_port: free_port(),
		etcd_timeout_secs: 10,
		apiserver_timeout_secs: 10,
		..BootstrapConfig::default()
	}
}

fn install_script(dir: &Path, name: &str, body: &str) {
	fs::create_dir_all(dir).expect("bin dir");
	let path = dir.join(name);
	fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
	fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
}

#[tokio::test]
async fn test_missing_binaries_are_reported() {
	let dir = tempfile::tempdir().expect("tempdir");
	let config = config_in(&dir);

	let result = start(&config).await;
	assert_matches!(
		result,
		Err(BootstrapError::MissingBinary { component: Component::Etcd, path }) if path == config.assets_dir.join("etcd")
	);
	assert!(!config.kubeconfig.exists());
}

#[tokio::test]
async fn test_missing_apiserver_is_reported() {
	let dir = tempfile::tempdir().expect("tempdir");
	let config = config_in(&dir);
	install_script(&config.assets_dir, "etcd", "exec sleep 30");

	let result = start(&config).await;
	assert_matches!(
		result,
		Err(BootstrapError::MissingBinary {
			component: Component::KubeApiServer,
			..
		})
	);
}

#[tokio::test]
async fn test_crashing_etcd_aborts_startup() {
	let dir = tempfile::tempdir().expect("tempdir");
	let config = config_in(&dir);
	install_script(&config.assets_dir, "etcd", "exit 7");
	install_script(&config.assets_dir, "kube-apiserver", "exec sleep 30");

	let result = start(&config).await;
	assert_matches!(
		result,
		Err(BootstrapError::ExitedEarly { component: Component::Etcd, status }) if status.code() == Some(7)
	);

	// TLS material is written before anything starts.
	assert!(config.cert_dir.join("ca.crt").is_file());
	assert!(config.etcd_data_dir.is_dir());
	assert!(!config.kubeconfig.exists());
}

#[tokio::test]
async fn test_unhealthy_etcd_times_out() {
	let dir = tempfile::tempdir().expect("tempdir");
	let config = BootstrapConfig {
		etcd_timeout_secs: 1,
		..config_in(&dir)
	};
	install_script(&config.assets_dir, "etcd", "exec sleep 30");
	install_script(&config.assets_dir, "kube-apiserver", "exec sleep 30");

	let result = start(&config).await;
	assert_matches!(
		result,
		Err(BootstrapError::Unhealthy {
			component: Component::Etcd,
			..
		})
	);
}

#[tokio::test]
async fn test_invalid_service_range_is_rejected() {
	let dir = tempfile::tempdir().expect("tempdir");
	let config = BootstrapConfig {
		service_cluster_ip_range: "not-a-cidr".to_string(),
		..config_in(&dir)
	};
	install_script(&config.assets_dir, "etcd", "exec sleep 30");
	install_script(&config.assets_dir, "kube-apiserver", "exec sleep 30");

	let result = start(&config).await;
	assert_matches!(result, Err(BootstrapError::InvalidServiceCidr(cidr)) if cidr == "not-a-cidr");
}
