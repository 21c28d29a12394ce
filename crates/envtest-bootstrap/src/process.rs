//! Command lines for the control-plane processes.

use std::process::Stdio;

use tokio::process::Command;

use crate::{config::BootstrapConfig, error::Component, pki::TlsPaths};

/// Issuer kube-apiserver stamps into service-account tokens.
pub const SERVICE_ACCOUNT_ISSUER: &str = "https://kubernetes.default.svc";

pub fn etcd_args(config: &BootstrapConfig) -> Vec<String> {
	let client_url = config.etcd_url();
	let peer_url = config.etcd_peer_url();

	vec![
		format!("--data-dir={}", config.etcd_data_dir.display()),
		format!("--listen-client-urls={client_url}"),
		format!("--advertise-client-urls={client_url}"),
		format!("--listen-peer-urls={peer_url}"),
		// Durability is pointless for a throwaway cluster.
		"--unsafe-no-fsync=true".to_string(),
	]
}

pub fn apiserver_args(config: &BootstrapConfig, tls: &TlsPaths) -> Vec<String> {
	vec![
		"--advertise-address=127.0.0.1".to_string(),
		"--allow-privileged=true".to_string(),
		"--authorization-mode=RBAC".to_string(),
		"--bind-address=0.0.0.0".to_string(),
		format!("--secure-port={}", config.secure_port),
		format!("--tls-cert-file={}", tls.apiserver_cert.display()),
		format!("--tls-private-key-file={}", tls.apiserver_key.display()),
		format!("--client-ca-file={}", tls.ca_cert.display()),
		format!("--etcd-servers={}", config.etcd_url()),
		format!("--service-account-issuer={SERVICE_ACCOUNT_ISSUER}"),
		format!("--service-account-key-file={}", tls.service_account_pub.display()),
		format!(
			"--service-account-signing-key-file={}",
			tls.service_account_key.display()
		),
		format!(
			"--service-cluster-ip-range={}",
			config.service_cluster_ip_range
		),
		// No controller-manager runs to create the tokens this plugin waits for.
		"--disable-admission-plugins=ServiceAccount".to_string(),
	]
}

fn command(config: &BootstrapConfig, component: Component, args: Vec<String>) -> Command {
	let mut cmd = Command::new(config.binary(component));
	cmd.args(args);
	cmd.stdin(Stdio::null());
	cmd.stdout(Stdio::inherit());
	cmd.stderr(Stdio::inherit());
	cmd.kill_on_drop(true);
	cmd
}

pub fn etcd_command(config: &BootstrapConfig) -> Command {
	command(config, Component::Etcd, etcd_args(config))
}

pub fn apiserver_command(config: &BootstrapConfig, tls: &TlsPaths) -> Command {
	command(
		config,
		Component::KubeApiServer,
		apiserver_args(config, tls),
	)
}
