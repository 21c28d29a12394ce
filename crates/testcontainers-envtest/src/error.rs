use std::{io, time::Duration};

use kube::config::KubeconfigError;
use testcontainers::TestcontainersError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("failed to start envtest container")]
	Start(#[source] TestcontainersError),

	#[error(transparent)]
	Runtime(#[from] TestcontainersError),

	#[error("failed to read kubeconfig from container")]
	Exec(#[source] TestcontainersError),

	#[error("reading kubeconfig from container exited with {exit_code:?}: {stderr}")]
	ReadKubeconfig {
		exit_code: Option<i64>,
		stderr: String,
	},

	#[error("API server port {port} did not accept connections within {}s", .timeout.as_secs())]
	PortNotReady { port: u16, timeout: Duration },

	#[error(transparent)]
	Kubeconfig(#[from] KubeconfigError),

	#[error(transparent)]
	Kube(#[from] kube::Error),

	#[error(transparent)]
	Io(#[from] io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
