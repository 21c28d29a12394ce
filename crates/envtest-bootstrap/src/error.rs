use std::{fmt, io, path::PathBuf, process::ExitStatus, time::Duration};

use thiserror::Error;

use crate::pki::PkiError;

/// A process started by the bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
	Etcd,
	KubeApiServer,
}

impl Component {
	/// File name of the binary inside the assets directory.
	pub fn binary_name(self) -> &'static str {
		match self {
			Self::Etcd => "etcd",
			Self::KubeApiServer => "kube-apiserver",
		}
	}
}

impl fmt::Display for Component {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.binary_name())
	}
}

/// Errors that abort the bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
	#[error("{component} binary not found at {}", .path.display())]
	MissingBinary { component: Component, path: PathBuf },

	#[error("invalid service cluster IP range `{0}`")]
	InvalidServiceCidr(String),

	#[error(transparent)]
	Pki(#[from] PkiError),

	#[error("failed to render kubeconfig")]
	Kubeconfig(#[from] serde_yaml::Error),

	#[error("failed to build health probe")]
	Probe(#[from] reqwest::Error),

	#[error("I/O error on {}", .path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("failed to start {component}")]
	Spawn {
		component: Component,
		#[source]
		source: io::Error,
	},

	#[error("failed to wait for {component}")]
	Wait {
		component: Component,
		#[source]
		source: io::Error,
	},

	#[error("{component} did not become healthy within {}s", .timeout.as_secs())]
	Unhealthy {
		component: Component,
		timeout: Duration,
	},

	#[error("{component} exited unexpectedly ({status})")]
	ExitedEarly {
		component: Component,
		status: ExitStatus,
	},
}

impl BootstrapError {
	pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
		let path = path.into();
		move |source| Self::Io { path, source }
	}
}

#[cfg(test)]
mod tests {
	use std::error::Error as _;

	use super::*;

	fn not_found() -> io::Error {
		io::Error::new(io::ErrorKind::NotFound, "no such file")
	}

	#[test]
	fn test_cause_is_only_in_source() {
		let err = BootstrapError::Spawn {
			component: Component::Etcd,
			source: not_found(),
		};

		assert_eq!(err.to_string(), "failed to start etcd");
		assert_eq!(
			err.source().map(ToString::to_string).as_deref(),
			Some("no such file")
		);
	}

	#[test]
	fn test_io_error_names_path() {
		let err = BootstrapError::io("/tmp/envtest/certs")(not_found());

		assert_eq!(err.to_string(), "I/O error on /tmp/envtest/certs");
		assert!(err.source().is_some());
	}
}
