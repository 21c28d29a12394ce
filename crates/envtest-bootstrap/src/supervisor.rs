//! Keeps the control-plane processes alive together and tears them down in order.

use std::{io, process::ExitStatus, time::Duration};

use futures::future::{select_all, FutureExt};
use nix::{
	sys::signal::{kill, Signal},
	unistd::Pid,
};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::{
	error::Component,
	health::{wait_until_healthy, HealthProbe},
	BootstrapError,
};

#[derive(Debug)]
struct ManagedProcess {
	component: Component,
	child: Child,
}

/// A supervised process stopped on its own.
#[derive(Debug)]
pub struct Exited {
	pub component: Component,
	pub result: io::Result<ExitStatus>,
}

impl Exited {
	pub fn into_error(self) -> BootstrapError {
		match self.result {
			Ok(status) => BootstrapError::ExitedEarly {
				component: self.component,
				status,
			},
			Err(source) => BootstrapError::Wait {
				component: self.component,
				source,
			},
		}
	}
}

/// Processes in start order. Shutdown walks them in reverse.
#[derive(Debug, Default)]
pub struct Supervisor {
	processes: Vec<ManagedProcess>,
}

impl Supervisor {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.processes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.processes.is_empty()
	}

	/// OS process id of `component`, if it was started and not yet reaped.
	pub fn pid(&self, component: Component) -> Option<u32> {
		self.processes
			.iter()
			.find(|process| process.component == component)
			.and_then(|process| process.child.id())
	}

	pub fn spawn(&mut self, component: Component, mut command: Command) -> Result<(), BootstrapError> {
		let child = command
			.spawn()
			.map_err(|source| BootstrapError::Spawn { component, source })?;
		info!(%component, pid = child.id(), "Started");
		self.processes.push(ManagedProcess { component, child });
		Ok(())
	}

	/// Resolves as soon as any supervised process exits. Pending forever when empty.
	pub async fn wait_any(&mut self) -> Exited {
		if self.processes.is_empty() {
			return futures::future::pending::<Exited>().await;
		}

		let waits = self.processes.iter_mut().map(|process| {
			let component = process.component;
			process
				.child
				.wait()
				.map(move |result| Exited { component, result })
				.boxed()
		});
		let (exited, _, _) = select_all(waits).await;
		exited
	}

	/// Wait for `probe` while making sure nothing supervised dies meanwhile.
	pub async fn wait_healthy(
		&mut self,
		probe: &HealthProbe,
		timeout: Duration,
		interval: Duration,
	) -> Result<(), BootstrapError> {
		tokio::select! {
			result = wait_until_healthy(probe, timeout, interval) => result,
			exited = self.wait_any() => Err(exited.into_error()),
		}
	}

	/// SIGTERM every process, newest first, and kill whatever is still running
	/// after `grace`.
	pub async fn shutdown(&mut self, grace: Duration) {
		while let Some(mut process) = self.processes.pop() {
			let component = process.component;

			if let Ok(Some(status)) = process.child.try_wait() {
				debug!(%component, %status, "Already exited");
				continue;
			}

			if let Some(pid) = process.child.id().and_then(|id| i32::try_from(id).ok()) {
				if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
					warn!(%component, error = %e, "Failed to send SIGTERM");
				}
			}

			match tokio::time::timeout(grace, process.child.wait()).await {
				Ok(Ok(status)) => info!(%component, %status, "Stopped"),
				Ok(Err(e)) => warn!(%component, error = %e, "Failed to wait for exit"),
				Err(_) => {
					warn!(%component, grace_secs = grace.as_secs(), "Did not stop in time, killing");
					if let Err(e) = process.child.kill().await {
						warn!(%component, error = %e, "Failed to kill");
					}
				}
			}
		}
	}
}
