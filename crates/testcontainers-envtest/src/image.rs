use testcontainers::{
	core::{ContainerPort, WaitFor},
	Image,
};

use crate::{options::EnvtestOptions, API_SERVER_PORT, READY_MESSAGE};

const EXPOSED_PORTS: [ContainerPort; 1] = [ContainerPort::Tcp(API_SERVER_PORT)];

/// The envtest image.
///
/// Usable on its own with [`testcontainers::runners::AsyncRunner`]; readiness is the
/// entrypoint's `Envtest is ready!` line.
#[derive(Debug, Clone)]
pub struct EnvtestImage {
	name: String,
	tag: String,
}

impl EnvtestImage {
	pub fn new(options: &EnvtestOptions) -> Self {
		let (name, tag) = options.image_reference();
		Self { name, tag }
	}
}

impl Default for EnvtestImage {
	fn default() -> Self {
		Self::new(&EnvtestOptions::default())
	}
}

impl Image for EnvtestImage {
	fn name(&self) -> &str {
		&self.name
	}

	fn tag(&self) -> &str {
		&self.tag
	}

	fn ready_conditions(&self) -> Vec<WaitFor> {
		vec![WaitFor::message_on_stdout(READY_MESSAGE)]
	}

	fn expose_ports(&self) -> &[ContainerPort] {
		&EXPOSED_PORTS
	}
}
