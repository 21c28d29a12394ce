use anyhow::{Context, Result};
use kube::Client;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::builder()
				.with_default_directive(Level::INFO.into())
				.from_env_lossy(),
		)
		.with_writer(std::io::stderr)
		.init();

	let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

	let client = Client::try_default()
		.await
		.context("failed to build client from the ambient kubeconfig")?;
	configmap_hash_controller::run(client).await;

	Ok(())
}
