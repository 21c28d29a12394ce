//! Container entrypoint: boots etcd and kube-apiserver, announces readiness on
//! stdout and keeps both running until the container is stopped.

use std::{
	io::{self, Write},
	process::ExitCode,
	time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use envtest_bootstrap::{BootstrapConfig, READY_MESSAGE};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, Level};

mod telemetry;

#[derive(Parser)]
#[command(name = "envtest-entrypoint")]
#[command(about = "Run a disposable Kubernetes control plane for tests")]
struct Cli {
	#[command(flatten)]
	config: BootstrapConfig,

	/// Log level, overrides RUST_LOG
	#[arg(long, env = "ENVTEST_LOG_LEVEL")]
	log_level: Option<Level>,

	/// Seconds to wait for processes to exit after SIGTERM before killing them
	#[arg(long = "shutdown-grace", env = "ENVTEST_SHUTDOWN_GRACE", value_name = "SECONDS", default_value_t = 10)]
	shutdown_grace_secs: u64,
}

fn main() -> ExitCode {
	let cli = Cli::parse();
	telemetry::init(cli.log_level);

	let runtime = match tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
		.context("failed to build tokio runtime")
	{
		Ok(runtime) => runtime,
		Err(e) => {
			error!("{e:#}");
			return ExitCode::FAILURE;
		}
	};

	match runtime.block_on(async_main(cli)) {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			error!("{e:#}");
			ExitCode::FAILURE
		}
	}
}

fn announce_ready() -> Result<()> {
	let mut stdout = io::stdout().lock();
	writeln!(stdout, "{READY_MESSAGE}").context("failed to write readiness line")?;
	stdout.flush().context("failed to flush stdout")
}

async fn async_main(cli: Cli) -> Result<()> {
	// The health probe talks TLS before any kube client exists.
	let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

	let grace = Duration::from_secs(cli.shutdown_grace_secs);
	let mut sigterm = signal(SignalKind::terminate()).context("failed to register SIGTERM handler")?;

	info!(
		assets = %cli.config.assets_dir.display(),
		port = cli.config.secure_port,
		"Starting control plane"
	);

	// A stop request during startup drops the future, and kill_on_drop reaps the children.
	let mut envtest = tokio::select! {
		result = envtest_bootstrap::start(&cli.config) => result.context("failed to start control plane")?,
		_ = tokio::signal::ctrl_c() => {
			info!("Received SIGINT during startup");
			return Ok(());
		}
		_ = sigterm.recv() => {
			info!("Received SIGTERM during startup");
			return Ok(());
		}
	};

	announce_ready()?;
	info!(kubeconfig = %envtest.kubeconfig_path().display(), "Control plane is ready");

	let exited = tokio::select! {
		_ = tokio::signal::ctrl_c() => {
			info!("Received SIGINT");
			None
		}
		_ = sigterm.recv() => {
			info!("Received SIGTERM");
			None
		}
		exited = envtest.wait() => Some(exited),
	};

	envtest.shutdown(grace).await;

	match exited {
		Some(exited) => Err(exited.into_error()).context("control plane stopped unexpectedly"),
		None => Ok(()),
	}
}
