//! Keeps a `hash-<key>` annotation with the SHA-256 of every data entry on
//! ConfigMaps that opt in through [`WATCH_LABEL`].
//!
//! Workloads can copy those annotations into their pod templates to get rolled
//! whenever the configuration they mount changes.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use futures::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{
	api::PostParams,
	runtime::{controller::Action, watcher, Controller},
	Api, Client, ResourceExt,
};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Only ConfigMaps with this label set to `true` are reconciled.
pub const WATCH_LABEL: &str = "configmap-hash-controller.example.io/enabled";

/// Prefix of the annotations this controller owns.
pub const ANNOTATION_PREFIX: &str = "configmap-hash-controller.example.io/hash-";

const ERROR_REQUEUE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum Error {
	#[error("ConfigMap has no namespace")]
	MissingNamespace,

	#[error(transparent)]
	Kube(#[from] kube::Error),
}

pub struct Context {
	pub client: Client,
}

/// Lowercase hex SHA-256 of `value`.
pub fn hash_value(value: &str) -> String {
	format!("{:x}", Sha256::digest(value.as_bytes()))
}

/// The annotation set a ConfigMap should carry: every foreign annotation as is,
/// plus one hash annotation per data key. Hash annotations for keys that no
/// longer exist are dropped.
pub fn desired_annotations(
	current: &BTreeMap<String, String>,
	data: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
	let mut annotations: BTreeMap<String, String> = current
		.iter()
		.filter(|(key, _)| !key.starts_with(ANNOTATION_PREFIX))
		.map(|(key, value)| (key.clone(), value.clone()))
		.collect();

	for (key, value) in data {
		annotations.insert(format!("{ANNOTATION_PREFIX}{key}"), hash_value(value));
	}

	annotations
}

/// Sorted hash annotation keys present in `annotations`.
pub fn hash_annotation_keys(annotations: &BTreeMap<String, String>) -> Vec<&str> {
	annotations
		.keys()
		.map(String::as_str)
		.filter(|key| key.starts_with(ANNOTATION_PREFIX))
		.collect()
}

#[instrument(skip_all, fields(name = %config_map.name_any()))]
pub async fn reconcile(config_map: Arc<ConfigMap>, ctx: Arc<Context>) -> Result<Action, Error> {
	let namespace = config_map.namespace().ok_or(Error::MissingNamespace)?;
	debug!(%namespace, "Reconciling");
	let empty = BTreeMap::new();
	let data = config_map.data.as_ref().unwrap_or(&empty);

	let desired = desired_annotations(config_map.annotations(), data);
	if &desired == config_map.annotations() {
		debug!("Annotations up to date");
		return Ok(Action::await_change());
	}

	let mut updated = (*config_map).clone();
	updated.metadata.annotations = Some(desired);

	let api: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), &namespace);
	api.replace(&config_map.name_any(), &PostParams::default(), &updated)
		.await?;
	info!("Updated hash annotations");

	Ok(Action::await_change())
}

pub fn error_policy(config_map: Arc<ConfigMap>, error: &Error, _ctx: Arc<Context>) -> Action {
	warn!(
		?error,
		name = %config_map.name_any(),
		"Reconciliation failed"
	);
	Action::requeue(ERROR_REQUEUE)
}

/// Run the controller until a shutdown signal arrives.
pub async fn run(client: Client) {
	let config_maps: Api<ConfigMap> = Api::all(client.clone());
	let ctx = Arc::new(Context { client });
	let selector = format!("{WATCH_LABEL}=true");

	info!(%selector, "Starting ConfigMap hash controller");
	Controller::new(config_maps, watcher::Config::default().labels(&selector))
		.shutdown_on_signal()
		.run(reconcile, error_policy, ctx)
		.for_each(|result| async move {
			match result {
				Ok((object, _)) => debug!(name = %object.name, "Reconciled"),
				Err(e) => warn!(error = %e, "Reconcile failed"),
			}
		})
		.await;
}
