//! HTTP mock of the envtest API server using wiremock.
//!
//! Unlike a real envtest container it speaks plain HTTP, so kubeconfigs produced
//! here carry no TLS material.

use std::{
	collections::BTreeMap,
	sync::{Arc, PoisonError, RwLock},
};

use bon::Builder;
use kube::config::{
	AuthInfo, Cluster, Context, Kubeconfig, NamedAuthInfo, NamedCluster, NamedContext,
};
use serde_json::Value;
use tracing::{debug, trace};
use wiremock::{
	matchers::{method, path, path_regex},
	Mock, MockServer, Request, ResponseTemplate,
};

use crate::responses;

/// Git version reported by `/version` unless overridden.
pub const DEFAULT_GIT_VERSION: &str = "v1.31.0";

/// Namespaces every fresh kube-apiserver creates on startup.
pub const SEEDED_NAMESPACES: [&str; 4] = ["default", "kube-node-lease", "kube-public", "kube-system"];

/// Name used for the cluster, context and user in generated kubeconfigs.
const ENVTEST_NAME: &str = "envtest";

#[derive(Default)]
struct State {
	namespaces: BTreeMap<String, Value>,
	resource_version: u64,
}

impl State {
	fn insert_namespace(&mut self, name: &str) -> Value {
		self.resource_version += 1;
		let object = responses::namespace(name, self.resource_version);
		self.namespaces.insert(name.to_string(), object.clone());
		object
	}
}

type SharedState = Arc<RwLock<State>>;

/// A mock API server, configured before start.
#[derive(Builder)]
pub struct MockApiServer {
	/// Version reported by `/version`, e.g. `v1.30.0`.
	#[builder(default = DEFAULT_GIT_VERSION.to_string(), into)]
	git_version: String,
	/// Whether `/healthz`, `/livez` and `/readyz` report success.
	#[builder(default = true)]
	healthy: bool,
	/// Extra namespaces to create next to the seeded ones.
	#[builder(default)]
	namespaces: Vec<String>,
}

/// A running mock API server.
pub struct RunningMockApiServer {
	server: MockServer,
	state: SharedState,
}

impl MockApiServer {
	/// Start serving on a random loopback port.
	pub async fn start(self) -> RunningMockApiServer {
		let server = MockServer::start().await;
		debug!(uri = %server.uri(), "Started mock envtest API server");

		let mut state = State::default();
		for name in SEEDED_NAMESPACES
			.iter()
			.copied()
			.chain(self.namespaces.iter().map(String::as_str))
		{
			trace!(namespace = name, "Seeded namespace");
			state.insert_namespace(name);
		}
		let state = Arc::new(RwLock::new(state));

		mount_version(&server, &self.git_version).await;
		mount_health(&server, self.healthy).await;
		mount_namespaces(&server, &state).await;

		RunningMockApiServer { server, state }
	}
}

impl RunningMockApiServer {
	/// The server's URI (e.g. `http://127.0.0.1:12345`).
	pub fn uri(&self) -> String {
		self.server.uri()
	}

	/// A kubeconfig pointing at this server, shaped like the one envtest writes.
	pub fn kubeconfig(&self) -> Kubeconfig {
		Kubeconfig {
			clusters: vec![NamedCluster {
				name: ENVTEST_NAME.to_string(),
				cluster: Some(Cluster {
					server: Some(self.uri()),
					..Default::default()
				}),
			}],
			contexts: vec![NamedContext {
				name: ENVTEST_NAME.to_string(),
				context: Some(Context {
					cluster: ENVTEST_NAME.to_string(),
					user: Some(ENVTEST_NAME.to_string()),
					..Default::default()
				}),
			}],
			auth_infos: vec![NamedAuthInfo {
				name: ENVTEST_NAME.to_string(),
				auth_info: Some(AuthInfo::default()),
			}],
			current_context: Some(ENVTEST_NAME.to_string()),
			kind: Some("Config".to_string()),
			api_version: Some("v1".to_string()),
			..Default::default()
		}
	}

	/// [`Self::kubeconfig`] serialized to YAML.
	pub fn kubeconfig_yaml(&self) -> String {
		serde_yaml::to_string(&self.kubeconfig())
			.expect("serializing a kubeconfig should never fail")
	}

	/// Names of the namespaces currently stored, sorted.
	pub fn namespaces(&self) -> Vec<String> {
		let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
		state.namespaces.keys().cloned().collect()
	}
}

async fn mount_version(server: &MockServer, git_version: &str) {
	Mock::given(method("GET"))
		.and(path("/version"))
		.respond_with(ResponseTemplate::new(200).set_body_json(responses::version_info(git_version)))
		.mount(server)
		.await;
}

async fn mount_health(server: &MockServer, healthy: bool) {
	let response = if healthy {
		ResponseTemplate::new(200).set_body_string("ok")
	} else {
		ResponseTemplate::new(500)
			.set_body_string("[-]etcd failed: reason withheld\nhealthz check failed")
	};

	Mock::given(method("GET"))
		.and(path_regex(r"^/(healthz|livez|readyz)$"))
		.respond_with(response)
		.mount(server)
		.await;
}

async fn mount_namespaces(server: &MockServer, state: &SharedState) {
	let list_state = Arc::clone(state);
	let get_state = Arc::clone(state);
	let create_state = Arc::clone(state);

	Mock::given(method("GET"))
		.and(path("/api/v1/namespaces"))
		.respond_with(move |_: &Request| {
			let state = list_state.read().unwrap_or_else(PoisonError::into_inner);
			let items = state.namespaces.values().cloned().collect();
			ResponseTemplate::new(200)
				.set_body_json(responses::namespace_list(items, state.resource_version))
		})
		.mount(server)
		.await;

	Mock::given(method("GET"))
		.and(path_regex(r"^/api/v1/namespaces/[^/]+$"))
		.respond_with(move |req: &Request| {
			let name = req.url.path().rsplit('/').next().unwrap_or_default();
			let state = get_state.read().unwrap_or_else(PoisonError::into_inner);
			match state.namespaces.get(name) {
				Some(namespace) => ResponseTemplate::new(200).set_body_json(namespace),
				None => ResponseTemplate::new(404).set_body_json(responses::failure(
					404,
					"NotFound",
					&format!("namespaces \"{name}\" not found"),
				)),
			}
		})
		.mount(server)
		.await;

	Mock::given(method("POST"))
		.and(path("/api/v1/namespaces"))
		.respond_with(move |req: &Request| {
			let body: Value = serde_json::from_slice(&req.body).unwrap_or(Value::Null);
			let Some(name) = body.pointer("/metadata/name").and_then(Value::as_str) else {
				return ResponseTemplate::new(422).set_body_json(responses::failure(
					422,
					"Invalid",
					"Namespace \"\" is invalid: metadata.name: Required value: name is required",
				));
			};

			let mut state = create_state.write().unwrap_or_else(PoisonError::into_inner);
			if state.namespaces.contains_key(name) {
				return ResponseTemplate::new(409).set_body_json(responses::failure(
					409,
					"AlreadyExists",
					&format!("namespaces \"{name}\" already exists"),
				));
			}

			trace!(namespace = name, "Created namespace");
			ResponseTemplate::new(201).set_body_json(state.insert_namespace(name))
		})
		.mount(server)
		.await;
}
