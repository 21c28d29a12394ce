//! Drives the mock through a real kube client built from its kubeconfig.

use envtest_mock::{MockApiServer, SEEDED_NAMESPACES};
use k8s_openapi::api::core::v1::Namespace;
use kube::{
	api::{ListParams, ObjectMeta, PostParams},
	config::{KubeConfigOptions, Kubeconfig},
	Api, Client, Config,
};

async fn client_for(kubeconfig: Kubeconfig) -> Client {
	let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
	let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
		.await
		.expect("kubeconfig should load");
	Client::try_from(config).expect("client should build")
}

#[tokio::test]
async fn test_version_is_reported() {
	let server = MockApiServer::builder()
		.git_version("v1.30.0")
		.build()
		.start()
		.await;
	let client = client_for(server.kubeconfig()).await;

	let info = client.apiserver_version().await.expect("version request");
	assert_eq!(info.git_version, "v1.30.0");
	assert_eq!(info.minor, "30");
}

#[tokio::test]
async fn test_lists_seeded_namespaces() {
	let server = MockApiServer::builder().build().start().await;
	let client = client_for(server.kubeconfig()).await;

	let namespaces: Api<Namespace> = Api::all(client);
	let list = namespaces
		.list(&ListParams::default())
		.await
		.expect("list request");
	let names: Vec<_> = list
		.items
		.iter()
		.filter_map(|ns| ns.metadata.name.as_deref())
		.collect();
	assert_eq!(names, SEEDED_NAMESPACES);
}

#[tokio::test]
async fn test_create_then_get_namespace() {
	let server = MockApiServer::builder().build().start().await;
	let client = client_for(server.kubeconfig()).await;
	let namespaces: Api<Namespace> = Api::all(client);

	let namespace = Namespace {
		metadata: ObjectMeta {
			name: Some("test-namespace".to_string()),
			..Default::default()
		},
		..Default::default()
	};
	let created = namespaces
		.create(&PostParams::default(), &namespace)
		.await
		.expect("create request");
	assert_eq!(created.metadata.name.as_deref(), Some("test-namespace"));

	let fetched = namespaces.get("test-namespace").await.expect("get request");
	assert_eq!(fetched.metadata.name.as_deref(), Some("test-namespace"));
	assert!(server.namespaces().contains(&"test-namespace".to_string()));

	let duplicate = namespaces.create(&PostParams::default(), &namespace).await;
	assert!(duplicate.is_err(), "second create should conflict");
}

#[tokio::test]
async fn test_missing_namespace_is_not_found() {
	let server = MockApiServer::builder().build().start().await;
	let client = client_for(server.kubeconfig()).await;
	let namespaces: Api<Namespace> = Api::all(client);

	let missing = namespaces.get_opt("nope").await.expect("get request");
	assert!(missing.is_none());
}

#[tokio::test]
async fn test_kubeconfig_yaml_roundtrips() {
	let server = MockApiServer::builder().build().start().await;

	let parsed = Kubeconfig::from_yaml(&server.kubeconfig_yaml()).expect("valid kubeconfig");
	assert_eq!(parsed.current_context.as_deref(), Some("envtest"));
	assert_eq!(
		parsed.clusters[0]
			.cluster
			.as_ref()
			.and_then(|c| c.server.as_deref()),
		Some(server.uri().as_str())
	);
}
