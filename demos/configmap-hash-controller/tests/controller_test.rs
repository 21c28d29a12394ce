//! Runs the controller against a real API server in a container.

use std::{collections::BTreeMap, time::Duration};

use configmap_hash_controller::{hash_annotation_keys, hash_value, ANNOTATION_PREFIX, WATCH_LABEL};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{
	api::{ObjectMeta, PostParams},
	Api,
};
use testcontainers_envtest::EnvtestContainer;

fn config_map(name: &str, labels: Option<BTreeMap<String, String>>) -> ConfigMap {
	ConfigMap {
		metadata: ObjectMeta {
			name: Some(name.to_string()),
			namespace: Some("default".to_string()),
			labels,
			..Default::default()
		},
		data: Some(BTreeMap::from([
			("key1".to_string(), "value1".to_string()),
			("key2".to_string(), "value2".to_string()),
		])),
		..Default::default()
	}
}

async fn wait_for_hashes(api: &Api<ConfigMap>, name: &str, count: usize) -> Option<ConfigMap> {
	let poll = async {
		loop {
			if let Ok(cm) = api.get(name).await {
				let annotations = cm.metadata.annotations.clone().unwrap_or_default();
				if hash_annotation_keys(&annotations).len() == count {
					return cm;
				}
			}
			tokio::time::sleep(Duration::from_millis(100)).await;
		}
	};
	tokio::time::timeout(Duration::from_secs(30), poll).await.ok()
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn test_configmap_hash_controller() {
	let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

	let envtest = EnvtestContainer::run_default()
		.await
		.expect("container starts");
	let client = envtest.kubernetes_client().await.expect("client");

	let controller = tokio::spawn(configmap_hash_controller::run(client.clone()));
	let api: Api<ConfigMap> = Api::namespaced(client, "default");

	let labels = BTreeMap::from([(WATCH_LABEL.to_string(), "true".to_string())]);
	api.create(&PostParams::default(), &config_map("test-configmap", Some(labels)))
		.await
		.expect("create labelled ConfigMap");

	let updated = wait_for_hashes(&api, "test-configmap", 2)
		.await
		.expect("hash annotations appear");
	let annotations = updated.metadata.annotations.unwrap_or_default();
	assert_eq!(
		annotations.get(&format!("{ANNOTATION_PREFIX}key1")),
		Some(&hash_value("value1"))
	);
	assert_eq!(
		annotations.get(&format!("{ANNOTATION_PREFIX}key2")),
		Some(&hash_value("value2"))
	);

	api.create(&PostParams::default(), &config_map("test-configmap-no-label", None))
		.await
		.expect("create unlabelled ConfigMap");
	tokio::time::sleep(Duration::from_secs(2)).await;
	let untouched = api
		.get("test-configmap-no-label")
		.await
		.expect("get unlabelled ConfigMap");
	let annotations = untouched.metadata.annotations.unwrap_or_default();
	assert!(hash_annotation_keys(&annotations).is_empty());

	controller.abort();
	envtest.terminate().await.expect("terminate");
}
