//! Response bodies shaped like the ones kube-apiserver returns.

use serde_json::{json, Value};

/// `/version` body for a `vMAJOR.MINOR.PATCH` git version.
pub fn version_info(git_version: &str) -> Value {
	let mut parts = git_version.trim_start_matches('v').split('.');
	let major = parts.next().unwrap_or_default();
	let minor = parts.next().unwrap_or_default();

	json!({
		"major": major,
		"minor": minor,
		"gitVersion": git_version,
		"gitCommit": "envtest-mock",
		"gitTreeState": "clean",
		"buildDate": "2024-08-13T07:28:49Z",
		"goVersion": "go1.22.5",
		"compiler": "gc",
		"platform": "linux/amd64"
	})
}

pub fn namespace(name: &str, resource_version: u64) -> Value {
	json!({
		"apiVersion": "v1",
		"kind": "Namespace",
		"metadata": {
			"name": name,
			"resourceVersion": resource_version.to_string(),
			"labels": {
				"kubernetes.io/metadata.name": name
			}
		},
		"spec": {
			"finalizers": ["kubernetes"]
		},
		"status": {
			"phase": "Active"
		}
	})
}

pub fn namespace_list(items: Vec<Value>, resource_version: u64) -> Value {
	json!({
		"apiVersion": "v1",
		"kind": "NamespaceList",
		"metadata": {"resourceVersion": resource_version.to_string()},
		"items": items
	})
}

/// A `Status` failure body, as returned for 4xx responses.
pub fn failure(code: u16, reason: &str, message: &str) -> Value {
	json!({
		"apiVersion": "v1",
		"kind": "Status",
		"metadata": {},
		"status": "Failure",
		"message": message,
		"reason": reason,
		"code": code
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_version_info_splits_git_version() {
		let info = version_info("v1.30.2");
		assert_eq!(info["major"], "1");
		assert_eq!(info["minor"], "30");
		assert_eq!(info["gitVersion"], "v1.30.2");
	}

	#[test]
	fn test_failure_carries_code() {
		let body = failure(404, "NotFound", "namespaces \"x\" not found");
		assert_eq!(body["code"], 404);
		assert_eq!(body["reason"], "NotFound");
	}
}
