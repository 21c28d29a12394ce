use std::time::Duration;

use bon::Builder;

use crate::{DEFAULT_IMAGE, DEFAULT_KUBERNETES_VERSION, DEFAULT_TAG};

/// How long a start may take before it is abandoned.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(120);

/// Knobs for [`EnvtestContainer::run`](crate::EnvtestContainer::run).
///
/// ```
/// use testcontainers_envtest::EnvtestOptions;
///
/// let options = EnvtestOptions::builder().kubernetes_version("1.30.0").build();
/// assert_eq!(options.image_reference(), ("ghcr.io/roma-glushko/testcontainers-envtest".to_string(), "v1.30.0".to_string()));
/// ```
#[derive(Debug, Clone, Default, Builder)]
pub struct EnvtestOptions {
	/// Full image reference (`name[:tag]`). Takes precedence over the tag derived
	/// from `kubernetes_version`.
	#[builder(into)]
	image: Option<String>,

	/// Kubernetes version to run, without the `v` prefix.
	#[builder(into)]
	kubernetes_version: Option<String>,

	startup_timeout: Option<Duration>,
}

impl EnvtestOptions {
	/// The version reported back by the container handle.
	pub fn kubernetes_version(&self) -> &str {
		self.kubernetes_version
			.as_deref()
			.unwrap_or(DEFAULT_KUBERNETES_VERSION)
	}

	pub fn startup_timeout(&self) -> Duration {
		self.startup_timeout.unwrap_or(DEFAULT_STARTUP_TIMEOUT)
	}

	/// Image name and tag to pull.
	pub fn image_reference(&self) -> (String, String) {
		if let Some(image) = &self.image {
			return split_image(image);
		}
		let tag = self
			.kubernetes_version
			.as_deref()
			.map_or_else(|| DEFAULT_TAG.to_string(), |version| format!("v{version}"));
		(DEFAULT_IMAGE.to_string(), tag)
	}
}

/// Split `name[:tag]`. A colon inside the registry host (`host:5000/image`) is not a tag.
fn split_image(image: &str) -> (String, String) {
	let name_start = image.rfind('/').map_or(0, |slash| slash + 1);
	match image[name_start..].rfind(':') {
		Some(colon) => {
			let colon = name_start + colon;
			(image[..colon].to_string(), image[colon + 1..].to_string())
		}
		None => (image.to_string(), DEFAULT_TAG.to_string()),
	}
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;

	#[test]
	fn test_defaults() {
		let options = EnvtestOptions::default();

		assert_eq!(options.kubernetes_version(), "1.31.0");
		assert_eq!(options.startup_timeout(), DEFAULT_STARTUP_TIMEOUT);
		assert_eq!(
			options.image_reference(),
			(DEFAULT_IMAGE.to_string(), "latest".to_string())
		);
	}

	#[test]
	fn test_version_selects_tag() {
		let options = EnvtestOptions::builder()
			.kubernetes_version("1.30.0")
			.build();

		assert_eq!(options.kubernetes_version(), "1.30.0");
		assert_eq!(options.image_reference().1, "v1.30.0");
	}

	#[test]
	fn test_custom_image_wins_over_version() {
		let options = EnvtestOptions::builder()
			.image("my-registry/envtest:custom")
			.kubernetes_version("1.30.0")
			.startup_timeout(Duration::from_secs(5))
			.build();

		assert_eq!(
			options.image_reference(),
			("my-registry/envtest".to_string(), "custom".to_string())
		);
		assert_eq!(options.kubernetes_version(), "1.30.0");
		assert_eq!(options.startup_timeout(), Duration::from_secs(5));
	}

	#[rstest]
	#[case::name_only("envtest", "envtest", "latest")]
	#[case::with_tag("envtest:v1.29.0", "envtest", "v1.29.0")]
	#[case::registry_port("localhost:5000/envtest", "localhost:5000/envtest", "latest")]
	#[case::registry_port_and_tag("localhost:5000/team/envtest:dev", "localhost:5000/team/envtest", "dev")]
	fn test_split_image(#[case] image: &str, #[case] name: &str, #[case] tag: &str) {
		assert_eq!(split_image(image), (name.to_string(), tag.to_string()));
	}
}
