//! TLS material for a throwaway control plane.
//!
//! A self-signed CA issues the API server serving certificate and an admin client
//! certificate. The service-account signing key is a bare key pair. Everything is
//! regenerated on every start and never leaves the container except through the
//! kubeconfig.

use std::{
	fs::{self, OpenOptions},
	io::Write,
	os::unix::fs::OpenOptionsExt,
	path::{Path, PathBuf},
};

use rcgen::{
	string::Ia5String, BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
	ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose, SanType,
};
use thiserror::Error;
use tracing::debug;

use crate::BootstrapError;

/// Validity of the generated CA.
pub const CA_VALIDITY_DAYS: i64 = 3650;

/// Validity of the generated leaf certificates.
pub const LEAF_VALIDITY_DAYS: i64 = 365;

/// Common name of the admin client certificate.
pub const ADMIN_USER: &str = "envtest-admin";

/// Group that RBAC grants cluster-admin to out of the box.
pub const ADMIN_GROUP: &str = "system:masters";

#[derive(Debug, Error)]
pub enum PkiError {
	#[error("failed to generate {what} key")]
	KeyGeneration {
		what: &'static str,
		#[source]
		source: rcgen::Error,
	},

	#[error("failed to sign {what} certificate")]
	Signing {
		what: &'static str,
		#[source]
		source: rcgen::Error,
	},

	#[error("invalid subject alternative name `{0}`")]
	InvalidSan(String),
}

/// A PEM certificate and its PEM (PKCS#8) private key.
#[derive(Debug, Clone)]
pub struct CertifiedKey {
	pub cert_pem: String,
	pub key_pem: String,
}

/// Key pair kube-apiserver signs and verifies service-account tokens with.
#[derive(Debug, Clone)]
pub struct ServiceAccountKey {
	pub private_key_pem: String,
	pub public_key_pem: String,
}

#[derive(Debug, Clone)]
pub struct TlsAssets {
	pub ca: CertifiedKey,
	pub apiserver: CertifiedKey,
	pub admin: CertifiedKey,
	pub service_account: ServiceAccountKey,
}

/// Locations of [`TlsAssets`] once written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
	pub ca_cert: PathBuf,
	pub ca_key: PathBuf,
	pub apiserver_cert: PathBuf,
	pub apiserver_key: PathBuf,
	pub admin_cert: PathBuf,
	pub admin_key: PathBuf,
	pub service_account_key: PathBuf,
	pub service_account_pub: PathBuf,
}

impl TlsPaths {
	pub fn in_dir(dir: &Path) -> Self {
		Self {
			ca_cert: dir.join("ca.crt"),
			ca_key: dir.join("ca.key"),
			apiserver_cert: dir.join("apiserver.crt"),
			apiserver_key: dir.join("apiserver.key"),
			admin_cert: dir.join("client.crt"),
			admin_key: dir.join("client.key"),
			service_account_key: dir.join("sa.key"),
			service_account_pub: dir.join("sa.pub"),
		}
	}
}

fn validity(days: i64) -> (time::OffsetDateTime, time::OffsetDateTime) {
	// Backdate a little so clocks that are slightly off still accept the certificates.
	let now = time::OffsetDateTime::now_utc();
	(now - time::Duration::hours(1), now + time::Duration::days(days))
}

fn distinguished_name(common_name: &str, organization: &str) -> DistinguishedName {
	let mut dn = DistinguishedName::new();
	dn.push(DnType::CommonName, DnValue::Utf8String(common_name.to_string()));
	dn.push(
		DnType::OrganizationName,
		DnValue::Utf8String(organization.to_string()),
	);
	dn
}

fn generate_key(what: &'static str) -> Result<KeyPair, PkiError> {
	KeyPair::generate().map_err(|source| PkiError::KeyGeneration { what, source })
}

fn parse_sans(sans: &[String]) -> Result<Vec<SanType>, PkiError> {
	sans.iter()
		.map(|san| {
			if let Ok(ip) = san.parse::<std::net::IpAddr>() {
				Ok(SanType::IpAddress(ip))
			} else {
				Ia5String::try_from(san.clone())
					.map(SanType::DnsName)
					.map_err(|_| PkiError::InvalidSan(san.clone()))
			}
		})
		.collect()
}

impl TlsAssets {
	/// Generate a CA, the API server certificate for `sans`, the admin client
	/// certificate and the service-account key.
	pub fn generate(sans: &[String]) -> Result<Self, PkiError> {
		let ca_key = generate_key("CA")?;
		let mut ca_params = CertificateParams::default();
		ca_params.distinguished_name = distinguished_name("envtest-ca", "envtest");
		ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
		ca_params.key_usages = vec![
			KeyUsagePurpose::KeyCertSign,
			KeyUsagePurpose::CrlSign,
			KeyUsagePurpose::DigitalSignature,
		];
		(ca_params.not_before, ca_params.not_after) = validity(CA_VALIDITY_DAYS);
		let ca_cert = ca_params
			.self_signed(&ca_key)
			.map_err(|source| PkiError::Signing { what: "CA", source })?;
		let ca = CertifiedKey {
			cert_pem: ca_cert.pem(),
			key_pem: ca_key.serialize_pem(),
		};
		let issuer = Issuer::from_ca_cert_pem(&ca.cert_pem, &ca_key).map_err(|source| {
			PkiError::Signing {
				what: "CA",
				source,
			}
		})?;

		let mut server_params = CertificateParams::default();
		server_params.distinguished_name = distinguished_name("kube-apiserver", "envtest");
		server_params.key_usages = vec![
			KeyUsagePurpose::DigitalSignature,
			KeyUsagePurpose::KeyEncipherment,
		];
		server_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
		server_params.subject_alt_names = parse_sans(sans)?;
		let apiserver = issue(server_params, &issuer, "kube-apiserver")?;

		// Kubernetes reads the user from CN and groups from O.
		let mut admin_params = CertificateParams::default();
		admin_params.distinguished_name = distinguished_name(ADMIN_USER, ADMIN_GROUP);
		admin_params.key_usages = vec![
			KeyUsagePurpose::DigitalSignature,
			KeyUsagePurpose::KeyEncipherment,
		];
		admin_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
		let admin = issue(admin_params, &issuer, "admin client")?;

		let sa_key = generate_key("service-account")?;
		let service_account = ServiceAccountKey {
			private_key_pem: sa_key.serialize_pem(),
			public_key_pem: sa_key.public_key_pem(),
		};

		debug!(san_count = sans.len(), "Generated TLS assets");

		Ok(Self {
			ca,
			apiserver,
			admin,
			service_account,
		})
	}

	/// Write everything below `dir`, private keys readable by the owner only.
	pub fn write_to(&self, dir: &Path) -> Result<TlsPaths, BootstrapError> {
		fs::create_dir_all(dir).map_err(BootstrapError::io(dir))?;
		let paths = TlsPaths::in_dir(dir);

		write_public(&paths.ca_cert, &self.ca.cert_pem)?;
		write_private(&paths.ca_key, &self.ca.key_pem)?;
		write_public(&paths.apiserver_cert, &self.apiserver.cert_pem)?;
		write_private(&paths.apiserver_key, &self.apiserver.key_pem)?;
		write_public(&paths.admin_cert, &self.admin.cert_pem)?;
		write_private(&paths.admin_key, &self.admin.key_pem)?;
		write_private(&paths.service_account_key, &self.service_account.private_key_pem)?;
		write_public(&paths.service_account_pub, &self.service_account.public_key_pem)?;

		debug!(dir = %dir.display(), "Wrote TLS assets");
		Ok(paths)
	}
}

fn issue(
	mut params: CertificateParams,
	issuer: &Issuer<'_, &KeyPair>,
	what: &'static str,
) -> Result<CertifiedKey, PkiError> {
	params.is_ca = IsCa::NoCa;
	(params.not_before, params.not_after) = validity(LEAF_VALIDITY_DAYS);

	let key = generate_key(what)?;
	let cert = params
		.signed_by(&key, issuer)
		.map_err(|source| PkiError::Signing { what, source })?;

	Ok(CertifiedKey {
		cert_pem: cert.pem(),
		key_pem: key.serialize_pem(),
	})
}

fn write_public(path: &Path, contents: &str) -> Result<(), BootstrapError> {
	fs::write(path, contents).map_err(BootstrapError::io(path))
}

fn write_private(path: &Path, contents: &str) -> Result<(), BootstrapError> {
	OpenOptions::new()
		.write(true)
		.create(true)
		.truncate(true)
		.mode(0o600)
		.open(path)
		.and_then(|mut file| file.write_all(contents.as_bytes()))
		.map_err(BootstrapError::io(path))
}
