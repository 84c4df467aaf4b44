//! Factories building credentials from key files and PKCS#12 containers.

// std
use std::{fs, io::Read, path::Path};
// self
use crate::{
	_prelude::*,
	auth::ScopeList,
	credentials::{KeyMaterial, ServiceAccountCredentials},
	crypt::{DEFAULT_PKCS12_PASSWORD, SignerBackend},
	error::ConfigError,
	jwt::ExtraClaims,
};

/// `type` discriminator of a service-account key file.
pub const SERVICE_ACCOUNT_TYPE: &str = "service_account";

#[derive(Deserialize)]
struct KeyFileFields {
	client_email: String,
	private_key: String,
	private_key_id: String,
	client_id: String,
}

impl ServiceAccountCredentials {
	/// Builds a credential from a parsed service-account key file.
	///
	/// The `type` discriminator is checked first, then `client_email`, `private_key`,
	/// `private_key_id`, and `client_id` in that order. Unknown fields are ignored.
	pub fn from_keyfile_dict(
		payload: &Value,
		scopes: ScopeList,
		claims: ExtraClaims,
		backend: &dyn SignerBackend,
	) -> Result<Self> {
		let got = payload.get("type");

		if got.and_then(Value::as_str) != Some(SERVICE_ACCOUNT_TYPE) {
			return Err(ConfigError::InvalidCredentialType {
				got: got.map(|value| value.as_str().map_or_else(|| value.to_string(), Into::into)),
				expected: SERVICE_ACCOUNT_TYPE,
			}
			.into());
		}

		for field in ["client_email", "private_key", "private_key_id", "client_id"] {
			if payload.get(field).is_none() {
				return Err(ConfigError::MissingField { field }.into());
			}
		}

		let fields: KeyFileFields = serde_path_to_error::deserialize(payload)
			.map_err(|source| ConfigError::MalformedKeyFile { source })?;
		let signer = backend.from_pkcs8_pem(&fields.private_key)?;

		Ok(Self::new(fields.client_email, signer)
			.with_key_material(KeyMaterial::Pkcs8Pem(fields.private_key))
			.with_private_key_id(fields.private_key_id)
			.with_client_id(fields.client_id)
			.with_scopes(scopes)
			.with_claims(claims))
	}

	/// Reads and parses a key file from disk, then defers to
	/// [`from_keyfile_dict`](Self::from_keyfile_dict).
	pub fn from_keyfile_path(
		path: impl AsRef<Path>,
		scopes: ScopeList,
		claims: ExtraClaims,
		backend: &dyn SignerBackend,
	) -> Result<Self> {
		let raw = fs::read(path).map_err(ConfigError::from)?;
		let payload = serde_json::from_slice::<Value>(&raw).map_err(ConfigError::from)?;

		Self::from_keyfile_dict(&payload, scopes, claims, backend)
	}

	/// Builds a credential from PKCS#12 container bytes.
	///
	/// `password` defaults to [`DEFAULT_PKCS12_PASSWORD`]. PKCS#12 credentials carry neither a key
	/// id nor a client id.
	pub fn from_pkcs12(
		service_account_email: impl Into<String>,
		der: impl Into<Vec<u8>>,
		password: Option<&str>,
		scopes: ScopeList,
		claims: ExtraClaims,
		backend: &dyn SignerBackend,
	) -> Result<Self> {
		let der = der.into();
		let password = password.unwrap_or(DEFAULT_PKCS12_PASSWORD).to_owned();
		let signer = backend.from_pkcs12(&der, &password)?;

		Ok(Self::new(service_account_email, signer)
			.with_key_material(KeyMaterial::Pkcs12 { der, password })
			.with_scopes(scopes)
			.with_claims(claims))
	}

	/// Reads a PKCS#12 container from disk.
	pub fn from_pkcs12_path(
		service_account_email: impl Into<String>,
		path: impl AsRef<Path>,
		password: Option<&str>,
		scopes: ScopeList,
		claims: ExtraClaims,
		backend: &dyn SignerBackend,
	) -> Result<Self> {
		let der = fs::read(path).map_err(ConfigError::from)?;

		Self::from_pkcs12(service_account_email, der, password, scopes, claims, backend)
	}

	/// Drains a PKCS#12 container from any reader.
	pub fn from_pkcs12_reader(
		service_account_email: impl Into<String>,
		mut reader: impl Read,
		password: Option<&str>,
		scopes: ScopeList,
		claims: ExtraClaims,
		backend: &dyn SignerBackend,
	) -> Result<Self> {
		let mut der = Vec::new();

		reader.read_to_end(&mut der).map_err(ConfigError::from)?;

		Self::from_pkcs12(service_account_email, der, password, scopes, claims, backend)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::crypt::RsaSignerBackend;

	fn keyfile() -> Value {
		serde_json::json!({
			"type": "service_account",
			"client_id": "123",
			"client_email": "dummy@example.com",
			"private_key_id": "ABCDEF",
			"private_key": include_str!("../../tests/data/privatekey.pem"),
			"project_id": "ignored",
		})
	}

	#[test]
	fn type_mismatch_is_reported_before_fields() {
		let mut payload = keyfile();

		payload["type"] = "authorized_user".into();
		payload.as_object_mut().expect("Key file fixture is an object.").remove("client_email");

		let err = ServiceAccountCredentials::from_keyfile_dict(
			&payload,
			ScopeList::default(),
			ExtraClaims::new(),
			&RsaSignerBackend,
		)
		.expect_err("Only service_account key files are accepted.");

		assert!(matches!(
			err,
			Error::Config(ConfigError::InvalidCredentialType { got: Some(ref got), expected: "service_account" })
				if got == "authorized_user"
		));

		payload.as_object_mut().expect("Key file fixture is an object.").remove("type");

		let err = ServiceAccountCredentials::from_keyfile_dict(
			&payload,
			ScopeList::default(),
			ExtraClaims::new(),
			&RsaSignerBackend,
		)
		.expect_err("A missing discriminator is a type mismatch.");

		assert!(matches!(err, Error::Config(ConfigError::InvalidCredentialType { got: None, .. })));
	}

	#[test]
	fn first_missing_field_is_named() {
		for field in ["client_email", "private_key", "private_key_id", "client_id"] {
			let mut payload = keyfile();

			payload.as_object_mut().expect("Key file fixture is an object.").remove(field);

			let err = ServiceAccountCredentials::from_keyfile_dict(
				&payload,
				ScopeList::default(),
				ExtraClaims::new(),
				&RsaSignerBackend,
			)
			.expect_err("Missing fields must be rejected.");

			assert!(
				matches!(err, Error::Config(ConfigError::MissingField { field: missing }) if missing == field),
				"Unexpected error for {field}: {err:?}"
			);
		}
	}

	#[test]
	fn non_string_fields_report_their_path() {
		let mut payload = keyfile();

		payload["client_id"] = 123.into();

		let err = ServiceAccountCredentials::from_keyfile_dict(
			&payload,
			ScopeList::default(),
			ExtraClaims::new(),
			&RsaSignerBackend,
		)
		.expect_err("Numeric client ids are malformed.");

		match err {
			Error::Config(ConfigError::MalformedKeyFile { source }) =>
				assert_eq!(source.path().to_string(), "client_id"),
			other => panic!("Unexpected error: {other:?}."),
		}
	}

	#[cfg(not(feature = "pkcs12"))]
	#[test]
	fn rsa_backend_cannot_open_pkcs12() {
		let err = ServiceAccountCredentials::from_pkcs12(
			"dummy@example.com",
			include_bytes!("../../tests/data/privatekey.p12").to_vec(),
			None,
			ScopeList::default(),
			ExtraClaims::new(),
			&RsaSignerBackend,
		)
		.expect_err("The rsa backend has no PKCS#12 support.");

		assert!(matches!(
			err,
			Error::Config(ConfigError::UnsupportedKeyFormat { format: "PKCS#12", backend: "rsa" })
		));
	}
}
