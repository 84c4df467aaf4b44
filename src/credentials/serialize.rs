//! JSON projection of a credential and its inverse.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use time::format_description::well_known::Rfc3339;
// self
use crate::{
	_prelude::*,
	auth::{CachedToken, ScopeList, TokenSecret},
	credentials::{KeyMaterial, SERVICE_ACCOUNT_TYPE, ServiceAccountCredentials, TokenEndpoints},
	crypt::{DEFAULT_PKCS12_PASSWORD, KeyFormat, SignerBackend},
	error::ConfigError,
	jwt::ExtraClaims,
};

/// `_class` discriminator written by [`ServiceAccountCredentials::serialize_with`].
pub const SERIALIZED_CLASS: &str = "ServiceAccountCredentials";

#[derive(Serialize, Deserialize)]
struct SerializedCredential {
	service_account_email: String,
	#[serde(default)]
	scopes: ScopeList,
	#[serde(default)]
	private_key_id: Option<String>,
	#[serde(default)]
	client_id: Option<String>,
	#[serde(default)]
	user_agent: Option<String>,
	token_uri: String,
	revoke_uri: String,
	#[serde(default)]
	extra_claims: ExtraClaims,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	private_key_pkcs8_pem: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	private_key_pkcs12: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	private_key_password: Option<String>,
	#[serde(default)]
	access_token: Option<TokenSecret>,
	#[serde(default, with = "time::serde::rfc3339::option")]
	token_expiry: Option<OffsetDateTime>,
	#[serde(default, with = "time::serde::rfc3339::option")]
	token_issued_at: Option<OffsetDateTime>,
	#[serde(default)]
	token_response: Option<Value>,
}

impl ServiceAccountCredentials {
	/// Returns `{"_class": "ServiceAccountCredentials", "token_expiry": <RFC 3339 or null>}` with
	/// `fields` merged over it.
	pub fn serialize_with(&self, fields: Map<String, Value>) -> Result<Value> {
		let token_expiry = match self.token_expiry() {
			Some(expiry) => Value::from(expiry.format(&Rfc3339).map_err(serialization_error)?),
			None => Value::Null,
		};
		let mut object = Map::new();

		object.insert("_class".into(), SERIALIZED_CLASS.into());
		object.insert("token_expiry".into(), token_expiry);
		object.extend(fields);

		Ok(Value::Object(object))
	}

	/// Serializes identity, key material, and the cached token.
	///
	/// Credentials built around an external signer serialize without key material and cannot be
	/// read back by [`from_json`](Self::from_json).
	pub fn to_json(&self) -> Result<String> {
		let cached = self.cached();
		let (pkcs8, pkcs12, password) = match self.key_material() {
			KeyMaterial::Pkcs8Pem(pem) => (Some(pem.clone()), None, None),
			KeyMaterial::Pkcs12 { der, password } =>
				(None, Some(STANDARD.encode(der)), Some(password.clone())),
			KeyMaterial::External => (None, None, None),
		};
		let state = SerializedCredential {
			service_account_email: self.service_account_email().to_owned(),
			scopes: self.scopes().clone(),
			private_key_id: self.private_key_id().map(ToOwned::to_owned),
			client_id: self.client_id().map(ToOwned::to_owned),
			user_agent: self.user_agent().map(ToOwned::to_owned),
			token_uri: self.endpoints().token.to_string(),
			revoke_uri: self.endpoints().revocation.to_string(),
			extra_claims: self.extra_claims().clone(),
			private_key_pkcs8_pem: pkcs8,
			private_key_pkcs12: pkcs12,
			private_key_password: password,
			access_token: cached.as_ref().map(|token| token.access_token.clone()),
			token_expiry: cached.as_ref().map(|token| token.expires_at),
			token_issued_at: cached.as_ref().map(|token| token.issued_at),
			token_response: cached.map(|token| token.response),
		};
		let Value::Object(fields) = serde_json::to_value(state).map_err(ConfigError::from)? else {
			return Err(serialization_error("credential did not serialize to an object").into());
		};

		Ok(self.serialize_with(fields)?.to_string())
	}

	/// Rebuilds a credential written by [`to_json`](Self::to_json); the signer is built fresh.
	pub fn from_json(raw: &str, backend: &dyn SignerBackend) -> Result<Self> {
		let payload = serde_json::from_str::<Value>(raw).map_err(ConfigError::from)?;
		let class = payload.get("_class");

		if class.and_then(Value::as_str) != Some(SERIALIZED_CLASS) {
			return Err(ConfigError::InvalidCredentialType {
				got: class.map(|value| value.as_str().map_or_else(|| value.to_string(), Into::into)),
				expected: SERIALIZED_CLASS,
			}
			.into());
		}

		let state: SerializedCredential = serde_path_to_error::deserialize(&payload)
			.map_err(|source| ConfigError::MalformedKeyFile { source })?;
		let (signer, key_material) = match (state.private_key_pkcs8_pem, state.private_key_pkcs12) {
			(Some(pem), _) => (backend.from_pkcs8_pem(&pem)?, KeyMaterial::Pkcs8Pem(pem)),
			(None, Some(encoded)) => {
				let der = STANDARD
					.decode(encoded)
					.map_err(|e| ConfigError::invalid_key(KeyFormat::Pkcs12.as_str(), e))?;
				let password = state
					.private_key_password
					.unwrap_or_else(|| DEFAULT_PKCS12_PASSWORD.to_owned());

				(backend.from_pkcs12(&der, &password)?, KeyMaterial::Pkcs12 { der, password })
			},
			(None, None) => return Err(ConfigError::MissingField { field: "private_key" }.into()),
		};
		let mut creds = Self::new(state.service_account_email, signer)
			.with_key_material(key_material)
			.with_scopes(state.scopes)
			.with_claims(state.extra_claims)
			.with_endpoints(TokenEndpoints::parse(&state.token_uri, &state.revoke_uri)?);

		if let Some(private_key_id) = state.private_key_id {
			creds = creds.with_private_key_id(private_key_id);
		}
		if let Some(client_id) = state.client_id {
			creds = creds.with_client_id(client_id);
		}
		if let Some(user_agent) = state.user_agent {
			creds = creds.with_user_agent(user_agent);
		}
		if let (Some(access_token), Some(expires_at)) = (state.access_token, state.token_expiry) {
			creds.restore_cached(CachedToken {
				access_token,
				issued_at: state.token_issued_at.unwrap_or(expires_at),
				expires_at,
				response: state.token_response.unwrap_or(Value::Null),
			});
		}

		Ok(creds)
	}

	/// Key-file shaped projection, available only for credentials loaded from a key file.
	///
	/// Feeding the result back into
	/// [`from_keyfile_dict`](ServiceAccountCredentials::from_keyfile_dict) yields an equivalent
	/// credential.
	pub fn serialization_data(&self) -> Option<Value> {
		let KeyMaterial::Pkcs8Pem(private_key) = self.key_material() else {
			return None;
		};
		let client_id = self.client_id()?;
		let private_key_id = self.private_key_id()?;

		Some(serde_json::json!({
			"type": SERVICE_ACCOUNT_TYPE,
			"client_email": self.service_account_email(),
			"client_id": client_id,
			"private_key": private_key,
			"private_key_id": private_key_id,
		}))
	}
}

fn serialization_error(message: impl Display) -> ConfigError {
	ConfigError::Serialization(<serde_json::Error as serde::ser::Error>::custom(message))
}
