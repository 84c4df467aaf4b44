//! JWT-bearer assertion construction and signing.
//!
//! The builder produces header and claims only; signing happens through a [`Signer`]. Both JSON
//! segments are serialized deterministically (fixed header field order, claims sorted by key),
//! so a fixed credential and a fixed `now` always yield byte-identical signing input.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{_prelude::*, auth::ScopeList, crypt::Signer, error::SigningError};

/// Lifetime requested for every assertion.
pub const MAX_TOKEN_LIFETIME: Duration = Duration::seconds(3600);
/// Claim used for subject delegation.
pub const SUBJECT_CLAIM: &str = "sub";

/// Additional string claims merged over the standard claim set.
pub type ExtraClaims = BTreeMap<String, String>;

/// JOSE header of an RS256 assertion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionHeader {
	/// Token type, always `JWT`.
	pub typ: String,
	/// Signing algorithm, always `RS256`.
	pub alg: String,
	/// Key identifier, when the credential knows it.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub kid: Option<String>,
}
impl AssertionHeader {
	/// Builds the RS256 header for an optional key id.
	pub fn rs256(kid: Option<&str>) -> Self {
		Self { typ: "JWT".into(), alg: "RS256".into(), kid: kid.map(ToOwned::to_owned) }
	}
}

/// Unsigned assertion: header plus claim set.
#[derive(Clone, Debug, PartialEq)]
pub struct Assertion {
	/// JOSE header.
	pub header: AssertionHeader,
	/// Claim set; keys are unique and serialize in sorted order.
	pub claims: Map<String, Value>,
}
impl Assertion {
	/// Composes the canonical claim set for a credential at `now`.
	///
	/// `scope` is always present, even when the list is empty, and `extra_claims` are applied last
	/// so they overwrite any same-named standard claim.
	pub fn build(
		issuer: &str,
		scopes: &ScopeList,
		audience: &Url,
		key_id: Option<&str>,
		extra_claims: &ExtraClaims,
		now: OffsetDateTime,
	) -> Self {
		let iat = now.unix_timestamp();
		let exp = (now + MAX_TOKEN_LIFETIME).unix_timestamp();
		let mut claims = Map::new();

		claims.insert("iss".into(), Value::from(issuer));
		claims.insert("scope".into(), Value::from(scopes.normalized()));
		claims.insert("aud".into(), Value::from(audience.as_str()));
		claims.insert("iat".into(), Value::from(iat));
		claims.insert("exp".into(), Value::from(exp));

		for (key, value) in extra_claims {
			claims.insert(key.clone(), Value::from(value.as_str()));
		}

		Self { header: AssertionHeader::rs256(key_id), claims }
	}

	/// `base64url(header) "." base64url(claims)` without padding.
	pub fn signing_input(&self) -> Result<String, SigningError> {
		let header = serde_json::to_vec(&self.header).map_err(SigningError::new)?;
		let claims = serde_json::to_vec(&self.claims).map_err(SigningError::new)?;

		Ok(format!("{}.{}", URL_SAFE_NO_PAD.encode(header), URL_SAFE_NO_PAD.encode(claims)))
	}

	/// Signs the assertion and returns the compact JWT.
	pub fn sign(&self, signer: &dyn Signer) -> Result<String, SigningError> {
		let input = self.signing_input()?;
		let signature = signer.sign(input.as_bytes())?;

		Ok(format!("{input}.{}", URL_SAFE_NO_PAD.encode(signature)))
	}
}
