//! Service-account credential: identity, key material, and the cached access token.
//!
//! A [`ServiceAccountCredentials`] value is built once (from a key file, a PKCS#12 container, or
//! an explicit [`Signer`]) and then shared across tasks. Identity fields never change after
//! construction; only the token cache moves, and only through the single-flight refresh.
//! Derivation (`create_scoped`, `create_delegated`, `create_with_claims`) returns a
//! new credential that shares the signer and clock but starts with an empty cache.

mod keyfile;
mod metrics;
mod refresh;
mod serialize;

pub use keyfile::*;
pub use metrics::RefreshMetrics;
pub use serialize::*;

// self
use crate::{
	_prelude::*,
	auth::{CachedToken, ScopeList, TokenSecret},
	clock::{Clock, SystemClock},
	crypt::Signer,
	error::ConfigError,
	jwt::{ExtraClaims, SUBJECT_CLAIM},
	obs::{self, Operation, OperationSpan, Outcome},
};

/// Standard Google token endpoint.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
/// Standard Google revocation endpoint.
pub const DEFAULT_REVOKE_URI: &str = "https://oauth2.googleapis.com/revoke";

/// Token and revocation endpoints used by a credential.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenEndpoints {
	/// Token endpoint; also the `aud` claim of every assertion.
	pub token: Url,
	/// Revocation endpoint, carried for serialization.
	pub revocation: Url,
}
impl TokenEndpoints {
	/// Parses both endpoints, reporting which one was invalid.
	pub fn parse(token: &str, revocation: &str) -> Result<Self> {
		Ok(Self {
			token: parse_uri("token_uri", token)?,
			revocation: parse_uri("revoke_uri", revocation)?,
		})
	}
}
impl Default for TokenEndpoints {
	fn default() -> Self {
		Self {
			token: Url::parse(DEFAULT_TOKEN_URI).expect("Default token URI is a valid URL."),
			revocation: Url::parse(DEFAULT_REVOKE_URI).expect("Default revoke URI is a valid URL."),
		}
	}
}

fn parse_uri(field: &'static str, raw: &str) -> Result<Url> {
	Url::parse(raw).map_err(|source| ConfigError::InvalidUri { field, source }.into())
}

/// Key material a credential's signer was built from.
///
/// Retained so a serialized credential can rebuild its signer.
#[derive(Clone, PartialEq, Eq)]
pub enum KeyMaterial {
	/// PKCS#8 PEM text from a key file.
	Pkcs8Pem(String),
	/// PKCS#12 container bytes and the password that opens them.
	Pkcs12 {
		/// DER-encoded container.
		der: Vec<u8>,
		/// Container password.
		password: String,
	},
	/// Signer supplied directly; nothing to serialize.
	External,
}
impl Debug for KeyMaterial {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Pkcs8Pem(_) => f.write_str("Pkcs8Pem(<redacted>)"),
			Self::Pkcs12 { der, .. } =>
				f.debug_struct("Pkcs12").field("len", &der.len()).finish_non_exhaustive(),
			Self::External => f.write_str("External"),
		}
	}
}

/// Service-account credential that mints and caches bearer tokens.
pub struct ServiceAccountCredentials {
	service_account_email: String,
	signer: Arc<dyn Signer>,
	key_material: KeyMaterial,
	private_key_id: Option<String>,
	client_id: Option<String>,
	scopes: ScopeList,
	endpoints: TokenEndpoints,
	user_agent: Option<String>,
	extra_claims: ExtraClaims,
	clock: Arc<dyn Clock>,
	state: RwLock<refresh::TokenState>,
	refresh_lock: AsyncMutex<()>,
	refresh_metrics: Arc<RefreshMetrics>,
}
impl ServiceAccountCredentials {
	/// Creates a credential around an already built signer.
	pub fn new(service_account_email: impl Into<String>, signer: Arc<dyn Signer>) -> Self {
		Self {
			service_account_email: service_account_email.into(),
			signer,
			key_material: KeyMaterial::External,
			private_key_id: None,
			client_id: None,
			scopes: ScopeList::default(),
			endpoints: TokenEndpoints::default(),
			user_agent: None,
			extra_claims: ExtraClaims::new(),
			clock: Arc::new(SystemClock),
			state: RwLock::default(),
			refresh_lock: AsyncMutex::new(()),
			refresh_metrics: Default::default(),
		}
	}

	/// Replaces the requested scopes.
	pub fn with_scopes(mut self, scopes: ScopeList) -> Self {
		self.scopes = scopes;

		self
	}

	/// Sets the key identifier reported in the JWT header and by [`sign_blob`](Self::sign_blob).
	pub fn with_private_key_id(mut self, private_key_id: impl Into<String>) -> Self {
		self.private_key_id = Some(private_key_id.into());

		self
	}

	/// Sets the informational OAuth client id.
	pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
		self.client_id = Some(client_id.into());

		self
	}

	/// Merges claims over the existing extra claims.
	pub fn with_claims(mut self, claims: ExtraClaims) -> Self {
		self.extra_claims.extend(claims);

		self
	}

	/// Replaces both endpoints.
	pub fn with_endpoints(mut self, endpoints: TokenEndpoints) -> Self {
		self.endpoints = endpoints;

		self
	}

	/// Overrides the token endpoint.
	pub fn with_token_uri(mut self, token_uri: Url) -> Self {
		self.endpoints.token = token_uri;

		self
	}

	/// Overrides the revocation endpoint.
	pub fn with_revoke_uri(mut self, revoke_uri: Url) -> Self {
		self.endpoints.revocation = revoke_uri;

		self
	}

	/// Sets the `User-Agent` sent with token exchanges.
	pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = Some(user_agent.into());

		self
	}

	/// Swaps the time source.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	pub(crate) fn with_key_material(mut self, key_material: KeyMaterial) -> Self {
		self.key_material = key_material;

		self
	}

	/// Service account email; the `iss` claim.
	pub fn service_account_email(&self) -> &str {
		&self.service_account_email
	}

	/// Key identifier, absent for PKCS#12-backed credentials.
	pub fn private_key_id(&self) -> Option<&str> {
		self.private_key_id.as_deref()
	}

	/// OAuth client id, when known.
	pub fn client_id(&self) -> Option<&str> {
		self.client_id.as_deref()
	}

	/// Requested scopes in insertion order.
	pub fn scopes(&self) -> &ScopeList {
		&self.scopes
	}

	/// Token and revocation endpoints.
	pub fn endpoints(&self) -> &TokenEndpoints {
		&self.endpoints
	}

	/// Configured `User-Agent`, if any.
	pub fn user_agent(&self) -> Option<&str> {
		self.user_agent.as_deref()
	}

	/// Claims merged into every assertion.
	pub fn extra_claims(&self) -> &ExtraClaims {
		&self.extra_claims
	}

	/// Key material the signer was built from.
	pub fn key_material(&self) -> &KeyMaterial {
		&self.key_material
	}

	/// Shared signer.
	pub fn signer(&self) -> &Arc<dyn Signer> {
		&self.signer
	}

	/// Per-instance lifecycle counters.
	pub fn refresh_metrics(&self) -> &Arc<RefreshMetrics> {
		&self.refresh_metrics
	}

	/// Cached access token, valid or not.
	pub fn access_token(&self) -> Option<TokenSecret> {
		self.state.read().cached.as_ref().map(|token| token.access_token.clone())
	}

	/// Instant after which the cached token is expired.
	pub fn token_expiry(&self) -> Option<OffsetDateTime> {
		self.state.read().cached.as_ref().map(|token| token.expires_at)
	}

	/// Raw payload of the last successful exchange.
	pub fn token_response(&self) -> Option<Value> {
		self.state.read().cached.as_ref().map(|token| token.response.clone())
	}

	/// Returns `true` when no token is cached or the cached one has reached its expiry.
	pub fn access_token_expired(&self) -> bool {
		let now = self.clock.now();

		self.state.read().cached.as_ref().is_none_or(|token| token.is_expired_at(now))
	}

	/// Returns `true` when the credential has no scopes and must be scoped before use.
	pub fn create_scoped_required(&self) -> bool {
		self.scopes.is_empty()
	}

	/// Returns a clone requesting `scopes`; the source is left untouched.
	pub fn create_scoped(&self, scopes: ScopeList) -> Self {
		let mut derived = self.derive();

		derived.scopes = scopes;

		derived
	}

	/// Returns a clone acting on behalf of `subject`, replacing any previous `sub` claim.
	pub fn create_delegated(&self, subject: impl Into<String>) -> Self {
		let mut derived = self.derive();

		derived.extra_claims.insert(SUBJECT_CLAIM.into(), subject.into());

		derived
	}

	/// Returns a clone with `claims` merged over the existing extra claims.
	pub fn create_with_claims(&self, claims: ExtraClaims) -> Self {
		self.derive().with_claims(claims)
	}

	/// Signs arbitrary bytes with the credential's key; independent of the token cache.
	pub fn sign_blob(&self, blob: &[u8]) -> Result<(Option<&str>, Vec<u8>)> {
		const OPERATION: Operation = Operation::SignBlob;

		let _span = OperationSpan::new(OPERATION, "sign_blob").entered();

		obs::record_outcome(OPERATION, Outcome::Attempt);

		let result = self.signer.sign(blob).map_err(Error::from);

		obs::record_outcome(OPERATION, Outcome::of(&result));

		Ok((self.private_key_id.as_deref(), result?))
	}

	pub(crate) fn restore_cached(&self, cached: CachedToken) {
		self.state.write().cached = Some(cached);
	}

	pub(crate) fn cached(&self) -> Option<CachedToken> {
		self.state.read().cached.clone()
	}

	fn derive(&self) -> Self {
		Self {
			service_account_email: self.service_account_email.clone(),
			signer: Arc::clone(&self.signer),
			key_material: self.key_material.clone(),
			private_key_id: self.private_key_id.clone(),
			client_id: self.client_id.clone(),
			scopes: self.scopes.clone(),
			endpoints: self.endpoints.clone(),
			user_agent: self.user_agent.clone(),
			extra_claims: self.extra_claims.clone(),
			clock: Arc::clone(&self.clock),
			state: RwLock::default(),
			refresh_lock: AsyncMutex::new(()),
			refresh_metrics: Default::default(),
		}
	}
}
impl Debug for ServiceAccountCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceAccountCredentials")
			.field("service_account_email", &self.service_account_email)
			.field("private_key_id", &self.private_key_id)
			.field("client_id", &self.client_id)
			.field("scopes", &self.scopes)
			.field("endpoints", &self.endpoints)
			.field("user_agent", &self.user_agent)
			.field("extra_claims", &self.extra_claims)
			.field("key_material", &self.key_material)
			.field("cached", &self.state.read().cached)
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::{clock::FixedClock, error::SigningError};

	#[derive(Debug)]
	struct StaticSigner;
	impl Signer for StaticSigner {
		fn sign(&self, _: &[u8]) -> Result<Vec<u8>, SigningError> {
			Ok(b"signed-content".to_vec())
		}
	}

	fn credentials() -> ServiceAccountCredentials {
		ServiceAccountCredentials::new("dummy@google.com", Arc::new(StaticSigner))
			.with_private_key_id("ABCDEF")
			.with_client_id("123")
	}

	#[test]
	fn defaults_point_at_google_endpoints() {
		let creds = credentials();

		assert_eq!(creds.endpoints().token.as_str(), DEFAULT_TOKEN_URI);
		assert_eq!(creds.endpoints().revocation.as_str(), DEFAULT_REVOKE_URI);
		assert_eq!(creds.service_account_email(), "dummy@google.com");
		assert!(creds.access_token().is_none());
		assert!(creds.token_expiry().is_none());
		assert!(creds.access_token_expired(), "An empty cache counts as expired.");
	}

	#[test]
	fn endpoint_parsing_names_the_bad_field() {
		let endpoints = TokenEndpoints::parse("https://example.com/token", DEFAULT_REVOKE_URI)
			.expect("Both endpoints should parse.");

		assert_eq!(endpoints.token.as_str(), "https://example.com/token");
		assert_eq!(credentials().with_endpoints(endpoints.clone()).endpoints(), &endpoints);
		assert!(matches!(
			TokenEndpoints::parse("not a url", DEFAULT_REVOKE_URI),
			Err(Error::Config(ConfigError::InvalidUri { field: "token_uri", .. }))
		));
		assert!(matches!(
			TokenEndpoints::parse(DEFAULT_TOKEN_URI, "::"),
			Err(Error::Config(ConfigError::InvalidUri { field: "revoke_uri", .. }))
		));
	}

	#[test]
	fn scoped_required_tracks_scope_emptiness() {
		let creds = credentials();

		assert!(creds.create_scoped_required());

		let scoped = creds
			.create_scoped(ScopeList::new(["dummy_scope"]).expect("Scope fixture should be valid."));

		assert!(!scoped.create_scoped_required());
		assert_eq!(scoped.scopes().normalized(), "dummy_scope");
		assert!(creds.create_scoped_required(), "The source must not change.");
	}

	#[test]
	fn delegation_replaces_only_the_subject() {
		let creds = credentials().with_claims(ExtraClaims::from([
			("sub".to_owned(), "first@example.com".to_owned()),
			("hd".to_owned(), "example.com".to_owned()),
		]));
		let delegated = creds.create_delegated("second@example.com");

		assert_eq!(delegated.extra_claims()["sub"], "second@example.com");
		assert_eq!(delegated.extra_claims()["hd"], "example.com");
		assert_eq!(creds.extra_claims()["sub"], "first@example.com");

		let widened = creds.create_with_claims(ExtraClaims::from([(
			"prn".to_owned(),
			"third@example.com".to_owned(),
		)]));

		assert_eq!(widened.extra_claims().len(), 3);
		assert_eq!(creds.extra_claims().len(), 2);
	}

	#[test]
	fn derived_clones_start_with_an_empty_cache() {
		let clock = Arc::new(FixedClock::new(macros::datetime!(1992-12-31 00:00:11 UTC)));
		let creds = credentials().with_clock(clock.clone());

		creds.restore_cached(CachedToken {
			access_token: TokenSecret::new("first_token"),
			issued_at: clock.now(),
			expires_at: clock.now() + Duration::seconds(2),
			response: serde_json::json!({ "access_token": "first_token", "expires_in": 2 }),
		});

		assert!(!creds.access_token_expired());

		let scoped = creds.create_scoped(ScopeList::default());

		assert!(scoped.access_token().is_none());
		assert!(Arc::ptr_eq(scoped.signer(), creds.signer()));
		assert!(!Arc::ptr_eq(scoped.refresh_metrics(), creds.refresh_metrics()));
		assert_eq!(
			creds.access_token().map(|token| token.expose().to_owned()),
			Some("first_token".into())
		);

		clock.advance(Duration::seconds(2));

		assert!(creds.access_token_expired());
	}

	#[test]
	fn sign_blob_reports_key_id() {
		let creds = credentials();
		let (key_id, signature) = creds.sign_blob(b"Google").expect("Static signer never fails.");

		assert_eq!(key_id, Some("ABCDEF"));
		assert_eq!(signature, b"signed-content");
	}

	#[test]
	fn debug_hides_key_material() {
		let creds = credentials().with_key_material(KeyMaterial::Pkcs8Pem("-----BEGIN".into()));
		let rendered = format!("{creds:?}");

		assert!(rendered.contains("Pkcs8Pem(<redacted>)"));
		assert!(!rendered.contains("-----BEGIN"));
	}
}
