//! JWT-bearer grant exchange against a token endpoint.
//!
//! [`TokenExchanger`] posts a signed assertion as
//! `grant_type=urn:ietf:params:oauth:grant-type:jwt-bearer&assertion=<jwt>` and turns the reply
//! into a [`TokenGrant`] or a [`TokenExchangeError`]. The HTTP stack is pluggable through
//! [`TokenHttpClient`]; transport failures are classified by a [`TransportErrorMapper`].

pub use oauth2;

// crates.io
use oauth2::{
	AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
	http::{
		Method, Request, StatusCode,
		header::{ACCEPT, CONTENT_TYPE, USER_AGENT},
	},
};
use url::form_urlencoded::Serializer;
// self
use crate::{
	_prelude::*,
	error::TokenExchangeError,
	http::{self, ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

/// Grant type URN for RFC 7523 JWT-bearer assertions.
pub const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Exchanger specialized for the crate's default reqwest transport stack.
#[cfg(feature = "reqwest")]
pub type ReqwestTokenExchanger = TokenExchanger<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Maps transport failures into [`TokenExchangeError`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport.
	fn map_transport_error(
		&self,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<E>,
	) -> TokenExchangeError;
}

/// Mapper that works for any transport by rendering the error message.
#[derive(Clone, Copy, Debug, Default)]
pub struct BasicTransportErrorMapper;
impl<E> TransportErrorMapper<E> for BasicTransportErrorMapper
where
	E: 'static + Send + Sync + StdError,
{
	fn map_transport_error(
		&self,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<E>,
	) -> TokenExchangeError {
		match err {
			HttpClientError::Http(inner) =>
				TokenExchangeError::InvalidRequest { reason: inner.to_string() },
			HttpClientError::Reqwest(inner) => transport(meta, inner),
			HttpClientError::Io(inner) => transport(meta, inner),
			HttpClientError::Other(message) => transport(meta, message),
			_ => transport(meta, "unknown HTTP client failure"),
		}
	}
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Copy, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> TokenExchangeError {
		match err {
			HttpClientError::Reqwest(inner) => {
				if inner.is_builder() {
					return TokenExchangeError::InvalidRequest { reason: inner.to_string() };
				}

				let status = meta
					.and_then(|meta| meta.status)
					.or_else(|| inner.status().map(|code| code.as_u16()));
				let reason = if inner.is_timeout() {
					"request timed out".to_owned()
				} else {
					inner.to_string()
				};

				TokenExchangeError::Transport { reason, status }
			},
			other => BasicTransportErrorMapper.map_transport_error(meta, other),
		}
	}
}

fn transport(meta: Option<&ResponseMetadata>, reason: impl Display) -> TokenExchangeError {
	TokenExchangeError::Transport {
		reason: reason.to_string(),
		status: meta.and_then(|meta| meta.status),
	}
}

/// Successful token endpoint reply.
#[derive(Clone, PartialEq)]
pub struct TokenGrant {
	/// Access token value.
	pub access_token: String,
	/// Lifetime in seconds; always positive.
	pub expires_in: i64,
	/// Token type reported by the endpoint, usually `Bearer`.
	pub token_type: Option<String>,
	/// Full JSON payload.
	pub raw: Value,
}
impl TokenGrant {
	/// Classifies an HTTP response from the token endpoint.
	///
	/// Non-2xx statuses become [`TokenExchangeError::Endpoint`]; a 2xx body that is not JSON or
	/// lacks `access_token` or a positive `expires_in` becomes
	/// [`TokenExchangeError::MalformedResponse`].
	pub fn from_response(
		response: &HttpResponse,
		retry_after: Option<Duration>,
	) -> Result<Self, TokenExchangeError> {
		let status = response.status();
		let body = String::from_utf8_lossy(response.body()).into_owned();

		if !status.is_success() {
			let retry_after = retry_after.or_else(|| http::parse_retry_after(response.headers()));

			return Err(TokenExchangeError::Endpoint {
				status: status.as_u16(),
				reason: endpoint_reason(status, &body),
				body,
				retry_after,
			});
		}

		let malformed = |reason: String| TokenExchangeError::MalformedResponse {
			status: status.as_u16(),
			reason,
			body: body.clone(),
		};
		let raw = serde_json::from_str::<Value>(&body)
			.map_err(|e| malformed(format!("body is not JSON ({e})")))?;
		let fields: GrantFields = serde_path_to_error::deserialize(&raw)
			.map_err(|e| malformed(format!("unexpected value at `{}` ({})", e.path(), e.inner())))?;
		let access_token = fields
			.access_token
			.filter(|token| !token.is_empty())
			.ok_or_else(|| malformed("missing `access_token`".into()))?;
		let expires_in = fields
			.expires_in
			.ok_or_else(|| malformed("missing `expires_in`".into()))?
			.seconds()
			.ok_or_else(|| malformed("`expires_in` is not an integer".into()))?;

		if expires_in <= 0 {
			return Err(malformed(format!("`expires_in` must be positive, got {expires_in}")));
		}

		Ok(Self { access_token, expires_in, token_type: fields.token_type, raw })
	}
}
impl Debug for TokenGrant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenGrant")
			.field("access_token", &"<redacted>")
			.field("expires_in", &self.expires_in)
			.field("token_type", &self.token_type)
			.finish_non_exhaustive()
	}
}

#[derive(Deserialize)]
struct GrantFields {
	#[serde(default)]
	access_token: Option<String>,
	#[serde(default)]
	expires_in: Option<ExpiresIn>,
	#[serde(default)]
	token_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExpiresIn {
	Seconds(i64),
	Text(String),
}
impl ExpiresIn {
	fn seconds(&self) -> Option<i64> {
		match self {
			Self::Seconds(secs) => Some(*secs),
			Self::Text(text) => text.trim().parse().ok(),
		}
	}
}

#[derive(Deserialize)]
struct OAuthErrorBody {
	error: String,
	#[serde(default)]
	error_description: Option<String>,
}

fn endpoint_reason(status: StatusCode, body: &str) -> String {
	match serde_json::from_str::<OAuthErrorBody>(body) {
		Ok(OAuthErrorBody { error, error_description: Some(description) }) =>
			format!("{error}: {description}"),
		Ok(OAuthErrorBody { error, error_description: None }) => error,
		Err(_) => match status.canonical_reason() {
			Some(reason) => format!("HTTP {} {reason}", status.as_u16()),
			None => format!("HTTP {}", status.as_u16()),
		},
	}
}

/// Performs JWT-bearer exchanges over a pluggable transport.
///
/// The exchanger holds no token state, so one instance can serve any number of credentials.
pub struct TokenExchanger<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	http_client: Arc<C>,
	transport_mapper: Arc<M>,
}
impl<C, M> TokenExchanger<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Builds an exchanger over a caller-supplied transport and error mapper.
	pub fn with_http_client(
		http_client: impl Into<Arc<C>>,
		transport_mapper: impl Into<Arc<M>>,
	) -> Self {
		Self { http_client: http_client.into(), transport_mapper: transport_mapper.into() }
	}

	/// Posts `assertion` to `token_uri` and parses the reply.
	pub async fn exchange(
		&self,
		token_uri: &Url,
		assertion: &str,
		user_agent: Option<&str>,
	) -> Result<TokenGrant, TokenExchangeError> {
		let request = build_request(token_uri, assertion, user_agent)?;
		let slot = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(slot.clone());
		let response = handle
			.call(request)
			.await
			.map_err(|err| self.transport_mapper.map_transport_error(slot.take().as_ref(), err))?;
		let retry_after = slot.take().and_then(|meta| meta.retry_after);

		TokenGrant::from_response(&response, retry_after)
	}
}
#[cfg(feature = "reqwest")]
impl ReqwestTokenExchanger {
	/// Builds an exchanger over a default reqwest client.
	pub fn new() -> Self {
		Self::with_reqwest_client(ReqwestClient::default())
	}

	/// Builds an exchanger over an existing reqwest client.
	pub fn with_reqwest_client(client: ReqwestClient) -> Self {
		Self::with_http_client(ReqwestHttpClient::with_client(client), ReqwestTransportErrorMapper)
	}
}
#[cfg(feature = "reqwest")]
impl Default for ReqwestTokenExchanger {
	fn default() -> Self {
		Self::new()
	}
}
impl<C, M> Clone for TokenExchanger<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			http_client: Arc::clone(&self.http_client),
			transport_mapper: Arc::clone(&self.transport_mapper),
		}
	}
}
impl<C, M> Debug for TokenExchanger<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("TokenExchanger(..)")
	}
}

/// Builds the form-encoded POST for a JWT-bearer exchange.
pub fn build_request(
	token_uri: &Url,
	assertion: &str,
	user_agent: Option<&str>,
) -> Result<HttpRequest, TokenExchangeError> {
	let body = Serializer::new(String::new())
		.append_pair("grant_type", JWT_BEARER_GRANT_TYPE)
		.append_pair("assertion", assertion)
		.finish();
	let mut builder = Request::builder()
		.method(Method::POST)
		.uri(token_uri.as_str())
		.header(CONTENT_TYPE, "application/x-www-form-urlencoded")
		.header(ACCEPT, "application/json");

	if let Some(agent) = user_agent {
		builder = builder.header(USER_AGENT, agent);
	}

	builder
		.body(body.into_bytes())
		.map_err(|e| TokenExchangeError::InvalidRequest { reason: e.to_string() })
}
