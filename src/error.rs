//! Credential-level error types shared by loaders, signers, and the refresh state machine.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Key file, key material, or construction problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// The signer could not produce a signature.
	#[error(transparent)]
	Signing(#[from] SigningError),
	/// The token endpoint exchange failed.
	#[error(transparent)]
	TokenExchange(#[from] TokenExchangeError),
	/// The in-flight refresh was dropped before it completed.
	#[error("Token refresh was cancelled before it completed.")]
	Cancelled,
}
impl From<crate::auth::ScopeValidationError> for Error {
	fn from(e: crate::auth::ScopeValidationError) -> Self {
		ConfigError::from(e).into()
	}
}

/// Construction and loading failures; none of these are retried.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// A required key is absent from a serialized key file.
	#[error("Key file is missing the `{field}` field.")]
	MissingField {
		/// Name of the absent key.
		field: &'static str,
	},
	/// The `type` (or `_class`) discriminator does not match.
	#[error("Unexpected credentials type {}, expected `{expected}`.", display_got(.got))]
	InvalidCredentialType {
		/// Discriminator found in the payload, if any.
		got: Option<String>,
		/// Discriminator this loader accepts.
		expected: &'static str,
	},
	/// The active signer backend cannot load the requested key format.
	#[error("Signer backend `{backend}` does not support {format} key material.")]
	UnsupportedKeyFormat {
		/// Key format label.
		format: &'static str,
		/// Signer backend label.
		backend: &'static str,
	},
	/// Key material was rejected by the signer backend.
	#[error("Invalid {format} key material.")]
	InvalidKey {
		/// Key format label.
		format: &'static str,
		/// Underlying decoding failure.
		#[source]
		source: BoxError,
	},
	/// Key file or serialized credential contains a value of the wrong shape.
	#[error("Serialized credential is malformed.")]
	MalformedKeyFile {
		/// Structured parsing failure, including the JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Token or revocation URI cannot be parsed.
	#[error("The `{field}` value is not a valid URI.")]
	InvalidUri {
		/// Field holding the URI.
		field: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Scope list cannot be built.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Reading key material failed.
	#[error("Failed to read key material.")]
	Io(#[from] std::io::Error),
	/// Credential state could not be encoded or decoded as JSON.
	#[error("Failed to encode or decode credential JSON.")]
	Serialization(#[from] serde_json::Error),
}
impl ConfigError {
	/// Wraps a backend-specific key decoding failure.
	pub fn invalid_key(
		format: &'static str,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::InvalidKey { format, source: Box::new(src) }
	}
}

/// Signing failure reported by a [`Signer`](crate::crypt::Signer).
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Failed to sign payload: {message}.")]
pub struct SigningError {
	/// Backend-supplied description.
	pub message: String,
}
impl SigningError {
	/// Creates a signing error from any displayable cause.
	pub fn new(message: impl Display) -> Self {
		Self { message: message.to_string() }
	}
}

/// Token endpoint failures; the raw body is kept for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum TokenExchangeError {
	/// The endpoint answered with a non-success status.
	#[error("Token endpoint rejected the assertion ({status}): {reason}.")]
	Endpoint {
		/// HTTP status code.
		status: u16,
		/// OAuth `error[: error_description]`, or a status summary.
		reason: String,
		/// Raw response body.
		body: String,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// The endpoint answered with success but the body is unusable.
	#[error("Token endpoint returned a malformed response: {reason}.")]
	MalformedResponse {
		/// HTTP status code.
		status: u16,
		/// Description of what was wrong.
		reason: String,
		/// Raw response body.
		body: String,
	},
	/// The transport failed before a response was available.
	#[error("Transport error occurred while calling the token endpoint: {reason}.")]
	Transport {
		/// Transport-supplied description.
		reason: String,
		/// HTTP status code, when the transport observed one.
		status: Option<u16>,
	},
	/// The exchange request could not be constructed.
	#[error("Token request could not be built: {reason}.")]
	InvalidRequest {
		/// Builder-supplied description.
		reason: String,
	},
}
impl TokenExchangeError {
	/// HTTP status associated with the failure, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Endpoint { status, .. } | Self::MalformedResponse { status, .. } => Some(*status),
			Self::Transport { status, .. } => *status,
			Self::InvalidRequest { .. } => None,
		}
	}

	/// Raw response body, when the endpoint produced one.
	pub fn body(&self) -> Option<&str> {
		match self {
			Self::Endpoint { body, .. } | Self::MalformedResponse { body, .. } => Some(body),
			Self::Transport { .. } | Self::InvalidRequest { .. } => None,
		}
	}
}

fn display_got(got: &Option<String>) -> String {
	match got {
		Some(value) => format!("`{value}`"),
		None => "<missing>".into(),
	}
}
