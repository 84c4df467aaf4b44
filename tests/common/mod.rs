//! Shared fixtures for integration tests: a scripted transport, a counting signer, and key data.

#![allow(dead_code)]

// std
use std::{
	collections::VecDeque,
	future::Future,
	io,
	pin::Pin,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration as StdDuration,
};
// crates.io
use parking_lot::Mutex;
use serde_json::Value;
use time::{Duration, OffsetDateTime};
// self
use oauth2_service_account::{
	clock::FixedClock,
	crypt::{KeyFormat, RsaSigner, RsaSignerBackend, Signer, SignerBackend},
	error::{ConfigError, SigningError},
	exchange::{
		BasicTransportErrorMapper, TokenExchanger,
		oauth2::{
			AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
			http::{HeaderMap, StatusCode},
		},
	},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
};

pub const PRIVATE_KEY_PEM: &str = include_str!("../data/privatekey.pem");
pub const PUBLIC_KEY_PEM: &str = include_str!("../data/publickey.pem");
pub const PRIVATE_KEY_P12: &[u8] = include_bytes!("../data/privatekey.p12");
pub const KEYFILE_JSON: &str = include_str!("../data/service_account.json");

pub type ScriptedExchanger = TokenExchanger<ScriptedTransport, BasicTransportErrorMapper>;

pub fn keyfile() -> Value {
	serde_json::from_str(KEYFILE_JSON).expect("Key file fixture should be valid JSON.")
}

pub fn data_path(name: &str) -> String {
	format!("{}/tests/data/{name}", env!("CARGO_MANIFEST_DIR"))
}

pub fn fixed_clock(now: OffsetDateTime) -> Arc<FixedClock> {
	Arc::new(FixedClock::new(now))
}

/// One scripted reply of the fake token endpoint.
#[derive(Clone, Debug)]
pub enum Reply {
	/// Responds with `status` and a JSON body.
	Json(u16, Value),
	/// Responds with `status` and a raw body.
	Raw(u16, String),
	/// Waits before producing the inner reply.
	Delayed(StdDuration, Box<Reply>),
	/// Advances the clock before producing the inner reply, like a slow endpoint.
	Tick(Arc<FixedClock>, Duration, Box<Reply>),
	/// Never resolves.
	Pending,
	/// Fails at the transport layer.
	Fail(String),
}
impl Reply {
	pub fn token(access_token: &str, expires_in: i64) -> Self {
		Self::Json(200, serde_json::json!({ "access_token": access_token, "expires_in": expires_in }))
	}
}

/// Parts of a request seen by the scripted transport.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
	pub method: String,
	pub uri: String,
	pub headers: HeaderMap,
	pub body: Vec<u8>,
}
impl RecordedRequest {
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).and_then(|value| value.to_str().ok())
	}

	pub fn form(&self) -> Vec<(String, String)> {
		url::form_urlencoded::parse(&self.body).into_owned().collect()
	}
}

#[derive(Default)]
struct ScriptState {
	replies: Mutex<VecDeque<Reply>>,
	requests: Mutex<Vec<RecordedRequest>>,
	calls: AtomicUsize,
}

/// [`TokenHttpClient`] that replays a fixed sequence of replies and records every request.
#[derive(Clone, Default)]
pub struct ScriptedTransport(Arc<ScriptState>);
impl ScriptedTransport {
	pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
		let transport = Self::default();

		transport.0.replies.lock().extend(replies);

		transport
	}

	pub fn exchanger(&self) -> ScriptedExchanger {
		TokenExchanger::with_http_client(self.clone(), BasicTransportErrorMapper)
	}

	pub fn calls(&self) -> usize {
		self.0.calls.load(Ordering::SeqCst)
	}

	pub fn requests(&self) -> Vec<RecordedRequest> {
		self.0.requests.lock().clone()
	}
}
impl TokenHttpClient for ScriptedTransport {
	type Handle = ScriptedHandle;
	type TransportError = io::Error;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		ScriptedHandle { state: Arc::clone(&self.0), slot }
	}
}

pub struct ScriptedHandle {
	state: Arc<ScriptState>,
	slot: ResponseMetadataSlot,
}
impl<'c> AsyncHttpClient<'c> for ScriptedHandle {
	type Error = HttpClientError<io::Error>;
	type Future = Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		Box::pin(async move {
			self.slot.take();
			self.state.calls.fetch_add(1, Ordering::SeqCst);
			self.state.requests.lock().push(RecordedRequest {
				method: request.method().to_string(),
				uri: request.uri().to_string(),
				headers: request.headers().clone(),
				body: request.body().clone(),
			});

			let reply = self
				.state
				.replies
				.lock()
				.pop_front()
				.expect("Transport should not be called more often than scripted.");

			respond(&self.slot, reply).await
		})
	}
}

fn respond(
	slot: &ResponseMetadataSlot,
	reply: Reply,
) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpClientError<io::Error>>> + Send + '_>> {
	Box::pin(async move {
		match reply {
			Reply::Json(status, body) => Ok(response(slot, status, body.to_string())),
			Reply::Raw(status, body) => Ok(response(slot, status, body)),
			Reply::Delayed(delay, inner) => {
				tokio::time::sleep(delay).await;

				respond(slot, *inner).await
			},
			Reply::Tick(clock, elapsed, inner) => {
				clock.advance(elapsed);

				respond(slot, *inner).await
			},
			Reply::Pending => std::future::pending().await,
			Reply::Fail(reason) => Err(HttpClientError::Io(io::Error::other(reason))),
		}
	})
}

fn response(slot: &ResponseMetadataSlot, status: u16, body: String) -> HttpResponse {
	let mut response = HttpResponse::new(body.into_bytes());

	*response.status_mut() = StatusCode::from_u16(status).expect("Scripted status should be valid.");

	slot.store(ResponseMetadata { status: Some(status), retry_after: None });

	response
}

/// Signer wrapper counting how many signatures were produced.
#[derive(Debug)]
pub struct CountingSigner {
	inner: Arc<dyn Signer>,
	calls: AtomicUsize,
}
impl CountingSigner {
	pub fn new(inner: Arc<dyn Signer>) -> Arc<Self> {
		Arc::new(Self { inner, calls: AtomicUsize::new(0) })
	}

	pub fn rsa() -> Arc<Self> {
		Self::new(Arc::new(RsaSigner::from_pem(PRIVATE_KEY_PEM).expect("Fixture key should parse.")))
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl Signer for CountingSigner {
	fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SigningError> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		self.inner.sign(message)
	}
}

/// Signer that always fails.
#[derive(Debug)]
pub struct BrokenSigner;
impl Signer for BrokenSigner {
	fn sign(&self, _: &[u8]) -> Result<Vec<u8>, SigningError> {
		Err(SigningError::new("backend unavailable"))
	}
}

/// Backend recording the key material it receives; PKCS#12 support is opt-in and decodes through
/// [`RsaSignerBackend`].
#[derive(Default)]
pub struct RecordingBackend {
	pub pkcs12: bool,
	pub pem_calls: Mutex<Vec<String>>,
	pub pkcs12_calls: Mutex<Vec<(Vec<u8>, String)>>,
}
impl RecordingBackend {
	pub fn with_pkcs12() -> Self {
		Self { pkcs12: true, ..Default::default() }
	}
}
impl SignerBackend for RecordingBackend {
	fn name(&self) -> &'static str {
		"recording"
	}

	fn from_pkcs8_pem(&self, pem: &str) -> Result<Arc<dyn Signer>, ConfigError> {
		self.pem_calls.lock().push(pem.to_owned());

		Ok(Arc::new(RsaSigner::from_pem(pem)?))
	}

	fn supports(&self, format: KeyFormat) -> bool {
		matches!(format, KeyFormat::Pkcs8Pem) || self.pkcs12
	}

	fn from_pkcs12(&self, der: &[u8], password: &str) -> Result<Arc<dyn Signer>, ConfigError> {
		if !self.pkcs12 {
			return Err(ConfigError::UnsupportedKeyFormat {
				format: KeyFormat::Pkcs12.as_str(),
				backend: self.name(),
			});
		}

		self.pkcs12_calls.lock().push((der.to_vec(), password.to_owned()));

		RsaSignerBackend.from_pkcs12(der, password)
	}
}
