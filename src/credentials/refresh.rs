//! Single-flight token refresh.
//!
//! Callers first look at the cache under a read lock. On a miss they queue on the per-instance
//! async mutex; whoever holds it signs a fresh assertion and performs the exchange while the
//! others wait. Each concluded refresh bumps an epoch, so a waiter can tell that the refresh it
//! queued behind has finished and reuse its outcome (the new token, or the same failure) instead
//! of starting another exchange.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, CachedToken, TokenSecret},
	clock,
	credentials::{RefreshMetrics, ServiceAccountCredentials},
	error::{SigningError, TokenExchangeError},
	exchange::{TokenExchanger, TransportErrorMapper},
	http::TokenHttpClient,
	jwt::Assertion,
	obs::{self, Operation, OperationSpan, Outcome, trace_event},
};

#[derive(Debug, Default)]
pub(crate) struct TokenState {
	pub(crate) cached: Option<CachedToken>,
	epoch: u64,
	last_failure: Option<RefreshFailure>,
}

#[derive(Clone, Debug)]
enum RefreshFailure {
	Signing(SigningError),
	TokenExchange(TokenExchangeError),
	Cancelled,
}
impl From<SigningError> for RefreshFailure {
	fn from(e: SigningError) -> Self {
		Self::Signing(e)
	}
}
impl From<TokenExchangeError> for RefreshFailure {
	fn from(e: TokenExchangeError) -> Self {
		Self::TokenExchange(e)
	}
}
impl From<RefreshFailure> for Error {
	fn from(failure: RefreshFailure) -> Self {
		match failure {
			RefreshFailure::Signing(e) => e.into(),
			RefreshFailure::TokenExchange(e) => e.into(),
			RefreshFailure::Cancelled => Error::Cancelled,
		}
	}
}

/// Marks the refresh as cancelled unless it is concluded explicitly.
struct RefreshAttempt<'a> {
	state: &'a RwLock<TokenState>,
	metrics: &'a RefreshMetrics,
	armed: bool,
}
impl<'a> RefreshAttempt<'a> {
	fn start(state: &'a RwLock<TokenState>, metrics: &'a RefreshMetrics) -> Self {
		metrics.record_attempt();

		Self { state, metrics, armed: true }
	}

	fn conclude(mut self, outcome: &Result<CachedToken, RefreshFailure>) {
		self.armed = false;

		let mut state = self.state.write();

		state.epoch = state.epoch.wrapping_add(1);

		match outcome {
			Ok(cached) => {
				state.cached = Some(cached.clone());
				state.last_failure = None;

				self.metrics.record_success();
			},
			Err(failure) => {
				state.last_failure = Some(failure.clone());

				self.metrics.record_failure();
			},
		}
	}
}
impl Drop for RefreshAttempt<'_> {
	fn drop(&mut self) {
		if !self.armed {
			return;
		}

		let mut state = self.state.write();

		state.epoch = state.epoch.wrapping_add(1);
		state.last_failure = Some(RefreshFailure::Cancelled);

		self.metrics.record_cancelled();
	}
}

impl ServiceAccountCredentials {
	/// Returns the cached token while it is valid, otherwise refreshes it first.
	///
	/// Concurrent callers share one exchange: while a refresh is in flight the others wait for it
	/// and receive its result. A failed or cancelled refresh leaves the cache as it was and is
	/// reported to every caller that waited on it.
	pub async fn get_access_token<C, M>(
		&self,
		exchanger: &TokenExchanger<C, M>,
	) -> Result<AccessToken>
	where
		C: ?Sized + TokenHttpClient,
		M: ?Sized + TransportErrorMapper<C::TransportError>,
	{
		const OPERATION: Operation = Operation::AccessToken;

		let span = OperationSpan::new(OPERATION, "get_access_token");

		obs::record_outcome(OPERATION, Outcome::Attempt);

		let result = span
			.instrument(async move {
				let observed = match self.cached_access_token() {
					Ok(token) => return Ok(token),
					Err(epoch) => epoch,
				};

				self.refresh_single_flight(exchanger, Some(observed)).await
			})
			.await;

		obs::record_outcome(OPERATION, Outcome::of(&result));

		result
	}

	/// Signs a new assertion and exchanges it regardless of the cached token's validity.
	pub async fn refresh<C, M>(&self, exchanger: &TokenExchanger<C, M>) -> Result<AccessToken>
	where
		C: ?Sized + TokenHttpClient,
		M: ?Sized + TransportErrorMapper<C::TransportError>,
	{
		self.refresh_single_flight(exchanger, None).await
	}

	async fn refresh_single_flight<C, M>(
		&self,
		exchanger: &TokenExchanger<C, M>,
		observed: Option<u64>,
	) -> Result<AccessToken>
	where
		C: ?Sized + TokenHttpClient,
		M: ?Sized + TransportErrorMapper<C::TransportError>,
	{
		let _singleflight = self.refresh_lock.lock().await;

		if let Some(settled) = observed.and_then(|epoch| self.settled_since(epoch)) {
			return settled;
		}

		self.perform_refresh(exchanger).await
	}

	/// Valid cached token, or the current epoch when a refresh is needed.
	fn cached_access_token(&self) -> Result<AccessToken, u64> {
		let now = self.clock.now();
		let state = self.state.read();

		match state.cached.as_ref() {
			Some(cached) if !cached.is_expired_at(now) => {
				self.refresh_metrics.record_cache_hit();

				Ok(cached.access_token_at(now))
			},
			_ => Err(state.epoch),
		}
	}

	/// Outcome of a refresh that concluded after `epoch` was observed, if any.
	fn settled_since(&self, epoch: u64) -> Option<Result<AccessToken>> {
		let now = self.clock.now();
		let state = self.state.read();

		if let Some(cached) = state.cached.as_ref().filter(|cached| !cached.is_expired_at(now)) {
			self.refresh_metrics.record_cache_hit();

			return Some(Ok(cached.access_token_at(now)));
		}
		if state.epoch != epoch {
			return state.last_failure.clone().map(|failure| Err(failure.into()));
		}

		None
	}

	async fn perform_refresh<C, M>(&self, exchanger: &TokenExchanger<C, M>) -> Result<AccessToken>
	where
		C: ?Sized + TokenHttpClient,
		M: ?Sized + TransportErrorMapper<C::TransportError>,
	{
		const OPERATION: Operation = Operation::Refresh;

		let span =
			OperationSpan::new(OPERATION, "perform_refresh").with_endpoint(&self.endpoints.token);

		obs::record_outcome(OPERATION, Outcome::Attempt);

		let attempt = RefreshAttempt::start(&self.state, &self.refresh_metrics);
		let outcome = span.instrument(self.exchange_assertion(exchanger)).await;

		attempt.conclude(&outcome);
		obs::record_outcome(OPERATION, Outcome::of(&outcome));

		match outcome {
			Ok(cached) => {
				let lifetime = cached.expires_at - cached.issued_at;

				span.record_lifetime(lifetime);
				obs::record_token_lifetime(lifetime);
				trace_event!(expires_at = %cached.expires_at, "stored refreshed access token");

				Ok(cached.access_token_at(self.clock.now()))
			},
			Err(failure) => {
				trace_event!(error = ?failure, "access token refresh failed");

				Err(failure.into())
			},
		}
	}

	async fn exchange_assertion<C, M>(
		&self,
		exchanger: &TokenExchanger<C, M>,
	) -> Result<CachedToken, RefreshFailure>
	where
		C: ?Sized + TokenHttpClient,
		M: ?Sized + TransportErrorMapper<C::TransportError>,
	{
		let now = clock::truncate_to_second(self.clock.now());
		let jwt = Assertion::build(
			&self.service_account_email,
			&self.scopes,
			&self.endpoints.token,
			self.private_key_id.as_deref(),
			&self.extra_claims,
			now,
		)
		.sign(self.signer.as_ref())?;
		let grant =
			exchanger.exchange(&self.endpoints.token, &jwt, self.user_agent.as_deref()).await?;
		let expires_at = now.checked_add(Duration::seconds(grant.expires_in)).ok_or_else(|| {
			TokenExchangeError::MalformedResponse {
				status: 200,
				reason: format!("`expires_in` of {} seconds is out of range", grant.expires_in),
				body: grant.raw.to_string(),
			}
		})?;

		Ok(CachedToken {
			access_token: TokenSecret::new(grant.access_token),
			issued_at: now,
			expires_at,
			response: grant.raw,
		})
	}
}
