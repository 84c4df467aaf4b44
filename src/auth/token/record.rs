//! Cached access-token state and the value handed back to callers.

// self
use crate::{_prelude::*, auth::token::secret::TokenSecret};

/// Lifecycle status of a cached token at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// Token is currently valid.
	Active,
	/// Token reached its expiry instant.
	Expired,
}

/// Token minted by the last successful exchange.
///
/// The access token, its expiry, and the raw endpoint payload only ever change together, so the
/// credential stores them as one value and swaps it atomically.
#[derive(Clone, Serialize, Deserialize)]
pub struct CachedToken {
	/// Bearer token; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Instant the exchange started.
	pub issued_at: OffsetDateTime,
	/// Instant after which the token must be treated as expired.
	pub expires_at: OffsetDateTime,
	/// Raw token endpoint payload, kept verbatim for inspection.
	pub response: Value,
}
impl CachedToken {
	/// Computes the lifecycle status at a given instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> TokenStatus {
		if instant >= self.expires_at { TokenStatus::Expired } else { TokenStatus::Active }
	}

	/// Returns `true` if the token has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant), TokenStatus::Expired)
	}

	/// Whole seconds left before expiry, clamped at zero.
	pub fn expires_in_at(&self, instant: OffsetDateTime) -> i64 {
		(self.expires_at - instant).whole_seconds().max(0)
	}

	/// Snapshot handed to callers at `instant`.
	pub fn access_token_at(&self, instant: OffsetDateTime) -> AccessToken {
		AccessToken {
			access_token: self.access_token.clone(),
			expires_in: self.expires_in_at(instant),
		}
	}
}
impl Debug for CachedToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CachedToken")
			.field("access_token", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish_non_exhaustive()
	}
}

/// Access token plus its remaining lifetime in seconds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessToken {
	/// Bearer token value.
	pub access_token: TokenSecret,
	/// Seconds until expiry at the moment the token was handed out.
	pub expires_in: i64,
}
