//! Optional observability hooks for credential operations.
//!
//! # Feature Flags
//!
//! - `tracing` wraps each operation in an `oauth2_service_account.operation` span carrying the
//!   `operation` and `stage` fields; refresh spans also record the token endpoint host
//!   (`endpoint`) and the granted lifetime (`lifetime_secs`).
//! - `metrics` increments `oauth2_service_account_operation_total`, labeled by `operation` and
//!   `outcome`, and records granted lifetimes in `oauth2_service_account_token_lifetime_seconds`.
//!
//! With both features off every helper compiles down to nothing.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Credential operations that emit telemetry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
	/// Cached-or-refreshed token lookup.
	AccessToken,
	/// Assertion signing plus token exchange.
	Refresh,
	/// Raw blob signing.
	SignBlob,
}
impl Operation {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Operation::AccessToken => "access_token",
			Operation::Refresh => "refresh",
			Operation::SignBlob => "sign_blob",
		}
	}
}
impl Display for Operation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
	/// Entry to the operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl Outcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Outcome::Attempt => "attempt",
			Outcome::Success => "success",
			Outcome::Failure => "failure",
		}
	}

	/// Maps a result onto its terminal outcome.
	pub fn of<T, E>(result: &std::result::Result<T, E>) -> Self {
		if result.is_ok() { Outcome::Success } else { Outcome::Failure }
	}
}
impl Display for Outcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
