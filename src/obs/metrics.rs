// self
use crate::{
	_prelude::*,
	obs::{Operation, Outcome},
};

/// Records an operation outcome via the global metrics recorder (when enabled).
pub fn record_outcome(operation: Operation, outcome: Outcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oauth2_service_account_operation_total",
			"operation" => operation.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (operation, outcome);
	}
}

/// Records the lifetime granted by a successful exchange (when enabled).
pub fn record_token_lifetime(lifetime: Duration) {
	#[cfg(feature = "metrics")]
	{
		metrics::histogram!("oauth2_service_account_token_lifetime_seconds")
			.record(lifetime.as_seconds_f64());
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = lifetime;
	}
}
