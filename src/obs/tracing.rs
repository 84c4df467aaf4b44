// self
use crate::{_prelude::*, obs::Operation};

/// Instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type Instrumented<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type Instrumented<F> = F;

/// Span wrapper used around credential operations.
///
/// Every span declares `endpoint` (token endpoint host) and `lifetime_secs` (lifetime granted by
/// the last exchange); refreshes fill them in as they learn them.
#[derive(Clone, Debug)]
pub struct OperationSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OperationSpan {
	/// Creates a span tagged with the operation and call-site stage.
	pub fn new(operation: Operation, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"oauth2_service_account.operation",
				operation = operation.as_str(),
				stage,
				endpoint = tracing::field::Empty,
				lifetime_secs = tracing::field::Empty,
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (operation, stage);

			Self {}
		}
	}

	/// Tags the span with the host of the token endpoint being called.
	pub fn with_endpoint(self, endpoint: &Url) -> Self {
		#[cfg(feature = "tracing")]
		if let Some(host) = endpoint.host_str() {
			self.span.record("endpoint", host);
		}
		#[cfg(not(feature = "tracing"))]
		let _ = endpoint;

		self
	}

	/// Records the lifetime the token endpoint granted.
	pub fn record_lifetime(&self, lifetime: Duration) {
		#[cfg(feature = "tracing")]
		{
			self.span.record("lifetime_secs", lifetime.whole_seconds());
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = lifetime;
		}
	}

	/// Enters the span for synchronous sections.
	pub fn entered(self) -> OperationSpanGuard {
		#[cfg(feature = "tracing")]
		{
			OperationSpanGuard { guard: self.span.entered() }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = self;

			OperationSpanGuard {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> Instrumented<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// RAII guard returned by [`OperationSpan::entered`].
pub struct OperationSpanGuard {
	#[cfg(feature = "tracing")]
	#[allow(dead_code)]
	guard: tracing::span::EnteredSpan,
}
impl Debug for OperationSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("OperationSpanGuard(..)")
	}
}

/// Emits a debug event inside the current span (when enabled).
macro_rules! trace_event {
	($($arg:tt)*) => {
		#[cfg(feature = "tracing")]
		{
			::tracing::debug!($($arg)*);
		}
	};
}
pub(crate) use trace_event;
