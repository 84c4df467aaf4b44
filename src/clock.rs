//! Time sources consulted by the credential state machine.
//!
//! Expiry is evaluated lazily against [`Clock::now`], so swapping in a [`FixedClock`] makes token
//! lifetimes fully deterministic in tests.

// self
use crate::_prelude::*;

/// Source of the current UTC instant.
pub trait Clock
where
	Self: Send + Sync + Debug,
{
	/// Returns the current instant.
	fn now(&self) -> OffsetDateTime;
}

/// Wall-clock time via [`OffsetDateTime::now_utc`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

/// Manually driven clock for tests and simulations.
#[derive(Debug)]
pub struct FixedClock(Mutex<OffsetDateTime>);
impl FixedClock {
	/// Creates a clock frozen at `instant`.
	pub fn new(instant: OffsetDateTime) -> Self {
		Self(Mutex::new(instant))
	}

	/// Moves the clock to `instant`.
	pub fn set(&self, instant: OffsetDateTime) {
		*self.0.lock() = instant;
	}

	/// Moves the clock forward by `delta`.
	pub fn advance(&self, delta: Duration) {
		*self.0.lock() += delta;
	}
}
impl Clock for FixedClock {
	fn now(&self) -> OffsetDateTime {
		*self.0.lock()
	}
}

/// Drops sub-second precision; token expiry is tracked in whole seconds.
pub(crate) fn truncate_to_second(instant: OffsetDateTime) -> OffsetDateTime {
	instant - Duration::nanoseconds(i64::from(instant.nanosecond()))
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn fixed_clock_moves_only_when_told() {
		let clock = FixedClock::new(macros::datetime!(1992-12-31 00:00:11 UTC));

		assert_eq!(clock.now(), macros::datetime!(1992-12-31 00:00:11 UTC));

		clock.advance(Duration::seconds(2));

		assert_eq!(clock.now(), macros::datetime!(1992-12-31 00:00:13 UTC));

		clock.set(macros::datetime!(2025-01-01 00:00 UTC));

		assert_eq!(clock.now(), macros::datetime!(2025-01-01 00:00 UTC));
	}

	#[test]
	fn truncation_keeps_whole_seconds() {
		let instant = macros::datetime!(2025-01-01 00:00:05.999 UTC);

		assert_eq!(truncate_to_second(instant), macros::datetime!(2025-01-01 00:00:05 UTC));
		assert!(SystemClock.now() > macros::datetime!(2025-01-01 00:00 UTC));
	}
}
