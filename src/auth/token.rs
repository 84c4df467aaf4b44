//! Cached token state and redacted secrets.

pub mod record;
pub mod secret;
