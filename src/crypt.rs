//! Signing capability contracts and the bundled RSA implementation.
//!
//! A [`Signer`] owns exactly one private key and never exposes it; credentials only ever ask it
//! to sign bytes. A [`SignerBackend`] turns key material into signers. Backends opt into each
//! key format, so a backend that cannot read PKCS#12 containers reports
//! [`ConfigError::UnsupportedKeyFormat`] instead of a decoding failure.

mod rsa_signer;

pub use rsa_signer::*;

// self
use crate::{
	_prelude::*,
	error::{ConfigError, SigningError},
};

/// Password Google applies to downloaded PKCS#12 service-account keys.
pub const DEFAULT_PKCS12_PASSWORD: &str = "notasecret";

/// Key material formats a backend may accept.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyFormat {
	/// PEM text holding a PKCS#8 (or PKCS#1) RSA private key.
	Pkcs8Pem,
	/// DER-encoded PKCS#12 container protected by a password.
	Pkcs12,
}
impl KeyFormat {
	/// Returns a stable label suitable for errors and logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			KeyFormat::Pkcs8Pem => "PKCS#8 PEM",
			KeyFormat::Pkcs12 => "PKCS#12",
		}
	}
}
impl Display for KeyFormat {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Opaque signing service bound to one private key.
///
/// Implementations must be deterministic for RS256 (RSASSA-PKCS1-v1_5 over SHA-256) since the
/// remote verifier recomputes the digest over the exact signing input.
pub trait Signer
where
	Self: Send + Sync + Debug,
{
	/// Signs `message` and returns the raw signature bytes.
	fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SigningError>;
}

/// Factory that builds [`Signer`]s from key material.
pub trait SignerBackend
where
	Self: Send + Sync,
{
	/// Stable backend label used in errors.
	fn name(&self) -> &'static str;

	/// Builds a signer from PKCS#8 PEM text.
	fn from_pkcs8_pem(&self, pem: &str) -> Result<Arc<dyn Signer>, ConfigError>;

	/// Reports whether [`from_pkcs12`](Self::from_pkcs12) is implemented.
	fn supports(&self, format: KeyFormat) -> bool {
		matches!(format, KeyFormat::Pkcs8Pem)
	}

	/// Builds a signer from a PKCS#12 container.
	///
	/// The default implementation reports the format as unsupported.
	fn from_pkcs12(&self, der: &[u8], password: &str) -> Result<Arc<dyn Signer>, ConfigError> {
		let _ = (der, password);

		Err(ConfigError::UnsupportedKeyFormat {
			format: KeyFormat::Pkcs12.as_str(),
			backend: self.name(),
		})
	}
}
