//! RS256 signer backed by the pure-Rust `rsa` crate.
//!
//! With the `pkcs12` feature the backend also opens password-protected PKCS#12 containers through
//! `p12-keystore`; the first private key entry in the container becomes the signing key.

// crates.io
#[cfg(feature = "pkcs12")] use p12_keystore::KeyStore;
use rsa::{
	RsaPrivateKey,
	pkcs1::DecodeRsaPrivateKey,
	pkcs1v15::{SigningKey, VerifyingKey},
	pkcs8::DecodePrivateKey,
	signature::{Keypair, SignatureEncoding, Signer as _},
};
use sha2::Sha256;
// self
use crate::{
	_prelude::*,
	crypt::{KeyFormat, Signer, SignerBackend},
	error::{ConfigError, SigningError},
};

/// RSASSA-PKCS1-v1_5 / SHA-256 signer.
#[derive(Clone)]
pub struct RsaSigner {
	key: SigningKey<Sha256>,
}
impl RsaSigner {
	/// Parses a PEM private key, accepting PKCS#8 (`BEGIN PRIVATE KEY`) first and falling back
	/// to PKCS#1 (`BEGIN RSA PRIVATE KEY`).
	pub fn from_pem(pem: &str) -> Result<Self, ConfigError> {
		let key = match RsaPrivateKey::from_pkcs8_pem(pem) {
			Ok(key) => key,
			Err(pkcs8_err) => RsaPrivateKey::from_pkcs1_pem(pem)
				.map_err(|_| ConfigError::invalid_key(KeyFormat::Pkcs8Pem.as_str(), pkcs8_err))?,
		};

		Ok(Self::from_key(key))
	}

	/// Decrypts a PKCS#12 container with `password` and takes its private key entry.
	#[cfg(feature = "pkcs12")]
	pub fn from_pkcs12(der: &[u8], password: &str) -> Result<Self, ConfigError> {
		const FORMAT: &str = KeyFormat::Pkcs12.as_str();

		let store =
			KeyStore::from_pkcs12(der, password).map_err(|e| ConfigError::invalid_key(FORMAT, e))?;
		let (_, chain) = store
			.private_key_chain()
			.ok_or_else(|| ConfigError::invalid_key(FORMAT, MissingPrivateKey))?;
		let key = RsaPrivateKey::from_pkcs8_der(chain.key())
			.map_err(|e| ConfigError::invalid_key(FORMAT, e))?;

		Ok(Self::from_key(key))
	}

	/// Wraps an already decoded private key.
	pub fn from_key(key: RsaPrivateKey) -> Self {
		Self { key: SigningKey::new(key) }
	}

	/// Verifying half of the key pair.
	pub fn verifying_key(&self) -> VerifyingKey<Sha256> {
		self.key.verifying_key()
	}
}
impl Signer for RsaSigner {
	fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SigningError> {
		let signature = self.key.try_sign(message).map_err(SigningError::new)?;

		Ok(signature.to_vec())
	}
}
impl Debug for RsaSigner {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("RsaSigner(<redacted>)")
	}
}

#[cfg(feature = "pkcs12")]
#[derive(Debug, ThisError)]
#[error("PKCS#12 container holds no private key entry")]
struct MissingPrivateKey;

/// Backend producing [`RsaSigner`]s.
///
/// PKCS#12 containers are readable only with the `pkcs12` feature.
#[derive(Clone, Copy, Debug, Default)]
pub struct RsaSignerBackend;
impl SignerBackend for RsaSignerBackend {
	fn name(&self) -> &'static str {
		"rsa"
	}

	fn from_pkcs8_pem(&self, pem: &str) -> Result<Arc<dyn Signer>, ConfigError> {
		Ok(Arc::new(RsaSigner::from_pem(pem)?))
	}

	#[cfg(feature = "pkcs12")]
	fn supports(&self, _: KeyFormat) -> bool {
		true
	}

	#[cfg(feature = "pkcs12")]
	fn from_pkcs12(&self, der: &[u8], password: &str) -> Result<Arc<dyn Signer>, ConfigError> {
		Ok(Arc::new(RsaSigner::from_pkcs12(der, password)?))
	}
}
