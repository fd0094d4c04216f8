//! Per-request CSP nonce generation.
//!
//! A [`NonceProvider`] hands out exactly one nonce for its lifetime. Clones share
//! the same cache, so every part of a request resolves to the same value.

use std::fmt;
use std::sync::{Arc, OnceLock};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use rand::{TryRngCore, rngs::OsRng};
use tracing::{debug, error};

use crate::error::CspError;

/// Number of random bytes in a nonce (128 bits).
pub const NONCE_BYTES: usize = 16;

/// Fills a buffer with random bytes or reports why it could not.
pub type EntropySource = fn(&mut [u8]) -> Result<(), CspError>;

/// Read from the operating system CSPRNG.
pub fn os_entropy(buf: &mut [u8]) -> Result<(), CspError> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| CspError::Entropy(e.to_string()))
}

/// An opaque CSP nonce value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Nonce(String);

impl Nonce {
    /// Generate a random 128-bit nonce as base64
    pub fn generate(source: EntropySource) -> Result<Self, CspError> {
        let mut bytes = [0u8; NONCE_BYTES];
        source(&mut bytes)?;
        Ok(Self(BASE64.encode(bytes)))
    }

    /// Wrap a known value.
    ///
    /// Returns `None` unless the value is non-empty base64 (standard or URL-safe
    /// alphabet). Anything else could break out of the `'nonce-…'` source.
    pub fn from_value(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let valid = !value.is_empty()
            && value
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'-' | b'_' | b'='));
        valid.then_some(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Nonce {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lazily generates and memoizes a single nonce.
///
/// One provider belongs to one request. It must never be stored in a static:
/// a process-wide cache would leak one request's nonce into another.
#[derive(Clone)]
pub struct NonceProvider {
    cell: Arc<OnceLock<Nonce>>,
    source: EntropySource,
}

impl NonceProvider {
    pub fn new() -> Self {
        Self::with_source(os_entropy)
    }

    pub fn with_source(source: EntropySource) -> Self {
        Self {
            cell: Arc::new(OnceLock::new()),
            source,
        }
    }

    /// Return this request's nonce, generating it on first access.
    ///
    /// A failed generation is not cached, and no substitute value is returned.
    pub fn get_nonce(&self) -> Result<Nonce, CspError> {
        if let Some(nonce) = self.cell.get() {
            return Ok(nonce.clone());
        }
        let fresh = Nonce::generate(self.source).inspect_err(|e| {
            error!(error = %e, "Failed to generate CSP nonce");
        })?;
        // Under a race the first stored value wins and both callers see it.
        let nonce = self.cell.get_or_init(|| fresh);
        debug!("Generated CSP nonce");
        Ok(nonce.clone())
    }

    /// Whether a nonce has been generated yet.
    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl Default for NonceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NonceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonceProvider")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
