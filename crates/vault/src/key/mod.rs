//! Master key handling: the [`KeyHolder`], the versioned [`KeyRing`], and
//! rotation bookkeeping.
//!
//! # Lifecycle
//!
//! 1. At startup the master secret is read from configuration
//!    (`HIPAA_ENCRYPTION_KEY`) and validated into a [`KeyHolder`]. A missing or
//!    short secret is a startup failure.
//! 2. The holder becomes version `N` of a [`KeyRing`], optionally alongside
//!    retired secrets that still decrypt older envelopes.
//! 3. On rotation the operator persists the new secret externally and installs
//!    it into the ring; the previous secret moves to the retired list.
//!
//! # Security invariants
//!
//! - Master secrets are **never** logged, serialised, or included in traces.
//! - Secret bytes are zeroed when the holder is dropped.
//! - Only the KDF reads the secret bytes.

pub mod ring;
pub mod rotation;

pub use ring::{KeyRing, KeySet};
pub use rotation::{spawn_rotation_monitor, KeyRotation, RotatedKey};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use common::FieldCryptoError;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::crypto::{self, DerivedKey, KdfError, KEY_LEN, SALT_LEN};

/// Minimum master secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Environment variable consulted when no secret is passed explicitly.
pub const KEY_ENV_VAR: &str = "HIPAA_ENCRYPTION_KEY";

/// Errors produced while building or installing master keys.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// No secret was supplied and no fallback source had one.
    #[error("{KEY_ENV_VAR} must be provided")]
    MissingKey,

    /// The secret is shorter than [`MIN_SECRET_LEN`].
    #[error("master key must be at least {min} bytes, got {actual}")]
    InvalidKeyLength { min: usize, actual: usize },

    /// A key was installed with a version that does not move forward.
    #[error("key version {offered} is not newer than current version {current}")]
    StaleVersion { current: u32, offered: u32 },
}

impl From<KeyError> for FieldCryptoError {
    fn from(e: KeyError) -> Self {
        FieldCryptoError::Construction(e.to_string())
    }
}

/// Validated master secret, immutable for its lifetime.
pub struct KeyHolder {
    secret: Zeroizing<Vec<u8>>,
}

impl KeyHolder {
    /// Validate and retain `secret`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidKeyLength`] if `secret` is shorter than
    /// [`MIN_SECRET_LEN`] bytes. Length is measured in bytes, not characters,
    /// so 16 two-byte UTF-8 characters are enough.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, KeyError> {
        let secret = secret.as_ref();
        if secret.len() < MIN_SECRET_LEN {
            return Err(KeyError::InvalidKeyLength {
                min: MIN_SECRET_LEN,
                actual: secret.len(),
            });
        }
        Ok(Self {
            secret: Zeroizing::new(secret.to_vec()),
        })
    }

    /// Use `explicit` if given, otherwise `fallback`. Empty values count as
    /// absent.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::MissingKey`] when neither source has a secret, or
    /// [`KeyError::InvalidKeyLength`] when the chosen one is too short.
    pub fn from_sources<S: AsRef<[u8]>>(
        explicit: Option<S>,
        fallback: Option<S>,
    ) -> Result<Self, KeyError> {
        let chosen = explicit
            .filter(|s| !s.as_ref().is_empty())
            .or_else(|| fallback.filter(|s| !s.as_ref().is_empty()))
            .ok_or(KeyError::MissingKey)?;
        Self::new(chosen)
    }

    /// Read the secret from [`KEY_ENV_VAR`].
    ///
    /// # Errors
    ///
    /// See [`KeyHolder::from_sources`].
    pub fn from_env() -> Result<Self, KeyError> {
        Self::from_sources(None, std::env::var(KEY_ENV_VAR).ok())
    }

    /// Derive the per-envelope key for `salt`.
    pub(crate) fn derive(&self, salt: &[u8; SALT_LEN]) -> Result<DerivedKey, KdfError> {
        crypto::derive_key(&self.secret, salt)
    }
}

impl std::fmt::Debug for KeyHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyHolder([REDACTED])")
    }
}

/// Generate a fresh master secret: 32 CSPRNG bytes, base64url without padding.
pub fn generate_master_secret() -> Zeroizing<String> {
    let bytes = Zeroizing::new(crypto::cipher::random_bytes::<KEY_LEN>());
    Zeroizing::new(URL_SAFE_NO_PAD.encode(bytes.as_slice()))
}
