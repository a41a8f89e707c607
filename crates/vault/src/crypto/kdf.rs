//! PBKDF2-HMAC-SHA256 derivation of a per-value AES key.

use hmac::Hmac;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

use super::cipher::KEY_LEN;
use super::envelope::SALT_LEN;

/// PBKDF2 iteration count. NIST SP 800-132 minimum guidance.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// A derived 256-bit key, zeroed on drop.
pub type DerivedKey = Zeroizing<[u8; KEY_LEN]>;

/// Errors produced by key derivation.
#[derive(Debug, Error)]
pub enum KdfError {
    /// HMAC rejected the master secret length.
    #[error("kdf input has invalid length")]
    InvalidLength,
}

/// Derive the AES key for one envelope from the master secret and its salt.
///
/// Deterministic: the same `(master, salt)` always yields the same key.
///
/// # Errors
///
/// Returns [`KdfError::InvalidLength`] if HMAC cannot be keyed with `master`
/// (unreachable for HMAC-SHA256, which accepts any key length).
pub fn derive_key(master: &[u8], salt: &[u8; SALT_LEN]) -> Result<DerivedKey, KdfError> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::pbkdf2::<Hmac<Sha256>>(master, salt, PBKDF2_ITERATIONS, key.as_mut_slice())
        .map_err(|_| KdfError::InvalidLength)?;
    Ok(key)
}
