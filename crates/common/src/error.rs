//! Caller-facing error umbrella for field encryption.

use thiserror::Error;

/// Why a stored envelope could not be turned back into plaintext.
///
/// Exposed so callers that care can tell corruption of the stored text apart
/// from a tag mismatch; callers that don't can match on
/// [`FieldCryptoError::DecryptionFailed`] alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptionCause {
    /// The stored value is not a well-formed envelope (bad base64, truncated).
    Format,
    /// The authentication tag did not verify under any known key.
    Authentication,
    /// The tag verified but the plaintext is not valid UTF-8.
    Encoding,
}

impl std::fmt::Display for DecryptionCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DecryptionCause::Format => "malformed envelope",
            DecryptionCause::Authentication => "authentication failed",
            DecryptionCause::Encoding => "plaintext is not valid utf-8",
        };
        f.write_str(s)
    }
}

/// Top-level field encryption error.
///
/// None of these are transient; nothing in the encryption layer retries.
/// - [`FieldCryptoError::Construction`] is fatal at startup.
/// - [`FieldCryptoError::DecryptionFailed`] marks a data-integrity incident the
///   caller may either abort on or flag and skip.
#[derive(Debug, Error)]
pub enum FieldCryptoError {
    /// The master secret is missing or too short.
    #[error("key construction failed: {0}")]
    Construction(String),

    /// Key derivation or sealing failed while encrypting.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// A stored value could not be decrypted.
    #[error("decryption failed: {0}")]
    DecryptionFailed(DecryptionCause),

    /// A worker task died before producing a result.
    #[error("internal error: {0}")]
    Internal(String),
}

impl FieldCryptoError {
    /// Short machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            FieldCryptoError::Construction(_) => "key_construction",
            FieldCryptoError::EncryptionFailed(_) => "encryption_failed",
            FieldCryptoError::DecryptionFailed(_) => "decryption_failed",
            FieldCryptoError::Internal(_) => "internal_error",
        }
    }

    /// Returns `true` if the process cannot continue (bad or missing key).
    pub fn is_fatal(&self) -> bool {
        matches!(self, FieldCryptoError::Construction(_))
    }

    /// Returns `true` if the error points at corrupted or tampered stored data.
    pub fn is_data_integrity(&self) -> bool {
        matches!(self, FieldCryptoError::DecryptionFailed(_))
    }
}
