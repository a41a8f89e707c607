//! Packing of salt, nonce, tag, and ciphertext into the stored text value.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

use super::cipher::{NONCE_LEN, TAG_LEN};

/// Byte length of the per-envelope KDF salt.
pub const SALT_LEN: usize = 16;

/// Fixed prefix length: `salt ‖ nonce ‖ tag`.
pub const HEADER_LEN: usize = SALT_LEN + NONCE_LEN + TAG_LEN;

/// Errors produced when parsing a stored value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The stored text is not standard base64.
    #[error("envelope is not valid base64")]
    InvalidBase64,

    /// Fewer bytes than the fixed header decoded.
    #[error("envelope too short: {len} bytes, need at least {HEADER_LEN}")]
    TooShort { len: usize },
}

/// A parsed encrypted value.
///
/// The string representation is `base64(salt ‖ nonce ‖ tag ‖ ciphertext)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub salt: [u8; SALT_LEN],
    pub nonce: [u8; NONCE_LEN],
    pub tag: [u8; TAG_LEN],
    /// Same length as the plaintext; empty for an empty plaintext.
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Encode this envelope to its stored string representation.
    pub fn encode(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    /// Parse a stored string back into an [`Envelope`].
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::InvalidBase64`] if `s` is not base64 and
    /// [`EnvelopeError::TooShort`] if it decodes to fewer than [`HEADER_LEN`]
    /// bytes.
    pub fn decode(s: &str) -> Result<Self, EnvelopeError> {
        let bytes = STANDARD
            .decode(s.trim())
            .map_err(|_| EnvelopeError::InvalidBase64)?;
        Self::from_bytes(&bytes)
    }

    /// Concatenate the four parts in their fixed order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Split raw envelope bytes into their four parts.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::TooShort`] if `bytes` is shorter than
    /// [`HEADER_LEN`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        if bytes.len() < HEADER_LEN {
            return Err(EnvelopeError::TooShort { len: bytes.len() });
        }
        let (salt, rest) = bytes.split_at(SALT_LEN);
        let (nonce, rest) = rest.split_at(NONCE_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        let mut envelope = Envelope {
            salt: [0u8; SALT_LEN],
            nonce: [0u8; NONCE_LEN],
            tag: [0u8; TAG_LEN],
            ciphertext: ciphertext.to_vec(),
        };
        envelope.salt.copy_from_slice(salt);
        envelope.nonce.copy_from_slice(nonce);
        envelope.tag.copy_from_slice(tag);
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope {
            salt: [1u8; SALT_LEN],
            nonce: [2u8; NONCE_LEN],
            tag: [3u8; TAG_LEN],
            ciphertext: b"ciphertext".to_vec(),
        }
    }

    #[test]
    fn layout_is_salt_nonce_tag_ciphertext() {
        let bytes = sample().to_bytes();
        assert_eq!(bytes.len(), HEADER_LEN + 10);
        assert!(bytes[..16].iter().all(|&b| b == 1));
        assert!(bytes[16..28].iter().all(|&b| b == 2));
        assert!(bytes[28..44].iter().all(|&b| b == 3));
        assert_eq!(&bytes[44..], b"ciphertext");
    }

    #[test]
    fn string_repr_round_trip() {
        let env = sample();
        let s = env.encode();
        assert_eq!(STANDARD.decode(&s).unwrap(), env.to_bytes());
        assert_eq!(Envelope::decode(&s).unwrap(), env);
    }

    #[test]
    fn header_only_envelope_is_accepted() {
        let env = Envelope {
            ciphertext: Vec::new(),
            ..sample()
        };
        let decoded = Envelope::decode(&env.encode()).unwrap();
        assert!(decoded.ciphertext.is_empty());
    }

    #[test]
    fn decode_rejects_bad_base64() {
        assert_eq!(
            Envelope::decode("not base64 at all!!").unwrap_err(),
            EnvelopeError::InvalidBase64
        );
    }

    #[test]
    fn decode_rejects_short_input() {
        let short = STANDARD.encode([0u8; HEADER_LEN - 1]);
        assert_eq!(
            Envelope::decode(&short).unwrap_err(),
            EnvelopeError::TooShort { len: HEADER_LEN - 1 }
        );
    }

    #[test]
    fn decode_rejects_empty_string() {
        assert_eq!(
            Envelope::decode("").unwrap_err(),
            EnvelopeError::TooShort { len: 0 }
        );
    }

    #[test]
    fn plaintext_is_not_an_envelope() {
        assert!(Envelope::decode("Patient has mild fever").is_err());
    }
}
