//! AES-256-GCM sealing and opening with a detached tag.
//!
//! **Nonce reuse under one key is catastrophic for GCM.** Every envelope gets
//! its own derived key (fresh salt) and its own random nonce, so a repeated
//! nonce across envelopes never shares a key.

use aes_gcm::{
    aead::{rand_core::RngCore, AeadInPlace, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce, Tag,
};
use thiserror::Error;
use zeroize::Zeroizing;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of a GCM nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Byte length of a GCM authentication tag (16 bytes = 128 bits).
pub const TAG_LEN: usize = 16;

/// Errors produced by the cipher layer.
#[derive(Debug, Error)]
pub enum CipherError {
    /// AES-GCM refused to seal (plaintext beyond the GCM length limit).
    #[error("aead seal failed")]
    AeadFailure,

    /// The tag does not verify: wrong key, or the nonce, tag, or ciphertext
    /// was altered.
    #[error("authentication failed")]
    Authentication,
}

/// Encrypt `plaintext` under `key` and `nonce`.
///
/// Returns the ciphertext (same length as `plaintext`) and the detached
/// 128-bit tag.
///
/// # Errors
///
/// Returns [`CipherError::AeadFailure`] if the AEAD rejects the input.
pub fn seal(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> Result<(Vec<u8>, [u8; TAG_LEN]), CipherError> {
    let cipher = build_cipher(key);
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(nonce), b"", &mut buffer)
        .map_err(|_| CipherError::AeadFailure)?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(&tag);
    Ok((buffer, tag_bytes))
}

/// Verify `tag` and decrypt `ciphertext`.
///
/// Nothing is returned unless the tag verifies; the working buffer is zeroed
/// when it does not.
///
/// # Errors
///
/// Returns [`CipherError::Authentication`] on any tag mismatch.
pub fn open(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    tag: &[u8; TAG_LEN],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CipherError> {
    let cipher = build_cipher(key);
    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(nonce),
            b"",
            buffer.as_mut_slice(),
            Tag::from_slice(tag),
        )
        .map_err(|_| CipherError::Authentication)?;
    Ok(std::mem::take(&mut *buffer))
}

/// Fill an array from the OS CSPRNG.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

fn build_cipher(key: &[u8; KEY_LEN]) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key))
}
