//! Per-value key derivation, AES-256-GCM sealing, and the envelope codec.
//!
//! This module is free of I/O and of any notion of records or audit. It
//! provides the primitives the field adapter composes.
//!
//! # Envelope format
//!
//! ```text
//! base64( salt[16] ‖ nonce[12] ‖ tag[16] ‖ ciphertext[n] )
//! ```
//!
//! A fresh salt selects a fresh PBKDF2-derived key for every value, so a
//! leaked derived key exposes one field value only.

pub mod cipher;
pub mod envelope;
pub mod kdf;

pub use cipher::{CipherError, KEY_LEN, NONCE_LEN, TAG_LEN};
pub use envelope::{Envelope, EnvelopeError, HEADER_LEN, SALT_LEN};
pub use kdf::{derive_key, DerivedKey, KdfError, PBKDF2_ITERATIONS};
