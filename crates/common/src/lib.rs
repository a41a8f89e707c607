//! Common types, wire formats, and errors shared across `phi-vault` crates.

pub mod error;
pub mod protocol;

pub use error::{DecryptionCause, FieldCryptoError};
