//! `phi-vault`: field-level envelope encryption for personal and health records.
//!
//! A database compromise alone must not expose protected fields. Each field
//! value is sealed with AES-256-GCM under a key derived (PBKDF2-HMAC-SHA256)
//! from the master secret and a fresh salt, and stored as one base64
//! envelope.
//!
//! Construct one [`FieldEncryptor`] at startup and pass it to every
//! repository that reads or writes protected fields:
//!
//! ```no_run
//! use phi_vault::{FieldEncryptor, KeyHolder, KeyRing};
//!
//! let keys = KeyRing::new(KeyHolder::from_env()?);
//! let fields = FieldEncryptor::with_tracing_audit(keys);
//!
//! let stored = fields.encrypt_field(Some("Patient has mild fever"))?;
//! let plain = fields.decrypt_field(stored.as_deref())?;
//! assert_eq!(plain.as_deref(), Some("Patient has mild fever"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod audit;
pub mod config;
pub mod crypto;
pub mod field;
pub mod key;
pub mod record;
pub mod telemetry;

pub use audit::{AuditContext, AuditSink};
pub use common::{DecryptionCause, FieldCryptoError};
pub use field::FieldEncryptor;
pub use key::{KeyError, KeyHolder, KeyRing, KeyRotation};
pub use record::{FieldPaths, RecordCodec};
