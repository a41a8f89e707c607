//! Transparent field adapter: the only surface persistence code touches.
//!
//! [`FieldEncryptor`] turns a plaintext field value into a stored envelope
//! string and back. `None` passes through untouched. All cryptographic
//! parameters stay internal.
//!
//! ```text
//! encrypt: plaintext ─▶ salt,nonce ─▶ KDF ─▶ AES-GCM seal ─▶ envelope ─▶ base64
//! decrypt: base64 ─▶ envelope ─▶ KDF(salt) ─▶ AES-GCM open ─▶ plaintext
//! ```

pub mod batch;

use std::sync::Arc;

use common::protocol::{AuditEvent, AuditOperation, AuditOutcome};
use common::{DecryptionCause, FieldCryptoError};
use tracing::{debug, warn};

use crate::audit::{AuditContext, AuditSink, TracingAuditSink};
use crate::crypto::{
    cipher::{self, random_bytes},
    CipherError, Envelope, EnvelopeError, KdfError,
};
use crate::key::{KeyHolder, KeyRing};

impl From<EnvelopeError> for FieldCryptoError {
    fn from(_: EnvelopeError) -> Self {
        FieldCryptoError::DecryptionFailed(DecryptionCause::Format)
    }
}

impl From<KdfError> for FieldCryptoError {
    fn from(e: KdfError) -> Self {
        FieldCryptoError::EncryptionFailed(e.to_string())
    }
}

/// Encrypts and decrypts individual record fields.
///
/// Cheap to clone; clones share the same [`KeyRing`] and audit sink. Pass it
/// to every repository that stores protected fields.
#[derive(Clone)]
pub struct FieldEncryptor {
    keys: KeyRing,
    audit: Arc<dyn AuditSink>,
}

impl FieldEncryptor {
    pub fn new(keys: KeyRing, audit: Arc<dyn AuditSink>) -> Self {
        Self { keys, audit }
    }

    /// Encryptor that audits through `tracing`.
    pub fn with_tracing_audit(keys: KeyRing) -> Self {
        Self::new(keys, Arc::new(TracingAuditSink))
    }

    pub fn key_ring(&self) -> &KeyRing {
        &self.keys
    }

    // -----------------------------------------------------------------------
    // Null-propagating field API
    // -----------------------------------------------------------------------

    /// Encrypt an optional field value under the default audit context.
    ///
    /// # Errors
    ///
    /// See [`FieldEncryptor::encrypt_bytes`].
    pub fn encrypt_field(&self, value: Option<&str>) -> Result<Option<String>, FieldCryptoError> {
        self.encrypt_field_with(value, &AuditContext::default())
    }

    /// Decrypt an optional stored value under the default audit context.
    ///
    /// # Errors
    ///
    /// See [`FieldEncryptor::decrypt`].
    pub fn decrypt_field(&self, value: Option<&str>) -> Result<Option<String>, FieldCryptoError> {
        self.decrypt_field_with(value, &AuditContext::default())
    }

    pub fn encrypt_field_with(
        &self,
        value: Option<&str>,
        ctx: &AuditContext,
    ) -> Result<Option<String>, FieldCryptoError> {
        value.map(|v| self.encrypt(v, ctx)).transpose()
    }

    pub fn decrypt_field_with(
        &self,
        value: Option<&str>,
        ctx: &AuditContext,
    ) -> Result<Option<String>, FieldCryptoError> {
        value.map(|v| self.decrypt(v, ctx)).transpose()
    }

    /// Decrypt with whichever known key opens `value`, then encrypt again
    /// under the current key. Used to migrate envelopes off retired keys.
    ///
    /// # Errors
    ///
    /// Fails like [`FieldEncryptor::decrypt`] or [`FieldEncryptor::encrypt`].
    pub fn reencrypt_field(
        &self,
        value: Option<&str>,
        ctx: &AuditContext,
    ) -> Result<Option<String>, FieldCryptoError> {
        value
            .map(|v| {
                let plaintext = zeroize::Zeroizing::new(self.decrypt_bytes(v, ctx)?);
                self.encrypt_bytes(&plaintext, ctx)
            })
            .transpose()
    }

    // -----------------------------------------------------------------------
    // Non-optional API
    // -----------------------------------------------------------------------

    /// Encrypt a string value.
    ///
    /// # Errors
    ///
    /// See [`FieldEncryptor::encrypt_bytes`].
    pub fn encrypt(&self, plaintext: &str, ctx: &AuditContext) -> Result<String, FieldCryptoError> {
        self.encrypt_bytes(plaintext.as_bytes(), ctx)
    }

    /// Decrypt a stored value that must hold UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns [`FieldCryptoError::DecryptionFailed`] with
    /// [`DecryptionCause::Encoding`] if the plaintext is not UTF-8, or as
    /// [`FieldEncryptor::decrypt_bytes`].
    pub fn decrypt(&self, stored: &str, ctx: &AuditContext) -> Result<String, FieldCryptoError> {
        let bytes = self.decrypt_bytes(stored, ctx)?;
        String::from_utf8(bytes)
            .map_err(|_| FieldCryptoError::DecryptionFailed(DecryptionCause::Encoding))
    }

    /// Encrypt raw bytes under the current master key.
    ///
    /// # Errors
    ///
    /// Returns [`FieldCryptoError::EncryptionFailed`] if key derivation or
    /// sealing fails.
    pub fn encrypt_bytes(
        &self,
        plaintext: &[u8],
        ctx: &AuditContext,
    ) -> Result<String, FieldCryptoError> {
        let keys = self.keys.snapshot();
        let result = seal_with(keys.current(), plaintext);
        let outcome = outcome_of(&result);
        self.emit(AuditOperation::Encrypt, ctx, keys.version(), outcome);
        result
    }

    /// Decrypt a stored envelope into raw bytes.
    ///
    /// The current key is tried first, then retired keys newest-first.
    ///
    /// # Errors
    ///
    /// Returns [`FieldCryptoError::DecryptionFailed`] with
    /// [`DecryptionCause::Format`] if `stored` is not an envelope, or
    /// [`DecryptionCause::Authentication`] if no known key verifies it.
    pub fn decrypt_bytes(
        &self,
        stored: &str,
        ctx: &AuditContext,
    ) -> Result<Vec<u8>, FieldCryptoError> {
        let keys = self.keys.snapshot();
        let mut version = keys.version();
        let result = Envelope::decode(stored)
            .map_err(FieldCryptoError::from)
            .and_then(|envelope| {
                let (v, plaintext) = open_with_any(keys.decryption_candidates(), &envelope)?;
                version = v;
                Ok(plaintext)
            });
        if let Err(e) = &result {
            debug!(error = %e, data_type = %ctx.data_type, "field decryption failed");
        }
        let outcome = outcome_of(&result);
        self.emit(AuditOperation::Decrypt, ctx, version, outcome);
        result
    }

    fn emit(
        &self,
        operation: AuditOperation,
        ctx: &AuditContext,
        key_version: u32,
        outcome: AuditOutcome,
    ) {
        let event = AuditEvent::new(
            operation,
            ctx.data_type.clone(),
            ctx.user_id.clone(),
            key_version,
            outcome,
        );
        if let Err(e) = self.audit.record(&event) {
            warn!(
                error = %e,
                operation = operation.as_str(),
                "audit sink rejected event; continuing"
            );
        }
    }
}

impl std::fmt::Debug for FieldEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldEncryptor")
            .field("key_version", &self.keys.current_version())
            .finish_non_exhaustive()
    }
}

fn outcome_of<T>(result: &Result<T, FieldCryptoError>) -> AuditOutcome {
    if result.is_ok() {
        AuditOutcome::Success
    } else {
        AuditOutcome::Failure
    }
}

fn seal_with(holder: &KeyHolder, plaintext: &[u8]) -> Result<String, FieldCryptoError> {
    let salt = random_bytes();
    let nonce = random_bytes();
    let key = holder.derive(&salt)?;
    let (ciphertext, tag) = cipher::seal(&key, &nonce, plaintext)
        .map_err(|e| FieldCryptoError::EncryptionFailed(e.to_string()))?;
    Ok(Envelope {
        salt,
        nonce,
        tag,
        ciphertext,
    }
    .encode())
}

fn open_with_any<'a>(
    candidates: impl Iterator<Item = (u32, &'a KeyHolder)>,
    envelope: &Envelope,
) -> Result<(u32, Vec<u8>), FieldCryptoError> {
    for (version, holder) in candidates {
        let key = holder.derive(&envelope.salt).map_err(open_failure)?;
        match cipher::open(&key, &envelope.nonce, &envelope.tag, &envelope.ciphertext) {
            Ok(plaintext) => return Ok((version, plaintext)),
            Err(CipherError::Authentication) => continue,
            Err(e) => return Err(open_failure(e)),
        }
    }
    Err(FieldCryptoError::DecryptionFailed(DecryptionCause::Authentication))
}

/// Non-authentication failure on the decrypt path. The stored value is not
/// at fault, so this is internal rather than a data-integrity error.
fn open_failure(e: impl std::fmt::Display) -> FieldCryptoError {
    FieldCryptoError::Internal(format!("decryption failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditError, MockAuditSink, NoopAuditSink};
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    fn encryptor(secret: &str) -> FieldEncryptor {
        FieldEncryptor::new(
            KeyRing::new(KeyHolder::new(secret).unwrap()),
            Arc::new(NoopAuditSink),
        )
    }

    fn zeros() -> FieldEncryptor {
        encryptor(&"0".repeat(32))
    }

    #[test]
    fn round_trip() {
        let enc = zeros();
        for s in ["Patient has mild fever", "ü 🩺 名前", "a"] {
            let stored = enc.encrypt_field(Some(s)).unwrap().unwrap();
            assert_ne!(stored, s);
            assert_eq!(enc.decrypt_field(Some(&stored)).unwrap().as_deref(), Some(s));
        }
    }

    #[test]
    fn none_passes_through() {
        let enc = zeros();
        assert_eq!(enc.encrypt_field(None).unwrap(), None);
        assert_eq!(enc.decrypt_field(None).unwrap(), None);
    }

    #[test]
    fn empty_string_round_trips_and_differs_from_none() {
        let enc = zeros();
        let stored = enc.encrypt_field(Some("")).unwrap().unwrap();
        assert!(!stored.is_empty());
        assert_eq!(enc.decrypt_field(Some(&stored)).unwrap(), Some(String::new()));
    }

    #[test]
    fn encryption_is_probabilistic() {
        let enc = zeros();
        let a = enc.encrypt_field(Some("same value")).unwrap().unwrap();
        let b = enc.encrypt_field(Some("same value")).unwrap().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn concrete_scenario() {
        let enc = zeros();
        let stored = enc
            .encrypt_field(Some("Patient has mild fever"))
            .unwrap()
            .unwrap();
        // 44-byte header + 22-byte ciphertext = 66 bytes = 88 base64 chars.
        assert!(stored.len() >= 60);
        assert_eq!(stored.len(), 88);
        assert_eq!(
            enc.decrypt_field(Some(&stored)).unwrap().as_deref(),
            Some("Patient has mild fever")
        );

        let mut corrupted = stored.clone();
        let last = corrupted.pop().unwrap();
        corrupted.push(if last == 'A' { 'B' } else { 'A' });
        let err = enc.decrypt_field(Some(&corrupted)).unwrap_err();
        assert!(matches!(
            err,
            FieldCryptoError::DecryptionFailed(DecryptionCause::Authentication)
        ));
    }

    #[test]
    fn single_byte_flip_anywhere_is_detected() {
        let enc = zeros();
        let stored = enc.encrypt("tamper", &AuditContext::default()).unwrap();
        let bytes = STANDARD.decode(&stored).unwrap();

        // Every byte of salt, nonce, tag and ciphertext.
        for pos in 0..bytes.len() {
            let mut tampered = bytes.clone();
            tampered[pos] ^= 0x01;
            let result = enc.decrypt_field(Some(&STANDARD.encode(&tampered)));
            assert!(
                matches!(result, Err(FieldCryptoError::DecryptionFailed(_))),
                "flip at byte {pos} was not detected"
            );
        }
    }

    #[test]
    fn kdf_failure_while_opening_is_internal() {
        let err = open_failure(KdfError::InvalidLength);
        assert!(matches!(err, FieldCryptoError::Internal(_)));
        assert_eq!(err.code(), "internal_error");
        assert!(!err.is_data_integrity());
    }

    #[test]
    fn wrong_master_key_fails() {
        let stored = zeros().encrypt_field(Some("secret")).unwrap().unwrap();
        let other = encryptor(&"1".repeat(32));
        assert!(other.decrypt_field(Some(&stored)).unwrap_err().is_data_integrity());
    }

    #[test]
    fn malformed_value_is_format_failure() {
        let enc = zeros();
        for bad in ["", "plain text value", "AAAA"] {
            let err = enc.decrypt_field(Some(bad)).unwrap_err();
            assert!(
                matches!(err, FieldCryptoError::DecryptionFailed(DecryptionCause::Format)),
                "{bad:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn non_utf8_plaintext_is_encoding_failure() {
        let enc = zeros();
        let ctx = AuditContext::default();
        let stored = enc.encrypt_bytes(&[0xFF, 0xFE, 0x00], &ctx).unwrap();
        assert_eq!(enc.decrypt_bytes(&stored, &ctx).unwrap(), vec![0xFF, 0xFE, 0x00]);
        assert!(matches!(
            enc.decrypt(&stored, &ctx),
            Err(FieldCryptoError::DecryptionFailed(DecryptionCause::Encoding))
        ));
    }

    #[test]
    fn old_envelopes_decrypt_after_rotation() {
        let enc = zeros();
        let before = enc.encrypt_field(Some("written under v1")).unwrap().unwrap();

        enc.key_ring()
            .install(KeyHolder::new("2".repeat(32)).unwrap(), 2)
            .unwrap();
        let after = enc.encrypt_field(Some("written under v2")).unwrap().unwrap();

        assert_eq!(
            enc.decrypt_field(Some(&before)).unwrap().as_deref(),
            Some("written under v1")
        );
        assert_eq!(
            enc.decrypt_field(Some(&after)).unwrap().as_deref(),
            Some("written under v2")
        );
        // A ring holding only the new key cannot read the old envelope.
        let v2_only = encryptor(&"2".repeat(32));
        assert!(v2_only.decrypt_field(Some(&before)).is_err());
    }

    #[test]
    fn reencrypt_moves_value_to_current_key() {
        let enc = zeros();
        let ctx = AuditContext::default();
        let old = enc.encrypt_field(Some("migrate me")).unwrap().unwrap();
        enc.key_ring()
            .install(KeyHolder::new("3".repeat(32)).unwrap(), 2)
            .unwrap();

        let migrated = enc.reencrypt_field(Some(&old), &ctx).unwrap().unwrap();
        let v2_only = encryptor(&"3".repeat(32));
        assert_eq!(
            v2_only.decrypt_field(Some(&migrated)).unwrap().as_deref(),
            Some("migrate me")
        );
        assert_eq!(enc.reencrypt_field(None, &ctx).unwrap(), None);
    }

    #[test]
    fn audit_event_per_operation() {
        let mut sink = MockAuditSink::new();
        sink.expect_record()
            .withf(|e| {
                e.operation == AuditOperation::Encrypt
                    && e.outcome == AuditOutcome::Success
                    && e.data_type == "consultation_notes"
                    && e.user_id.as_deref() == Some("42")
                    && e.key_version == 1
            })
            .times(1)
            .returning(|_| Ok(()));
        sink.expect_record()
            .withf(|e| e.operation == AuditOperation::Decrypt && e.outcome == AuditOutcome::Success)
            .times(1)
            .returning(|_| Ok(()));

        let enc = FieldEncryptor::new(
            KeyRing::new(KeyHolder::new("0".repeat(32)).unwrap()),
            Arc::new(sink),
        );
        let ctx = AuditContext::new("consultation_notes").with_user("42");
        let stored = enc.encrypt_field_with(Some("note"), &ctx).unwrap();
        enc.decrypt_field_with(stored.as_deref(), &ctx).unwrap();
    }

    #[test]
    fn null_values_are_not_audited() {
        let mut sink = MockAuditSink::new();
        sink.expect_record().times(0);
        let enc = FieldEncryptor::new(
            KeyRing::new(KeyHolder::new("0".repeat(32)).unwrap()),
            Arc::new(sink),
        );
        enc.encrypt_field(None).unwrap();
        enc.decrypt_field(None).unwrap();
    }

    #[test]
    fn failed_decrypt_is_audited_as_failure() {
        let mut sink = MockAuditSink::new();
        sink.expect_record()
            .withf(|e| e.operation == AuditOperation::Decrypt && e.outcome == AuditOutcome::Failure)
            .times(1)
            .returning(|_| Ok(()));
        let enc = FieldEncryptor::new(
            KeyRing::new(KeyHolder::new("0".repeat(32)).unwrap()),
            Arc::new(sink),
        );
        assert!(enc.decrypt_field(Some("garbage")).is_err());
    }

    #[test]
    fn audit_failure_never_fails_the_operation() {
        let mut sink = MockAuditSink::new();
        sink.expect_record()
            .returning(|_| Err(AuditError::Other("log backend down".into())));
        let enc = FieldEncryptor::new(
            KeyRing::new(KeyHolder::new("0".repeat(32)).unwrap()),
            Arc::new(sink),
        );
        let stored = enc.encrypt_field(Some("still works")).unwrap();
        assert_eq!(
            enc.decrypt_field(stored.as_deref()).unwrap().as_deref(),
            Some("still works")
        );
    }

    #[test]
    fn concurrent_use_from_threads() {
        let enc = zeros();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let enc = enc.clone();
                std::thread::spawn(move || {
                    let value = format!("record {i}");
                    let stored = enc.encrypt_field(Some(&value)).unwrap();
                    enc.decrypt_field(stored.as_deref()).unwrap() == Some(value)
                })
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap());
        }
    }

    #[test]
    fn debug_does_not_leak_keys() {
        let enc = encryptor("correct-horse-battery-staple-0123456789");
        let dbg = format!("{enc:?}");
        assert!(dbg.contains("key_version"));
        assert!(!dbg.contains("correct-horse"));
    }
}
