//! Compliance audit hooks around every field encryption and decryption.
//!
//! The field adapter hands one [`AuditEvent`] per non-null operation to an
//! [`AuditSink`]. Sinks are best-effort: a failing sink is logged and ignored,
//! it never fails the cryptographic operation.
//!
//! # Audit invariants
//!
//! - Events carry operation, data type, user id, key version, outcome, and
//!   time. **Never** plaintext, ciphertext, or key material.

pub mod channel;

pub use channel::ChannelAuditSink;

use common::protocol::{AuditEvent, DEFAULT_DATA_TYPE};
use thiserror::Error;
use tracing::info;

#[cfg(test)]
use mockall::automock;

/// Tracing target used for audit lines, so they can be routed separately.
pub const AUDIT_TARGET: &str = "hipaa_audit";

/// Errors reported by an audit sink.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The sink's buffer is full; the event was dropped.
    #[error("audit sink is full")]
    Full,

    /// The receiving side has gone away.
    #[error("audit sink is closed")]
    Closed,

    #[error("audit sink failed: {0}")]
    Other(String),
}

/// Destination for audit events. Must not block.
#[cfg_attr(test, automock)]
pub trait AuditSink: Send + Sync {
    /// Record one event.
    ///
    /// # Errors
    ///
    /// Returns an [`AuditError`] if the event could not be accepted. The
    /// caller logs and discards the error.
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// Who is touching which kind of data, for the audit trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditContext {
    pub data_type: String,
    pub user_id: Option<String>,
}

impl AuditContext {
    pub fn new(data_type: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            user_id: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

impl Default for AuditContext {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_TYPE)
    }
}

/// Writes each event as a structured `tracing` line on [`AUDIT_TARGET`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        info!(
            target: AUDIT_TARGET,
            event_id = %event.event_id,
            operation = event.operation.as_str(),
            data_type = %event.data_type,
            user_id = event.user_id.as_deref(),
            key_version = event.key_version,
            outcome = ?event.outcome,
            timestamp = %event.timestamp.to_rfc3339(),
            "HIPAA_AUDIT: {} operation on {}",
            event.operation.as_str(),
            event.data_type,
        );
        Ok(())
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &AuditEvent) -> Result<(), AuditError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::protocol::{AuditOperation, AuditOutcome};

    fn event() -> AuditEvent {
        AuditEvent::new(
            AuditOperation::Encrypt,
            "PII",
            Some("7".into()),
            1,
            AuditOutcome::Success,
        )
    }

    #[test]
    fn default_context_is_pii_without_user() {
        let ctx = AuditContext::default();
        assert_eq!(ctx.data_type, "PII");
        assert!(ctx.user_id.is_none());
    }

    #[test]
    fn context_builder_sets_user() {
        let ctx = AuditContext::new("consultation_notes").with_user("42");
        assert_eq!(ctx.data_type, "consultation_notes");
        assert_eq!(ctx.user_id.as_deref(), Some("42"));
    }

    #[test]
    fn tracing_sink_never_fails() {
        assert!(TracingAuditSink.record(&event()).is_ok());
    }

    #[test]
    fn noop_sink_accepts_everything() {
        assert!(NoopAuditSink.record(&event()).is_ok());
    }
}
