//! Records exchanged with external collaborators.
//!
//! [`AuditEvent`] is the append-only line handed to the audit-log sink for every
//! field encryption or decryption. [`KeyMetadata`] is the operator view of the
//! master key rotation state. Both serialise as JSON and carry no key material,
//! plaintext, or ciphertext.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Audit events
// ---------------------------------------------------------------------------

/// Data type recorded when the caller does not name one.
pub const DEFAULT_DATA_TYPE: &str = "PII";

/// Cryptographic operation being audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOperation {
    Encrypt,
    Decrypt,
}

impl AuditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOperation::Encrypt => "encrypt",
            AuditOperation::Decrypt => "decrypt",
        }
    }
}

/// Whether the audited operation produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
}

/// One audit log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique id of this log line.
    pub event_id: Uuid,
    /// `"encrypt"` or `"decrypt"`.
    pub operation: AuditOperation,
    /// Kind of record field touched, e.g. `"PII"` or `"consultation_notes"`.
    pub data_type: String,
    /// Acting user, when the caller knows one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Master key version that sealed (or opened) the value.
    pub key_version: u32,
    pub outcome: AuditOutcome,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    /// Build an event stamped with a fresh id and the current time.
    pub fn new(
        operation: AuditOperation,
        data_type: impl Into<String>,
        user_id: Option<String>,
        key_version: u32,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            operation,
            data_type: data_type.into(),
            user_id,
            key_version,
            outcome,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Key metadata
// ---------------------------------------------------------------------------

/// Snapshot of master key rotation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyMetadata {
    pub current_version: u32,
    pub last_rotation: DateTime<Utc>,
    pub next_rotation: DateTime<Utc>,
    /// Whole days left until rotation is due; negative once overdue.
    pub days_until_rotation: i64,
}
