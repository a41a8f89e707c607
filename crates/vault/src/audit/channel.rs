//! [`ChannelAuditSink`]: hands events to an async forwarder over a bounded
//! channel without ever blocking the caller.

use common::protocol::AuditEvent;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::{AuditError, AuditSink};

/// Audit sink backed by a bounded tokio mpsc channel.
///
/// The receiver is owned by whatever ships events to the audit log store.
/// When the buffer is full the event is dropped and [`AuditError::Full`] is
/// reported; the encryption call proceeds regardless.
#[derive(Debug, Clone)]
pub struct ChannelAuditSink {
    tx: mpsc::Sender<AuditEvent>,
}

impl ChannelAuditSink {
    /// Create a sink with room for `capacity` undelivered events, returning
    /// the receiving half alongside it.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AuditEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl AuditSink for ChannelAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            TrySendError::Full(_) => AuditError::Full,
            TrySendError::Closed(_) => AuditError::Closed,
        })
    }
}
