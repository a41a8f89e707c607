//! Bulk field operations spread over tokio's blocking pool.
//!
//! Every value costs one PBKDF2 derivation, so exports touching thousands of
//! encrypted fields scale linearly. These helpers run the CPU-bound work in
//! parallel off the async executor and keep results in input order.

use common::FieldCryptoError;
use tokio::task::JoinHandle;

use super::FieldEncryptor;
use crate::audit::AuditContext;

impl FieldEncryptor {
    /// Decrypt many optional stored values concurrently.
    ///
    /// # Errors
    ///
    /// Returns the first failure in input order. [`FieldCryptoError::Internal`]
    /// if a worker task panicked.
    pub async fn decrypt_batch(
        &self,
        values: Vec<Option<String>>,
        ctx: &AuditContext,
    ) -> Result<Vec<Option<String>>, FieldCryptoError> {
        let handles = values
            .into_iter()
            .map(|value| {
                let enc = self.clone();
                let ctx = ctx.clone();
                tokio::task::spawn_blocking(move || enc.decrypt_field_with(value.as_deref(), &ctx))
            })
            .collect();
        join_in_order(handles).await
    }

    /// Encrypt many optional plaintext values concurrently.
    ///
    /// # Errors
    ///
    /// As [`FieldEncryptor::decrypt_batch`].
    pub async fn encrypt_batch(
        &self,
        values: Vec<Option<String>>,
        ctx: &AuditContext,
    ) -> Result<Vec<Option<String>>, FieldCryptoError> {
        let handles = values
            .into_iter()
            .map(|value| {
                let enc = self.clone();
                let ctx = ctx.clone();
                tokio::task::spawn_blocking(move || enc.encrypt_field_with(value.as_deref(), &ctx))
            })
            .collect();
        join_in_order(handles).await
    }
}

async fn join_in_order(
    handles: Vec<JoinHandle<Result<Option<String>, FieldCryptoError>>>,
) -> Result<Vec<Option<String>>, FieldCryptoError> {
    let mut out = Vec::with_capacity(handles.len());
    for handle in handles {
        let value = handle
            .await
            .map_err(|e| FieldCryptoError::Internal(format!("field worker failed: {e}")))??;
        out.push(value);
    }
    Ok(out)
}
