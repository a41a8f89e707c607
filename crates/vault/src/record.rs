//! Record codec applied at the repository boundary.
//!
//! Repositories call [`RecordCodec::encrypt_record`] immediately before a write
//! and [`RecordCodec::decrypt_record`] immediately after a read. Which fields
//! are protected is decided by the calling schema and passed in as
//! [`FieldPaths`].

use std::collections::BTreeSet;

use common::FieldCryptoError;
use serde_json::Value;

use crate::audit::AuditContext;
use crate::field::FieldEncryptor;

/// Dot-notation paths of protected fields.
///
/// Example paths: `"ssn"`, `"profile.address.zip"`, `"messages[].body"`.
pub type FieldPaths = BTreeSet<String>;

/// One step from a record root towards a protected leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    /// Object member.
    Key(String),
    /// Each element of an array.
    ArrayItem,
}

/// Split a protected-field path into steps. `"visits[].notes"` walks the
/// `visits` member, every array element, then `notes`.
fn parse_path(path: &str) -> Vec<PathSegment> {
    path.split('.')
        .flat_map(|part| match part.strip_suffix("[]") {
            Some(name) => vec![PathSegment::Key(name.to_owned()), PathSegment::ArrayItem],
            None => vec![PathSegment::Key(part.to_owned())],
        })
        .collect()
}

/// Encrypts and decrypts the protected fields of JSON-shaped records.
#[derive(Debug, Clone)]
pub struct RecordCodec {
    encryptor: FieldEncryptor,
    paths: Vec<Vec<PathSegment>>,
}

impl RecordCodec {
    pub fn new(encryptor: FieldEncryptor, paths: &FieldPaths) -> Self {
        Self {
            encryptor,
            paths: paths.iter().map(|p| parse_path(p)).collect(),
        }
    }

    /// Replace every protected string leaf in `record` with its envelope.
    ///
    /// `null` leaves stay `null`, missing paths and non-string leaves are left
    /// alone.
    ///
    /// # Errors
    ///
    /// Returns the first encryption failure; `record` may then be partially
    /// transformed and must not be written.
    pub fn encrypt_record(
        &self,
        record: &mut Value,
        ctx: &AuditContext,
    ) -> Result<(), FieldCryptoError> {
        self.transform(record, &|s: &str| self.encryptor.encrypt(s, ctx))
    }

    /// Replace every protected envelope in `record` with its plaintext.
    ///
    /// # Errors
    ///
    /// Returns the first decryption failure.
    pub fn decrypt_record(
        &self,
        record: &mut Value,
        ctx: &AuditContext,
    ) -> Result<(), FieldCryptoError> {
        self.transform(record, &|s: &str| self.encryptor.decrypt(s, ctx))
    }

    fn transform(
        &self,
        record: &mut Value,
        f: &dyn Fn(&str) -> Result<String, FieldCryptoError>,
    ) -> Result<(), FieldCryptoError> {
        for segments in &self.paths {
            transform_at_path(record, segments, f)?;
        }
        Ok(())
    }
}

/// Recursively navigate `value` following `segments` and rewrite any string
/// leaf found at the end of the path.
fn transform_at_path(
    value: &mut Value,
    segments: &[PathSegment],
    f: &dyn Fn(&str) -> Result<String, FieldCryptoError>,
) -> Result<(), FieldCryptoError> {
    let Some((head, rest)) = segments.split_first() else {
        if let Value::String(s) = value {
            *s = f(s)?;
        }
        return Ok(());
    };

    match head {
        PathSegment::Key(key) => {
            if let Value::Object(map) = value {
                if let Some(child) = map.get_mut(key) {
                    transform_at_path(child, rest, f)?;
                }
            }
        }
        PathSegment::ArrayItem => {
            if let Value::Array(items) = value {
                for item in items.iter_mut() {
                    transform_at_path(item, rest, f)?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::audit::NoopAuditSink;
    use crate::crypto::Envelope;
    use crate::key::{KeyHolder, KeyRing};

    fn codec(paths: &[&str]) -> RecordCodec {
        let enc = FieldEncryptor::new(
            KeyRing::new(KeyHolder::new("0".repeat(32)).unwrap()),
            Arc::new(NoopAuditSink),
        );
        let paths: FieldPaths = paths.iter().map(|p| p.to_string()).collect();
        RecordCodec::new(enc, &paths)
    }

    fn is_envelope(v: &Value) -> bool {
        v.as_str().map(|s| Envelope::decode(s).is_ok()).unwrap_or(false)
    }

    #[test]
    fn parse_path_flat() {
        assert_eq!(parse_path("ssn"), vec![PathSegment::Key("ssn".into())]);
    }

    #[test]
    fn parse_path_nested() {
        assert_eq!(parse_path("profile.address.zip").len(), 3);
    }

    #[test]
    fn parse_path_array() {
        let segs = parse_path("messages[].body");
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[1], PathSegment::ArrayItem);
    }

    #[test]
    fn encrypts_only_protected_fields_and_round_trips() {
        let codec = codec(&["diagnosis", "profile.phone"]);
        let ctx = AuditContext::default();
        let original = json!({
            "id": 17,
            "diagnosis": "Patient has mild fever",
            "profile": {"name": "Alice", "phone": "555-0100"}
        });

        let mut record = original.clone();
        codec.encrypt_record(&mut record, &ctx).unwrap();
        assert!(is_envelope(&record["diagnosis"]));
        assert!(is_envelope(&record["profile"]["phone"]));
        assert_eq!(record["profile"]["name"], "Alice");
        assert_eq!(record["id"], 17);

        codec.decrypt_record(&mut record, &ctx).unwrap();
        assert_eq!(record, original);
    }

    #[test]
    fn array_elements_are_transformed() {
        let codec = codec(&["messages[].body"]);
        let ctx = AuditContext::new("chat_message");
        let mut record = json!({
            "messages": [
                {"body": "first", "sender": "patient"},
                {"body": "second", "sender": "doctor"}
            ]
        });
        codec.encrypt_record(&mut record, &ctx).unwrap();
        for msg in record["messages"].as_array().unwrap() {
            assert!(is_envelope(&msg["body"]));
            assert!(!is_envelope(&msg["sender"]));
        }
        codec.decrypt_record(&mut record, &ctx).unwrap();
        assert_eq!(record["messages"][1]["body"], "second");
    }

    #[test]
    fn null_and_missing_fields_are_left_alone() {
        let codec = codec(&["notes", "ssn"]);
        let ctx = AuditContext::default();
        let mut record = json!({"notes": null, "name": "Bob"});
        codec.encrypt_record(&mut record, &ctx).unwrap();
        assert!(record["notes"].is_null());
        assert!(record.get("ssn").is_none());
        codec.decrypt_record(&mut record, &ctx).unwrap();
        assert!(record["notes"].is_null());
    }

    #[test]
    fn corrupted_field_fails_the_record() {
        let codec = codec(&["notes"]);
        let ctx = AuditContext::default();
        let mut record = json!({"notes": "never encrypted"});
        let err = codec.decrypt_record(&mut record, &ctx).unwrap_err();
        assert!(err.is_data_integrity());
    }
}
