//! Tracing setup: JSON logs, plus OTLP span export when an endpoint is set.
//!
//! # Telemetry invariants
//!
//! - **No plaintext, envelopes, or key material** in any span attribute or log
//!   field. Audit lines carry only the fields of `AuditEvent`.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`) and
//!   overridable with `RUST_LOG`.

pub mod init;

pub use init::init_telemetry;
