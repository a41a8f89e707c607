//! Configuration loading and validation.
//!
//! All values are read from environment variables at startup. A missing or
//! short master key surfaces when the key ring is built, which callers treat
//! as fatal.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::key::{ring::DEFAULT_MAX_RETIRED, KeyError, KeyHolder, KeyRing, KeyRotation};

/// Validated encryption configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Current master secret. **Required** to build a key ring.
    #[serde(default)]
    pub hipaa_encryption_key: Option<String>,

    /// Retired master secrets, comma-separated, newest first. Still accepted
    /// for decryption.
    #[serde(default)]
    pub hipaa_retired_encryption_keys: Option<String>,

    /// Version number of the current master secret.
    #[serde(default = "default_key_version")]
    pub hipaa_key_version: u32,

    /// RFC 3339 time the current secret was installed. Defaults to startup time.
    #[serde(default)]
    pub hipaa_key_last_rotation: Option<String>,

    /// How long (seconds) a master secret stays current before rotation is due.
    #[serde(default = "default_key_rotation_interval")]
    pub key_rotation_interval_secs: u64,

    /// How often (seconds) the rotation monitor checks the due date.
    #[serde(default = "default_key_rotation_check")]
    pub key_rotation_check_secs: u64,

    /// Upper bound on retired secrets kept for decryption.
    #[serde(default = "default_max_retired_keys")]
    pub max_retired_keys: usize,

    /// OTLP endpoint for span export. Logs only when unset.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_key_version() -> u32 {
    1
}
fn default_key_rotation_interval() -> u64 {
    30 * 24 * 3600
}
fn default_key_rotation_check() -> u64 {
    3600
}
fn default_max_retired_keys() -> usize {
    DEFAULT_MAX_RETIRED
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or fails validation.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        if self.hipaa_key_version == 0 {
            anyhow::bail!("HIPAA_KEY_VERSION must be >= 1");
        }
        let retired = self.retired_secrets().len();
        if retired >= self.hipaa_key_version as usize {
            anyhow::bail!(
                "HIPAA_KEY_VERSION ({}) must exceed the number of retired keys ({retired})",
                self.hipaa_key_version
            );
        }
        if retired > self.max_retired_keys {
            anyhow::bail!(
                "HIPAA_RETIRED_ENCRYPTION_KEYS lists {retired} keys but MAX_RETIRED_KEYS is {}",
                self.max_retired_keys
            );
        }
        if self.key_rotation_interval_secs == 0 {
            anyhow::bail!("KEY_ROTATION_INTERVAL_SECS must be > 0");
        }
        if self.key_rotation_check_secs == 0 {
            anyhow::bail!("KEY_ROTATION_CHECK_SECS must be > 0");
        }
        self.last_rotation()?;
        Ok(())
    }

    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.key_rotation_interval_secs)
    }

    pub fn rotation_check_interval(&self) -> Duration {
        Duration::from_secs(self.key_rotation_check_secs)
    }

    /// Build the key ring: the current secret at `hipaa_key_version`, retired
    /// secrets at the versions immediately below it.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::MissingKey`] if no current secret is configured and
    /// [`KeyError::InvalidKeyLength`] if any secret is too short.
    pub fn key_ring(&self) -> Result<KeyRing, KeyError> {
        let current = KeyHolder::from_sources(self.hipaa_encryption_key.as_deref(), None)?;
        let retired = self
            .retired_secrets()
            .into_iter()
            .enumerate()
            .map(|(i, secret)| {
                let version = self.hipaa_key_version.saturating_sub(i as u32 + 1);
                KeyHolder::new(secret).map(|holder| (version, holder))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(KeyRing::with_history(
            current,
            self.hipaa_key_version,
            retired,
            self.max_retired_keys,
        ))
    }

    /// Rotation state for the current secret.
    ///
    /// # Errors
    ///
    /// Returns an error if `hipaa_key_last_rotation` is not RFC 3339.
    pub fn key_rotation(&self) -> Result<KeyRotation> {
        let last = self.last_rotation()?.unwrap_or_else(Utc::now);
        Ok(KeyRotation::resume(
            self.hipaa_key_version,
            last,
            self.rotation_interval(),
        ))
    }

    fn last_rotation(&self) -> Result<Option<DateTime<Utc>>> {
        self.hipaa_key_last_rotation
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                DateTime::parse_from_rfc3339(s.trim())
                    .map(|t| t.with_timezone(&Utc))
                    .context("HIPAA_KEY_LAST_ROTATION must be an RFC 3339 timestamp")
            })
            .transpose()
    }

    fn retired_secrets(&self) -> Vec<&str> {
        self.hipaa_retired_encryption_keys
            .as_deref()
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("Config")
            .field(
                "hipaa_encryption_key",
                &self.hipaa_encryption_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("retired_keys", &self.retired_secrets().len())
            .field("hipaa_key_version", &self.hipaa_key_version)
            .field("hipaa_key_last_rotation", &self.hipaa_key_last_rotation)
            .field("key_rotation_interval_secs", &self.key_rotation_interval_secs)
            .field("key_rotation_check_secs", &self.key_rotation_check_secs)
            .field("max_retired_keys", &self.max_retired_keys)
            .field("otel_exporter_otlp_endpoint", &self.otel_exporter_otlp_endpoint)
            .field("log_level", &self.log_level)
            .finish()
    }
}
