//! Master key rotation bookkeeping and the background due-date monitor.

use std::time::Duration;

use chrono::{DateTime, Utc};
use common::protocol::KeyMetadata;
use tokio::time;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::{generate_master_secret, KeyError, KeyHolder, KeyRing};

/// Rotate the master key every 30 days.
pub const DEFAULT_ROTATION_INTERVAL: Duration = Duration::from_secs(30 * 24 * 3600);

/// A newly generated master secret and the version it should be installed at.
///
/// The caller must persist `secret` in its secret store before installing
/// it, or envelopes written under it become unreadable after a restart.
pub struct RotatedKey {
    pub version: u32,
    pub secret: Zeroizing<String>,
}

impl RotatedKey {
    /// Validate the new secret and make it current in `ring`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::StaleVersion`] if `ring` is already at or past
    /// this version.
    pub fn install_into(&self, ring: &KeyRing) -> Result<(), KeyError> {
        ring.install(KeyHolder::new(self.secret.as_bytes())?, self.version)
    }
}

impl std::fmt::Debug for RotatedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotatedKey")
            .field("version", &self.version)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Tracks the current key version and when it was last rotated.
///
/// Rotation only affects future encryptions; nothing here re-encrypts
/// existing envelopes.
#[derive(Debug, Clone)]
pub struct KeyRotation {
    key_version: u32,
    last_rotation: DateTime<Utc>,
    interval: chrono::Duration,
}

impl KeyRotation {
    /// Start tracking at version 1, rotated now.
    pub fn new(interval: Duration) -> Self {
        Self::resume(1, Utc::now(), interval)
    }

    /// Restore previously persisted rotation state.
    pub fn resume(key_version: u32, last_rotation: DateTime<Utc>, interval: Duration) -> Self {
        Self {
            key_version,
            last_rotation,
            interval: chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::MAX),
        }
    }

    pub fn key_version(&self) -> u32 {
        self.key_version
    }

    pub fn last_rotation(&self) -> DateTime<Utc> {
        self.last_rotation
    }

    pub fn next_rotation(&self) -> DateTime<Utc> {
        self.last_rotation
            .checked_add_signed(self.interval)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// `true` once strictly more than the interval has elapsed.
    pub fn should_rotate(&self) -> bool {
        self.should_rotate_at(Utc::now())
    }

    pub fn should_rotate_at(&self, now: DateTime<Utc>) -> bool {
        now > self.next_rotation()
    }

    /// Generate a new master secret and advance the version, whether or not
    /// rotation is due.
    pub fn rotate(&mut self) -> RotatedKey {
        self.rotate_at(Utc::now())
    }

    pub fn rotate_at(&mut self, now: DateTime<Utc>) -> RotatedKey {
        self.key_version += 1;
        self.last_rotation = now;
        info!(key_version = self.key_version, "encryption key rotated");
        RotatedKey {
            version: self.key_version,
            secret: generate_master_secret(),
        }
    }

    /// Rotate only when due; `None` otherwise.
    pub fn rotate_if_due(&mut self) -> Option<RotatedKey> {
        let now = Utc::now();
        if !self.should_rotate_at(now) {
            return None;
        }
        Some(self.rotate_at(now))
    }

    pub fn metadata(&self) -> KeyMetadata {
        self.metadata_at(Utc::now())
    }

    pub fn metadata_at(&self, now: DateTime<Utc>) -> KeyMetadata {
        let next_rotation = self.next_rotation();
        KeyMetadata {
            current_version: self.key_version,
            last_rotation: self.last_rotation,
            next_rotation,
            days_until_rotation: (next_rotation - now).num_days(),
        }
    }
}

impl Default for KeyRotation {
    fn default() -> Self {
        Self::new(DEFAULT_ROTATION_INTERVAL)
    }
}

/// Spawn a background task that checks every `check_every` whether rotation
/// is due and warns once it is.
///
/// The monitor never rotates by itself: a new secret has to be persisted in
/// the external secret store first.
pub fn spawn_rotation_monitor(
    rotation: KeyRotation,
    check_every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(check_every);
        loop {
            ticker.tick().await;
            let meta = rotation.metadata();
            if rotation.should_rotate() {
                warn!(
                    key_version = meta.current_version,
                    last_rotation = %meta.last_rotation,
                    days_overdue = -meta.days_until_rotation,
                    "master key rotation is due"
                );
            } else {
                debug!(
                    key_version = meta.current_version,
                    days_until_rotation = meta.days_until_rotation,
                    "master key rotation not yet due"
                );
            }
        }
    })
}
