//! [`KeyRing`]: lock-free, versioned set of master keys.

use std::sync::Arc;

use arc_swap::ArcSwap;

use super::{KeyError, KeyHolder};

/// Retired keys kept for decryption when the caller does not say otherwise.
pub const DEFAULT_MAX_RETIRED: usize = 4;

/// One immutable generation of the key ring.
#[derive(Debug)]
pub struct KeySet {
    current: Arc<KeyHolder>,
    version: u32,
    /// Newest first.
    retired: Vec<(u32, Arc<KeyHolder>)>,
}

impl KeySet {
    /// Key used for every new encryption.
    pub fn current(&self) -> &KeyHolder {
        &self.current
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Keys to try when opening an envelope, current first, then retired
    /// newest-first.
    pub fn decryption_candidates(&self) -> impl Iterator<Item = (u32, &KeyHolder)> {
        std::iter::once((self.version, self.current.as_ref())).chain(
            self.retired
                .iter()
                .map(|(version, holder)| (*version, holder.as_ref())),
        )
    }

    pub fn retired_versions(&self) -> Vec<u32> {
        self.retired.iter().map(|(v, _)| *v).collect()
    }

    fn promote(&self, next: Arc<KeyHolder>, version: u32, max_retired: usize) -> KeySet {
        let mut retired = Vec::with_capacity(self.retired.len() + 1);
        retired.push((self.version, self.current.clone()));
        retired.extend(self.retired.iter().cloned());
        retired.truncate(max_retired);
        KeySet {
            current: next,
            version,
            retired,
        }
    }
}

/// Shared handle to the current master key and its retired predecessors.
///
/// Backed by [`ArcSwap`] so the encrypt/decrypt hot path never blocks and an
/// installation swaps the whole set atomically. Clones share state.
#[derive(Clone, Debug)]
pub struct KeyRing {
    inner: Arc<ArcSwap<KeySet>>,
    max_retired: usize,
}

impl KeyRing {
    /// A ring holding only `current` as version 1.
    pub fn new(current: KeyHolder) -> Self {
        Self::with_history(current, 1, Vec::new(), DEFAULT_MAX_RETIRED)
    }

    /// A ring at `version` with `retired` keys (newest first) still accepted
    /// for decryption. At most `max_retired` retired keys are kept.
    pub fn with_history(
        current: KeyHolder,
        version: u32,
        retired: Vec<(u32, KeyHolder)>,
        max_retired: usize,
    ) -> Self {
        let mut retired: Vec<(u32, Arc<KeyHolder>)> = retired
            .into_iter()
            .map(|(v, holder)| (v, Arc::new(holder)))
            .collect();
        retired.truncate(max_retired);
        let set = KeySet {
            current: Arc::new(current),
            version,
            retired,
        };
        Self {
            inner: Arc::new(ArcSwap::new(Arc::new(set))),
            max_retired,
        }
    }

    /// Current key set. The returned snapshot stays valid across a
    /// concurrent installation.
    pub fn snapshot(&self) -> Arc<KeySet> {
        self.inner.load_full()
    }

    pub fn current_version(&self) -> u32 {
        self.inner.load().version
    }

    /// Make `next` the current key at `version`, retiring the previous one.
    ///
    /// Existing envelopes are not re-encrypted; they stay readable while their
    /// key is within the retired window.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::StaleVersion`] unless `version` is greater than the
    /// current version.
    pub fn install(&self, next: KeyHolder, version: u32) -> Result<(), KeyError> {
        let next = Arc::new(next);
        let mut stale = None;
        self.inner.rcu(|set| {
            if version <= set.version {
                stale = Some(set.version);
                return set.clone();
            }
            stale = None;
            Arc::new(set.promote(next.clone(), version, self.max_retired))
        });
        match stale {
            Some(current) => Err(KeyError::StaleVersion {
                current,
                offered: version,
            }),
            None => Ok(()),
        }
    }
}
