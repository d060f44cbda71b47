//! Multi-version ordered map.
//!
//! Every key keeps a short history of `(version, Option<value>)` entries, where
//! `None` marks an erase. Writes always land at the latest version; reads can
//! target any version between the oldest retained version and the latest one,
//! and repeated reads at the same version return the same answer.
//!
//! History below a version is dropped with [`VersionedMap::forget_versions_before`].
//! The newest entry at or below the forget point survives so that reads at the
//! new oldest version still see it.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::ops::RangeBounds;

use crate::error::StoreError;
use crate::types::Version;

/// Ordered map whose contents can be read as of any retained version.
#[derive(Debug, Clone)]
pub struct VersionedMap<K, V> {
    entries: BTreeMap<K, BTreeMap<Version, Option<V>>>,
    latest: Version,
    oldest: Version,
}

impl<K: Ord + Clone, V: Clone> Default for VersionedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Clone, V: Clone> VersionedMap<K, V> {
    /// Empty map at version 0.
    pub fn new() -> Self {
        Self::at_version(0)
    }

    /// Empty map whose latest and oldest versions are `version`.
    pub fn at_version(version: Version) -> Self {
        Self {
            entries: BTreeMap::new(),
            latest: version,
            oldest: version,
        }
    }

    /// Version that writes currently land at.
    pub fn latest_version(&self) -> Version {
        self.latest
    }

    /// Oldest version still readable.
    pub fn oldest_version(&self) -> Version {
        self.oldest
    }

    /// Number of keys with any retained history (including erased keys whose
    /// erase has not been forgotten yet).
    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }

    /// Advance the latest version. Subsequent writes land at `version`.
    pub fn create_new_version(&mut self, version: Version) -> Result<(), StoreError> {
        if version <= self.latest {
            return Err(StoreError::NonMonotonicVersion {
                version,
                latest: self.latest,
            });
        }
        self.latest = version;
        Ok(())
    }

    /// Set `key` to `value` at the latest version.
    pub fn insert(&mut self, key: K, value: V) {
        self.entries.entry(key).or_default().insert(self.latest, Some(value));
    }

    /// Erase `key` at the latest version. Erasing an absent key is a no-op.
    pub fn erase(&mut self, key: &K) {
        let latest = self.latest;
        if let Some(history) = self.entries.get_mut(key) {
            let live = history.values().next_back().is_some_and(Option::is_some);
            if live {
                history.insert(latest, None);
            }
        }
    }

    /// Erase every live key in `range` at the latest version.
    pub fn erase_range<R: RangeBounds<K>>(&mut self, range: R) {
        let latest = self.latest;
        for history in self.entries.range_mut(range).map(|(_, h)| h) {
            if history.values().next_back().is_some_and(Option::is_some) {
                history.insert(latest, None);
            }
        }
    }

    /// Value of `key` as of `version`.
    pub fn read_at(&self, version: Version, key: &K) -> Result<Option<&V>, StoreError> {
        self.check_readable(version)?;
        Ok(self.entries.get(key).and_then(|history| value_at(history, version)))
    }

    /// Value of `key` at the latest version.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).and_then(|history| value_at(history, self.latest))
    }

    /// Live entries in `range` as of `version`, in key order, at most `limit`.
    pub fn range_at<R: RangeBounds<K>>(
        &self,
        version: Version,
        range: R,
        limit: usize,
    ) -> Result<Vec<(K, V)>, StoreError> {
        self.check_readable(version)?;
        Ok(self
            .entries
            .range(range)
            .filter_map(|(key, history)| value_at(history, version).map(|v| (key.clone(), v.clone())))
            .take(limit)
            .collect())
    }

    /// Drop history that no read at or above `version` can observe.
    ///
    /// `version` is clamped to the latest version. Forgetting below the
    /// current oldest version is a no-op.
    pub fn forget_versions_before(&mut self, version: Version) {
        let version = version.min(self.latest);
        if version <= self.oldest {
            return;
        }
        self.entries.retain(|_, history| {
            let mut newer = history.split_off(&version);
            let floor = newer.contains_key(&version);
            if !floor {
                if let Some((v, value)) = history.pop_last() {
                    newer.insert(v, value);
                }
            }
            *history = newer;
            // A key whose only remaining entry is an erase is gone for good.
            !(history.len() == 1 && history.values().all(Option::is_none))
        });
        self.oldest = version;
    }

    fn check_readable(&self, version: Version) -> Result<(), StoreError> {
        if version < self.oldest {
            return Err(StoreError::VersionTooOld {
                version,
                oldest: self.oldest,
            });
        }
        if version > self.latest {
            return Err(StoreError::FutureVersion {
                version,
                latest: self.latest,
            });
        }
        Ok(())
    }
}

fn value_at<V>(history: &BTreeMap<Version, Option<V>>, version: Version) -> Option<&V> {
    history.range((Bound::Unbounded, Bound::Included(version))).next_back().and_then(|(_, v)| v.as_ref())
}
