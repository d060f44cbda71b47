//! Optimistic read-your-writes transactions over a [`VersionedStore`].

use std::collections::BTreeMap;

use strata_constants::MAX_RANGE_RESULTS;

use crate::error::StoreError;
use crate::store::CommitRequest;
use crate::store::VersionedStore;
use crate::types::KeyRange;
use crate::types::KeyValue;
use crate::types::Mutation;
use crate::types::Version;
use crate::validation::validate_key;
use crate::validation::validate_value;

/// A transaction reading at a fixed version and buffering its writes.
///
/// Reads see the transaction's own uncommitted writes. Every read records a
/// conflict range; [`commit`](Transaction::commit) fails with
/// [`StoreError::Conflict`] if any of those ranges was written after the
/// read version.
pub struct Transaction<'a, S: VersionedStore + ?Sized> {
    store: &'a S,
    read_version: Version,
    read_conflicts: Vec<KeyRange>,
    /// Pending writes; `None` is a clear.
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a, S: VersionedStore + ?Sized> Transaction<'a, S> {
    /// Start a transaction at the store's latest version.
    pub async fn begin(store: &'a S) -> Result<Self, StoreError> {
        let read_version = store.read_version().await?;
        Ok(Self::at_version(store, read_version))
    }

    /// Start a transaction at an explicit read version.
    pub fn at_version(store: &'a S, read_version: Version) -> Self {
        Self {
            store,
            read_version,
            read_conflicts: Vec::new(),
            writes: BTreeMap::new(),
        }
    }

    /// Version this transaction reads at.
    pub fn read_version(&self) -> Version {
        self.read_version
    }

    /// True when the transaction has buffered writes.
    pub fn has_writes(&self) -> bool {
        !self.writes.is_empty()
    }

    /// Read one key.
    pub async fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(pending) = self.writes.get(key) {
            return Ok(pending.clone());
        }
        self.read_conflicts.push(KeyRange::single(key));
        self.store.get(key, self.read_version).await
    }

    /// Read a range, merged with pending writes, in key order, at most `limit`.
    pub async fn get_range(&mut self, range: &KeyRange, limit: u32) -> Result<Vec<KeyValue>, StoreError> {
        if range.end < range.begin {
            return Err(StoreError::InvalidRange);
        }
        let limit = limit.min(MAX_RANGE_RESULTS);
        let pending: Vec<(&Vec<u8>, &Option<Vec<u8>>)> =
            self.writes.range(range.begin.clone()..range.end.clone()).collect();
        // Each pending clear can hide at most one stored entry.
        let fetch = limit.saturating_add(pending.len() as u32);
        let stored = self.store.get_range(range, self.read_version, fetch).await?;

        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = stored.into_iter().map(|kv| (kv.key, kv.value)).collect();
        for (key, value) in pending {
            match value {
                Some(value) => merged.insert(key.clone(), value.clone()),
                None => merged.remove(key),
            };
        }
        self.read_conflicts.push(range.clone());
        Ok(merged.into_iter().take(limit as usize).map(|(key, value)| KeyValue { key, value }).collect())
    }

    /// Buffer a write.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        validate_key(key)?;
        validate_value(value)?;
        self.writes.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    /// Buffer a clear.
    pub fn clear(&mut self, key: &[u8]) -> Result<(), StoreError> {
        validate_key(key)?;
        self.writes.insert(key.to_vec(), None);
        Ok(())
    }

    /// Add a conflict range without reading it.
    pub fn add_read_conflict(&mut self, range: KeyRange) {
        self.read_conflicts.push(range);
    }

    /// Commit buffered writes. Returns the commit version, or the read version
    /// for a transaction without writes.
    pub async fn commit(self) -> Result<Version, StoreError> {
        if self.writes.is_empty() {
            return Ok(self.read_version);
        }
        let mutations = self
            .writes
            .into_iter()
            .map(|(key, value)| match value {
                Some(value) => Mutation::Set { key, value },
                None => Mutation::Clear { key },
            })
            .collect();
        self.store
            .commit(CommitRequest {
                read_version: self.read_version,
                read_conflicts: self.read_conflicts,
                mutations,
            })
            .await
    }
}
